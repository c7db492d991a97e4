use meshtable_table::{Error, run_tracked};

#[tokio::test]
async fn the_worker_result_passes_through() {
    let out = run_tracked("adds", async { Ok(2 + 2) }).await;
    assert_eq!(out.expect("ok"), 4);
}

#[tokio::test]
async fn worker_errors_pass_through_unchanged() {
    let out: meshtable_table::Result<()> = run_tracked("fails", async { Err(Error::Timeout) }).await;
    assert!(matches!(out, Err(Error::Timeout)));
}

#[tokio::test]
async fn a_panicking_worker_becomes_a_tagged_error() {
    let out: meshtable_table::Result<()> = run_tracked("panics", async {
        if true {
            panic!("boom");
        }
        Ok(())
    })
    .await;
    assert!(matches!(out, Err(Error::TaskFailed(_))));
}
