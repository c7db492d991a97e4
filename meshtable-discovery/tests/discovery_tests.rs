use meshtable_discovery::{
    Discovery, DiscoveryBackend, DiscoveryConfig, DiscoveryError, FileBackend, NodeDirectory,
    StaticBackend,
};
use meshtable_table::{Table, TableOpts};
use meshtable_types::{NodeName, Record, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn start_on(name: &str, node: &str) -> Table {
    Table::start(
        name,
        TableOpts {
            node: NodeName::from(node),
            ..Default::default()
        },
    )
    .expect("start")
}

fn person(name: &str, age: i64) -> Record {
    Record::from([Value::text(name), Value::int(age)])
}

// ── Backends ─────────────────────────────────────────────────────

#[tokio::test]
async fn static_backend_returns_its_nodes() {
    let mut backend = StaticBackend::new(vec![NodeName::from("n1"), NodeName::from("n2")]);
    let nodes = backend.get_nodes().await.expect("nodes");
    assert_eq!(nodes, vec![NodeName::from("n1"), NodeName::from("n2")]);
}

#[tokio::test]
async fn file_backend_reads_one_node_per_line() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "n1").expect("write");
    writeln!(file, "  n2  ").expect("write");
    writeln!(file, "# a comment").expect("write");
    writeln!(file).expect("write");
    writeln!(file, "n3").expect("write");

    let mut backend = FileBackend::new(file.path());
    let nodes = backend.get_nodes().await.expect("nodes");
    assert_eq!(
        nodes,
        vec![NodeName::from("n1"), NodeName::from("n2"), NodeName::from("n3")]
    );
}

#[tokio::test]
async fn file_backend_surfaces_missing_files() {
    let mut backend = FileBackend::new("/nonexistent/meshtable-nodes");
    assert!(matches!(
        backend.get_nodes().await,
        Err(DiscoveryError::Io(_))
    ));
}

// ── The loop ─────────────────────────────────────────────────────

#[tokio::test]
async fn a_poll_joins_resolvable_nodes() {
    let a = start_on("td_join", "n1");
    let b = start_on("td_join", "n2");
    let directory = Arc::new(NodeDirectory::new());
    directory.register(&a);
    directory.register(&b);

    let backend = StaticBackend::new(vec![NodeName::from("n1"), NodeName::from("n2")]);
    let mut discovery = Discovery::new(Box::new(backend), directory);
    discovery.add_table(a.clone());
    discovery.poll_once().await.expect("poll");

    assert_eq!(a.other_servers().await.expect("peers"), vec![b.clone()]);
    a.insert(person("alice", 32)).await.expect("insert");
    assert_eq!(b.lookup(&Value::text("alice")).await, vec![person("alice", 32)]);
}

#[tokio::test]
async fn polling_again_is_a_clean_noop() {
    let a = start_on("td_repoll", "n1");
    let b = start_on("td_repoll", "n2");
    let directory = Arc::new(NodeDirectory::new());
    directory.register(&a);
    directory.register(&b);

    let backend = StaticBackend::new(vec![NodeName::from("n1"), NodeName::from("n2")]);
    let mut discovery = Discovery::new(Box::new(backend), directory);
    discovery.add_table(a.clone());
    discovery.poll_once().await.expect("first poll");
    discovery.poll_once().await.expect("second poll");

    assert_eq!(a.other_servers().await.expect("peers").len(), 1);
}

#[tokio::test]
async fn unresolvable_nodes_are_skipped() {
    let a = start_on("td_unknown", "n1");
    let directory = Arc::new(NodeDirectory::new());
    directory.register(&a);

    let backend = StaticBackend::new(vec![NodeName::from("n1"), NodeName::from("ghost")]);
    let mut discovery = Discovery::new(Box::new(backend), directory);
    discovery.add_table(a.clone());
    discovery.poll_once().await.expect("poll");

    assert!(a.other_servers().await.expect("peers").is_empty());
}

#[tokio::test]
async fn dead_nodes_are_skipped() {
    let a = start_on("td_dead", "n1");
    let b = start_on("td_dead", "n2");
    let directory = Arc::new(NodeDirectory::new());
    directory.register(&a);
    directory.register(&b);
    b.stop().await;

    let backend = StaticBackend::new(vec![NodeName::from("n1"), NodeName::from("n2")]);
    let mut discovery = Discovery::new(Box::new(backend), directory);
    discovery.add_table(a.clone());
    discovery.poll_once().await.expect("poll");

    assert!(a.other_servers().await.expect("peers").is_empty());
}

#[tokio::test]
async fn directory_resolves_and_forgets() {
    let a = start_on("td_dir", "n1");
    let directory = NodeDirectory::new();
    directory.register(&a);
    assert_eq!(
        directory.get(&NodeName::from("n1"), a.table_name()),
        Some(a.clone())
    );
    directory.unregister(&NodeName::from("n1"), a.table_name());
    assert_eq!(directory.get(&NodeName::from("n1"), a.table_name()), None);
}

#[test]
fn the_default_poll_interval_is_five_seconds() {
    assert_eq!(DiscoveryConfig::default().poll_interval, Duration::from_secs(5));
}
