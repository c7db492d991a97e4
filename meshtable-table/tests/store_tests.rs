use meshtable_table::{TableStore, WriteOp};
use meshtable_types::{Record, TableType, Value};
use pretty_assertions::assert_eq;

fn person(name: &str, age: i64) -> Record {
    Record::from([Value::text(name), Value::int(age)])
}

fn one(v: i64) -> Record {
    Record::from([Value::int(v)])
}

fn ordered_set() -> TableStore {
    TableStore::new(TableType::OrderedSet, 1)
}

fn bag() -> TableStore {
    TableStore::new(TableType::Bag, 1)
}

// ── ordered_set ──────────────────────────────────────────────────

#[test]
fn insert_and_lookup() {
    let mut store = ordered_set();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    assert_eq!(store.lookup(&Value::text("alice")), vec![person("alice", 32)]);
    assert_eq!(store.size(), 1);
}

#[test]
fn insert_overwrites_per_key() {
    let mut store = ordered_set();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("alice", 33)));
    assert_eq!(store.lookup(&Value::text("alice")), vec![person("alice", 33)]);
    assert_eq!(store.size(), 1);
}

#[test]
fn insert_then_delete_leaves_nothing() {
    let mut store = ordered_set();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Delete(Value::text("alice")));
    assert_eq!(store.dump(), Vec::<Record>::new());
}

#[test]
fn dump_is_sorted_by_key() {
    let mut store = ordered_set();
    for v in [3, 1, 2] {
        store.apply(&WriteOp::Insert(one(v)));
    }
    assert_eq!(store.dump(), vec![one(1), one(2), one(3)]);
}

#[test]
fn delete_many_removes_all_named_keys() {
    let mut store = ordered_set();
    store.apply(&WriteOp::InsertMany(vec![one(1), one(2), one(3)]));
    store.apply(&WriteOp::DeleteMany(vec![Value::int(1), Value::int(3)]));
    assert_eq!(store.dump(), vec![one(2)]);
}

#[test]
fn delete_object_requires_whole_match() {
    let mut store = ordered_set();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::DeleteObject(person("alice", 33)));
    assert_eq!(store.size(), 1);
    store.apply(&WriteOp::DeleteObject(person("alice", 32)));
    assert_eq!(store.size(), 0);
}

#[test]
fn keypos_other_than_one() {
    let mut store = TableStore::new(TableType::OrderedSet, 2);
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("bob", 32)));
    // Both records share key 32 at position 2; the second wins.
    assert_eq!(store.lookup(&Value::int(32)), vec![person("bob", 32)]);
}

#[test]
fn keyless_records_are_skipped() {
    let mut store = TableStore::new(TableType::OrderedSet, 3);
    store.apply(&WriteOp::Insert(person("alice", 32)));
    assert_eq!(store.size(), 0);
}

// ── bag ──────────────────────────────────────────────────────────

#[test]
fn bag_keeps_many_records_per_key() {
    let mut store = bag();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("alice", 33)));
    assert_eq!(
        store.lookup(&Value::text("alice")),
        vec![person("alice", 32), person("alice", 33)]
    );
    assert_eq!(store.size(), 2);
}

#[test]
fn bag_deduplicates_whole_records() {
    let mut store = bag();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("alice", 32)));
    assert_eq!(store.size(), 1);
}

#[test]
fn bag_delete_removes_every_record_for_the_key() {
    let mut store = bag();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("alice", 33)));
    store.apply(&WriteOp::Delete(Value::text("alice")));
    assert_eq!(store.size(), 0);
}

#[test]
fn bag_delete_object_removes_one_value() {
    let mut store = bag();
    store.apply(&WriteOp::Insert(person("alice", 32)));
    store.apply(&WriteOp::Insert(person("alice", 33)));
    store.apply(&WriteOp::DeleteObject(person("alice", 32)));
    assert_eq!(store.lookup(&Value::text("alice")), vec![person("alice", 33)]);
}

#[test]
fn bag_delete_objects_removes_many() {
    let mut store = bag();
    store.apply(&WriteOp::InsertMany(vec![
        person("alice", 1),
        person("alice", 2),
        person("bob", 3),
    ]));
    store.apply(&WriteOp::DeleteObjects(vec![
        person("alice", 1),
        person("bob", 3),
    ]));
    assert_eq!(store.dump(), vec![person("alice", 2)]);
}
