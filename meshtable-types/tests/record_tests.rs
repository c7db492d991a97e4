use meshtable_types::{Record, TableType, Value};
use pretty_assertions::assert_eq;

fn person(name: &str, age: i64) -> Record {
    Record::from([Value::text(name), Value::int(age)])
}

// ── Keys ─────────────────────────────────────────────────────────

#[test]
fn key_at_default_position() {
    let rec = person("alice", 32);
    assert_eq!(rec.key(1), Some(&Value::text("alice")));
}

#[test]
fn key_at_later_position() {
    let rec = person("alice", 32);
    assert_eq!(rec.key(2), Some(&Value::int(32)));
}

#[test]
fn key_out_of_range_is_none() {
    let rec = person("alice", 32);
    assert_eq!(rec.key(3), None);
    assert_eq!(rec.key(0), None);
}

#[test]
fn empty_record_has_no_key() {
    let rec = Record::new(Vec::new());
    assert_eq!(rec.key(1), None);
    assert_eq!(rec.arity(), 0);
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn int_keys_order_numerically() {
    assert!(Value::int(2) < Value::int(10));
    assert!(Value::int(-1) < Value::int(0));
}

#[test]
fn text_keys_order_lexicographically() {
    assert!(Value::text("a") < Value::text("b"));
    assert!(Value::text("a") < Value::text("aa"));
}

#[test]
fn records_compare_by_whole_value() {
    assert_eq!(person("alice", 32), person("alice", 32));
    assert_ne!(person("alice", 32), person("alice", 33));
    assert!(person("alice", 32) < person("alice", 33));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn record_survives_json() {
    let rec = person("alice", 32);
    let json = serde_json::to_string(&rec).expect("serialize");
    let back: Record = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(rec, back);
}

#[test]
fn table_type_defaults_to_ordered_set() {
    assert_eq!(TableType::default(), TableType::OrderedSet);
}
