use meshtable_types::{AliasId, DumpRef, JoinRef, NodeName, PauseToken, ProcId, TableName, WriteRef};
use std::str::FromStr;

#[test]
fn ids_are_unique() {
    assert_ne!(ProcId::new(), ProcId::new());
    assert_ne!(JoinRef::new(), JoinRef::new());
    assert_ne!(AliasId::new(), AliasId::new());
    assert_ne!(DumpRef::new(), DumpRef::new());
    assert_ne!(PauseToken::new(), PauseToken::new());
    assert_ne!(WriteRef::new(), WriteRef::new());
}

#[test]
fn ids_round_trip_through_display() {
    let id = ProcId::new();
    let parsed = ProcId::from_str(&id.to_string()).expect("parse");
    assert_eq!(id, parsed);
}

#[test]
fn ids_serialize_transparently() {
    let id = JoinRef::new();
    let json = serde_json::to_string(&id).expect("serialize");
    assert_eq!(json, format!("\"{id}\""));
}

#[test]
fn v7_ids_are_time_ordered() {
    let a = WriteRef::new();
    let b = WriteRef::new();
    assert!(a.as_uuid() <= b.as_uuid());
}

#[test]
fn names_from_strings() {
    let table = TableName::from("users");
    assert_eq!(table.as_str(), "users");
    assert_eq!(table.to_string(), "users");

    let node = NodeName::from(String::from("n1"));
    assert_eq!(node, NodeName::from("n1"));
}
