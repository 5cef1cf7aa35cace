//! Integration tests for lazily-loaded relations
//!
//! Every accessor runs a fresh query; these tests check the shape of each
//! relation kind and that results follow the stored data.

mod common;

use pretty_assertions::assert_eq;
use sqlorm::OrmError;
use sqlorm::orm::{Entity, Related, Repository};
use sqlorm::Value;

use common::{Address, Contact, Phone, Schedule, memory_connection, seed};

const FIXTURES: &[&str] = &[
    "INSERT INTO contacts (first_name, last_name) VALUES ('Joabe', 'Silva')",
    "INSERT INTO contacts (first_name, last_name) VALUES ('Lonely', 'Person')",
    "INSERT INTO phones (contact_id, phone_number, active) VALUES (1, '555-0100', 1)",
    "INSERT INTO phones (contact_id, phone_number, active) VALUES (1, '555-0101', 0)",
    "INSERT INTO phones (contact_id, phone_number, active) VALUES (99, '555-0199', 1)",
    "INSERT INTO addresses (contact_id, street) VALUES (1, 'Rua Augusta')",
    "INSERT INTO schedules (title, start_time, end_time) VALUES ('Standup', '2017-10-20 09:00:00', '2017-10-20 09:15:00')",
    "INSERT INTO schedules (title, start_time, end_time) VALUES ('Review', '2017-10-20 16:50:00', '2017-10-20 17:30:00')",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (1, 1)",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (1, 2)",
];

async fn load(id: i64) -> Contact {
    let conn = memory_connection().await;
    seed(&conn, FIXTURES).await;
    Repository::<Contact>::new(conn)
        .find_by_id(id)
        .await
        .unwrap()
        .expect("fixture contact")
}

#[tokio::test]
async fn test_has_many_returns_every_match() {
    let joabe = load(1).await;

    let phones: Vec<Phone> = joabe.has_many("phones").await.unwrap();
    let numbers: Vec<_> = phones.iter().map(|p| p.get("phone_number").clone()).collect();
    assert_eq!(numbers, vec![Value::from("555-0100"), Value::from("555-0101")]);
    assert_eq!(phones[1].get("active"), &Value::Bool(false));
}

#[tokio::test]
async fn test_to_many_relations_are_empty_without_matches() {
    let lonely = load(2).await;

    let phones: Vec<Phone> = lonely.has_many("phones").await.unwrap();
    assert!(phones.is_empty());

    let schedules: Vec<Schedule> = lonely.has_many("schedules").await.unwrap();
    assert!(schedules.is_empty());
}

#[tokio::test]
async fn test_has_one_and_belongs_to() {
    let joabe = load(1).await;

    let address: Option<Address> = joabe.has_one("address").await.unwrap();
    assert_eq!(address.unwrap().get("street"), &Value::from("Rua Augusta"));

    let phones: Vec<Phone> = joabe.has_many("phones").await.unwrap();
    let owner: Option<Contact> = phones[0].has_one("contact").await.unwrap();
    assert_eq!(owner.unwrap().get("first_name"), &Value::from("Joabe"));

    let lonely = load(2).await;
    let address: Option<Address> = lonely.has_one("address").await.unwrap();
    assert!(address.is_none());
}

#[tokio::test]
async fn test_belongs_to_missing_parent_is_none() {
    let conn = memory_connection().await;
    seed(&conn, FIXTURES).await;

    let orphan = Repository::<Phone>::new(conn).find_by_id(3).await.unwrap().unwrap();
    let owner: Option<Contact> = orphan.has_one("contact").await.unwrap();
    assert!(owner.is_none());
}

#[tokio::test]
async fn test_many_many_through_junction() {
    let joabe = load(1).await;

    let schedules: Vec<Schedule> = joabe.has_many("schedules").await.unwrap();
    let titles: Vec<_> = schedules.iter().map(|s| s.get("title").clone()).collect();
    assert_eq!(titles, vec![Value::from("Standup"), Value::from("Review")]);

    let start = schedules[1].get("start_time").as_datetime().unwrap();
    assert_eq!(start.format("%Y-%m-%d %H:%M:%S").to_string(), "2017-10-20 16:50:00");
}

#[tokio::test]
async fn test_relations_are_requeried_on_every_access() {
    let conn = memory_connection().await;
    seed(&conn, FIXTURES).await;
    let joabe = Repository::<Contact>::new(conn.clone())
        .find_by_id(1)
        .await
        .unwrap()
        .unwrap();

    let before: Vec<Phone> = joabe.has_many("phones").await.unwrap();
    seed(
        &conn,
        &["INSERT INTO phones (contact_id, phone_number, active) VALUES (1, '555-0102', 1)"],
    )
    .await;
    let after: Vec<Phone> = joabe.has_many("phones").await.unwrap();

    assert_eq!(before.len(), 2);
    assert_eq!(after.len(), 3);
}

#[tokio::test]
async fn test_dynamic_record_access() {
    let joabe = load(1).await;

    match joabe.record().related("address").await.unwrap() {
        Related::One(Some(record)) => assert_eq!(record.get("street"), &Value::from("Rua Augusta")),
        other => panic!("unexpected relation shape: {:?}", other),
    }

    match joabe.record().related("phones").await.unwrap() {
        Related::Many(records) => assert_eq!(records.len(), 2),
        other => panic!("unexpected relation shape: {:?}", other),
    }

    assert!(matches!(joabe.record().related("avatar").await.unwrap(), Related::None));
}

#[tokio::test]
async fn test_relation_errors() {
    let joabe = load(1).await;

    let unknown = joabe.has_many::<Phone>("emails").await;
    assert!(matches!(unknown, Err(OrmError::UnknownRelation { name, .. }) if name == "emails"));

    let mismatch = joabe.has_many::<Schedule>("phones").await;
    assert!(matches!(
        mismatch,
        Err(OrmError::RelationMismatch { expected, found }) if expected == "schedules" && found == "phones"
    ));

    let none: Vec<Phone> = joabe.has_many("avatar").await.unwrap();
    assert!(none.is_empty());
}
