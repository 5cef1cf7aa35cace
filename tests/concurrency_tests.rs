//! Repositories and relation loaders used from spawned tasks
//!
//! Handlers on a multi-threaded runtime need every future to be `Send`.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlorm::orm::{Entity, Repository};
use sqlorm::{Connection, Value};

use common::{Contact, Phone, memory_connection, seed};

async fn save_contact(conn: Arc<Connection>, first_name: &str) -> i64 {
    let mut repo = Repository::<Contact>::new(conn);
    let mut contact = Contact::blank();
    contact.set("first_name", first_name);
    contact.set("last_name", "Silva");

    assert!(repo.save(&mut contact).await, "{}", repo.errors());
    contact.get("id").as_i64().expect("assigned id")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_operations_run_in_spawned_tasks() {
    let conn = memory_connection().await;

    let id = tokio::spawn(save_contact(conn.clone(), "Joabe"))
        .await
        .unwrap();
    assert_eq!(id, 1);

    seed(
        &conn,
        &["INSERT INTO phones (contact_id, phone_number, active) VALUES (1, '555-0100', 1)"],
    )
    .await;

    let found = tokio::spawn({
        let conn = conn.clone();
        async move { Repository::<Contact>::new(conn).find_by_id(id).await }
    })
    .await
    .unwrap()
    .unwrap()
    .expect("saved contact");
    assert_eq!(found.get("first_name"), &Value::from("Joabe"));

    let phones: Vec<Phone> = tokio::spawn(async move { found.has_many("phones").await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(phones.len(), 1);
    assert_eq!(phones[0].get("phone_number"), &Value::from("555-0100"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_share_one_connection() {
    let conn = memory_connection().await;

    let handles: Vec<_> = ["Ana", "Bia", "Caio", "Davi"]
        .into_iter()
        .map(|name| tokio::spawn(save_contact(conn.clone(), name)))
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let total = tokio::spawn({
        let conn = conn.clone();
        async move {
            Repository::<Contact>::new(conn)
                .count(sqlorm::Filter::default())
                .await
        }
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(total, 4);
    assert!(conn.is_connected().await);
}
