#![allow(unused_crate_dependencies)]

mod common;

use common::{TestCache, BOOKS_SDL};
use normalized_cache::{CacheStatus, Error};
use serde_json::json;

const BOOKS_QUERY: &str = "{ books { id title } }";

fn books_response() -> serde_json::Value {
    json!({"data": {"books": [
        {"id": "1", "title": "Dune"},
        {"id": "2", "title": "Emma"},
        {"id": "3", "title": "Solaris"}
    ]}})
}

#[tokio::test]
async fn deleting_removes_the_entry_and_its_references() {
    let test = TestCache::new(
        BOOKS_SDL,
        [books_response(), json!({"data": {"deleteBookById": true}})],
    );

    test.cache.handle(BOOKS_QUERY).await.unwrap();
    assert!(test.entry("book--2").await.is_some());

    let response = test
        .cache
        .handle(r#"mutation { deleteBookById(id: "2") }"#)
        .await
        .unwrap();

    assert_eq!(response.cache_status, CacheStatus::Bypass);
    assert_eq!(response.data, Some(json!({"deleteBookById": true})));
    assert_eq!(test.entry("book--2").await, None);
    assert_eq!(test.entry("books").await, Some(json!(["book--1", "book--3"])));

    let books = test.cache.handle(BOOKS_QUERY).await.unwrap();
    assert_eq!(books.cache_status, CacheStatus::Hit);
    assert_eq!(
        books.data,
        Some(json!({"books": [{"id": "1", "title": "Dune"}, {"id": "3", "title": "Solaris"}]}))
    );
    assert_eq!(test.executed().len(), 2);
}

#[tokio::test]
async fn created_entities_join_existing_lists() {
    let test = TestCache::new(
        BOOKS_SDL,
        [
            books_response(),
            json!({"data": {"addBook": {"id": "4", "title": "Ubik"}}}),
        ],
    );

    test.cache.handle(BOOKS_QUERY).await.unwrap();
    test.cache
        .handle(r#"mutation { addBook(title: "Ubik") { id title } }"#)
        .await
        .unwrap();

    assert_eq!(test.entry("book--4").await, Some(json!({"id": "4", "title": "Ubik"})));

    let books = test.cache.handle(BOOKS_QUERY).await.unwrap();
    assert_eq!(books.cache_status, CacheStatus::Hit);
    assert_eq!(books.data.unwrap()["books"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn created_entities_do_not_create_lists() {
    let test = TestCache::new(BOOKS_SDL, [json!({"data": {"addBook": {"id": "4", "title": "Ubik"}}})]);

    test.cache
        .handle(r#"mutation { addBook(title: "Ubik") { id title } }"#)
        .await
        .unwrap();

    assert!(test.entry("book--4").await.is_some());
    assert_eq!(test.entry("books").await, None);
}

#[tokio::test]
async fn unsupported_mutations_are_not_executed() {
    let test = TestCache::new(BOOKS_SDL, [json!({"data": {"publishBook": {"id": "1"}}})]);

    let error = test
        .cache
        .handle(r#"mutation { publishBook(id: "1") { id } }"#)
        .await
        .unwrap_err();

    assert!(matches!(error, Error::UnsupportedMutation(ref name) if name == "publishBook"));
    assert!(test.executed().is_empty());
    assert!(test.operations().is_empty());
}

#[tokio::test]
async fn failed_mutations_leave_the_cache_alone() {
    let test = TestCache::new(
        BOOKS_SDL,
        [
            books_response(),
            json!({"data": null, "errors": [{"message": "Book 2 is locked"}]}),
        ],
    );

    test.cache.handle(BOOKS_QUERY).await.unwrap();
    let response = test
        .cache
        .handle(r#"mutation { deleteBookById(id: "2") }"#)
        .await
        .unwrap();

    assert!(response.has_errors());
    assert!(test.entry("book--2").await.is_some());
    assert_eq!(
        test.entry("books").await,
        Some(json!(["book--1", "book--2", "book--3"]))
    );
}
