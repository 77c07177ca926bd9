#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use normalized_cache::{CacheConfig, Executor, QueryCache, Response, SchemaMaps};
use runtime::kv::{Bytes, KvResult, KvStore, KvStoreInner};
use runtime_local::InMemoryKv;

pub const COUNTRIES_SDL: &str = r#"
    type Query {
        country(id: ID!): Country
        countries: [Country!]!
        version: String
    }

    type Country {
        id: ID!
        name: String
        capital: String
        cities: [City!]
    }

    type City {
        id: ID!
        name: String
    }
"#;

pub const BOOKS_SDL: &str = r#"
    type Query {
        books: [Book!]!
        book(id: ID!): Book
    }

    type Mutation {
        addBook(title: String!): Book
        deleteBookById(id: ID!): Boolean
        publishBook(id: ID!): Book
    }

    type Book {
        id: ID!
        title: String
    }
"#;

/// Replies to queries with canned responses, in order, and remembers what it was asked
#[derive(Default)]
pub struct MockExecutor {
    responses: Mutex<VecDeque<serde_json::Value>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new(responses: impl IntoIterator<Item = serde_json::Value>) -> Self {
        MockExecutor {
            responses: Mutex::new(responses.into_iter().collect()),
            queries: Arc::default(),
        }
    }

    pub fn queries(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.queries)
    }
}

#[async_trait::async_trait]
impl Executor for MockExecutor {
    type Error = String;

    async fn execute(&self, query: String) -> Result<Response, Self::Error> {
        self.queries.lock().unwrap().push(query);

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "no response left".to_string())?;

        serde_json::from_value(response).map_err(|error| error.to_string())
    }
}

/// Logs every operation before forwarding it to an in memory store
#[derive(Default)]
pub struct RecordingKv {
    inner: InMemoryKv,
    operations: Arc<Mutex<Vec<String>>>,
}

impl RecordingKv {
    pub fn operations(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.operations)
    }

    fn record(&self, operation: &str, key: &str) {
        self.operations.lock().unwrap().push(format!("{operation} {key}"));
    }
}

#[async_trait::async_trait]
impl KvStoreInner for RecordingKv {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        self.record("get", key);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, bytes: Bytes, expiration_ttl: Option<Duration>) -> KvResult<()> {
        self.record("set", key);
        self.inner.set(key, bytes, expiration_ttl).await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.record("delete", key);
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        self.record("exists", key);
        self.inner.exists(key).await
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        self.record("keys", pattern);
        self.inner.keys(pattern).await
    }

    async fn flush_all(&self) -> KvResult<()> {
        self.record("flush_all", "");
        self.inner.flush_all().await
    }
}

pub struct TestCache {
    pub cache: QueryCache<MockExecutor>,
    pub queries: Arc<Mutex<Vec<String>>>,
    pub operations: Arc<Mutex<Vec<String>>>,
}

impl TestCache {
    pub fn new(sdl: &str, responses: impl IntoIterator<Item = serde_json::Value>) -> Self {
        let executor = MockExecutor::new(responses);
        let queries = executor.queries();

        let kv = RecordingKv::default();
        let operations = kv.operations();

        let cache = QueryCache::new(
            KvStore::new(kv),
            executor,
            SchemaMaps::from_sdl(sdl).unwrap(),
            CacheConfig::default(),
        );

        TestCache {
            cache,
            queries,
            operations,
        }
    }

    /// The queries the executor received
    pub fn executed(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    pub async fn entry(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.store().get_json(key).await.unwrap()
    }
}
