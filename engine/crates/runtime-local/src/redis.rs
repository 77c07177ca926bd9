use std::time::Duration;

use bytes::Bytes;
use redis::aio::ConnectionManager;
use runtime::kv::{KvError, KvResult, KvStoreInner};

/// A key-value store backed by a Redis server.
///
/// Every key is namespaced with `key_prefix`, so `flush_all` only removes the
/// entries written through this store.
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
    key_prefix: KeyPrefix,
}

impl RedisKv {
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("error creating a Redis client: {e}");
                return Err(e.into());
            }
        };

        let connection = match client.get_connection_manager().await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("error connecting to Redis: {e}");
                return Err(e.into());
            }
        };

        Ok(RedisKv {
            connection,
            key_prefix: KeyPrefix(key_prefix.into()),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        self.key_prefix.apply(key)
    }
}

#[derive(Clone, Debug, Default)]
struct KeyPrefix(String);

impl KeyPrefix {
    fn apply(&self, key: &str) -> String {
        format!("{}{key}", self.0)
    }

    /// Removes the prefix from keys returned by Redis, dropping any key that doesn't carry it
    fn strip(&self, keys: Vec<String>) -> Vec<String> {
        let mut keys = keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.0).map(str::to_string))
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    /// The pattern of the keys to delete on a flush, `None` when the whole database belongs to us
    fn flush_pattern(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.apply("*"))
    }
}

fn kv_error(error: redis::RedisError) -> KvError {
    KvError::Kv(error.to_string())
}

#[async_trait::async_trait]
impl KvStoreInner for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.prefixed(key))
            .query_async(&mut connection)
            .await
            .map_err(kv_error)?;

        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, bytes: Bytes, expiration_ttl: Option<Duration>) -> KvResult<()> {
        let mut connection = self.connection.clone();
        let mut command = redis::cmd("SET");
        command.arg(self.prefixed(key)).arg(bytes.as_ref());

        if let Some(ttl) = expiration_ttl {
            // Redis rejects an expiry of zero
            command.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }

        command.query_async::<_, ()>(&mut connection).await.map_err(kv_error)
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut connection = self.connection.clone();
        redis::cmd("DEL")
            .arg(self.prefixed(key))
            .query_async::<_, ()>(&mut connection)
            .await
            .map_err(kv_error)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut connection = self.connection.clone();
        let count: u64 = redis::cmd("EXISTS")
            .arg(self.prefixed(key))
            .query_async(&mut connection)
            .await
            .map_err(kv_error)?;

        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let mut connection = self.connection.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.prefixed(pattern))
            .query_async(&mut connection)
            .await
            .map_err(kv_error)?;

        Ok(self.key_prefix.strip(keys))
    }

    async fn flush_all(&self) -> KvResult<()> {
        let mut connection = self.connection.clone();

        let Some(pattern) = self.key_prefix.flush_pattern() else {
            return redis::cmd("FLUSHDB")
                .query_async::<_, ()>(&mut connection)
                .await
                .map_err(kv_error);
        };

        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut connection)
            .await
            .map_err(kv_error)?;

        if keys.is_empty() {
            return Ok(());
        }

        redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, ()>(&mut connection)
            .await
            .map_err(kv_error)
    }
}
