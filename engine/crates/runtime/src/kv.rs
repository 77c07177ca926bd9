use std::{sync::Arc, time::Duration};

pub use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Kv error: {0}")]
    Kv(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type KvResult<T> = Result<T, KvError>;

/// A shared handle to a key-value backend.
///
/// Keys are treated case-insensitively by the cache, so callers are expected to
/// lower-case them before they get here.
#[derive(Clone)]
pub struct KvStore(Arc<dyn KvStoreInner>);

impl KvStore {
    pub fn new(inner: impl KvStoreInner + 'static) -> Self {
        Self(Arc::new(inner))
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let bytes = self.get(key).await?;
        bytes
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn put_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        expiration_ttl: Option<Duration>,
    ) -> KvResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes.into(), expiration_ttl).await
    }
}

impl std::ops::Deref for KvStore {
    type Target = dyn KvStoreInner;
    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

#[async_trait::async_trait]
pub trait KvStoreInner: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>>;

    /// Stores `bytes` under `key`, replacing any previous value. A `None` ttl keeps
    /// the entry until it is deleted.
    async fn set(&self, key: &str, bytes: Bytes, expiration_ttl: Option<Duration>) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Lists keys matching a glob style pattern (`*`, `?` and `[...]`).
    async fn keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    async fn flush_all(&self) -> KvResult<()>;
}
