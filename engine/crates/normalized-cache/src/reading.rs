//! Reads as much of a query as possible from the cache.

use futures_util::{
    future::{join_all, BoxFuture},
    FutureExt,
};
use runtime::kv::{KvError, KvStore};
use serde_json::{Map, Value};

use crate::{
    error::Result,
    prototype::{Fields, Node, ObjectNode, Prototype},
};

/// The outcome of a cache read
#[derive(Debug, Default)]
pub struct CacheRead {
    /// The partial response built from cached entries
    pub data: Map<String, Value>,
    /// A copy of the prototype where every leaf found in the cache is `false`
    pub prototype: Prototype,
}

impl CacheRead {
    pub fn is_complete(&self) -> bool {
        !self.prototype.is_needed()
    }
}

/// Reads entries with at most `batch_size` reads in flight at any time.
pub struct CacheReader<'a> {
    store: &'a KvStore,
    batch_size: usize,
}

impl<'a> CacheReader<'a> {
    pub fn new(store: &'a KvStore, batch_size: usize) -> Self {
        CacheReader {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn read(&self, prototype: &Prototype) -> Result<CacheRead> {
        let mut data = Map::new();
        let mut fields = Fields::with_capacity(prototype.fields.len());

        for (key, node) in &prototype.fields {
            match (self.read_root(node).await?, node) {
                (Some((value, read_node)), _) => {
                    data.insert(key.clone(), value);
                    fields.insert(key.clone(), Node::Object(read_node));
                }
                (None, Node::Object(object)) => {
                    fields.insert(key.clone(), Node::Object(object.with_all(true)));
                }
                (None, scalar) => {
                    fields.insert(key.clone(), scalar.clone());
                }
            }
        }

        Ok(CacheRead {
            data,
            prototype: Prototype::new(fields),
        })
    }

    async fn read_root(&self, node: &Node) -> Result<Option<(Value, ObjectNode)>> {
        let Node::Object(object) = node else {
            return Ok(None);
        };

        // Root scalars aren't cached
        if object.is_leaf() {
            return Ok(None);
        }

        let key = object.cache_key();
        let stored = match object.entity_id() {
            Some(_) => self.entry(&key).await?.map(Value::Object),
            None => self.stored(&key).await?,
        };

        let Some(stored) = stored else {
            tracing::debug!(%key, "Cache miss");
            return Ok(None);
        };

        self.resolve(stored, object, self.batch_size).await
    }

    /// Resolves a stored value against the node that selects it.  `None` is a miss.
    ///
    /// `concurrency` is how many reads this branch may have in flight, a list
    /// shares it between its elements.
    fn resolve<'b>(
        &'b self,
        stored: Value,
        node: &'b ObjectNode,
        concurrency: usize,
    ) -> BoxFuture<'b, Result<Option<(Value, ObjectNode)>>> {
        async move {
            match stored {
                Value::Null => Ok(Some((Value::Null, node.with_all(false)))),
                Value::String(key) => match self.entry(&key).await? {
                    Some(entry) => Ok(Some(self.read_entity(entry, node, concurrency).await?)),
                    None => {
                        tracing::debug!(%key, "Referenced entry is missing");
                        Ok(None)
                    }
                },
                Value::Object(entry) => Ok(Some(self.read_entity(entry, node, concurrency).await?)),
                Value::Array(items) => self.read_list(items, node, concurrency).await,
                Value::Bool(_) | Value::Number(_) => Ok(None),
            }
        }
        .boxed()
    }

    async fn read_entity(
        &self,
        entry: Map<String, Value>,
        node: &ObjectNode,
        concurrency: usize,
    ) -> Result<(Value, ObjectNode)> {
        let mut data = Map::new();
        let mut read_node = node.clone();

        for (key, child) in &node.children {
            match child {
                Node::Scalar(_) => {
                    if let Some(value) = entry.get(key) {
                        data.insert(key.clone(), value.clone());
                        read_node.children.insert(key.clone(), Node::Scalar(false));
                    }
                }
                Node::Object(child_node) => {
                    let read = match entry.get(&child_node.field_key()) {
                        Some(stored) => self.resolve(stored.clone(), child_node, concurrency).await?,
                        None => None,
                    };

                    let child = match read {
                        Some((value, child)) => {
                            data.insert(key.clone(), value);
                            child
                        }
                        None => child_node.with_all(true),
                    };
                    read_node.children.insert(key.clone(), Node::Object(child));
                }
            }
        }

        Ok((Value::Object(data), read_node))
    }

    /// Reads every element of a list.  The list is only a hit when all of its
    /// elements were found with the same set of fields.
    ///
    /// Elements are read `concurrency` at a time and each of them reads its own
    /// nested lists one element after the other.
    async fn read_list(
        &self,
        items: Vec<Value>,
        node: &ObjectNode,
        concurrency: usize,
    ) -> Result<Option<(Value, ObjectNode)>> {
        let mut values = Vec::with_capacity(items.len());
        let mut shape: Option<ObjectNode> = None;

        for chunk in items.chunks(concurrency.max(1)) {
            let reads = join_all(chunk.iter().map(|item| self.resolve(item.clone(), node, 1))).await;

            for read in reads {
                let Some((value, element)) = read? else {
                    return Ok(None);
                };

                match &shape {
                    Some(shape) if *shape != element => {
                        tracing::debug!(field = %node.name, "List elements are only partially cached");
                        return Ok(None);
                    }
                    Some(_) => {}
                    None => shape = Some(element),
                }

                values.push(value);
            }
        }

        let shape = shape.unwrap_or_else(|| node.with_all(false));
        Ok(Some((Value::Array(values), shape)))
    }

    async fn entry(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        Ok(match self.stored(key).await? {
            Some(Value::Object(entry)) => Some(entry),
            Some(_) => {
                tracing::warn!(key, "Ignoring cache entry that isn't an object");
                None
            }
            None => None,
        })
    }

    async fn stored(&self, key: &str) -> Result<Option<Value>> {
        match self.store.get_json::<Value>(key).await {
            Ok(value) => Ok(value),
            Err(KvError::Serialization(error)) => {
                tracing::warn!(key, %error, "Ignoring malformed cache entry");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}
