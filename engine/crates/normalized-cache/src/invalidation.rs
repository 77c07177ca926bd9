//! Keeps the cache consistent with the effects of mutations.

use std::time::Duration;

use runtime::kv::{KvError, KvStore};
use serde_json::{Map, Value};

use crate::{
    error::Result,
    identity::{generate_cache_id, Identifiers},
    normalizing::{normalize_entity, write_all},
    prototype::{ArgumentValue, ObjectNode},
    schema::SchemaMaps,
};

/// What a mutation does to the entities it touches
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

pub struct Invalidator<'a> {
    store: &'a KvStore,
    schema: &'a SchemaMaps,
    identifiers: &'a Identifiers,
    ttl: Option<Duration>,
}

impl<'a> Invalidator<'a> {
    pub fn new(store: &'a KvStore, schema: &'a SchemaMaps, identifiers: &'a Identifiers, ttl: Option<Duration>) -> Self {
        Invalidator {
            store,
            schema,
            identifiers,
            ttl,
        }
    }

    /// Applies the effect of a single mutation field, given what it returned.
    ///
    /// Concurrent mutations of the same entity can race here: entries & lists are
    /// read, modified and written back without any locking.
    pub async fn invalidate(&self, field: &ObjectNode, kind: MutationKind, returned: Option<&Value>) -> Result<()> {
        let node = ObjectNode {
            type_name: self.entity_type(field),
            ..field.clone()
        };
        let lists = self.reference_lists(&node.type_name);

        tracing::info!(mutation = %field.name, %kind, type_name = %node.type_name, "Invalidating cache");

        let returned_entities = match returned {
            _ if node.is_leaf() => Vec::new(),
            Some(Value::Object(entity)) => vec![entity],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        };

        if let Some(id) = node.entity_id() {
            let key = generate_cache_id(&node.type_name, Some(id));
            match kind {
                MutationKind::Delete => return self.evict(&key, &lists).await,
                MutationKind::Update if returned_entities.is_empty() => return self.patch(&key, &node).await,
                _ => {}
            }
        }

        if returned_entities.is_empty() {
            return self.scan(&node, kind, &lists).await;
        }

        for entity in returned_entities {
            self.apply_returned(entity, &node, kind, &lists).await?;
        }

        Ok(())
    }

    /// The lower-cased type a mutation operates on.  Mutations returning a scalar
    /// are named after their type instead, e.g. `deleteBookById` for `book`.
    fn entity_type(&self, field: &ObjectNode) -> String {
        if let Some(ty) = self.schema.mutation_map.get(&field.name) {
            if self.schema.fields_map.contains_key(&ty.name) {
                return ty.name.to_lowercase();
            }
        }

        let guessed = type_from_mutation_name(&field.name);
        let singular = guessed.strip_suffix('s').unwrap_or(&guessed);
        let types = || self.schema.fields_map.keys();

        types()
            .find(|ty| ty.eq_ignore_ascii_case(&guessed))
            .or_else(|| types().find(|ty| ty.eq_ignore_ascii_case(singular)))
            .map(|ty| ty.to_lowercase())
            .unwrap_or(guessed)
    }

    fn reference_lists(&self, type_name: &str) -> Vec<String> {
        let lists = self.schema.reference_lists_for(type_name);
        if lists.is_empty() {
            vec![format!("{type_name}s")]
        } else {
            lists
        }
    }

    async fn apply_returned(
        &self,
        entity: &Map<String, Value>,
        node: &ObjectNode,
        kind: MutationKind,
        lists: &[String],
    ) -> Result<()> {
        let Some((key, writes)) = normalize_entity(entity, node, self.identifiers) else {
            return Ok(());
        };

        if kind == MutationKind::Delete {
            return self.evict(&key, lists).await;
        }

        let existed = self.store.exists(&key).await?;
        write_all(self.store, writes, self.ttl).await?;

        if !existed {
            for list in lists {
                self.append_reference(list, &key).await?;
            }
        }

        Ok(())
    }

    async fn evict(&self, key: &str, lists: &[String]) -> Result<()> {
        self.store.delete(key).await?;

        for list in lists {
            self.remove_reference(list, key).await?;
        }

        Ok(())
    }

    /// Copies the arguments of an update into the cached entry
    async fn patch(&self, key: &str, node: &ObjectNode) -> Result<()> {
        let Some(mut entry) = self.entry(key).await? else {
            return Ok(());
        };

        for (name, value) in &node.args {
            if !self.identifiers.is_id_like(name) {
                entry.insert(name.clone(), value.to_json());
            }
        }

        Ok(self.store.put_json(key, &Value::Object(entry), self.ttl).await?)
    }

    /// Without an identifier or a returned entity, every entry of the reference
    /// lists is checked against the arguments of the mutation
    async fn scan(&self, node: &ObjectNode, kind: MutationKind, lists: &[String]) -> Result<()> {
        let (selectors, changes): (Vec<_>, Vec<_>) = match kind {
            MutationKind::Delete => (node.args.iter().collect(), Vec::new()),
            MutationKind::Update => node
                .args
                .iter()
                .partition(|(name, _)| self.identifiers.is_reference_like(name)),
            MutationKind::Create => {
                // The new entity is unknown, so the lists it belongs to can't be trusted anymore
                for list in lists {
                    self.store.delete(list).await?;
                }
                return Ok(());
            }
        };

        for list in lists {
            let Some(keys) = self.reference_list(list).await? else {
                continue;
            };

            if selectors.is_empty() {
                for key in &keys {
                    self.store.delete(key).await?;
                }
                self.store.delete(list).await?;
                continue;
            }

            let mut remaining = Vec::with_capacity(keys.len());
            for key in keys {
                let Some(mut entry) = self.entry(&key).await? else {
                    continue;
                };

                if !matches_all(&entry, &selectors) {
                    remaining.push(key);
                    continue;
                }

                if kind == MutationKind::Delete {
                    self.store.delete(&key).await?;
                    continue;
                }

                for (name, value) in &changes {
                    entry.insert((*name).clone(), value.to_json());
                }
                self.store.put_json(&key, &Value::Object(entry), self.ttl).await?;
                remaining.push(key);
            }

            self.store.put_json(list, &remaining, self.ttl).await?;
        }

        Ok(())
    }

    async fn append_reference(&self, list: &str, key: &str) -> Result<()> {
        let Some(mut keys) = self.reference_list(list).await? else {
            return Ok(());
        };

        if !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
            self.store.put_json(list, &keys, self.ttl).await?;
        }

        Ok(())
    }

    async fn remove_reference(&self, list: &str, key: &str) -> Result<()> {
        let Some(mut keys) = self.reference_list(list).await? else {
            return Ok(());
        };

        let len = keys.len();
        keys.retain(|existing| existing != key);
        if keys.len() != len {
            self.store.put_json(list, &keys, self.ttl).await?;
        }

        Ok(())
    }

    async fn reference_list(&self, list: &str) -> Result<Option<Vec<String>>> {
        Ok(match self.stored(list).await? {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(key) => Some(key),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
    }

    async fn entry(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        Ok(match self.stored(key).await? {
            Some(Value::Object(entry)) => Some(entry),
            _ => None,
        })
    }

    async fn stored(&self, key: &str) -> Result<Option<Value>> {
        match self.store.get_json(key).await {
            Ok(value) => Ok(value),
            Err(KvError::Serialization(error)) => {
                tracing::warn!(key, %error, "Ignoring malformed cache entry");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }
}

fn matches_all(entry: &Map<String, Value>, selectors: &[(&String, &ArgumentValue)]) -> bool {
    selectors
        .iter()
        .all(|(name, value)| entry.get(name.as_str()).is_some_and(|stored| value.matches(stored)))
}

/// `deleteBookById` & `delete_book_by_id` both operate on `book`
fn type_from_mutation_name(name: &str) -> String {
    let rest = name
        .trim_start_matches(|c: char| c.is_ascii_lowercase())
        .trim_start_matches('_');
    let rest = if rest.is_empty() { name } else { rest };

    let end = rest
        .match_indices("By")
        .map(|(index, _)| index)
        .find(|index| rest[index + 2..].starts_with(|c: char| c.is_ascii_uppercase()))
        .or_else(|| rest.find("_by_"))
        .unwrap_or(rest.len());

    rest[..end].to_lowercase()
}
