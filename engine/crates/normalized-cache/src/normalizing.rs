//! Decomposes responses into normalized cache entries.

use std::time::Duration;

use futures_util::future::join_all;
use indexmap::IndexMap;
use runtime::kv::{KvError, KvStore};
use serde_json::{Map, Value};

use crate::{
    error::Result,
    identity::{generate_cache_id, Identifiers},
    prototype::{Node, ObjectNode, Prototype},
};

/// A single entry to store
#[derive(Clone, Debug, PartialEq)]
pub struct CacheWrite {
    pub key: String,
    pub value: Value,
}

/// Works out the entries a response should be stored as.
///
/// Every identifiable object becomes an entry keyed `type--id`, with its nested
/// objects replaced by the keys of their own entries.  Root lists store the keys
/// of their elements.  An object that appears more than once in the response is
/// written once, with the union of its fields.
pub fn normalize(data: &Map<String, Value>, prototype: &Prototype, identifiers: &Identifiers) -> Vec<CacheWrite> {
    let mut normalizer = Normalizer {
        identifiers,
        writes: IndexMap::new(),
    };

    for (key, object) in prototype.root_objects() {
        if object.is_leaf() {
            continue;
        }

        let reference = match data.get(key) {
            Some(Value::Array(items)) => normalizer.list(items, object),
            Some(Value::Object(entity)) => {
                let Some(entity_key) = normalizer.entity(entity, object, object.entity_id()) else {
                    continue;
                };

                if object.entity_id().is_some() {
                    continue;
                }
                Some(Value::String(entity_key))
            }
            _ => None,
        };

        if let Some(reference) = reference {
            normalizer.writes.insert(object.cache_key(), reference);
        }
    }

    normalizer.into_writes()
}

/// Normalizes a single object, such as the one returned by a mutation.  Returns
/// the key of the object along with every entry to write.
pub fn normalize_entity(
    entity: &Map<String, Value>,
    node: &ObjectNode,
    identifiers: &Identifiers,
) -> Option<(String, Vec<CacheWrite>)> {
    let mut normalizer = Normalizer {
        identifiers,
        writes: IndexMap::new(),
    };

    let key = normalizer.entity(entity, node, node.entity_id())?;
    Some((key, normalizer.into_writes()))
}

struct Normalizer<'a> {
    identifiers: &'a Identifiers,
    writes: IndexMap<String, Value>,
}

impl Normalizer<'_> {
    fn into_writes(self) -> Vec<CacheWrite> {
        self.writes
            .into_iter()
            .map(|(key, value)| CacheWrite { key, value })
            .collect()
    }

    /// Writes an entity and returns its key
    fn entity(&mut self, entity: &Map<String, Value>, node: &ObjectNode, id: Option<&str>) -> Option<String> {
        let Some(id) = id.map(str::to_string).or_else(|| self.identifiers.find_id(entity)) else {
            tracing::warn!(type_name = %node.type_name, field = %node.name, "Skipping an entity without an identifier");
            return None;
        };

        let key = generate_cache_id(&node.type_name, Some(&id));
        let mut stored = Map::new();

        for (response_key, child) in &node.children {
            let Some(value) = entity.get(response_key) else {
                continue;
            };

            match child {
                Node::Scalar(_) => {
                    stored.insert(response_key.clone(), value.clone());
                }
                Node::Object(child) => {
                    let reference = match value {
                        Value::Array(items) => self.list(items, child),
                        Value::Object(nested) => self.entity(nested, child, child.entity_id()).map(Value::String),
                        other => Some(other.clone()),
                    };

                    if let Some(reference) = reference {
                        stored.insert(child.field_key(), reference);
                    }
                }
            }
        }

        match self.writes.get_mut(&key) {
            Some(Value::Object(existing)) => existing.extend(stored),
            _ => {
                self.writes.insert(key.clone(), Value::Object(stored));
            }
        }

        Some(key)
    }

    /// Writes the elements of a list and returns their keys.  A list with an
    /// element that can't be keyed isn't stored at all.
    fn list(&mut self, items: &[Value], node: &ObjectNode) -> Option<Value> {
        let mut references = Vec::with_capacity(items.len());

        for item in items {
            let reference = match item {
                Value::Null => Value::Null,
                Value::Array(nested) => self.list(nested, node)?,
                Value::Object(entity) => Value::String(self.entity(entity, node, None)?),
                other => other.clone(),
            };
            references.push(reference);
        }

        Some(Value::Array(references))
    }
}

/// Stores the output of [`normalize`].
///
/// Entities are merged into what's already cached for them so that fields
/// fetched by other queries survive; references replace the stored value.
pub async fn write_all(store: &KvStore, writes: Vec<CacheWrite>, ttl: Option<Duration>) -> Result<()> {
    let results = join_all(writes.into_iter().map(|write| write_one(store, write, ttl))).await;

    results.into_iter().collect()
}

async fn write_one(store: &KvStore, write: CacheWrite, ttl: Option<Duration>) -> Result<()> {
    let CacheWrite { key, value } = write;

    let value = match value {
        Value::Object(entry) => match store.get_json::<Value>(&key).await {
            Ok(Some(Value::Object(mut existing))) => {
                existing.extend(entry);
                Value::Object(existing)
            }
            Ok(_) | Err(KvError::Serialization(_)) => Value::Object(entry),
            Err(error) => return Err(error.into()),
        },
        reference => reference,
    };

    Ok(store.put_json(&key, &value, ttl).await?)
}

#[cfg(test)]
mod tests {
    use runtime_local::InMemoryKv;
    use serde_json::json;

    use super::*;
    use crate::prototype::Fields;

    fn map(value: Value) -> Map<String, Value> {
        let Value::Object(map) = value else { unreachable!() };
        map
    }

    fn countries_prototype() -> Prototype {
        let cities = ObjectNode::new("cities", "city").list().with_scalars(["id", "name"]);
        let countries = ObjectNode::new("countries", "country")
            .list()
            .with_scalars(["id", "name"])
            .with_child("cities", Node::Object(cities));

        Prototype::new(Fields::from([("countries".to_string(), Node::Object(countries))]))
    }

    fn countries_response() -> Map<String, Value> {
        map(json!({"countries": [
            {"id": "AD", "name": "Andorra", "cities": [{"id": "1", "name": "Encamp"}]},
            {"id": "BE", "name": "Belgium", "cities": []}
        ]}))
    }

    fn writes_as_json(writes: &[CacheWrite]) -> Value {
        Value::Object(
            writes
                .iter()
                .map(|write| (write.key.clone(), write.value.clone()))
                .collect(),
        )
    }

    #[test]
    fn lists_are_normalized() {
        let writes = normalize(&countries_response(), &countries_prototype(), &Identifiers::default());

        assert_eq!(
            writes_as_json(&writes),
            json!({
                "city--1": {"id": "1", "name": "Encamp"},
                "country--ad": {"id": "AD", "name": "Andorra", "cities": ["city--1"]},
                "country--be": {"id": "BE", "name": "Belgium", "cities": []},
                "countries": ["country--ad", "country--be"]
            })
        );
    }

    #[test]
    fn normalizing_is_idempotent() {
        let first = normalize(&countries_response(), &countries_prototype(), &Identifiers::default());
        let second = normalize(&countries_response(), &countries_prototype(), &Identifiers::default());

        assert_eq!(first, second);
    }

    #[test]
    fn single_objects() {
        let country = ObjectNode::new("country", "country").with_id("AD").with_scalars(["id", "name"]);
        let me = ObjectNode::new("me", "user").with_scalars(["id", "name"]);
        let prototype = Prototype::new(Fields::from([
            ("country".to_string(), Node::Object(country)),
            ("me".to_string(), Node::Object(me)),
        ]));

        let data = map(json!({
            "country": {"id": "AD", "name": "Andorra"},
            "me": {"id": 7, "name": "Jane"}
        }));

        assert_eq!(
            writes_as_json(&normalize(&data, &prototype, &Identifiers::default())),
            json!({
                "country--ad": {"id": "AD", "name": "Andorra"},
                "user--7": {"id": 7, "name": "Jane"},
                "me": "user--7"
            })
        );
    }

    #[test]
    fn lists_with_anonymous_elements_are_skipped() {
        let data = map(json!({"countries": [
            {"id": "AD", "name": "Andorra", "cities": []},
            {"name": "Nowhere", "cities": []}
        ]}));

        let writes = normalize(&data, &countries_prototype(), &Identifiers::default());

        assert_eq!(
            writes_as_json(&writes),
            json!({"country--ad": {"id": "AD", "name": "Andorra", "cities": []}})
        );
    }

    #[tokio::test]
    async fn entities_are_merged_into_existing_entries() {
        let store = KvStore::new(InMemoryKv::default());
        store
            .put_json("country--ad", &json!({"id": "AD", "capital": "Andorra la Vella"}), None)
            .await
            .unwrap();

        let writes = vec![
            CacheWrite {
                key: "country--ad".into(),
                value: json!({"id": "AD", "name": "Andorra"}),
            },
            CacheWrite {
                key: "countries".into(),
                value: json!(["country--ad"]),
            },
        ];
        write_all(&store, writes, None).await.unwrap();

        assert_eq!(
            store.get_json::<Value>("country--ad").await.unwrap(),
            Some(json!({"id": "AD", "capital": "Andorra la Vella", "name": "Andorra"}))
        );
        assert_eq!(
            store.get_json::<Value>("countries").await.unwrap(),
            Some(json!(["country--ad"]))
        );
    }
}
