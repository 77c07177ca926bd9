//! Derivation of cache keys from types, identifiers & arguments.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::prototype::ArgumentValue;

pub const KEY_SEPARATOR: &str = "--";

const DEFAULT_ID_FIELDS: [&str; 4] = ["id", "_id", "ID", "Id"];

/// Builds the key of a normalized entry: `<type>--<id>`, or just `<type>` when there's no id.
///
/// Keys are always lower-cased.
pub fn generate_cache_id(type_name: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{type_name}{KEY_SEPARATOR}{id}").to_lowercase(),
        None => type_name.to_lowercase(),
    }
}

/// The key of the reference list (or single reference) a root field without an id is stored under
pub fn reference_list_key(field_name: &str, args: &IndexMap<String, ArgumentValue>) -> String {
    field_key(field_name, args).to_lowercase()
}

/// The property a parent entry uses for one of its fields.  Arguments are part of
/// the key so that `cities(first: 2)` and `cities` don't clobber each other.
pub fn field_key(field_name: &str, args: &IndexMap<String, ArgumentValue>) -> String {
    if args.is_empty() {
        return field_name.to_string();
    }

    let args = args
        .iter()
        .map(|(name, value)| format!("{name}:{}", value.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    format!("{field_name}({args})")
}

/// The set of field & argument names that identify an object.
#[derive(Clone, Debug, Default)]
pub struct Identifiers {
    extra: Vec<String>,
}

impl Identifiers {
    pub fn new(extra: impl IntoIterator<Item = String>) -> Self {
        Identifiers {
            extra: extra.into_iter().collect(),
        }
    }

    pub fn is_id_like(&self, name: &str) -> bool {
        DEFAULT_ID_FIELDS.contains(&name) || self.extra.iter().any(|extra| extra == name)
    }

    /// Arguments like `authorId` or `author_id` that reference another object
    pub fn is_reference_like(&self, name: &str) -> bool {
        self.is_id_like(name) || name.ends_with("Id") || name.ends_with("_id") || name.ends_with("ID")
    }

    /// Finds the identifier of an object from its own fields
    pub fn find_id(&self, object: &Map<String, Value>) -> Option<String> {
        object
            .iter()
            .filter(|(name, _)| self.is_id_like(name))
            .find_map(|(_, value)| id_to_string(value))
    }

    /// Builds the key of an object from its type & identifier, if it has one
    pub fn entity_key(&self, type_name: &str, object: &Map<String, Value>) -> Option<String> {
        self.find_id(object)
            .map(|id| generate_cache_id(type_name, Some(&id)))
    }
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
