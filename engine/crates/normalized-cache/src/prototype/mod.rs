//! The prototype is a structural template of a query.
//!
//! Every selected field appears in it: leaf fields as a boolean placeholder and
//! object fields as an [`ObjectNode`] carrying the metadata needed to derive
//! cache keys and to render the field back into query text.
//!
//! Placeholders follow a single convention: `true` means the value is still
//! needed from the network, `false` means it was found in the cache.

mod builder;
mod fragments;

use std::fmt;

use indexmap::IndexMap;

use crate::{error::UnquellableQuery, identity};

pub use self::{
    builder::build_prototype,
    fragments::{inline_fragments, FragmentMap},
};

pub type Fields = IndexMap<String, Node>;

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Scalar(bool),
    Object(ObjectNode),
}

impl Node {
    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Node::Object(object) => Some(object),
            Node::Scalar(_) => None,
        }
    }

    /// Whether this node, or anything beneath it, still has to be fetched
    pub fn is_needed(&self) -> bool {
        match self {
            Node::Scalar(needed) => *needed,
            Node::Object(object) => object.is_leaf() || object.children.values().any(Node::is_needed),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectNode {
    /// The name of the field in the schema
    pub name: String,
    /// The lower-cased name of the type this field resolves to
    pub type_name: String,
    pub alias: Option<String>,
    pub args: IndexMap<String, ArgumentValue>,
    /// The identifier supplied through an id-like argument
    pub id: Option<String>,
    pub is_list: bool,
    /// Child nodes keyed by their response key
    pub children: Fields,
}

impl ObjectNode {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        ObjectNode {
            name: name.into(),
            type_name: type_name.into().to_lowercase(),
            alias: None,
            args: IndexMap::new(),
            id: None,
            is_list: false,
            children: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, key: impl Into<String>, node: Node) -> Self {
        self.children.insert(key.into(), node);
        self
    }

    #[must_use]
    pub fn with_scalars<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.children.insert(name.to_string(), Node::Scalar(true));
        }
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.args.insert("id".into(), ArgumentValue::String(id.clone()));
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// A field without a selection set.  These only exist at the root of an
    /// operation, where a scalar field still needs its name & arguments.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The key this node is read from & written to when it sits at the root of a query
    pub fn cache_key(&self) -> String {
        match self.entity_id() {
            Some(id) => identity::generate_cache_id(&self.type_name, Some(id)),
            None => identity::reference_list_key(&self.name, &self.args),
        }
    }

    /// The id argument, when it identifies the single object this field returns
    pub fn entity_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|_| !self.is_list)
    }

    /// The key a parent entry stores this field under
    pub fn field_key(&self) -> String {
        identity::field_key(&self.name, &self.args)
    }

    /// Returns a copy of this node with every placeholder beneath it set to `needed`
    #[must_use]
    pub fn with_all(&self, needed: bool) -> Self {
        let mut node = self.clone();
        node.set_all(needed);
        node
    }

    fn set_all(&mut self, needed: bool) {
        for child in self.children.values_mut() {
            match child {
                Node::Scalar(value) => *value = needed,
                Node::Object(object) => object.set_all(needed),
            }
        }
    }
}

/// An argument literal from the query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgumentValue {
    /// A string literal, rendered quoted
    String(String),
    /// Numbers, booleans, enums & null: rendered as written
    Literal(String),
}

impl ArgumentValue {
    pub fn as_str(&self) -> &str {
        match self {
            ArgumentValue::String(value) | ArgumentValue::Literal(value) => value,
        }
    }

    /// The value as it would appear in a response.  Enum values become strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgumentValue::String(value) => serde_json::Value::String(value.clone()),
            ArgumentValue::Literal(literal) => {
                serde_json::from_str(literal).unwrap_or_else(|_| serde_json::Value::String(literal.clone()))
            }
        }
    }

    /// Whether a stored value is equal to this argument
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::String(value) => value == self.as_str(),
            serde_json::Value::Number(_) | serde_json::Value::Bool(_) | serde_json::Value::Null => {
                value == &self.to_json()
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::String(value) => write!(f, "{}", serde_json::Value::from(value.as_str())),
            ArgumentValue::Literal(value) => f.write_str(value),
        }
    }
}

/// The root of a prototype: the fields selected directly on the operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prototype {
    pub fields: Fields,
}

impl Prototype {
    pub fn new(fields: Fields) -> Self {
        Prototype { fields }
    }

    pub fn is_needed(&self) -> bool {
        self.fields.values().any(Node::is_needed)
    }

    pub fn root_objects(&self) -> impl Iterator<Item = (&str, &ObjectNode)> + '_ {
        self.fields
            .iter()
            .filter_map(|(key, node)| Some((key.as_str(), node.as_object()?)))
    }
}

/// How a query should be handled
#[derive(Clone, Debug, PartialEq, strum::Display)]
pub enum OperationType {
    #[strum(serialize = "query")]
    Query,
    #[strum(serialize = "mutation")]
    Mutation,
    /// The query uses constructs the cache won't handle, so it's passed through untouched
    #[strum(serialize = "unQuellable")]
    Unquellable(UnquellableQuery),
    /// A selection set has no identifier, so its results can't be keyed
    #[strum(serialize = "noID")]
    NoId,
}

impl OperationType {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, OperationType::Query | OperationType::Mutation)
    }
}

/// The output of [`build_prototype`]
#[derive(Debug)]
pub struct ParsedQuery {
    pub prototype: Prototype,
    pub operation_type: OperationType,
    pub fragments: FragmentMap,
}

impl ParsedQuery {
    pub(crate) fn bypass(reason: UnquellableQuery) -> Self {
        ParsedQuery {
            prototype: Prototype::default(),
            operation_type: OperationType::Unquellable(reason),
            fragments: FragmentMap::default(),
        }
    }

    /// Splices the fragments into the prototype, returning the inlined prototype
    pub fn into_inlined(self) -> (Prototype, OperationType) {
        let prototype = inline_fragments(self.prototype, &self.fragments);
        (prototype, self.operation_type)
    }
}
