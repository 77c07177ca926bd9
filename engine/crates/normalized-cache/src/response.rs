use serde_json::{Map, Value};

/// A GraphQL response, as returned by an [`Executor`](crate::Executor) and by the cache.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
    /// Some executors report a single failure outside of `errors`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip)]
    pub cache_status: CacheStatus,
}

impl Response {
    pub fn from_data(data: Map<String, Value>) -> Self {
        Response {
            data: Some(Value::Object(data)),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.error.is_some()
    }

    /// The `data` object, or an empty map when there isn't one
    pub fn data_object(&self) -> Map<String, Value> {
        match &self.data {
            Some(Value::Object(data)) => data.clone(),
            _ => Map::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_status(mut self, cache_status: CacheStatus) -> Self {
        self.cache_status = cache_status;
        self
    }
}

/// How much of a response came from the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    Hit,
    PartialHit,
    #[default]
    Miss,
    /// The cache wasn't used, e.g. for mutations or queries it can't handle
    Bypass,
}
