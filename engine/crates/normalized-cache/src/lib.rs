//! A normalized cache for the results of GraphQL queries.
//!
//! Responses are broken up into one entry per identifiable object, so that
//! different queries selecting the same objects share cache entries.  A query
//! goes through a few phases:
//!
//! 1. We build a prototype of the query: a tree of every field it selects.
//! 2. The cache is read, marking every field of the prototype that was found.
//! 3. Whatever wasn't found is turned into a residual query for the executor.
//! 4. The cached & fetched data are joined into a single response.
//! 5. The response is normalized & written back to the cache.
//!
//! Mutations always go to the executor, and the entries they touch are then
//! updated or evicted.  Queries the cache can't handle are passed through untouched.

mod config;
mod error;
mod executor;
mod identity;
mod invalidation;
mod merging;
mod normalizing;
mod prototype;
mod query_cache;
mod reading;
mod residual;
mod response;
mod schema;

pub use self::{
    config::{CacheConfig, MutationPrefixes},
    error::{ConfigError, Error, Result, SchemaError, UnquellableQuery},
    executor::Executor,
    identity::{field_key, generate_cache_id, reference_list_key, Identifiers, KEY_SEPARATOR},
    invalidation::{Invalidator, MutationKind},
    merging::{join, join_arrays},
    normalizing::{normalize, normalize_entity, write_all, CacheWrite},
    prototype::{
        build_prototype, inline_fragments, ArgumentValue, Fields, FragmentMap, Node, ObjectNode, OperationType,
        ParsedQuery, Prototype,
    },
    query_cache::QueryCache,
    reading::{CacheRead, CacheReader},
    residual::{create_query_str, OperationKeyword, ResidualQuery},
    response::{CacheStatus, Response},
    schema::{FieldType, SchemaMaps},
};
