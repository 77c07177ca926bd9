use runtime::kv::KvStore;
use tracing::{info_span, Instrument};

use crate::{
    config::CacheConfig,
    error::{Error, Result},
    identity::Identifiers,
    invalidation::{Invalidator, MutationKind},
    merging::join,
    normalizing::{normalize, write_all},
    prototype::{build_prototype, ObjectNode, OperationType, Prototype},
    reading::CacheReader,
    residual::{create_query_str, OperationKeyword, ResidualQuery},
    schema::SchemaMaps,
    CacheStatus, Executor, Response,
};

/// Answers queries from a normalized cache, fetching whatever is missing through an [`Executor`].
pub struct QueryCache<E> {
    store: KvStore,
    executor: E,
    schema: SchemaMaps,
    identifiers: Identifiers,
    config: CacheConfig,
}

impl<E: Executor> QueryCache<E> {
    pub fn new(store: KvStore, executor: E, schema: SchemaMaps, config: CacheConfig) -> Self {
        QueryCache {
            store,
            executor,
            schema,
            identifiers: config.identifiers(),
            config,
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub async fn handle(&self, query: &str) -> Result<Response> {
        let (prototype, operation_type) = build_prototype(query, &self.schema, &self.identifiers).into_inlined();

        match operation_type {
            OperationType::Query => self.query(prototype).await,
            OperationType::Mutation => self.mutation(query, prototype).await,
            OperationType::Unquellable(reason) => {
                tracing::info!(%reason, "BYPASS");
                self.bypass(query).await
            }
            OperationType::NoId => {
                tracing::info!("BYPASS: a selection set has no identifier");
                self.bypass(query).await
            }
        }
    }

    /// Removes every entry from the cache
    pub async fn clear_cache(&self) -> Result<()> {
        Ok(self.store.flush_all().await?)
    }

    async fn query(&self, prototype: Prototype) -> Result<Response> {
        let read = CacheReader::new(&self.store, self.config.batch_size)
            .read(&prototype)
            .instrument(info_span!("cache_read"))
            .await?;

        if read.is_complete() {
            tracing::info!("HIT");
            return Ok(Response::from_data(read.data).with_status(CacheStatus::Hit));
        }

        let residual = ResidualQuery::from_prototype(&read.prototype, &self.identifiers);
        let fetched = self
            .execute(create_query_str(&residual, Some(OperationKeyword::Query)))
            .instrument(info_span!("execute"))
            .await?;

        if fetched.has_errors() {
            return Ok(fetched.with_status(CacheStatus::Miss));
        }

        let status = if read.data.is_empty() {
            CacheStatus::Miss
        } else {
            CacheStatus::PartialHit
        };
        tracing::info!("{status}");

        let data = join(&read.data, &fetched.data_object(), &prototype);

        let writes = normalize(&data, &prototype, &self.identifiers);
        if let Err(error) = write_all(&self.store, writes, self.config.ttl())
            .instrument(info_span!("cache_write"))
            .await
        {
            tracing::error!(%error, "Failed to update the cache");
        }

        Ok(Response::from_data(data).with_status(status))
    }

    async fn mutation(&self, query: &str, prototype: Prototype) -> Result<Response> {
        // Nothing gets executed unless every field can be kept in sync with the cache
        let fields = prototype
            .root_objects()
            .map(|(key, field)| {
                let kind = self
                    .config
                    .mutation_kind(&field.name)
                    .ok_or_else(|| Error::UnsupportedMutation(field.name.clone()))?;
                Ok((key, field, kind))
            })
            .collect::<Result<Vec<(&str, &ObjectNode, MutationKind)>>>()?;

        let response = self
            .execute(query.to_string())
            .instrument(info_span!("execute"))
            .await?;

        if response.has_errors() {
            return Ok(response.with_status(CacheStatus::Bypass));
        }

        let data = response.data_object();
        let invalidator = Invalidator::new(&self.store, &self.schema, &self.identifiers, self.config.ttl());

        async {
            for (key, field, kind) in fields {
                invalidator.invalidate(field, kind, data.get(key)).await?;
            }
            Ok::<_, Error>(())
        }
        .instrument(info_span!("cache_invalidation"))
        .await?;

        Ok(response.with_status(CacheStatus::Bypass))
    }

    async fn bypass(&self, query: &str) -> Result<Response> {
        let response = self
            .execute(query.to_string())
            .instrument(info_span!("execute"))
            .await?;

        Ok(response.with_status(CacheStatus::Bypass))
    }

    async fn execute(&self, query: String) -> Result<Response> {
        self.executor
            .execute(query)
            .await
            .map_err(|error| Error::Executor(error.to_string()))
    }
}
