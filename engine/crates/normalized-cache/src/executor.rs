use std::fmt;

use crate::Response;

/// Resolves queries the cache can't answer, typically by sending them to a GraphQL API.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    type Error: fmt::Display + Send;

    async fn execute(&self, query: String) -> Result<Response, Self::Error>;
}
