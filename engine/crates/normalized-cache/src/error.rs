use runtime::kv::KvError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cache store error: {0}")]
    Store(#[from] KvError),
    #[error("Executor error: {0}")]
    Executor(String),
    #[error("Mutation {0} is not known to create, update or delete anything")]
    UnsupportedMutation(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The reasons a query is executed without consulting the cache
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UnquellableQuery {
    #[error("the query could not be parsed: {0}")]
    Parse(String),
    #[error("the document does not contain an operation")]
    NoOperation,
    #[error("the document contains more than one operation")]
    MultipleOperations,
    #[error("subscriptions are not cacheable")]
    Subscription,
    #[error("the operation declares variables")]
    VariableDefinitions,
    #[error("directive @{0} is present")]
    Directive(String),
    #[error("argument {0} uses a variable")]
    Variable(String),
    #[error("{0} is an introspection field")]
    Introspection(String),
    #[error("argument {0} is a list or input object")]
    ComplexArgument(String),
    #[error("inline fragments are not supported")]
    InlineFragment,
    #[error("leaf field {0} has an alias or arguments")]
    DecoratedLeaf(String),
    #[error("fragment {0} is not defined")]
    UnknownFragment(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("could not parse the schema: {0}")]
    Parse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
