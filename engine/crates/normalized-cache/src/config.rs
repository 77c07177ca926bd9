use std::{collections::BTreeMap, path::Path, time::Duration};

use duration_str::deserialize_duration;

use crate::{error::ConfigError, identity::Identifiers, invalidation::MutationKind};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// The ttl to store cache entries with.  Defaults to 60s
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    /// How many entries of a reference list are read concurrently
    pub batch_size: usize,
    /// Field & argument names that identify an object, on top of `id`, `_id`, `ID` & `Id`
    pub id_fields: Vec<String>,
    /// Explicit classification of mutations, by name
    pub mutations: BTreeMap<String, MutationKind>,
    pub mutation_prefixes: MutationPrefixes,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::from_secs(60),
            batch_size: 10,
            id_fields: Vec::new(),
            mutations: BTreeMap::new(),
            mutation_prefixes: MutationPrefixes::default(),
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&contents)
    }

    pub fn identifiers(&self) -> Identifiers {
        Identifiers::new(self.id_fields.iter().cloned())
    }

    /// What a mutation does, from its explicit configuration or otherwise from its name
    pub fn mutation_kind(&self, name: &str) -> Option<MutationKind> {
        self.mutations
            .get(name)
            .copied()
            .or_else(|| self.mutation_prefixes.classify(name))
    }

    pub(crate) fn ttl(&self) -> Option<Duration> {
        (!self.ttl.is_zero()).then_some(self.ttl)
    }
}

/// The verbs mutation names start with, e.g. `add` in `addBook`
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationPrefixes {
    pub create: Vec<String>,
    pub update: Vec<String>,
    pub delete: Vec<String>,
}

impl Default for MutationPrefixes {
    fn default() -> Self {
        fn strings(prefixes: &[&str]) -> Vec<String> {
            prefixes.iter().map(|prefix| prefix.to_string()).collect()
        }

        MutationPrefixes {
            create: strings(&["create", "add", "insert", "new"]),
            update: strings(&["update", "edit", "change", "set", "modify", "upsert"]),
            delete: strings(&["delete", "remove", "destroy"]),
        }
    }
}

impl MutationPrefixes {
    pub fn classify(&self, name: &str) -> Option<MutationKind> {
        [
            (MutationKind::Delete, &self.delete),
            (MutationKind::Update, &self.update),
            (MutationKind::Create, &self.create),
        ]
        .into_iter()
        .find(|(_, prefixes)| prefixes.iter().any(|prefix| starts_with_verb(name, prefix)))
        .map(|(kind, _)| kind)
    }
}

/// `setName` and `set_name` start with the verb `set`, `settings` doesn't
fn starts_with_verb(name: &str, verb: &str) -> bool {
    let Some(prefix) = name.get(..verb.len()) else {
        return false;
    };

    if !prefix.eq_ignore_ascii_case(verb) {
        return false;
    }

    match name[verb.len()..].chars().next() {
        None => true,
        Some(next) => next.is_ascii_uppercase() || next == '_',
    }
}
