//! Type information derived from the schema, read once at start up.

use std::collections::BTreeMap;

use cynic_parser::{
    common::WrappingType,
    type_system::{self as ast, Definition, TypeDefinition},
};

use crate::error::SchemaError;

const QUERY_TYPE: &str = "Query";
const MUTATION_TYPE: &str = "Mutation";

/// The named type a field resolves to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldType {
    pub name: String,
    pub is_list: bool,
}

impl FieldType {
    pub fn new(name: impl Into<String>, is_list: bool) -> Self {
        FieldType {
            name: name.into(),
            is_list,
        }
    }

    fn from_ast(ty: ast::Type<'_>) -> Self {
        FieldType {
            name: ty.name().to_string(),
            is_list: ty.wrappers().any(|wrapper| wrapper == WrappingType::List),
        }
    }
}

/// Lookup tables from query, mutation & field names to the types they return.
///
/// An empty `SchemaMaps` is valid: keys then fall back to field names.
#[derive(Clone, Debug, Default)]
pub struct SchemaMaps {
    pub query_map: BTreeMap<String, FieldType>,
    pub mutation_map: BTreeMap<String, FieldType>,
    pub fields_map: BTreeMap<String, BTreeMap<String, FieldType>>,
}

impl SchemaMaps {
    pub fn from_sdl(sdl: &str) -> Result<Self, SchemaError> {
        let document =
            cynic_parser::parse_type_system_document(sdl).map_err(|err| SchemaError::Parse(err.to_string()))?;

        let mut maps = SchemaMaps::default();

        for definition in document.definitions() {
            let (Definition::Type(ty) | Definition::TypeExtension(ty)) = definition else {
                continue;
            };

            let type_name = ty.name();
            let fields = match ty {
                TypeDefinition::Object(object) => object
                    .fields()
                    .map(|field| (field.name().to_string(), FieldType::from_ast(field.ty())))
                    .collect::<Vec<_>>(),
                TypeDefinition::Interface(interface) => interface
                    .fields()
                    .map(|field| (field.name().to_string(), FieldType::from_ast(field.ty())))
                    .collect(),
                _ => continue,
            };

            match type_name {
                QUERY_TYPE => maps.query_map.extend(fields.iter().cloned()),
                MUTATION_TYPE => maps.mutation_map.extend(fields.iter().cloned()),
                _ => {}
            }
            maps.fields_map.entry(type_name.to_string()).or_default().extend(fields);
        }

        Ok(maps)
    }

    pub fn root_type(&self, mutation: bool) -> &'static str {
        if mutation {
            MUTATION_TYPE
        } else {
            QUERY_TYPE
        }
    }

    /// The type of `field` on `parent_type`
    pub fn field_type(&self, parent_type: &str, field: &str) -> Option<&FieldType> {
        match parent_type {
            QUERY_TYPE => self.query_map.get(field),
            MUTATION_TYPE => self.mutation_map.get(field),
            _ => self.fields_map.get(parent_type)?.get(field),
        }
    }

    /// The reference list keys of the root list queries returning `type_name`, e.g. `books`
    /// for `book`.  These are the lists mutations keep in sync.
    pub fn reference_lists_for(&self, type_name: &str) -> Vec<String> {
        self.query_map
            .iter()
            .filter(|(_, ty)| ty.is_list && ty.name.eq_ignore_ascii_case(type_name))
            .map(|(query, _)| query.to_lowercase())
            .collect()
    }
}
