use std::collections::HashSet;

use cynic_parser::{
    common::OperationType as AstOperationType,
    executable::{FieldSelection, Selection},
    ExecutableDocument, Span, Value,
};
use indexmap::IndexMap;

use super::{
    fragments::merge_fields, ArgumentValue, Fields, FragmentMap, Node, ObjectNode, OperationType, ParsedQuery,
    Prototype,
};
use crate::{error::UnquellableQuery, identity::Identifiers, schema::SchemaMaps};

/// Parses a query and builds its prototype.
///
/// This never fails: anything the cache can't handle, including text that doesn't
/// parse, is classified as [`OperationType::Unquellable`] so the caller can pass
/// the query through to the executor untouched.
pub fn build_prototype(query: &str, schema: &SchemaMaps, identifiers: &Identifiers) -> ParsedQuery {
    let document = match cynic_parser::parse_executable_document(query) {
        Ok(document) => document,
        Err(error) => return ParsedQuery::bypass(UnquellableQuery::Parse(error.to_string())),
    };

    let builder = PrototypeBuilder {
        source: query,
        schema,
        identifiers,
        fragment_names: document.fragments().map(|fragment| fragment.name().to_string()).collect(),
        missing_id: false,
    };

    builder.build(&document).unwrap_or_else(ParsedQuery::bypass)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SelectionLevel {
    /// The selection set of the operation
    Root,
    /// The top level selection set of a fragment definition
    Fragment,
    Nested,
}

struct PrototypeBuilder<'a> {
    source: &'a str,
    schema: &'a SchemaMaps,
    identifiers: &'a Identifiers,
    fragment_names: HashSet<String>,
    /// Set once we've seen a selection set that doesn't select an identifier
    missing_id: bool,
}

impl<'a> PrototypeBuilder<'a> {
    fn build(mut self, document: &ExecutableDocument) -> Result<ParsedQuery, UnquellableQuery> {
        let mut operations = document.operations();
        let operation = operations.next().ok_or(UnquellableQuery::NoOperation)?;
        if operations.next().is_some() {
            return Err(UnquellableQuery::MultipleOperations);
        }

        let is_mutation = match operation.operation_type() {
            AstOperationType::Query => false,
            AstOperationType::Mutation => true,
            AstOperationType::Subscription => return Err(UnquellableQuery::Subscription),
        };

        if let Some(directive) = operation.directives().next() {
            return Err(UnquellableQuery::Directive(directive.name().to_string()));
        }

        if operation.variable_definitions().len() != 0 {
            return Err(UnquellableQuery::VariableDefinitions);
        }

        let mut fragments = FragmentMap::default();
        for fragment in document.fragments() {
            if let Some(directive) = fragment.directives().next() {
                return Err(UnquellableQuery::Directive(directive.name().to_string()));
            }

            let fields = self.selection_set(
                fragment.selection_set(),
                Some(fragment.type_condition()),
                SelectionLevel::Fragment,
            )?;
            fragments.insert(fragment.name().to_string(), fields);
        }

        let root_type = self.schema.root_type(is_mutation);
        let fields = self.selection_set(operation.selection_set(), Some(root_type), SelectionLevel::Root)?;

        // Mutations aren't read from the cache so a missing id only limits what
        // can be invalidated afterwards
        let operation_type = if is_mutation {
            OperationType::Mutation
        } else if self.missing_id {
            OperationType::NoId
        } else {
            OperationType::Query
        };

        Ok(ParsedQuery {
            prototype: Prototype::new(fields),
            operation_type,
            fragments,
        })
    }

    fn selection_set<'d>(
        &mut self,
        selections: impl Iterator<Item = Selection<'d>>,
        parent_type: Option<&str>,
        level: SelectionLevel,
    ) -> Result<Fields, UnquellableQuery> {
        let mut fields = Fields::new();
        let mut has_id = false;
        let mut has_spread = false;

        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    if field.name().starts_with("__") {
                        return Err(UnquellableQuery::Introspection(field.name().to_string()));
                    }

                    if let Some(directive) = field.directives().next() {
                        return Err(UnquellableQuery::Directive(directive.name().to_string()));
                    }

                    let (args, id) = self.arguments(field)?;

                    if field.selection_set().len() == 0 && level != SelectionLevel::Root {
                        if field.alias().is_some() || !args.is_empty() {
                            return Err(UnquellableQuery::DecoratedLeaf(field.name().to_string()));
                        }

                        has_id |= self.identifiers.is_id_like(field.name());
                        fields.insert(field.name().to_string(), Node::Scalar(true));
                        continue;
                    }

                    let schema = self.schema;
                    let field_type = parent_type.and_then(|parent| schema.field_type(parent, field.name()));

                    let children = self.selection_set(
                        field.selection_set(),
                        field_type.map(|ty| ty.name.as_str()),
                        SelectionLevel::Nested,
                    )?;

                    let node = ObjectNode {
                        name: field.name().to_string(),
                        type_name: field_type
                            .map(|ty| ty.name.as_str())
                            .unwrap_or(field.name())
                            .to_lowercase(),
                        alias: field.alias().map(str::to_string),
                        args,
                        id,
                        is_list: field_type.is_some_and(|ty| ty.is_list),
                        children,
                    };

                    merge_fields(&mut fields, [(node.response_key().to_string(), Node::Object(node))]);
                }
                Selection::FragmentSpread(spread) => {
                    if let Some(directive) = spread.directives().next() {
                        return Err(UnquellableQuery::Directive(directive.name().to_string()));
                    }

                    let name = spread.fragment_name();
                    if !self.fragment_names.contains(name) {
                        return Err(UnquellableQuery::UnknownFragment(name.to_string()));
                    }

                    has_spread = true;
                    fields.insert(name.to_string(), Node::Scalar(true));
                }
                Selection::InlineFragment(_) => return Err(UnquellableQuery::InlineFragment),
            }
        }

        // A fragment's fields end up in the selection set it's spread into, which is checked there
        if level == SelectionLevel::Nested && !has_id && !has_spread {
            self.missing_id = true;
        }

        Ok(fields)
    }

    fn arguments(
        &self,
        field: FieldSelection<'_>,
    ) -> Result<(IndexMap<String, ArgumentValue>, Option<String>), UnquellableQuery> {
        let mut args = IndexMap::new();
        let mut id = None;

        for argument in field.arguments() {
            let name = argument.name();
            let value = match argument.value() {
                Value::Variable(_) => return Err(UnquellableQuery::Variable(name.to_string())),
                Value::List(_) | Value::Object(_) => return Err(UnquellableQuery::ComplexArgument(name.to_string())),
                Value::String(value) => ArgumentValue::String(value.as_str().to_string()),
                Value::Int(value) => ArgumentValue::Literal(self.literal(value.span(), || value.as_i64().to_string())),
                Value::Float(value) => ArgumentValue::Literal(self.literal(value.span(), || value.as_f64().to_string())),
                Value::Boolean(value) => ArgumentValue::Literal(value.value().to_string()),
                Value::Enum(value) => ArgumentValue::Literal(value.name().to_string()),
                Value::Null(_) => ArgumentValue::Literal("null".to_string()),
            };

            let is_null = matches!(value, ArgumentValue::Literal(ref literal) if literal == "null");
            if id.is_none() && !is_null && self.identifiers.is_id_like(name) {
                id = Some(value.as_str().to_string());
            }

            args.insert(name.to_string(), value);
        }

        Ok((args, id))
    }

    /// Numbers keep the text they were written with, an `f64` doesn't survive the trip for every literal
    fn literal(&self, span: Span, fallback: impl FnOnce() -> String) -> String {
        self.source
            .get(span.start..span.end)
            .map(str::to_string)
            .unwrap_or_else(fallback)
    }
}
