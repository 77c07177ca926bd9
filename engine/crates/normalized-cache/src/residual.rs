//! Builds the query for whatever the cache couldn't answer.

use std::fmt;

use crate::{
    identity::Identifiers,
    prototype::{Fields, Node, ObjectNode, Prototype},
};

/// The part of a query that still has to be executed
#[derive(Clone, Debug, PartialEq)]
pub struct ResidualQuery {
    fields: Fields,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OperationKeyword {
    Query,
    Mutation,
}

impl ResidualQuery {
    /// Keeps the leaves that are still needed and the objects containing them.
    ///
    /// Every surviving object also keeps its identifier so the fetched result can
    /// be normalized & merged with what came from the cache.
    pub fn from_prototype(prototype: &Prototype, identifiers: &Identifiers) -> Self {
        let fields = prototype
            .fields
            .iter()
            .filter_map(|(key, node)| {
                let node = match node {
                    Node::Scalar(needed) => needed.then_some(Node::Scalar(true))?,
                    Node::Object(object) if object.is_leaf() => Node::Object(object.clone()),
                    Node::Object(object) => Node::Object(prune(object, identifiers)?),
                };
                Some((key.clone(), node))
            })
            .collect();

        ResidualQuery { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn prune(object: &ObjectNode, identifiers: &Identifiers) -> Option<ObjectNode> {
    if !object.children.values().any(Node::is_needed) {
        return None;
    }

    let children = object
        .children
        .iter()
        .filter_map(|(key, child)| {
            let child = match child {
                Node::Scalar(needed) => (*needed || identifiers.is_id_like(key)).then_some(Node::Scalar(true))?,
                Node::Object(child) => Node::Object(prune(child, identifiers)?),
            };
            Some((key.clone(), child))
        })
        .collect();

    Some(ObjectNode {
        children,
        ..object.clone()
    })
}

/// Renders a residual query, prefixed with the operation keyword when one is given.
///
/// Nothing left to fetch renders as an empty string.
pub fn create_query_str(query: &ResidualQuery, keyword: Option<OperationKeyword>) -> String {
    if query.is_empty() {
        return String::new();
    }

    match keyword {
        Some(keyword) => format!("{keyword} {query}"),
        None => query.to_string(),
    }
}

impl fmt::Display for ResidualQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SelectionSet(&self.fields))
    }
}

struct SelectionSet<'a>(&'a Fields);

impl fmt::Display for SelectionSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (key, node) in self.0 {
            match node {
                Node::Scalar(_) => write!(f, " {key}")?,
                Node::Object(object) => write!(f, " {}", Field(object))?,
            }
        }
        write!(f, " }}")
    }
}

struct Field<'a>(&'a ObjectNode);

impl fmt::Display for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.0;

        if let Some(alias) = &field.alias {
            write!(f, "{alias}: ")?;
        }
        write!(f, "{}", field.name)?;

        if !field.args.is_empty() {
            write!(f, "(")?;
            for (index, (name, value)) in field.args.iter().enumerate() {
                let prefix = if index != 0 { ", " } else { "" };
                write!(f, "{prefix}{name}: {value}")?;
            }
            write!(f, ")")?;
        }

        if !field.is_leaf() {
            write!(f, " {}", SelectionSet(&field.children))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::prototype::ArgumentValue;

    fn residual(fields: Fields) -> ResidualQuery {
        ResidualQuery::from_prototype(&Prototype::new(fields), &Identifiers::default())
    }

    fn country() -> ObjectNode {
        ObjectNode::new("country", "country")
            .with_id("1")
            .with_child("id", Node::Scalar(false))
            .with_child("name", Node::Scalar(false))
            .with_child("capital", Node::Scalar(true))
    }

    #[test]
    fn keeps_needed_fields_and_identifiers() {
        let query = residual(Fields::from([("country".to_string(), Node::Object(country()))]));

        assert_snapshot!(create_query_str(&query, Some(OperationKeyword::Query)), @r###"query { country(id: "1") { id capital } }"###);
    }

    #[test]
    fn nothing_needed() {
        let country = country().with_child("capital", Node::Scalar(false));
        let query = residual(Fields::from([("country".to_string(), Node::Object(country))]));

        assert!(query.is_empty());
        assert_eq!(create_query_str(&query, Some(OperationKeyword::Query)), "");
    }

    #[test]
    fn nested_objects_aliases_and_literals() {
        let mut cities = ObjectNode::new("cities", "city")
            .list()
            .with_child("id", Node::Scalar(false))
            .with_child("name", Node::Scalar(true));
        cities.args.insert("first".into(), ArgumentValue::Literal("2".into()));

        let mut andorra = ObjectNode::new("country", "country")
            .with_id("AD")
            .with_child("id", Node::Scalar(false))
            .with_child("name", Node::Scalar(false))
            .with_child("cities", Node::Object(cities));
        andorra.alias = Some("andorra".into());

        let mut version = ObjectNode::new("version", "string");
        version.args.insert("format".into(), ArgumentValue::Literal("SHORT".into()));

        let query = residual(Fields::from([
            ("andorra".to_string(), Node::Object(andorra)),
            ("version".to_string(), Node::Object(version)),
        ]));

        assert_snapshot!(query, @r###"{ andorra: country(id: "AD") { id cities(first: 2) { id name } } version(format: SHORT) }"###);
        assert_snapshot!(
            create_query_str(&query, Some(OperationKeyword::Mutation)),
            @r###"mutation { andorra: country(id: "AD") { id cities(first: 2) { id name } } version(format: SHORT) }"###
        );
    }
}
