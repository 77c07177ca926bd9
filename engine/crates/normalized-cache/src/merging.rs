//! Merging of cached data with the response to a residual query.

use serde_json::{Map, Value};

use crate::prototype::{Fields, Node, Prototype};

/// Joins the cached partial response with the fetched one, following the shape of `prototype`.
///
/// Fetched values win over cached ones.  Keys that neither side has are left out.
pub fn join(cached: &Map<String, Value>, fetched: &Map<String, Value>, prototype: &Prototype) -> Map<String, Value> {
    join_fields(cached, fetched, &prototype.fields)
}

fn join_fields(cached: &Map<String, Value>, fetched: &Map<String, Value>, fields: &Fields) -> Map<String, Value> {
    let mut joined = Map::with_capacity(fields.len());

    for (key, node) in fields {
        let value = match (node, cached.get(key), fetched.get(key)) {
            (_, None, None) => continue,
            (Node::Object(object), Some(cached), Some(fetched)) => join_values(cached, fetched, &object.children),
            (_, cached, fetched) => match fetched.or(cached) {
                Some(value) => value.clone(),
                None => continue,
            },
        };

        joined.insert(key.clone(), value);
    }

    joined
}

fn join_values(cached: &Value, fetched: &Value, children: &Fields) -> Value {
    match (cached, fetched) {
        (Value::Array(cached), Value::Array(fetched))
            if same_shape(cached, fetched) && !same_entities(cached, fetched) =>
        {
            Value::Array(cached.iter().chain(fetched).cloned().collect())
        }
        (Value::Array(cached), Value::Array(fetched)) => Value::Array(join_arrays(cached, fetched, children)),
        (Value::Object(cached), Value::Object(fetched)) => Value::Object(join_fields(cached, fetched, children)),
        (_, fetched) => fetched.clone(),
    }
}

/// Merges two lists element by element.  The elements at each position are
/// joined; a position only one side has is taken from that side.
pub fn join_arrays(cached: &[Value], fetched: &[Value], children: &Fields) -> Vec<Value> {
    let len = cached.len().max(fetched.len());

    (0..len)
        .filter_map(|index| match (cached.get(index), fetched.get(index)) {
            (Some(cached), Some(fetched)) => Some(join_values(cached, fetched, children)),
            (cached, fetched) => fetched.or(cached).cloned(),
        })
        .collect()
}

/// Lists whose first elements have the same fields hold different elements, so
/// they're concatenated rather than merged by position
fn same_shape(cached: &[Value], fetched: &[Value]) -> bool {
    match (cached.first(), fetched.first()) {
        (Some(Value::Object(cached)), Some(Value::Object(fetched))) => {
            cached.len() == fetched.len() && cached.keys().all(|key| fetched.contains_key(key))
        }
        _ => false,
    }
}

/// Whether both first elements are the same entity, i.e. the scalars they both
/// hold are equal.  The residual query always selects identifiers, so a list the
/// cache only partly answered is fetched again with the same identifiers.
fn same_entities(cached: &[Value], fetched: &[Value]) -> bool {
    let (Some(Value::Object(cached)), Some(Value::Object(fetched))) = (cached.first(), fetched.first()) else {
        return false;
    };

    let mut shared = cached
        .iter()
        .filter(|(_, value)| !value.is_object() && !value.is_array())
        .filter_map(|(key, value)| Some((value, fetched.get(key)?)))
        .peekable();

    shared.peek().is_some() && shared.all(|(cached, fetched)| cached == fetched)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::prototype::ObjectNode;

    fn map(value: Value) -> Map<String, Value> {
        let Value::Object(map) = value else { unreachable!() };
        map
    }

    fn countries_prototype() -> Prototype {
        let countries = ObjectNode::new("countries", "country")
            .list()
            .with_scalars(["id", "name", "capital"]);

        Prototype::new(Fields::from([("countries".to_string(), Node::Object(countries))]))
    }

    #[test]
    fn every_field_is_present() {
        let country = ObjectNode::new("country", "country")
            .with_id("1")
            .with_scalars(["id", "name", "capital"])
            .with_child(
                "languages",
                Node::Object(ObjectNode::new("languages", "language").list().with_scalars(["code"])),
            );
        let prototype = Prototype::new(Fields::from([
            ("country".to_string(), Node::Object(country)),
            ("version".to_string(), Node::Object(ObjectNode::new("version", "string"))),
        ]));

        let cached = map(json!({"country": {"id": "1", "name": "Andorra", "capital": "stale"}}));
        let fetched = map(json!({
            "country": {"id": "1", "capital": "Andorra la Vella", "languages": [{"code": "ca"}]},
            "version": "1.2"
        }));

        assert_eq!(
            Value::Object(join(&cached, &fetched, &prototype)),
            json!({
                "country": {
                    "id": "1",
                    "name": "Andorra",
                    "capital": "Andorra la Vella",
                    "languages": [{"code": "ca"}]
                },
                "version": "1.2"
            })
        );
    }

    #[test]
    fn lists_are_merged_by_position() {
        let cached = map(json!({"countries": [{"id": "1", "name": "Andorra"}, {"id": "2", "name": "Belgium"}]}));
        let fetched = map(json!({"countries": [{"id": "1", "capital": "Andorra la Vella"}, {"id": "2", "capital": "Brussels"}]}));

        assert_eq!(
            Value::Object(join(&cached, &fetched, &countries_prototype())),
            json!({"countries": [
                {"id": "1", "name": "Andorra", "capital": "Andorra la Vella"},
                {"id": "2", "name": "Belgium", "capital": "Brussels"}
            ]})
        );
    }

    #[test]
    fn lists_of_the_same_shape_are_concatenated() {
        let cached = map(json!({"countries": [{"id": "1", "name": "Andorra"}]}));
        let fetched = map(json!({"countries": [{"id": "2", "name": "Belgium"}]}));

        assert_eq!(
            Value::Object(join(&cached, &fetched, &countries_prototype())),
            json!({"countries": [{"id": "1", "name": "Andorra"}, {"id": "2", "name": "Belgium"}]})
        );
    }

    #[test]
    fn lists_of_the_same_entities_are_merged_by_position() {
        let cities = ObjectNode::new("cities", "city").list().with_scalars(["id", "name"]);
        let countries = ObjectNode::new("countries", "country")
            .list()
            .with_scalars(["id"])
            .with_child("cities", Node::Object(cities));
        let prototype = Prototype::new(Fields::from([("countries".to_string(), Node::Object(countries))]));

        let cached = map(json!({"countries": [
            {"id": "AD", "cities": [{"id": "7"}]},
            {"id": "BE", "cities": [{"id": "8"}]}
        ]}));
        let fetched = map(json!({"countries": [
            {"id": "AD", "cities": [{"id": "7", "name": "Encamp"}]},
            {"id": "BE", "cities": [{"id": "8", "name": "Brussels"}]}
        ]}));

        assert_eq!(
            Value::Object(join(&cached, &fetched, &prototype)),
            json!({"countries": [
                {"id": "AD", "cities": [{"id": "7", "name": "Encamp"}]},
                {"id": "BE", "cities": [{"id": "8", "name": "Brussels"}]}
            ]})
        );
    }

    #[test]
    fn uneven_lists() {
        let children = Fields::from([("id".to_string(), Node::Scalar(true))]);

        assert_eq!(
            join_arrays(&[json!({"id": "1"})], &[json!({"id": "1"}), json!({"id": "2"})], &children),
            vec![json!({"id": "1"}), json!({"id": "2"})]
        );
    }

    #[test]
    fn missing_on_both_sides() {
        let cached = map(json!({}));
        let fetched = map(json!({}));

        assert!(join(&cached, &fetched, &countries_prototype()).is_empty());
    }
}
