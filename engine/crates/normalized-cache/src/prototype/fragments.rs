use indexmap::IndexMap;

use super::{Fields, Node, Prototype};

/// The selections of each named fragment in a document
pub type FragmentMap = IndexMap<String, Fields>;

/// Replaces every fragment spread in the prototype with the fields of its fragment.
///
/// Spreads are placeholders keyed by the fragment name.  Fragments may spread
/// other fragments, so the spliced fields are inlined too.  A fragment that
/// (directly or not) spreads itself is only expanded once.
pub fn inline_fragments(prototype: Prototype, fragments: &FragmentMap) -> Prototype {
    if fragments.is_empty() {
        return prototype;
    }

    Prototype::new(inline_fields(prototype.fields, fragments, &mut Vec::new()))
}

fn inline_fields(fields: Fields, fragments: &FragmentMap, expanding: &mut Vec<String>) -> Fields {
    let mut inlined = Fields::with_capacity(fields.len());

    for (key, node) in fields {
        match node {
            Node::Object(mut object) => {
                object.children = inline_fields(object.children, fragments, expanding);
                merge_fields(&mut inlined, [(key, Node::Object(object))]);
            }
            Node::Scalar(_) if fragments.contains_key(&key) => {
                if expanding.contains(&key) {
                    continue;
                }

                expanding.push(key.clone());
                let spliced = inline_fields(fragments[&key].clone(), fragments, expanding);
                expanding.pop();

                merge_fields(&mut inlined, spliced);
            }
            scalar => merge_fields(&mut inlined, [(key, scalar)]),
        }
    }

    inlined
}

/// Adds `source` to `target`.  A field selected on both sides is kept once, with
/// the union of their sub-selections.
pub(super) fn merge_fields(target: &mut Fields, source: impl IntoIterator<Item = (String, Node)>) {
    for (key, node) in source {
        match (target.get_mut(&key), node) {
            (Some(Node::Object(existing)), Node::Object(incoming)) => {
                merge_fields(&mut existing.children, incoming.children);
            }
            (Some(_), _) => {}
            (None, node) => {
                target.insert(key, node);
            }
        }
    }
}
