//! Typed boundary trees and vertex reference rewriting.
//!
//! CityJSON geometry carries boundaries as arbitrarily nested arrays whose
//! leaves are vertex indices. Rewriting works on a tagged tree instead of
//! probing array shapes at every level: a JSON boundary value is classified
//! once into [`Boundaries`], remapped, and serialized back.

use serde_json::Value;

/// One level of a boundary structure: either a terminal ring of vertex
/// references or a list of nested levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundaries {
    Ring(Vec<usize>),
    Nested(Vec<Boundaries>),
}

/// Maps feature-local vertex indices to their unified positions.
pub trait IndexMapping {
    /// The unified index for `index`, or `None` if the mapping has no entry.
    fn unified(&self, index: usize) -> Option<usize>;
}

/// The contiguous mapping used during a merge: local index `i` of a feature
/// whose vertices start at `base` maps to `base + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexIndexMap {
    base: usize,
    len: usize,
}

impl VertexIndexMap {
    pub fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }
}

impl IndexMapping for VertexIndexMap {
    fn unified(&self, index: usize) -> Option<usize> {
        if index < self.len {
            Some(self.base + index)
        } else {
            None
        }
    }
}

/// A vertex reference with no entry in the index mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DanglingReference {
    pub local_index: usize,
}

impl std::fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vertex reference {} has no entry in the index mapping",
            self.local_index
        )
    }
}

impl std::error::Error for DanglingReference {}

impl Boundaries {
    /// Classifies a raw JSON boundary value.
    ///
    /// An array whose first element is a number must be a ring of
    /// non-negative integers; any other array must nest arrays all the way
    /// down. An empty array is an empty `Nested` level. Anything else is
    /// malformed and the returned reason names the violation.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Some(items) = value.as_array() else {
            return Err(format!(
                "boundaries must be an array, found {}",
                kind_name(value)
            ));
        };

        match items.first() {
            None => Ok(Boundaries::Nested(Vec::new())),
            Some(first) if first.is_number() => {
                let mut references = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    let Some(index) = item.as_u64() else {
                        return Err(if item.is_number() {
                            format!("ring position {position} holds a non-integer vertex index")
                        } else {
                            format!(
                                "ring position {position} mixes {} into a vertex index ring",
                                kind_name(item)
                            )
                        });
                    };
                    references.push(index as usize);
                }
                Ok(Boundaries::Ring(references))
            }
            Some(_) => {
                let mut children = Vec::with_capacity(items.len());
                for (position, item) in items.iter().enumerate() {
                    if !item.is_array() {
                        return Err(format!(
                            "boundary position {position} holds {} where a nested array was expected",
                            kind_name(item)
                        ));
                    }
                    children.push(Boundaries::from_value(item)?);
                }
                Ok(Boundaries::Nested(children))
            }
        }
    }

    /// Rewrites every terminal vertex reference through `map`, keeping the
    /// nesting structure untouched. A reference without an entry fails; a
    /// stale index never passes through.
    pub fn rewrite(self, map: &impl IndexMapping) -> Result<Self, DanglingReference> {
        match self {
            Boundaries::Ring(references) => {
                let mut mapped = Vec::with_capacity(references.len());
                for local_index in references {
                    match map.unified(local_index) {
                        Some(unified) => mapped.push(unified),
                        None => return Err(DanglingReference { local_index }),
                    }
                }
                Ok(Boundaries::Ring(mapped))
            }
            Boundaries::Nested(children) => {
                let mut mapped = Vec::with_capacity(children.len());
                for child in children {
                    mapped.push(child.rewrite(map)?);
                }
                Ok(Boundaries::Nested(mapped))
            }
        }
    }

    /// Serializes the tree back to the nested-array wire form.
    pub fn to_value(&self) -> Value {
        match self {
            Boundaries::Ring(references) => Value::Array(
                references
                    .iter()
                    .map(|&index| Value::from(index as u64))
                    .collect(),
            ),
            Boundaries::Nested(children) => {
                Value::Array(children.iter().map(Boundaries::to_value).collect())
            }
        }
    }

    /// Calls `visit` with every terminal vertex reference in the tree.
    pub fn for_each_reference(&self, visit: &mut impl FnMut(usize)) {
        match self {
            Boundaries::Ring(references) => {
                for &index in references {
                    visit(index);
                }
            }
            Boundaries::Nested(children) => {
                for child in children {
                    child.for_each_reference(visit);
                }
            }
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn classifies_solid_boundaries() {
        let tree =
            Boundaries::from_value(&json!([[[0, 1, 2, 3], [4, 5, 6, 7]]])).expect("classify");

        assert_eq!(
            tree,
            Boundaries::Nested(vec![Boundaries::Nested(vec![
                Boundaries::Ring(vec![0, 1, 2, 3]),
                Boundaries::Ring(vec![4, 5, 6, 7]),
            ])])
        );
    }

    #[test]
    fn empty_array_is_an_empty_nested_level() {
        let tree = Boundaries::from_value(&json!([])).expect("classify");
        assert_eq!(tree, Boundaries::Nested(Vec::new()));
    }

    #[test]
    fn rejects_non_array_boundaries() {
        let reason = Boundaries::from_value(&json!("solid")).expect_err("must fail");
        assert!(reason.contains("must be an array"), "{reason}");
    }

    #[test]
    fn rejects_mixed_ring_content() {
        let reason = Boundaries::from_value(&json!([0, [1, 2]])).expect_err("must fail");
        assert!(reason.contains("ring position 1"), "{reason}");
    }

    #[test]
    fn rejects_non_integer_vertex_index() {
        let reason = Boundaries::from_value(&json!([[0.5, 1]])).expect_err("must fail");
        assert!(reason.contains("non-integer"), "{reason}");
    }

    #[test]
    fn rejects_scalar_inside_nested_level() {
        let reason = Boundaries::from_value(&json!([[0, 1, 2], "cap"])).expect_err("must fail");
        assert!(reason.contains("boundary position 1"), "{reason}");
    }

    #[test]
    fn rewrite_offsets_every_reference() {
        let tree = Boundaries::from_value(&json!([[[0, 1, 2], [3, 4, 5]]])).expect("classify");
        let rewritten = tree.rewrite(&VertexIndexMap::new(10, 6)).expect("rewrite");

        assert_eq!(rewritten.to_value(), json!([[[10, 11, 12], [13, 14, 15]]]));
    }

    #[test]
    fn rewrite_fails_on_reference_outside_the_mapping() {
        let tree = Boundaries::from_value(&json!([[0, 1, 9]])).expect("classify");
        let err = tree
            .rewrite(&VertexIndexMap::new(0, 4))
            .expect_err("must fail");

        assert_eq!(err.local_index, 9);
    }

    #[test]
    fn collects_terminal_references() {
        let tree = Boundaries::from_value(&json!([[[2, 7], [3]], [[5]]])).expect("classify");
        let mut seen = Vec::new();
        tree.for_each_reference(&mut |index| seen.push(index));

        assert_eq!(seen, vec![2, 7, 3, 5]);
    }
}
