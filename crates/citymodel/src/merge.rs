//! Merging paged city model features into a single document.
//!
//! Pages deliver each building as a standalone feature with its own vertex
//! list and locally-indexed geometry. The merger appends every ingested
//! feature's vertices to one unified list and rewrites each geometry's
//! boundary references through the offset mapping, so the resulting document
//! is internally consistent on its own.
//!
//! Features missing their entity map or vertex list are dropped whole. When
//! the same entity id arrives more than once, the first occurrence wins and
//! later copies are counted but never merged; their vertices stay in the
//! unified list unused.

use std::collections::BTreeMap;

use crate::boundaries::{Boundaries, IndexMapping, VertexIndexMap};
use crate::model::{CITYJSON_TYPE, CityObject, FeatureCollection, MergedDocument, Vertex};

/// A merge rejected the input. The document under construction is discarded;
/// partially merged output is never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// An entity's boundary value does not follow the nested-array shape.
    MalformedGeometry { entity_id: String, reason: String },
    /// An entity references a vertex index with no entry in its mapping.
    DanglingVertexReference {
        entity_id: String,
        local_index: usize,
    },
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::MalformedGeometry { entity_id, reason } => {
                write!(f, "entity {entity_id} carries malformed geometry: {reason}")
            }
            MergeError::DanglingVertexReference {
                entity_id,
                local_index,
            } => {
                write!(
                    f,
                    "entity {entity_id} references vertex {local_index} outside its vertex list"
                )
            }
        }
    }
}

impl std::error::Error for MergeError {}

/// Counters describing what one merge kept and what it dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Features whose vertices and entities were taken into the document.
    pub ingested_features: usize,
    /// Features dropped for lacking an entity map or a vertex list.
    pub skipped_features: usize,
    /// Entities inserted into the unified document.
    pub merged_objects: usize,
    /// Later copies of an already-merged entity id.
    pub duplicate_objects: usize,
    /// Length of the unified vertex list.
    pub vertex_count: usize,
}

/// Merges every feature of `collection` into one document.
///
/// Collection-level metadata is carried over unchanged. Entity iteration is
/// ordered by id within each feature, and features are processed in arrival
/// order, so the same input always produces the same document.
pub fn merge(collection: FeatureCollection) -> Result<(MergedDocument, MergeStats), MergeError> {
    let mut stats = MergeStats::default();
    let mut city_objects: BTreeMap<String, CityObject> = BTreeMap::new();
    let mut vertices: Vec<Vertex> = Vec::new();

    for feature in collection.features {
        let Some(objects) = feature.city_objects else {
            stats.skipped_features += 1;
            continue;
        };
        if feature.vertices.is_empty() {
            stats.skipped_features += 1;
            continue;
        }

        // The mapping must be fixed before the vertices move.
        let map = VertexIndexMap::new(vertices.len(), feature.vertices.len());
        vertices.extend(feature.vertices);
        stats.ingested_features += 1;

        for (entity_id, mut object) in objects {
            if city_objects.contains_key(&entity_id) {
                stats.duplicate_objects += 1;
                continue;
            }
            rewrite_boundaries_in_place(&mut object, &map, &entity_id)?;
            city_objects.insert(entity_id, object);
            stats.merged_objects += 1;
        }
    }

    stats.vertex_count = vertices.len();

    let document = MergedDocument {
        kind: CITYJSON_TYPE.to_string(),
        city_objects,
        vertices,
        transform: collection.transform,
        version: collection.version,
        reference_system: collection.reference_system,
    };
    Ok((document, stats))
}

/// Rewrites every boundary reference of `object` through `map`.
///
/// Objects without geometry and geometries without boundaries pass through
/// untouched. Classification failures and unmapped references surface as
/// [`MergeError`] values naming the entity.
pub(crate) fn rewrite_boundaries_in_place(
    object: &mut CityObject,
    map: &impl IndexMapping,
    entity_id: &str,
) -> Result<(), MergeError> {
    let Some(geometries) = object.geometry.as_mut() else {
        return Ok(());
    };

    for geometry in geometries {
        if geometry.boundaries.is_null() {
            continue;
        }
        let tree = Boundaries::from_value(&geometry.boundaries).map_err(|reason| {
            MergeError::MalformedGeometry {
                entity_id: entity_id.to_string(),
                reason,
            }
        })?;
        let rewritten =
            tree.rewrite(map)
                .map_err(|dangling| MergeError::DanglingVertexReference {
                    entity_id: entity_id.to_string(),
                    local_index: dangling.local_index,
                })?;
        geometry.boundaries = rewritten.to_value();
    }
    Ok(())
}
