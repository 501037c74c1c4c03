//! Optional vertex compaction for merged documents.
//!
//! A merged document keeps every vertex its source pages delivered, including
//! spans belonging only to duplicate entities that were never merged. This
//! pass drops vertices nothing references and renumbers the survivors while
//! preserving their relative order. It validates the whole document before
//! touching it, so a failed prune leaves the document exactly as it was.

use crate::boundaries::{Boundaries, IndexMapping};
use crate::merge::{MergeError, rewrite_boundaries_in_place};
use crate::model::MergedDocument;

/// Counters describing what one prune removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub removed_vertices: usize,
    pub retained_vertices: usize,
}

/// Non-contiguous mapping from old vertex positions to compacted ones.
struct CompactionMap {
    next: Vec<Option<usize>>,
}

impl IndexMapping for CompactionMap {
    fn unified(&self, index: usize) -> Option<usize> {
        self.next.get(index).copied().flatten()
    }
}

impl MergedDocument {
    /// Removes every vertex no geometry references and rewrites the
    /// remaining references to the compacted positions.
    pub fn prune_unreferenced_vertices(&mut self) -> Result<PruneStats, MergeError> {
        let mut referenced = vec![false; self.vertices.len()];

        for (entity_id, object) in &self.city_objects {
            let Some(geometries) = object.geometry.as_ref() else {
                continue;
            };
            for geometry in geometries {
                if geometry.boundaries.is_null() {
                    continue;
                }
                let tree = Boundaries::from_value(&geometry.boundaries).map_err(|reason| {
                    MergeError::MalformedGeometry {
                        entity_id: entity_id.clone(),
                        reason,
                    }
                })?;

                let mut out_of_range = None;
                tree.for_each_reference(&mut |index| match referenced.get_mut(index) {
                    Some(slot) => *slot = true,
                    None => {
                        if out_of_range.is_none() {
                            out_of_range = Some(index);
                        }
                    }
                });
                if let Some(local_index) = out_of_range {
                    return Err(MergeError::DanglingVertexReference {
                        entity_id: entity_id.clone(),
                        local_index,
                    });
                }
            }
        }

        let mut next = vec![None; self.vertices.len()];
        let mut compacted = Vec::new();
        for (index, vertex) in std::mem::take(&mut self.vertices).into_iter().enumerate() {
            if referenced[index] {
                next[index] = Some(compacted.len());
                compacted.push(vertex);
            }
        }
        let stats = PruneStats {
            removed_vertices: next.len() - compacted.len(),
            retained_vertices: compacted.len(),
        };
        self.vertices = compacted;

        let map = CompactionMap { next };
        for (entity_id, object) in self.city_objects.iter_mut() {
            rewrite_boundaries_in_place(object, &map, entity_id)?;
        }

        Ok(stats)
    }
}
