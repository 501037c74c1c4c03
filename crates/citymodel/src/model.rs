use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CITYJSON_TYPE: &str = "CityJSON";

/// One raw vertex in the document's scaled/translated integer space.
pub type Vertex = [i64; 3];

/// Scale/translate pair through which all vertices of a document are read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub scale: [f64; 3],
    pub translate: [f64; 3],
}

/// A named entity (building or similar) with its geometry records.
///
/// Fields beyond the type tag and geometry (attributes, parents, ...) are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<Geometry>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A typed geometry record. `boundaries` stays raw JSON on the wire; the
/// merger parses it into [`crate::Boundaries`](crate::boundaries::Boundaries)
/// when it rewrites vertex references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub boundaries: Value,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One page-local feature: its own entity map and its own 0-based vertex
/// sequence. A feature without an entity map (`CityObjects` absent) or
/// without vertices is skipped whole by the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityJsonFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "CityObjects",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub city_objects: Option<BTreeMap<String, CityObject>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<Vertex>,
}

/// All fetched features in arrival order, plus the first page's
/// representative metadata. This is the hand-off value from the fetcher to
/// the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<CityJsonFeature>,
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_system: Option<String>,
}

/// The unified output document: one vertex sequence, one transform, one
/// entity map whose boundary indices all reference the unified sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDocument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "CityObjects")]
    pub city_objects: BTreeMap<String, CityObject>,
    pub vertices: Vec<Vertex>,
    pub transform: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(
        rename = "referenceSystem",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_system: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn feature_without_entity_map_parses_as_none() {
        let feature: CityJsonFeature = serde_json::from_value(json!({
            "id": "f1",
            "vertices": [[0, 0, 0], [1, 1, 1]]
        }))
        .expect("parse feature");

        assert!(feature.city_objects.is_none());
        assert_eq!(feature.vertices.len(), 2);
    }

    #[test]
    fn city_object_carries_unknown_fields_through() {
        let raw = json!({
            "type": "Building",
            "attributes": { "bouwjaar": 1932, "status": "Pand in gebruik" },
            "geometry": [
                { "type": "MultiSurface", "lod": "1.2", "boundaries": [[[0, 1, 2]]] }
            ]
        });

        let object: CityObject = serde_json::from_value(raw.clone()).expect("parse object");
        assert_eq!(object.kind, "Building");
        assert!(object.extra.contains_key("attributes"));

        let geometry = &object.geometry.as_ref().expect("geometry")[0];
        assert_eq!(geometry.extra.get("lod"), Some(&json!("1.2")));

        let back = serde_json::to_value(&object).expect("serialize object");
        assert_eq!(back, raw);
    }

    #[test]
    fn merged_document_serializes_with_wire_field_names() {
        let document = MergedDocument {
            kind: CITYJSON_TYPE.to_string(),
            city_objects: BTreeMap::new(),
            vertices: vec![[10, 20, 30]],
            transform: Transform {
                scale: [0.001, 0.001, 0.001],
                translate: [125000.0, 497000.0, 0.0],
            },
            version: Some("2.0".to_string()),
            reference_system: Some("EPSG:28992".to_string()),
        };

        let value = serde_json::to_value(&document).expect("serialize document");
        assert_eq!(
            value,
            json!({
                "type": "CityJSON",
                "CityObjects": {},
                "vertices": [[10, 20, 30]],
                "transform": {
                    "scale": [0.001, 0.001, 0.001],
                    "translate": [125000.0, 497000.0, 0.0]
                },
                "version": "2.0",
                "referenceSystem": "EPSG:28992"
            })
        );
    }

    #[test]
    fn absent_optional_metadata_stays_absent_on_output() {
        let document = MergedDocument {
            kind: CITYJSON_TYPE.to_string(),
            city_objects: BTreeMap::new(),
            vertices: Vec::new(),
            transform: Transform {
                scale: [1.0, 1.0, 1.0],
                translate: [0.0, 0.0, 0.0],
            },
            version: None,
            reference_system: None,
        };

        let value = serde_json::to_value(&document).expect("serialize document");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("version"));
        assert!(!object.contains_key("referenceSystem"));
    }
}
