//! Loro-backed replica of the shape store.

use super::{ShapeStore, StoreError};
use crate::shapes::{Shape, ShapeId};
use loro::{ExportMode, LoroDoc, LoroMap, LoroResult, LoroValue, ValueOrContainer, VersionVector};
use std::collections::HashMap;

/// Key for the shapes map in the document.
pub const SHAPES_KEY: &str = "canvasObjects";

/// Key for the creation order of shapes, a map from identity to a sequence
/// number assigned when the identity is first written.
pub const ORDER_KEY: &str = "canvasOrder";

/// One peer's replica of the shared shape store.
///
/// Each shape is a single JSON string under its identity in a Loro map, so a
/// write is an atomic replacement and concurrent writes resolve through the
/// map's last-writer-wins register semantics.
///
/// Entries are listed bottom to top in creation order. Shapes created
/// concurrently on two peers can share a sequence number; identity breaks the
/// tie so every replica agrees.
pub struct ReplicatedStore {
    doc: LoroDoc,
}

impl ReplicatedStore {
    /// Create an empty replica.
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Create a replica from a snapshot or update blob.
    pub fn from_snapshot(bytes: &[u8]) -> LoroResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self { doc })
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    fn shapes_map(&self) -> LoroMap {
        self.doc.get_map(SHAPES_KEY)
    }

    fn order_map(&self) -> LoroMap {
        self.doc.get_map(ORDER_KEY)
    }

    fn raw_entry(&self, key: &str) -> Option<String> {
        match self.shapes_map().get(key) {
            Some(ValueOrContainer::Value(LoroValue::String(s))) => Some(s.to_string()),
            _ => None,
        }
    }

    /// Creation sequence of every ordered identity.
    fn sequences(&self) -> HashMap<String, i64> {
        let LoroValue::Map(map) = self.order_map().get_deep_value() else {
            return HashMap::new();
        };
        map.iter()
            .filter_map(|(key, value)| match value {
                LoroValue::I64(seq) => Some((key.clone(), *seq)),
                _ => None,
            })
            .collect()
    }

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> Vec<u8> {
        self.doc.export(ExportMode::updates(since)).unwrap_or_default()
    }

    /// Import updates or a snapshot from another replica.
    pub fn import(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }
}

impl Default for ReplicatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeStore for ReplicatedStore {
    fn get(&self, id: &ShapeId) -> Option<Shape> {
        let key = id.to_string();
        decode_entry(&key, &self.raw_entry(&key)?)
    }

    fn put(&mut self, id: ShapeId, shape: &Shape) -> Result<bool, StoreError> {
        if id != shape.id() {
            return Err(StoreError::IdentityMismatch {
                key: id,
                shape: shape.id(),
            });
        }

        let key = id.to_string();
        let json = serde_json::to_string(shape)?;
        if self.raw_entry(&key).as_deref() == Some(json.as_str()) {
            return Ok(false);
        }

        let order = self.order_map();
        if order.get(&key).is_none() {
            let next = self.sequences().into_values().max().map_or(0, |max| max + 1);
            order.insert(&key, next)?;
        }
        self.shapes_map().insert(&key, json)?;
        self.doc.commit();
        Ok(true)
    }

    fn delete(&mut self, id: &ShapeId) -> Result<bool, StoreError> {
        let key = id.to_string();
        let shapes = self.shapes_map();
        if shapes.get(&key).is_none() {
            return Ok(false);
        }

        shapes.delete(&key)?;
        self.order_map().delete(&key)?;
        self.doc.commit();
        Ok(true)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let shapes = self.shapes_map();
        let order = self.order_map();
        let keys: Vec<String> = match shapes.get_deep_value() {
            LoroValue::Map(map) => map.keys().cloned().collect(),
            _ => vec![],
        };
        let ordered: Vec<String> = self.sequences().into_keys().collect();
        if keys.is_empty() && ordered.is_empty() {
            return Ok(());
        }

        for key in keys {
            shapes.delete(&key)?;
        }
        for key in ordered {
            order.delete(&key)?;
        }
        self.doc.commit();
        Ok(())
    }

    fn entries(&self) -> Vec<Shape> {
        let LoroValue::Map(map) = self.shapes_map().get_deep_value() else {
            return Vec::new();
        };

        let sequences = self.sequences();
        let mut shapes: Vec<(i64, Shape)> = map
            .iter()
            .filter_map(|(key, value)| {
                let LoroValue::String(raw) = value else {
                    log::warn!("Skipping non-string shape entry {}", key);
                    return None;
                };
                let shape = decode_entry(key, &raw.to_string())?;
                Some((sequences.get(key).copied().unwrap_or(0), shape))
            })
            .collect();
        shapes.sort_by_key(|(seq, shape)| (*seq, shape.id()));
        shapes.into_iter().map(|(_, shape)| shape).collect()
    }
}

/// Decode a stored value, rejecting one whose identity differs from its key.
fn decode_entry(key: &str, raw: &str) -> Option<Shape> {
    match serde_json::from_str::<Shape>(raw) {
        Ok(shape) if shape.id().to_string() == key => Some(shape),
        Ok(shape) => {
            log::warn!("Skipping shape {} stored under key {}", shape.id(), key);
            None
        }
        Err(e) => {
            log::warn!("Skipping malformed shape {}: {}", key, e);
            None
        }
    }
}
