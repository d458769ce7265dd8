//! Serializer seam.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use restwire_core::{ChangeKind, PendingChange};
use restwire_protocol::Value;

/// Produces wire bodies for change operations.
///
/// Payload encoding is external to this engine: the serializer receives
/// the operation with its current descriptor snapshot and returns the
/// finished body bytes. Folded links must be embedded in insert bodies
/// by the implementation.
pub trait Serializer: Send + Sync {
    /// Serializes the body for one pending change.
    fn serialize(&self, change: &PendingChange) -> ClientResult<Bytes>;
}

impl<S: Serializer + ?Sized> Serializer for std::sync::Arc<S> {
    fn serialize(&self, change: &PendingChange) -> ClientResult<Bytes> {
        (**self).serialize(change)
    }
}

/// A minimal JSON serializer used as a test double.
///
/// Entity bodies are the entity's property map; link bodies are a
/// reference object pointing at the target's identity. Folded links are
/// embedded under their navigation property name.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStubSerializer;

impl JsonStubSerializer {
    /// Creates the serializer.
    pub fn new() -> Self {
        Self
    }

    fn json_value(value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Value::from(*d),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl Serializer for JsonStubSerializer {
    fn serialize(&self, change: &PendingChange) -> ClientResult<Bytes> {
        let body = match change {
            PendingChange::Entity(entity_change) => {
                if entity_change.kind == ChangeKind::Delete {
                    return Ok(Bytes::new());
                }
                let entity = entity_change.descriptor.entity().map_err(|e| {
                    ClientError::serialize(format!("entity unavailable: {e}"))
                })?;
                let mut map = serde_json::Map::new();
                for (name, value) in entity.snapshot() {
                    map.insert(name, Self::json_value(&value));
                }
                for link in &entity_change.folded_links {
                    let target_ref = link
                        .target()
                        .and_then(|t| t.identity())
                        .map(serde_json::Value::String)
                        .unwrap_or(serde_json::Value::Null);
                    map.insert(
                        link.property().to_string(),
                        serde_json::json!([{ "__ref": target_ref }]),
                    );
                }
                serde_json::Value::Object(map)
            }
            PendingChange::Link(link) => {
                let target_ref = link
                    .target()
                    .and_then(|t| t.identity())
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null);
                serde_json::json!({ "__ref": target_ref })
            }
        };
        let text = serde_json::to_string(&body)
            .map_err(|e| ClientError::serialize(e.to_string()))?;
        Ok(Bytes::from(text))
    }
}
