//! Tracked entity objects.

use parking_lot::RwLock;
use restwire_protocol::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A dynamic entity record.
///
/// Entities are property bags: a runtime type name plus named scalar
/// values. The application owns the record through an [`EntityRef`];
/// the registry only holds weak references and keys descriptors by
/// pointer identity, so two `EntityRef` clones of the same allocation
/// are one tracked instance.
pub struct EntityObject {
    type_name: String,
    props: RwLock<BTreeMap<String, Value>>,
}

/// Shared handle to an entity record.
pub type EntityRef = Arc<EntityObject>;

impl EntityObject {
    /// Creates an empty entity of the given runtime type.
    pub fn new(type_name: impl Into<String>) -> EntityRef {
        Arc::new(Self {
            type_name: type_name.into(),
            props: RwLock::new(BTreeMap::new()),
        })
    }

    /// Creates an entity with initial properties.
    pub fn with_props<I, K>(type_name: impl Into<String>, props: I) -> EntityRef
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entity = Self::new(type_name);
        {
            let mut map = entity.props.write();
            for (k, v) in props {
                map.insert(k.into(), v);
            }
        }
        entity
    }

    /// Returns the runtime type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Sets a property value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.props.write().insert(name.into(), value.into());
    }

    /// Reads a property value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.props.read().get(name).cloned()
    }

    /// Returns a snapshot of all properties.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.props.read().clone()
    }
}

impl fmt::Debug for EntityObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityObject")
            .field("type_name", &self.type_name)
            .field("props", &*self.props.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_access() {
        let e = EntityObject::new("Customer");
        e.set("Id", 7);
        e.set("Name", "ALFKI");

        assert_eq!(e.type_name(), "Customer");
        assert_eq!(e.get("Id"), Some(Value::Int(7)));
        assert_eq!(e.get("Name"), Some(Value::Text("ALFKI".into())));
        assert_eq!(e.get("Missing"), None);
    }

    #[test]
    fn with_props_initializes() {
        let e = EntityObject::with_props("Order", [("Id", Value::Int(1))]);
        assert_eq!(e.get("Id"), Some(Value::Int(1)));
        assert_eq!(e.snapshot().len(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let e = EntityObject::new("Customer");
        let e2 = Arc::clone(&e);
        e.set("Id", 1);
        assert_eq!(e2.get("Id"), Some(Value::Int(1)));
        assert!(Arc::ptr_eq(&e, &e2));
    }
}
