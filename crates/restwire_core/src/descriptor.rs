//! Entity descriptors.

use crate::entity::{EntityObject, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::state::EntityState;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Shared handle to an entity descriptor.
///
/// Descriptors are shared between the registry, change lists, and hook
/// arguments; reference identity of the `Arc` is observable (the same
/// descriptor instance is seen by every hook fired for one operation).
pub type DescriptorRef = Arc<EntityDescriptor>;

/// Tracked-state record for one entity instance.
///
/// The descriptor holds the entity weakly; the application owns the
/// entity itself. Identity (the relative resource path, which doubles as
/// the edit link) is `None` until the entity has been attached with keys
/// or inserted and assigned an identity from the response.
pub struct EntityDescriptor {
    set_name: String,
    entity: Weak<EntityObject>,
    entity_ptr: usize,
    ordinal: u64,
    inner: RwLock<DescriptorInner>,
}

struct DescriptorInner {
    state: EntityState,
    identity: Option<String>,
    etag: Option<String>,
    parent: Option<(DescriptorRef, String)>,
}

impl EntityDescriptor {
    pub(crate) fn new(
        set_name: impl Into<String>,
        entity: &EntityRef,
        state: EntityState,
        ordinal: u64,
    ) -> DescriptorRef {
        Arc::new(Self {
            set_name: set_name.into(),
            entity: Arc::downgrade(entity),
            entity_ptr: Arc::as_ptr(entity) as usize,
            ordinal,
            inner: RwLock::new(DescriptorInner {
                state,
                identity: None,
                etag: None,
                parent: None,
            }),
        })
    }

    /// Returns the entity set this descriptor belongs to.
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    /// Returns the tracked entity, if the application still holds it.
    pub fn try_entity(&self) -> Option<EntityRef> {
        self.entity.upgrade()
    }

    /// Returns the tracked entity or [`CoreError::EntityGone`].
    pub fn entity(&self) -> CoreResult<EntityRef> {
        self.try_entity().ok_or(CoreError::EntityGone)
    }

    /// Returns the current state.
    pub fn state(&self) -> EntityState {
        self.inner.read().state
    }

    pub(crate) fn set_state(&self, state: EntityState) {
        self.inner.write().state = state;
    }

    /// Returns the resource identity (relative path), if assigned.
    pub fn identity(&self) -> Option<String> {
        self.inner.read().identity.clone()
    }

    /// Returns the edit link. Identical to the identity for this engine.
    pub fn edit_link(&self) -> Option<String> {
        self.identity()
    }

    pub(crate) fn set_identity(&self, identity: impl Into<String>) {
        self.inner.write().identity = Some(identity.into());
    }

    /// Returns the etag last seen for this entity, if any.
    pub fn etag(&self) -> Option<String> {
        self.inner.read().etag.clone()
    }

    pub(crate) fn set_etag(&self, etag: Option<String>) {
        self.inner.write().etag = etag;
    }

    /// Returns the containing descriptor for a deep insert, if this
    /// entity was added via `add_related_object`.
    pub fn parent_for_insert(&self) -> Option<(DescriptorRef, String)> {
        self.inner.read().parent.clone()
    }

    pub(crate) fn set_parent_for_insert(&self, parent: DescriptorRef, property: impl Into<String>) {
        self.inner.write().parent = Some((parent, property.into()));
    }

    pub(crate) fn clear_parent_for_insert(&self) {
        self.inner.write().parent = None;
    }

    /// Stable pointer key of the tracked instance.
    pub(crate) fn entity_ptr(&self) -> usize {
        self.entity_ptr
    }

    /// Registration ordinal; the registry assigns these monotonically.
    pub(crate) fn ordinal(&self) -> u64 {
        self.ordinal
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("EntityDescriptor")
            .field("set_name", &self.set_name)
            .field("state", &inner.state)
            .field("identity", &inner.identity)
            .field("etag", &inner.etag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_is_held_weakly() {
        let entity = EntityObject::new("Customer");
        let desc = EntityDescriptor::new("Customers", &entity, EntityState::Added, 0);

        assert!(desc.try_entity().is_some());
        drop(entity);
        assert!(desc.try_entity().is_none());
        assert!(matches!(desc.entity(), Err(CoreError::EntityGone)));
    }

    #[test]
    fn identity_and_etag_cells() {
        let entity = EntityObject::new("Customer");
        let desc = EntityDescriptor::new("Customers", &entity, EntityState::Added, 0);

        assert_eq!(desc.identity(), None);
        desc.set_identity("Customers(1)");
        assert_eq!(desc.edit_link(), Some("Customers(1)".to_string()));

        desc.set_etag(Some("W/\"1\"".into()));
        assert_eq!(desc.etag(), Some("W/\"1\"".to_string()));
    }

    #[test]
    fn parent_for_insert_cell() {
        let parent_entity = EntityObject::new("Customer");
        let parent = EntityDescriptor::new("Customers", &parent_entity, EntityState::Added, 0);
        let child_entity = EntityObject::new("Order");
        let child = EntityDescriptor::new("Orders", &child_entity, EntityState::Added, 1);

        child.set_parent_for_insert(Arc::clone(&parent), "Orders");
        let (p, prop) = child.parent_for_insert().unwrap();
        assert!(Arc::ptr_eq(&p, &parent));
        assert_eq!(prop, "Orders");
    }
}
