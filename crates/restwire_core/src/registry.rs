//! The entity registry.

use crate::descriptor::{DescriptorRef, EntityDescriptor};
use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::identity::compute_identity;
use crate::link::{LinkDescriptor, LinkRef};
use crate::metadata::{MetadataProvider, NavigationKind};
use crate::state::EntityState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tracks identity, state, and relationships of application objects.
///
/// The registry is the unit the save pipeline reads from and applies
/// responses back to. Entities are keyed by instance (pointer identity
/// of their [`EntityRef`]); each instance has exactly one descriptor.
///
/// One save call owns the registry for its duration. Concurrent saves
/// against the same registry are not supported and must be serialized by
/// the caller.
pub struct EntityRegistry {
    metadata: Arc<dyn MetadataProvider>,
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    entities: Vec<DescriptorRef>,
    by_ptr: HashMap<usize, DescriptorRef>,
    links: Vec<LinkRef>,
    next_ordinal: u64,
}

impl RegistryInner {
    fn next_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    fn remove_descriptor(&mut self, descriptor: &DescriptorRef) {
        self.entities.retain(|d| !Arc::ptr_eq(d, descriptor));
        self.by_ptr.remove(&descriptor.entity_ptr());
        self.links.retain(|l| {
            !Arc::ptr_eq(l.source(), descriptor)
                && !l.target().is_some_and(|t| Arc::ptr_eq(&t, descriptor))
        });
    }
}

impl EntityRegistry {
    /// Creates a registry over the given schema.
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Returns the schema this registry was created with.
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    /// Starts tracking an existing entity in the Unchanged state.
    ///
    /// The identity is computed from the set name and the entity's key
    /// values. Attaching the same instance again returns its existing
    /// descriptor; attaching a different instance that computes the same
    /// identity fails with [`CoreError::DuplicateIdentity`].
    pub fn attach(&self, set_name: &str, entity: &EntityRef) -> CoreResult<DescriptorRef> {
        self.attach_with_etag(set_name, entity, None)
    }

    /// Like [`Self::attach`], also recording the etag last read for the
    /// entity.
    pub fn attach_with_etag(
        &self,
        set_name: &str,
        entity: &EntityRef,
        etag: Option<String>,
    ) -> CoreResult<DescriptorRef> {
        let identity = compute_identity(self.metadata.as_ref(), set_name, entity)?;
        let mut inner = self.inner.write();

        if let Some(existing) = inner.by_ptr.get(&(Arc::as_ptr(entity) as usize)) {
            return Ok(Arc::clone(existing));
        }
        if inner
            .entities
            .iter()
            .any(|d| d.identity().as_deref() == Some(identity.as_str()))
        {
            return Err(CoreError::duplicate_identity(identity));
        }

        let ordinal = inner.next_ordinal();
        let descriptor = EntityDescriptor::new(set_name, entity, EntityState::Unchanged, ordinal);
        descriptor.set_identity(identity.as_str());
        descriptor.set_etag(etag);
        inner.by_ptr.insert(descriptor.entity_ptr(), Arc::clone(&descriptor));
        inner.entities.push(Arc::clone(&descriptor));
        debug!(set = set_name, identity = %identity, "attached entity");
        Ok(descriptor)
    }

    /// Starts tracking a new entity in the Added state.
    ///
    /// Fails with [`CoreError::InvalidStateTransition`] if the instance
    /// is already tracked, and [`CoreError::UnknownSet`] for an unknown
    /// set.
    pub fn add(&self, set_name: &str, entity: &EntityRef) -> CoreResult<DescriptorRef> {
        if self.metadata.set_type(set_name).is_none() {
            return Err(CoreError::unknown_set(set_name));
        }
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_ptr.get(&(Arc::as_ptr(entity) as usize)) {
            return Err(CoreError::InvalidStateTransition {
                from: existing.state(),
                to: EntityState::Added,
            });
        }

        let ordinal = inner.next_ordinal();
        let descriptor = EntityDescriptor::new(set_name, entity, EntityState::Added, ordinal);
        inner.by_ptr.insert(descriptor.entity_ptr(), Arc::clone(&descriptor));
        inner.entities.push(Arc::clone(&descriptor));
        debug!(set = set_name, "added entity");
        Ok(descriptor)
    }

    /// Adds a new entity as related to an already tracked parent.
    ///
    /// The child is tracked in the Added state with a back-reference to
    /// the parent descriptor; its insert is sent against the parent's
    /// navigation collection.
    pub fn add_related_object(
        &self,
        parent: &EntityRef,
        property: &str,
        child: &EntityRef,
    ) -> CoreResult<DescriptorRef> {
        let parent_desc = self.descriptor_for(parent).ok_or(CoreError::UnknownEntity)?;
        if parent_desc.state() == EntityState::Deleted {
            return Err(CoreError::InvalidStateTransition {
                from: EntityState::Deleted,
                to: EntityState::Added,
            });
        }

        let parent_type = self
            .metadata
            .set_type(parent_desc.set_name())
            .ok_or_else(|| CoreError::unknown_set(parent_desc.set_name()))?;
        if self.metadata.navigation_kind(&parent_type, property)
            != Some(NavigationKind::Collection)
        {
            return Err(CoreError::unknown_property(parent_type, property));
        }
        let child_set = self
            .metadata
            .navigation_target_set(&parent_type, property)
            .ok_or_else(|| CoreError::unknown_property(&parent_type, property))?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_ptr.get(&(Arc::as_ptr(child) as usize)) {
            return Err(CoreError::InvalidStateTransition {
                from: existing.state(),
                to: EntityState::Added,
            });
        }

        let ordinal = inner.next_ordinal();
        let descriptor = EntityDescriptor::new(child_set.as_str(), child, EntityState::Added, ordinal);
        descriptor.set_parent_for_insert(Arc::clone(&parent_desc), property);
        inner.by_ptr.insert(descriptor.entity_ptr(), Arc::clone(&descriptor));
        inner.entities.push(Arc::clone(&descriptor));
        debug!(
            set = %child_set,
            parent_set = parent_desc.set_name(),
            property,
            "added related entity"
        );
        Ok(descriptor)
    }

    /// Marks a tracked entity as locally modified.
    ///
    /// An Added entity stays Added (its pending insert already carries
    /// the latest property values); a Deleted entity cannot be updated.
    pub fn update(&self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor_for(entity).ok_or(CoreError::UnknownEntity)?;
        match descriptor.state() {
            EntityState::Added => Ok(()),
            EntityState::Unchanged | EntityState::Modified => {
                descriptor.set_state(EntityState::Modified);
                Ok(())
            }
            state => Err(CoreError::InvalidStateTransition {
                from: state,
                to: EntityState::Modified,
            }),
        }
    }

    /// Marks a tracked entity for deletion.
    ///
    /// An Added entity was never sent, so it is removed from tracking
    /// outright (no request will be emitted), together with any links
    /// that reference it.
    pub fn delete(&self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor_for(entity).ok_or(CoreError::UnknownEntity)?;
        if descriptor.state() == EntityState::Added {
            descriptor.set_state(EntityState::Detached);
            self.inner.write().remove_descriptor(&descriptor);
        } else {
            descriptor.set_state(EntityState::Deleted);
        }
        Ok(())
    }

    /// Stops tracking an entity. Returns false if it was not tracked.
    pub fn detach(&self, entity: &EntityRef) -> bool {
        match self.descriptor_for(entity) {
            Some(descriptor) => {
                descriptor.set_state(EntityState::Detached);
                self.inner.write().remove_descriptor(&descriptor);
                true
            }
            None => false,
        }
    }

    /// Records a new relationship on a collection navigation property.
    pub fn add_link(
        &self,
        source: &EntityRef,
        property: &str,
        target: &EntityRef,
    ) -> CoreResult<LinkRef> {
        let source_desc = self.descriptor_for(source).ok_or(CoreError::UnknownEntity)?;
        let target_desc = self.descriptor_for(target).ok_or(CoreError::UnknownEntity)?;
        self.require_navigation(&source_desc, property, NavigationKind::Collection)?;

        let mut inner = self.inner.write();
        if inner
            .links
            .iter()
            .any(|l| l.matches(&source_desc, property, Some(&target_desc)))
        {
            return Err(CoreError::DuplicateLink {
                source_set: source_desc.set_name().to_string(),
                property: property.to_string(),
            });
        }

        let ordinal = inner.next_ordinal();
        let link = LinkDescriptor::new(
            source_desc,
            property,
            Some(target_desc),
            EntityState::Added,
            ordinal,
        );
        inner.links.push(Arc::clone(&link));
        Ok(link)
    }

    /// Sets (or nulls) a single-valued reference navigation property.
    ///
    /// A `None` target produces a Modified link with a null target,
    /// serialized as a reference removal. Setting the same property
    /// again replaces the previous pending link.
    pub fn set_link(
        &self,
        source: &EntityRef,
        property: &str,
        target: Option<&EntityRef>,
    ) -> CoreResult<LinkRef> {
        let source_desc = self.descriptor_for(source).ok_or(CoreError::UnknownEntity)?;
        let target_desc = match target {
            Some(t) => Some(self.descriptor_for(t).ok_or(CoreError::UnknownEntity)?),
            None => None,
        };
        self.require_navigation(&source_desc, property, NavigationKind::Reference)?;

        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .links
            .iter()
            .find(|l| Arc::ptr_eq(l.source(), &source_desc) && l.property() == property)
        {
            existing.set_target(target_desc);
            existing.set_state(EntityState::Modified);
            return Ok(Arc::clone(existing));
        }

        let ordinal = inner.next_ordinal();
        let link = LinkDescriptor::new(
            source_desc,
            property,
            target_desc,
            EntityState::Modified,
            ordinal,
        );
        inner.links.push(Arc::clone(&link));
        Ok(link)
    }

    /// Records removal of a relationship from a collection navigation
    /// property.
    ///
    /// Deleting a link that is still Added (never sent) removes it from
    /// tracking without emitting a request.
    pub fn delete_link(
        &self,
        source: &EntityRef,
        property: &str,
        target: &EntityRef,
    ) -> CoreResult<()> {
        let source_desc = self.descriptor_for(source).ok_or(CoreError::UnknownEntity)?;
        let target_desc = self.descriptor_for(target).ok_or(CoreError::UnknownEntity)?;
        self.require_navigation(&source_desc, property, NavigationKind::Collection)?;

        let mut inner = self.inner.write();
        if let Some(pos) = inner
            .links
            .iter()
            .position(|l| l.matches(&source_desc, property, Some(&target_desc)))
        {
            let link = Arc::clone(&inner.links[pos]);
            if link.state() == EntityState::Added {
                inner.links.remove(pos);
            } else {
                link.set_state(EntityState::Deleted);
            }
            return Ok(());
        }

        let ordinal = inner.next_ordinal();
        let link = LinkDescriptor::new(
            source_desc,
            property,
            Some(target_desc),
            EntityState::Deleted,
            ordinal,
        );
        inner.links.push(link);
        Ok(())
    }

    /// Stops tracking a link. Returns false if no such link is tracked.
    pub fn detach_link(&self, source: &EntityRef, property: &str, target: Option<&EntityRef>) -> bool {
        let Some(source_desc) = self.descriptor_for(source) else {
            return false;
        };
        let target_desc = match target {
            Some(t) => match self.descriptor_for(t) {
                Some(d) => Some(d),
                None => return false,
            },
            None => None,
        };

        let mut inner = self.inner.write();
        let before = inner.links.len();
        inner
            .links
            .retain(|l| !l.matches(&source_desc, property, target_desc.as_ref()));
        inner.links.len() != before
    }

    /// Returns the descriptor tracking an instance, if any.
    pub fn descriptor_for(&self, entity: &EntityRef) -> Option<DescriptorRef> {
        self.inner
            .read()
            .by_ptr
            .get(&(Arc::as_ptr(entity) as usize))
            .cloned()
    }

    /// Returns all entity descriptors in registration order.
    pub fn entities(&self) -> Vec<DescriptorRef> {
        self.inner.read().entities.clone()
    }

    /// Returns all link descriptors in registration order.
    pub fn links(&self) -> Vec<LinkRef> {
        self.inner.read().links.clone()
    }

    /// Returns true if any descriptor has a pending change.
    pub fn has_pending_changes(&self) -> bool {
        let inner = self.inner.read();
        inner.entities.iter().any(|d| d.state().is_pending())
            || inner.links.iter().any(|l| l.state().is_pending())
    }

    /// Applies a successful insert response: assigns identity and etag,
    /// transitions the descriptor to Unchanged.
    pub fn apply_insert_success(
        &self,
        descriptor: &DescriptorRef,
        identity: Option<String>,
        etag: Option<String>,
    ) {
        if let Some(identity) = identity {
            descriptor.set_identity(identity);
        }
        if etag.is_some() {
            descriptor.set_etag(etag);
        }
        descriptor.clear_parent_for_insert();
        descriptor.set_state(EntityState::Unchanged);
    }

    /// Applies a successful update response.
    pub fn apply_update_success(&self, descriptor: &DescriptorRef, etag: Option<String>) {
        if etag.is_some() {
            descriptor.set_etag(etag);
        }
        descriptor.set_state(EntityState::Unchanged);
    }

    /// Applies a successful delete response: the descriptor and any
    /// links referencing it leave the registry.
    pub fn apply_delete_success(&self, descriptor: &DescriptorRef) {
        descriptor.set_state(EntityState::Detached);
        self.inner.write().remove_descriptor(descriptor);
    }

    /// Applies a successful link operation: Added/Modified links become
    /// Unchanged, Deleted links leave the registry.
    pub fn apply_link_success(&self, link: &LinkRef) {
        if link.state() == EntityState::Deleted {
            self.inner.write().links.retain(|l| !Arc::ptr_eq(l, link));
        } else {
            link.set_state(EntityState::Unchanged);
        }
    }

    fn require_navigation(
        &self,
        source: &DescriptorRef,
        property: &str,
        kind: NavigationKind,
    ) -> CoreResult<()> {
        let type_name = self
            .metadata
            .set_type(source.set_name())
            .ok_or_else(|| CoreError::unknown_set(source.set_name()))?;
        if self.metadata.navigation_kind(&type_name, property) == Some(kind) {
            Ok(())
        } else {
            Err(CoreError::unknown_property(type_name, property))
        }
    }
}
