//! Link descriptors.

use crate::descriptor::DescriptorRef;
use crate::state::EntityState;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a link descriptor.
pub type LinkRef = Arc<LinkDescriptor>;

/// Tracked-state record for one relationship.
///
/// A link relates a source descriptor to a target descriptor through a
/// named navigation property. A `None` target on a Modified link means
/// "set the reference to null" and is serialized as a reference removal.
pub struct LinkDescriptor {
    source: DescriptorRef,
    property: String,
    ordinal: u64,
    inner: RwLock<LinkInner>,
}

struct LinkInner {
    target: Option<DescriptorRef>,
    state: EntityState,
}

impl LinkDescriptor {
    pub(crate) fn new(
        source: DescriptorRef,
        property: impl Into<String>,
        target: Option<DescriptorRef>,
        state: EntityState,
        ordinal: u64,
    ) -> LinkRef {
        Arc::new(Self {
            source,
            property: property.into(),
            ordinal,
            inner: RwLock::new(LinkInner { target, state }),
        })
    }

    /// Returns the source descriptor.
    pub fn source(&self) -> &DescriptorRef {
        &self.source
    }

    /// Returns the navigation property name.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Returns the target descriptor, or `None` for a reference-nulling
    /// link.
    pub fn target(&self) -> Option<DescriptorRef> {
        self.inner.read().target.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> EntityState {
        self.inner.read().state
    }

    pub(crate) fn set_state(&self, state: EntityState) {
        self.inner.write().state = state;
    }

    pub(crate) fn set_target(&self, target: Option<DescriptorRef>) {
        self.inner.write().target = target;
    }

    pub(crate) fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Returns true if this link relates the same (source, property,
    /// target) triple.
    pub(crate) fn matches(
        &self,
        source: &DescriptorRef,
        property: &str,
        target: Option<&DescriptorRef>,
    ) -> bool {
        if !Arc::ptr_eq(&self.source, source) || self.property != property {
            return false;
        }
        match (&self.inner.read().target, target) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for LinkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("LinkDescriptor")
            .field("source_set", &self.source.set_name())
            .field("property", &self.property)
            .field("has_target", &inner.target.is_some())
            .field("state", &inner.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EntityDescriptor;
    use crate::entity::EntityObject;

    fn descriptor(set: &str, ordinal: u64) -> DescriptorRef {
        let entity = EntityObject::new("T");
        EntityDescriptor::new(set, &entity, EntityState::Unchanged, ordinal)
    }

    #[test]
    fn triple_matching() {
        let src = descriptor("Orders", 0);
        let tgt = descriptor("OrderDetails", 1);
        let link = LinkDescriptor::new(
            Arc::clone(&src),
            "OrderDetails",
            Some(Arc::clone(&tgt)),
            EntityState::Added,
            2,
        );

        assert!(link.matches(&src, "OrderDetails", Some(&tgt)));
        assert!(!link.matches(&src, "OrderDetails", None));
        assert!(!link.matches(&src, "Other", Some(&tgt)));
        assert!(!link.matches(&tgt, "OrderDetails", Some(&tgt)));
    }

    #[test]
    fn null_target_link() {
        let src = descriptor("Orders", 0);
        let link = LinkDescriptor::new(Arc::clone(&src), "Customer", None, EntityState::Modified, 1);
        assert!(link.target().is_none());
        assert!(link.matches(&src, "Customer", None));
        assert_eq!(link.state(), EntityState::Modified);
    }
}
