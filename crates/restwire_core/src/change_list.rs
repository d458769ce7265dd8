//! Change-list linearization.
//!
//! `build_change_list` turns the registry's pending descriptors into the
//! ordered operation sequence a save walks. Ordering is registration
//! order, with two adjustments:
//!
//! - **Folding**: an Added link whose source is itself being inserted in
//!   this save and whose target is Unchanged rides inside the source's
//!   insert body instead of becoming a standalone operation.
//! - **Dependencies**: an operation that needs the identity of an entity
//!   being inserted in this save (a link endpoint, or an insert targeted
//!   at an Added parent's navigation collection) is deferred until just
//!   after that insert.

use crate::descriptor::DescriptorRef;
use crate::error::{CoreError, CoreResult};
use crate::link::LinkRef;
use crate::registry::EntityRegistry;
use crate::state::EntityState;
use std::collections::HashMap;
use std::sync::Arc;

/// The mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// POST a new entity.
    Insert,
    /// PATCH (or PUT) an existing entity.
    Update,
    /// DELETE an existing entity.
    Delete,
}

impl ChangeKind {
    fn from_state(state: EntityState) -> Option<Self> {
        match state {
            EntityState::Added => Some(ChangeKind::Insert),
            EntityState::Modified => Some(ChangeKind::Update),
            EntityState::Deleted => Some(ChangeKind::Delete),
            EntityState::Unchanged | EntityState::Detached => None,
        }
    }
}

/// One pending entity operation, with any links folded into its body.
#[derive(Debug, Clone)]
pub struct EntityChange {
    /// The descriptor the operation acts on.
    pub descriptor: DescriptorRef,
    /// What the operation does.
    pub kind: ChangeKind,
    /// Added links folded into this insert (empty unless `kind` is
    /// `Insert`).
    pub folded_links: Vec<LinkRef>,
}

/// One pending operation in the change list.
#[derive(Debug, Clone)]
pub enum PendingChange {
    /// An entity insert/update/delete.
    Entity(EntityChange),
    /// A standalone link operation; its state selects the verb.
    Link(LinkRef),
}

impl PendingChange {
    /// Returns the entity descriptor this change is about (the link
    /// source for link changes).
    pub fn descriptor(&self) -> &DescriptorRef {
        match self {
            PendingChange::Entity(change) => &change.descriptor,
            PendingChange::Link(link) => link.source(),
        }
    }

    /// Returns the descriptor attached to this operation's hook firings
    /// and response entry.
    pub fn operation_descriptor(&self) -> OperationDescriptor {
        match self {
            PendingChange::Entity(change) => {
                OperationDescriptor::Entity(Arc::clone(&change.descriptor))
            }
            PendingChange::Link(link) => OperationDescriptor::Link(Arc::clone(link)),
        }
    }
}

/// The tracked-state record an operation acts on: an entity descriptor
/// or a link descriptor.
#[derive(Debug, Clone)]
pub enum OperationDescriptor {
    /// An entity operation's descriptor.
    Entity(DescriptorRef),
    /// A link operation's descriptor.
    Link(LinkRef),
}

impl OperationDescriptor {
    /// Returns the entity descriptor, if this is an entity operation.
    pub fn as_entity(&self) -> Option<&DescriptorRef> {
        match self {
            OperationDescriptor::Entity(descriptor) => Some(descriptor),
            OperationDescriptor::Link(_) => None,
        }
    }

    /// Returns the link descriptor, if this is a link operation.
    pub fn as_link(&self) -> Option<&LinkRef> {
        match self {
            OperationDescriptor::Entity(_) => None,
            OperationDescriptor::Link(link) => Some(link),
        }
    }

    /// Returns true if both values refer to the same descriptor
    /// instance.
    pub fn same_as(&self, other: &OperationDescriptor) -> bool {
        match (self, other) {
            (OperationDescriptor::Entity(a), OperationDescriptor::Entity(b)) => Arc::ptr_eq(a, b),
            (OperationDescriptor::Link(a), OperationDescriptor::Link(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

enum WorkItem {
    Entity(DescriptorRef),
    Link(LinkRef),
}

impl WorkItem {
    fn ordinal(&self) -> u64 {
        match self {
            WorkItem::Entity(d) => d.ordinal(),
            WorkItem::Link(l) => l.ordinal(),
        }
    }
}

fn ptr_key(descriptor: &DescriptorRef) -> usize {
    Arc::as_ptr(descriptor) as usize
}

/// Returns true if the descriptor will be inserted by this save.
fn is_pending_insert(descriptor: &DescriptorRef) -> bool {
    descriptor.state() == EntityState::Added
}

/// Linearizes the registry's pending descriptors into operations.
///
/// Fails with [`CoreError::CircularDependency`] if added entities
/// require each other's inserts to come first with no resolvable order.
pub fn build_change_list(registry: &EntityRegistry) -> CoreResult<Vec<PendingChange>> {
    let mut items: Vec<WorkItem> = registry
        .entities()
        .into_iter()
        .filter(|d| d.state().is_pending())
        .map(WorkItem::Entity)
        .chain(
            registry
                .links()
                .into_iter()
                .filter(|l| l.state().is_pending())
                .map(WorkItem::Link),
        )
        .collect();
    items.sort_by_key(WorkItem::ordinal);

    let mut ops: Vec<PendingChange> = Vec::with_capacity(items.len());
    // Index of each emitted insert op, keyed by descriptor pointer.
    let mut emitted: HashMap<usize, usize> = HashMap::new();
    // Items blocked on an insert that has not been emitted yet.
    let mut waiting: HashMap<usize, Vec<WorkItem>> = HashMap::new();

    for item in items {
        emit(item, &mut ops, &mut emitted, &mut waiting);
    }

    if let Some(stuck) = waiting.values().flatten().next() {
        let set_name = match stuck {
            WorkItem::Entity(d) => d.set_name().to_string(),
            WorkItem::Link(l) => l.source().set_name().to_string(),
        };
        return Err(CoreError::CircularDependency { set_name });
    }

    Ok(ops)
}

/// Emits one item, or parks it until its blocking insert lands.
///
/// Emitting an insert flushes everything parked on it, preserving the
/// parked items' relative order.
fn emit(
    item: WorkItem,
    ops: &mut Vec<PendingChange>,
    emitted: &mut HashMap<usize, usize>,
    waiting: &mut HashMap<usize, Vec<WorkItem>>,
) {
    if let Some(blocker) = blocking_insert(&item, emitted) {
        waiting.entry(blocker).or_default().push(item);
        return;
    }

    match item {
        WorkItem::Entity(descriptor) => {
            let Some(kind) = ChangeKind::from_state(descriptor.state()) else {
                return;
            };
            let key = ptr_key(&descriptor);
            ops.push(PendingChange::Entity(EntityChange {
                descriptor,
                kind,
                folded_links: Vec::new(),
            }));
            if kind == ChangeKind::Insert {
                emitted.insert(key, ops.len() - 1);
                if let Some(unblocked) = waiting.remove(&key) {
                    for parked in unblocked {
                        emit(parked, ops, emitted, waiting);
                    }
                }
            }
        }
        WorkItem::Link(link) => {
            if foldable(&link) {
                let source_key = ptr_key(link.source());
                if let Some(&idx) = emitted.get(&source_key) {
                    if let PendingChange::Entity(change) = &mut ops[idx] {
                        change.folded_links.push(link);
                        return;
                    }
                }
            }
            ops.push(PendingChange::Link(link));
        }
    }
}

/// Returns the pointer key of the insert this item must wait for, if
/// that insert has not been emitted yet.
fn blocking_insert(item: &WorkItem, emitted: &HashMap<usize, usize>) -> Option<usize> {
    let needs = |descriptor: &DescriptorRef| -> Option<usize> {
        if is_pending_insert(descriptor) && !emitted.contains_key(&ptr_key(descriptor)) {
            Some(ptr_key(descriptor))
        } else {
            None
        }
    };

    match item {
        WorkItem::Entity(descriptor) => {
            // Only inserts into an Added parent's collection wait; the
            // parent identity is needed to address the request.
            if descriptor.state() == EntityState::Added {
                let (parent, _) = descriptor.parent_for_insert()?;
                needs(&parent)
            } else {
                None
            }
        }
        WorkItem::Link(link) => {
            if foldable(link) {
                // A foldable link waits for its source insert so it can
                // be folded into it.
                return if emitted.contains_key(&ptr_key(link.source())) {
                    None
                } else {
                    Some(ptr_key(link.source()))
                };
            }
            needs(link.source()).or_else(|| link.target().as_ref().and_then(needs))
        }
    }
}

/// The fold rule: an Added link into an Unchanged target, sourced from
/// an entity that is itself being inserted in this save.
fn foldable(link: &LinkRef) -> bool {
    link.state() == EntityState::Added
        && is_pending_insert(link.source())
        && link
            .target()
            .is_some_and(|t| t.state() == EntityState::Unchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityObject, EntityRef};
    use crate::metadata::{NavigationKind, StaticMetadata};
    use restwire_protocol::Value;

    fn registry() -> EntityRegistry {
        let metadata = StaticMetadata::new()
            .add_type("Customer", ["Id"])
            .add_type("Order", ["Id"])
            .add_type("OrderDetail", ["Id"])
            .add_set("Customers", "Customer")
            .add_set("Orders", "Order")
            .add_set("OrderDetails", "OrderDetail")
            .add_navigation("Customer", "Orders", NavigationKind::Collection, "Orders")
            .add_navigation(
                "Order",
                "OrderDetails",
                NavigationKind::Collection,
                "OrderDetails",
            )
            .add_navigation("Order", "Customer", NavigationKind::Reference, "Customers");
        EntityRegistry::new(std::sync::Arc::new(metadata))
    }

    fn entity(type_name: &str, id: i64) -> EntityRef {
        EntityObject::with_props(type_name, [("Id", Value::Int(id))])
    }

    #[test]
    fn registration_order_is_preserved() {
        let reg = registry();
        let a = entity("Customer", 1);
        let b = entity("Customer", 2);
        let c = entity("Customer", 3);
        reg.add("Customers", &a).unwrap();
        reg.attach("Customers", &b).unwrap();
        reg.update(&b).unwrap();
        reg.attach("Customers", &c).unwrap();
        reg.delete(&c).unwrap();

        let list = build_change_list(&reg).unwrap();
        let kinds: Vec<ChangeKind> = list
            .iter()
            .map(|op| match op {
                PendingChange::Entity(e) => e.kind,
                PendingChange::Link(_) => panic!("no links expected"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[test]
    fn unchanged_entities_are_skipped() {
        let reg = registry();
        let a = entity("Customer", 1);
        reg.attach("Customers", &a).unwrap();
        assert!(build_change_list(&reg).unwrap().is_empty());
    }

    #[test]
    fn added_link_to_unchanged_target_folds_into_source_insert() {
        let reg = registry();
        let new_order = entity("Order", 1);
        let detail = entity("OrderDetail", 7);
        reg.add("Orders", &new_order).unwrap();
        reg.attach("OrderDetails", &detail).unwrap();
        reg.add_link(&new_order, "OrderDetails", &detail).unwrap();

        let list = build_change_list(&reg).unwrap();
        assert_eq!(list.len(), 1, "link folds, no standalone op");
        match &list[0] {
            PendingChange::Entity(change) => {
                assert_eq!(change.kind, ChangeKind::Insert);
                assert_eq!(change.folded_links.len(), 1);
                assert_eq!(change.folded_links[0].property(), "OrderDetails");
            }
            PendingChange::Link(_) => panic!("expected folded entity change"),
        }
    }

    #[test]
    fn link_between_unchanged_entities_is_standalone() {
        let reg = registry();
        let customer = entity("Customer", 1);
        let order = entity("Order", 2);
        reg.attach("Customers", &customer).unwrap();
        reg.attach("Orders", &order).unwrap();
        reg.add_link(&customer, "Orders", &order).unwrap();

        let list = build_change_list(&reg).unwrap();
        assert_eq!(list.len(), 1);
        assert!(matches!(&list[0], PendingChange::Link(_)));
    }

    #[test]
    fn link_to_added_target_is_ordered_after_its_insert() {
        let reg = registry();
        let customer = entity("Customer", 1);
        reg.attach("Customers", &customer).unwrap();
        let order = entity("Order", 2);
        reg.attach("Orders", &order).unwrap();
        reg.delete(&order).unwrap();

        let new_order = entity("Order", 3);
        reg.add("Orders", &new_order).unwrap();
        reg.add_link(&customer, "Orders", &new_order).unwrap();

        let list = build_change_list(&reg).unwrap();
        // delete(order) first by registration order, then the insert,
        // then the link that depends on it.
        assert_eq!(list.len(), 3);
        assert!(matches!(
            &list[0],
            PendingChange::Entity(EntityChange { kind: ChangeKind::Delete, .. })
        ));
        assert!(matches!(
            &list[1],
            PendingChange::Entity(EntityChange { kind: ChangeKind::Insert, .. })
        ));
        assert!(matches!(&list[2], PendingChange::Link(_)));
    }

    #[test]
    fn related_insert_waits_for_parent_insert() {
        let reg = registry();
        let customer = entity("Customer", 1);
        reg.add("Customers", &customer).unwrap();
        let order = entity("Order", 10);
        reg.add_related_object(&customer, "Orders", &order).unwrap();

        let list = build_change_list(&reg).unwrap();
        assert_eq!(list.len(), 2);
        let sets: Vec<&str> = list
            .iter()
            .map(|op| op.descriptor().set_name())
            .collect();
        assert_eq!(sets, vec!["Customers", "Orders"]);
    }

    #[test]
    fn deep_insert_chain_linearizes_root_first() {
        let reg = registry();
        let customer = entity("Customer", 1);
        reg.add("Customers", &customer).unwrap();
        let order = entity("Order", 2);
        reg.add_related_object(&customer, "Orders", &order).unwrap();
        let detail = entity("OrderDetail", 3);
        reg.add_related_object(&order, "OrderDetails", &detail).unwrap();

        let list = build_change_list(&reg).unwrap();
        let sets: Vec<&str> = list
            .iter()
            .map(|op| op.descriptor().set_name())
            .collect();
        assert_eq!(sets, vec!["Customers", "Orders", "OrderDetails"]);
    }

    #[test]
    fn modified_link_is_not_folded() {
        let reg = registry();
        let order = entity("Order", 1);
        let customer = entity("Customer", 2);
        reg.add("Orders", &order).unwrap();
        reg.attach("Customers", &customer).unwrap();
        reg.set_link(&order, "Customer", Some(&customer)).unwrap();

        let list = build_change_list(&reg).unwrap();
        assert_eq!(list.len(), 2, "set_link is Modified and never folds");
        assert!(matches!(&list[1], PendingChange::Link(_)));
    }
}
