//! # Restwire Core
//!
//! Entity registry and change tracking for the restwire client engine.
//!
//! This crate provides:
//! - Tracked entity objects and descriptors ([`EntityObject`],
//!   [`EntityDescriptor`])
//! - Relationship tracking ([`LinkDescriptor`])
//! - The registry that owns both ([`EntityRegistry`])
//! - Deterministic identity computation from set name + key values
//! - Change-list linearization with link folding and deep-insert
//!   nesting ([`build_change_list`])
//! - The metadata seam that replaces runtime reflection
//!   ([`MetadataProvider`])
//!
//! ## Key Invariants
//!
//! - Exactly one descriptor per distinct tracked object instance
//! - State transitions are monotonic within one save cycle
//!   (Added → Unchanged, Modified → Unchanged, Deleted → removed)
//! - The registry holds entities weakly; applications own them
//! - Change lists preserve registration order, except where folding or
//!   dependency ordering requires otherwise

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_list;
mod descriptor;
mod entity;
mod error;
mod identity;
mod link;
mod metadata;
mod registry;
mod state;

pub use change_list::{
    build_change_list, ChangeKind, EntityChange, OperationDescriptor, PendingChange,
};
pub use descriptor::{DescriptorRef, EntityDescriptor};
pub use entity::{EntityObject, EntityRef};
pub use error::{CoreError, CoreResult};
pub use identity::compute_identity;
pub use link::{LinkDescriptor, LinkRef};
pub use metadata::{MetadataProvider, NavigationKind, StaticMetadata};
pub use registry::EntityRegistry;
pub use state::EntityState;
