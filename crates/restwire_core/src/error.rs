//! Error types for restwire core.

use thiserror::Error;

/// Result type for registry and change-list operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while tracking entities and building change lists.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A different instance with the same computed identity is already tracked.
    #[error("an entity with identity {identity} is already being tracked")]
    DuplicateIdentity {
        /// The computed identity that collided.
        identity: String,
    },

    /// The requested state transition is not valid for the descriptor.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current descriptor state.
        from: crate::EntityState,
        /// Attempted target state.
        to: crate::EntityState,
    },

    /// The relationship is already being tracked.
    #[error("the link {source_set}.{property} is already being tracked")]
    DuplicateLink {
        /// Set name of the link source.
        source_set: String,
        /// Navigation property name.
        property: String,
    },

    /// The entity is not tracked by this registry.
    #[error("the entity is not being tracked by this context")]
    UnknownEntity,

    /// No entity set with the given name is known to the metadata.
    #[error("unknown entity set: {name}")]
    UnknownSet {
        /// Name of the set.
        name: String,
    },

    /// A property required by the metadata is missing or not navigable.
    #[error("type {type_name} has no property {property} usable here")]
    UnknownProperty {
        /// The entity type.
        type_name: String,
        /// The property name.
        property: String,
    },

    /// The application dropped the entity while it was still tracked.
    #[error("tracked entity was dropped by the application")]
    EntityGone,

    /// Two added entities require each other to be inserted first.
    #[error("circular dependency between added entities in set {set_name}")]
    CircularDependency {
        /// Set of the first descriptor found on the cycle.
        set_name: String,
    },
}

impl CoreError {
    /// Creates a duplicate-identity error.
    pub fn duplicate_identity(identity: impl Into<String>) -> Self {
        Self::DuplicateIdentity {
            identity: identity.into(),
        }
    }

    /// Creates an unknown-set error.
    pub fn unknown_set(name: impl Into<String>) -> Self {
        Self::UnknownSet { name: name.into() }
    }

    /// Creates an unknown-property error.
    pub fn unknown_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }
}
