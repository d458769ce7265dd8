//! Metadata seam.
//!
//! The engine never reflects over application types. Everything it needs
//! to know about the schema — key properties and their declaration
//! order, set membership, which properties are navigations — comes
//! through [`MetadataProvider`]. [`StaticMetadata`] is the in-memory
//! implementation used by applications and tests alike.

use std::collections::HashMap;

/// How a navigation property relates two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Single-valued reference (set via `set_link`).
    Reference,
    /// Collection-valued navigation (targets of `add_link`,
    /// `add_related_object`, and `any`/`all` sources).
    Collection,
}

/// Supplies schema facts to the registry and sequencer.
pub trait MetadataProvider: Send + Sync {
    /// Returns the key properties of a type, in declaration order.
    fn key_properties(&self, type_name: &str) -> Option<Vec<String>>;

    /// Returns the entity type backing a set.
    fn set_type(&self, set_name: &str) -> Option<String>;

    /// Returns the navigation kind of a property, or `None` for
    /// non-navigation properties.
    fn navigation_kind(&self, type_name: &str, property: &str) -> Option<NavigationKind>;

    /// Returns the set that a navigation property's targets belong to.
    fn navigation_target_set(&self, type_name: &str, property: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct TypeInfo {
    keys: Vec<String>,
    navigations: HashMap<String, (NavigationKind, String)>,
}

/// An in-memory schema table.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    types: HashMap<String, TypeInfo>,
    sets: HashMap<String, String>,
}

impl StaticMetadata {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity type with its key properties in declaration order.
    pub fn add_type<I, S>(mut self, type_name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.insert(
            type_name.into(),
            TypeInfo {
                keys: keys.into_iter().map(Into::into).collect(),
                navigations: HashMap::new(),
            },
        );
        self
    }

    /// Declares an entity set backed by a type.
    pub fn add_set(mut self, set_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.sets.insert(set_name.into(), type_name.into());
        self
    }

    /// Declares a navigation property on a type.
    ///
    /// The type must already be declared with [`Self::add_type`].
    pub fn add_navigation(
        mut self,
        type_name: &str,
        property: impl Into<String>,
        kind: NavigationKind,
        target_set: impl Into<String>,
    ) -> Self {
        if let Some(info) = self.types.get_mut(type_name) {
            info.navigations
                .insert(property.into(), (kind, target_set.into()));
        }
        self
    }
}

impl MetadataProvider for StaticMetadata {
    fn key_properties(&self, type_name: &str) -> Option<Vec<String>> {
        self.types.get(type_name).map(|t| t.keys.clone())
    }

    fn set_type(&self, set_name: &str) -> Option<String> {
        self.sets.get(set_name).cloned()
    }

    fn navigation_kind(&self, type_name: &str, property: &str) -> Option<NavigationKind> {
        self.types
            .get(type_name)
            .and_then(|t| t.navigations.get(property))
            .map(|(kind, _)| *kind)
    }

    fn navigation_target_set(&self, type_name: &str, property: &str) -> Option<String> {
        self.types
            .get(type_name)
            .and_then(|t| t.navigations.get(property))
            .map(|(_, set)| set.clone())
    }
}
