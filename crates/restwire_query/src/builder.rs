//! Fluent construction of query trees.

use crate::ast::{
    Assignment, BinaryOp, Expr, Function, Projection, ProjectionValue, PropertyKind, QueryNode,
};
use restwire_protocol::Value;

/// Creates a range-variable reference.
pub fn var(name: impl Into<String>) -> Expr {
    Expr::Var(name.into())
}

/// Creates a literal expression.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Creates the single-argument `isof('T')` form testing the implicit
/// range variable.
pub fn root_is_of(type_name: impl Into<String>) -> Expr {
    Expr::IsOf {
        expr: None,
        type_name: type_name.into(),
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        lit(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        lit(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        lit(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        lit(value)
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs.into()),
        }
    }

    /// Accesses a scalar (or complex) property.
    pub fn field(self, name: impl Into<String>) -> Expr {
        Expr::Property {
            target: Box::new(self),
            name: name.into(),
            kind: PropertyKind::Scalar,
        }
    }

    /// Accesses a single-valued navigation property.
    pub fn nav(self, name: impl Into<String>) -> Expr {
        Expr::Property {
            target: Box::new(self),
            name: name.into(),
            kind: PropertyKind::Navigation,
        }
    }

    /// Accesses a collection-valued property.
    pub fn collection(self, name: impl Into<String>) -> Expr {
        Expr::Property {
            target: Box::new(self),
            name: name.into(),
            kind: PropertyKind::Collection,
        }
    }

    /// `self eq rhs`
    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self ne rhs`
    pub fn ne(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self gt rhs`
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self ge rhs`
    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// `self lt rhs`
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self le rhs`
    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self and rhs`
    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    /// `self or rhs`
    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    /// `self add rhs`
    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    /// `self sub rhs`
    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }

    /// `self mul rhs`
    pub fn mul(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }

    /// `self div rhs`
    pub fn div(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, rhs)
    }

    /// `self mod rhs`
    pub fn modulo(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mod, rhs)
    }

    /// `not self`
    pub fn negate(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// `contains(self,needle)`
    pub fn contains(self, needle: impl Into<Expr>) -> Expr {
        Expr::Call {
            function: Function::Contains,
            args: vec![self, needle.into()],
        }
    }

    /// `startswith(self,prefix)`
    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        Expr::Call {
            function: Function::StartsWith,
            args: vec![self, prefix.into()],
        }
    }

    /// `endswith(self,suffix)`
    pub fn ends_with(self, suffix: impl Into<Expr>) -> Expr {
        Expr::Call {
            function: Function::EndsWith,
            args: vec![self, suffix.into()],
        }
    }

    /// `tolower(self)`
    pub fn to_lower(self) -> Expr {
        Expr::Call {
            function: Function::ToLower,
            args: vec![self],
        }
    }

    /// `toupper(self)`
    pub fn to_upper(self) -> Expr {
        Expr::Call {
            function: Function::ToUpper,
            args: vec![self],
        }
    }

    /// `length(self)`
    pub fn length(self) -> Expr {
        Expr::Call {
            function: Function::Length,
            args: vec![self],
        }
    }

    /// `self/any(var:predicate)`
    pub fn any(self, var: impl Into<String>, predicate: Expr) -> Expr {
        Expr::Any {
            source: Box::new(self),
            binding: Some((var.into(), Box::new(predicate))),
        }
    }

    /// The parameterless existence form `self/any()`.
    pub fn any_exists(self) -> Expr {
        Expr::Any {
            source: Box::new(self),
            binding: None,
        }
    }

    /// `self/all(var:predicate)`
    pub fn all(self, var: impl Into<String>, predicate: Expr) -> Expr {
        Expr::All {
            source: Box::new(self),
            var: var.into(),
            predicate: Box::new(predicate),
        }
    }

    /// `isof(self,'T')`
    pub fn is_of(self, type_name: impl Into<String>) -> Expr {
        Expr::IsOf {
            expr: Some(Box::new(self)),
            type_name: type_name.into(),
        }
    }

    /// `cast(self,'T')`
    pub fn cast_to(self, type_name: impl Into<String>) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            type_name: type_name.into(),
        }
    }

    /// Filters a collection to a derived type; valid only as an
    /// `any`/`all` source, where it lowers to a type segment.
    pub fn of_type(self, type_name: impl Into<String>) -> Expr {
        Expr::OfType {
            source: Box::new(self),
            type_name: type_name.into(),
        }
    }
}

/// Fluent builder over [`QueryNode`].
///
/// Each call wraps the current tree in another node; [`Query::build`]
/// releases the finished, immutable tree.
#[derive(Debug, Clone)]
pub struct Query {
    node: QueryNode,
}

impl Query {
    /// Starts a query against an entity set, with the default range
    /// variable `it`.
    pub fn from_set(set: impl Into<String>) -> Self {
        Self::from_set_as(set, "it")
    }

    /// Starts a query against an entity set, naming its range variable.
    pub fn from_set_as(set: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            node: QueryNode::Source {
                set: set.into(),
                var: var.into(),
            },
        }
    }

    fn wrap(self, f: impl FnOnce(Box<QueryNode>) -> QueryNode) -> Self {
        Self {
            node: f(Box::new(self.node)),
        }
    }

    /// Addresses a single entity by key.
    pub fn key(self, value: impl Into<Value>) -> Self {
        self.wrap(|source| QueryNode::Key {
            source,
            key: vec![(None, value.into())],
        })
    }

    /// Addresses a single entity by composite key.
    pub fn composite_key<I, K>(self, parts: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.wrap(|source| QueryNode::Key {
            source,
            key: parts
                .into_iter()
                .map(|(name, value)| (Some(name.into()), value))
                .collect(),
        })
    }

    /// Appends a navigation segment.
    pub fn navigate(self, property: impl Into<String>) -> Self {
        self.wrap(|source| QueryNode::Navigation {
            source,
            property: property.into(),
        })
    }

    /// Appends a type filter segment.
    pub fn cast(self, type_name: impl Into<String>) -> Self {
        self.wrap(|source| QueryNode::Cast {
            source,
            type_name: type_name.into(),
        })
    }

    /// Adds (or conjoins) a `$filter` predicate.
    pub fn filter(self, predicate: Expr) -> Self {
        self.wrap(|source| QueryNode::Filter { source, predicate })
    }

    /// Adds an ascending `$orderby` key.
    pub fn order_by(self, key: Expr) -> Self {
        self.wrap(|source| QueryNode::OrderBy {
            source,
            keys: vec![(key, false)],
        })
    }

    /// Adds a descending `$orderby` key.
    pub fn order_by_desc(self, key: Expr) -> Self {
        self.wrap(|source| QueryNode::OrderBy {
            source,
            keys: vec![(key, true)],
        })
    }

    /// Projects to a plain property list.
    pub fn select<I, S>(self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrap(|source| QueryNode::Select {
            source,
            projection: Projection::Properties(properties.into_iter().map(Into::into).collect()),
        })
    }

    /// Projects into an entity shape with explicit assignments.
    pub fn select_entity(self, assignments: Vec<Assignment>) -> Self {
        self.wrap(|source| QueryNode::Select {
            source,
            projection: Projection::Entity(assignments),
        })
    }

    /// Adds an `$expand` path.
    pub fn expand(self, path: impl Into<String>) -> Self {
        self.wrap(|source| QueryNode::Expand {
            source,
            path: path.into(),
        })
    }

    /// Limits the result to the first `count` rows.
    pub fn top(self, count: u64) -> Self {
        self.wrap(|source| QueryNode::Top { source, count })
    }

    /// Skips the first `count` rows.
    pub fn skip(self, count: u64) -> Self {
        self.wrap(|source| QueryNode::Skip { source, count })
    }

    /// Requests an inline total count alongside the page.
    pub fn inline_count(self) -> Self {
        self.wrap(|source| QueryNode::InlineCount { source })
    }

    /// Adds a custom query option; the value is data-escaped on
    /// translation.
    pub fn add_query_option(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.wrap(|source| QueryNode::CustomOption {
            source,
            name: name.into(),
            value: value.into(),
        })
    }

    /// Appends the `$count` terminal segment.
    pub fn count(self) -> Self {
        self.wrap(|source| QueryNode::Count { source })
    }

    /// Appends the `$value` terminal segment.
    pub fn value(self) -> Self {
        self.wrap(|source| QueryNode::ValueSegment { source })
    }

    /// Appends the `$ref` terminal segment.
    pub fn reference(self) -> Self {
        self.wrap(|source| QueryNode::RefSegment { source })
    }

    /// Releases the finished tree.
    pub fn build(self) -> QueryNode {
        self.node
    }
}

/// Convenience constructor for projection assignments.
impl Assignment {
    /// A pass-through assignment (`Prop = source.Path`).
    pub fn path(property: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: ProjectionValue::Path(path.into()),
        }
    }

    /// A computed assignment.
    pub fn expr(property: impl Into<String>, expr: Expr) -> Self {
        Self {
            property: property.into(),
            value: ProjectionValue::Expr(expr),
        }
    }

    /// A nested member-initializer assignment with an explicit field
    /// list. Translation rejects these.
    pub fn init<I, S>(property: impl Into<String>, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            property: property.into(),
            value: ProjectionValue::Init {
                type_name: type_name.into(),
                fields: fields.into_iter().map(Into::into).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains_nodes() {
        let node = Query::from_set_as("Movies", "m")
            .filter(var("m").field("Year").gt(lit(1999)))
            .top(10)
            .build();

        assert!(matches!(node, QueryNode::Top { .. }));
        assert_eq!(node.root_var(), "m");
    }

    #[test]
    fn expression_sugar() {
        let e = var("c").field("Name").eq("ALFKI");
        match e {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Eq);
                assert_eq!(*right, Expr::Literal(Value::Text("ALFKI".into())));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn any_binding_forms() {
        let existence = var("e").collection("Tags").any_exists();
        assert!(matches!(existence, Expr::Any { binding: None, .. }));

        let bound = var("e").collection("Tags").any("t", var("t").eq(lit(1)));
        assert!(matches!(bound, Expr::Any { binding: Some(_), .. }));
    }

    #[test]
    fn composite_key_parts() {
        let node = Query::from_set("OrderDetails")
            .composite_key([("OrderId", Value::Int(1)), ("ProductId", Value::Int(2))])
            .build();
        match node {
            QueryNode::Key { key, .. } => {
                assert_eq!(key.len(), 2);
                assert_eq!(key[0].0.as_deref(), Some("OrderId"));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }
}
