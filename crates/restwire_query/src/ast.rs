//! The query expression tree.
//!
//! Trees are immutable once built: the [`crate::Query`] builder produces
//! them and [`crate::translate`] consumes them without mutation.

use restwire_protocol::Value;

/// How a property relates to its declaring type, as declared by the
/// builder.
///
/// The translator uses this to validate `any`/`all` sources without
/// consulting schema metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A scalar (or complex) value property.
    Scalar,
    /// A single-valued navigation property.
    Navigation,
    /// A collection-valued (navigation or primitive-collection) property.
    Collection,
}

/// Binary operators of the filter grammar, lowered to their wire tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
    /// `lt`
    Lt,
    /// `le`
    Le,
    /// `and`
    And,
    /// `or`
    Or,
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `mul`
    Mul,
    /// `div`
    Div,
    /// `mod`
    Mod,
}

impl BinaryOp {
    /// Returns the wire token for this operator.
    pub fn token(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        }
    }

    /// Binding strength; higher binds tighter.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        }
    }
}

/// Scalar functions of the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `contains(haystack,needle)`
    Contains,
    /// `startswith(text,prefix)`
    StartsWith,
    /// `endswith(text,suffix)`
    EndsWith,
    /// `tolower(text)`
    ToLower,
    /// `toupper(text)`
    ToUpper,
    /// `length(text)`
    Length,
    /// `trim(text)`
    Trim,
}

impl Function {
    /// Returns the wire name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::ToLower => "tolower",
            Function::ToUpper => "toupper",
            Function::Length => "length",
            Function::Trim => "trim",
        }
    }
}

/// A filter/projection expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A range variable by name (the root alias or a lambda variable).
    Var(String),
    /// Member access.
    Property {
        /// The expression the property is read from.
        target: Box<Expr>,
        /// Property name.
        name: String,
        /// Builder-declared property classification.
        kind: PropertyKind,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// A scalar function call.
    Call {
        /// The function.
        function: Function,
        /// Arguments in call order.
        args: Vec<Expr>,
    },
    /// Collection predicate: `source/any(v:predicate)` or `source/any()`.
    Any {
        /// The collection source.
        source: Box<Expr>,
        /// Lambda binding, `None` for the parameterless existence form.
        binding: Option<(String, Box<Expr>)>,
    },
    /// Collection predicate: `source/all(v:predicate)`.
    All {
        /// The collection source.
        source: Box<Expr>,
        /// Lambda variable name.
        var: String,
        /// Lambda predicate.
        predicate: Box<Expr>,
    },
    /// Type check: `isof('T')` (range variable form) or `isof(expr,'T')`.
    IsOf {
        /// Operand; `None` tests the implicit range variable.
        expr: Option<Box<Expr>>,
        /// Runtime type name, resolved through the name resolver.
        type_name: String,
    },
    /// Type conversion: `cast(expr,'T')`.
    Cast {
        /// Operand.
        expr: Box<Expr>,
        /// Runtime type name, resolved through the name resolver.
        type_name: String,
    },
    /// Collection type filter, valid only as an `any`/`all` source.
    OfType {
        /// The collection being filtered.
        source: Box<Expr>,
        /// Runtime type name, resolved through the name resolver.
        type_name: String,
    },
}

/// A projection in a `$select`.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A plain property list.
    Properties(Vec<String>),
    /// An entity projection with per-property assignments.
    Entity(Vec<Assignment>),
}

/// One assignment in an entity projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The projected property being assigned.
    pub property: String,
    /// The assigned value.
    pub value: ProjectionValue,
}

/// The value side of a projection assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionValue {
    /// Pass-through of a source property (complex values allowed whole).
    Path(String),
    /// A nested member initializer with an explicit field list. Not
    /// translatable; partial initialization of complex values is
    /// rejected.
    Init {
        /// Runtime type being initialized.
        type_name: String,
        /// Fields listed by the initializer.
        fields: Vec<String>,
    },
    /// A computed expression.
    Expr(Expr),
}

/// A node of the query tree.
///
/// The chain grows outward from [`QueryNode::Source`]; every other
/// variant wraps its source node.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// The root entity set, with the name of its range variable.
    Source {
        /// Entity set name.
        set: String,
        /// Range variable name used by expressions over this query.
        var: String,
    },
    /// Key access: `Set(key)`.
    Key {
        /// Source node.
        source: Box<QueryNode>,
        /// Key values; one unnamed entry renders bare, several render as
        /// `Name=value` pairs.
        key: Vec<(Option<String>, Value)>,
    },
    /// Navigation segment: `.../Prop`.
    Navigation {
        /// Source node.
        source: Box<QueryNode>,
        /// Navigation property name.
        property: String,
    },
    /// Type filter segment: `.../NS.Type`.
    Cast {
        /// Source node.
        source: Box<QueryNode>,
        /// Runtime type name, resolved through the name resolver.
        type_name: String,
    },
    /// `$filter`.
    Filter {
        /// Source node.
        source: Box<QueryNode>,
        /// Boolean predicate over the range variable.
        predicate: Expr,
    },
    /// `$orderby`.
    OrderBy {
        /// Source node.
        source: Box<QueryNode>,
        /// Sort keys with a descending flag each.
        keys: Vec<(Expr, bool)>,
    },
    /// `$select`.
    Select {
        /// Source node.
        source: Box<QueryNode>,
        /// The projection.
        projection: Projection,
    },
    /// `$expand`.
    Expand {
        /// Source node.
        source: Box<QueryNode>,
        /// Navigation path to expand.
        path: String,
    },
    /// `$top`.
    Top {
        /// Source node.
        source: Box<QueryNode>,
        /// Row limit.
        count: u64,
    },
    /// `$skip`.
    Skip {
        /// Source node.
        source: Box<QueryNode>,
        /// Rows to skip.
        count: u64,
    },
    /// `$inlinecount=allpages`.
    InlineCount {
        /// Source node.
        source: Box<QueryNode>,
    },
    /// A custom query option; name and value are data-escaped.
    CustomOption {
        /// Source node.
        source: Box<QueryNode>,
        /// Option name.
        name: String,
        /// Option value.
        value: String,
    },
    /// `$count` terminal segment.
    Count {
        /// Source node.
        source: Box<QueryNode>,
    },
    /// `$value` terminal segment.
    ValueSegment {
        /// Source node.
        source: Box<QueryNode>,
    },
    /// `$ref` terminal segment.
    RefSegment {
        /// Source node.
        source: Box<QueryNode>,
    },
}

impl QueryNode {
    /// Returns the inner source node, or `None` for the root.
    pub fn source(&self) -> Option<&QueryNode> {
        match self {
            QueryNode::Source { .. } => None,
            QueryNode::Key { source, .. }
            | QueryNode::Navigation { source, .. }
            | QueryNode::Cast { source, .. }
            | QueryNode::Filter { source, .. }
            | QueryNode::OrderBy { source, .. }
            | QueryNode::Select { source, .. }
            | QueryNode::Expand { source, .. }
            | QueryNode::Top { source, .. }
            | QueryNode::Skip { source, .. }
            | QueryNode::InlineCount { source }
            | QueryNode::CustomOption { source, .. }
            | QueryNode::Count { source }
            | QueryNode::ValueSegment { source }
            | QueryNode::RefSegment { source } => Some(source),
        }
    }

    /// Returns the range variable name declared by the root source.
    pub fn root_var(&self) -> &str {
        let mut node = self;
        while let Some(source) = node.source() {
            node = source;
        }
        match node {
            QueryNode::Source { var, .. } => var,
            _ => "it",
        }
    }
}
