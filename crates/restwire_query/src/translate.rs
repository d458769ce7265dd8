//! Query-tree to URI translation.
//!
//! Translation walks the tree bottom-up and assembles a relative path
//! plus a canonical query string. Literal values are percent-escaped
//! with the query profile; structural tokens of the expression grammar
//! (operators, slashes, parentheses, the space between tokens) stay
//! raw. Wire type names supplied by the [`NameResolver`] are inserted
//! verbatim, never escaped.

use crate::ast::{Expr, Projection, ProjectionValue, PropertyKind, QueryNode};
use crate::error::{QueryError, QueryResult};
use restwire_protocol::{escape_data_string, escape_query_part, ProtocolVersion, Value};
use std::collections::HashMap;

/// Resolves runtime type names to wire type names.
///
/// Resolver output is substituted into the URI verbatim: if a resolved
/// name carries characters that would normally require escaping, they
/// are emitted as-is.
pub trait NameResolver: Send + Sync {
    /// Returns the wire name for a runtime type, or `None` if unknown.
    fn resolve(&self, runtime_type: &str) -> Option<String>;
}

/// A table-backed resolver.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    map: HashMap<String, String>,
}

impl MapResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a runtime-to-wire name mapping.
    pub fn with(mut self, runtime_type: impl Into<String>, wire_name: impl Into<String>) -> Self {
        self.map.insert(runtime_type.into(), wire_name.into());
        self
    }
}

impl NameResolver for MapResolver {
    fn resolve(&self, runtime_type: &str) -> Option<String> {
        self.map.get(runtime_type).cloned()
    }
}

/// A translated relative URI: resource path plus query string.
///
/// Concatenating [`TranslatedUri::to_uri_string`] onto the service root
/// yields the absolute request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedUri {
    /// The resource path, e.g. `Movies(1)/Actors`.
    pub path: String,
    /// The query string without the leading `?`, possibly empty.
    pub query: String,
}

impl TranslatedUri {
    /// Renders `path` or `path?query`.
    pub fn to_uri_string(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Constructs gated by the negotiated protocol version.
const FEATURE_GATES: &[(&str, ProtocolVersion)] = &[
    ("any", ProtocolVersion::V3),
    ("all", ProtocolVersion::V3),
    ("OfType", ProtocolVersion::V3),
    ("$inlinecount", ProtocolVersion::V2),
];

fn gate(construct: &str, negotiated: ProtocolVersion) -> QueryResult<()> {
    if let Some(&(_, required)) = FEATURE_GATES.iter().find(|(name, _)| *name == construct) {
        if !negotiated.supports(required) {
            return Err(QueryError::ProtocolVersion {
                construct: construct.to_string(),
                required,
                negotiated,
            });
        }
    }
    Ok(())
}

/// The clause an expression is being lowered for. Collection predicates
/// are only accepted under `$filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Filter,
    OrderBy,
    Select,
}

impl Clause {
    fn reject_reason(&self, method: &str) -> String {
        match self {
            Clause::Filter => format!("the method '{method}' is not supported"),
            Clause::OrderBy => {
                format!("the method '{method}' is not supported by the 'orderby' query option")
            }
            Clause::Select => format!("the method '{method}' within 'Select' is not supported"),
        }
    }
}

struct ExprCx<'a> {
    resolver: &'a dyn NameResolver,
    version: ProtocolVersion,
    root_var: &'a str,
    clause: Clause,
    /// Enclosing lambda bindings, innermost last: (requested, actual).
    lambdas: Vec<(String, String)>,
}

impl<'a> ExprCx<'a> {
    fn resolve_type(&self, runtime_type: &str) -> QueryResult<String> {
        self.resolver
            .resolve(runtime_type)
            .ok_or_else(|| QueryError::UnresolvableType {
                type_name: runtime_type.to_string(),
            })
    }

    /// Picks a lambda variable name that cannot collide with the root
    /// alias or any enclosing binding. Collisions are resolved
    /// deepest-first by suffixing.
    fn fresh_name(&self, requested: &str) -> String {
        let taken = |candidate: &str| {
            candidate == self.root_var
                || self
                    .lambdas
                    .iter()
                    .any(|(req, actual)| req == candidate || actual == candidate)
        };
        if !taken(requested) {
            return requested.to_string();
        }
        let mut n = 0u32;
        loop {
            let candidate = format!("{requested}{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Translates a query tree into a relative URI.
///
/// Pure: the same tree, resolver, and version always produce the same
/// URI, byte for byte.
pub fn translate(
    root: &QueryNode,
    resolver: &dyn NameResolver,
    version: ProtocolVersion,
) -> QueryResult<TranslatedUri> {
    // Flatten the chain source-first.
    let mut chain = Vec::new();
    let mut node = Some(root);
    while let Some(current) = node {
        chain.push(current);
        node = current.source();
    }
    chain.reverse();

    if !matches!(chain.first(), Some(QueryNode::Source { .. })) {
        return Err(QueryError::EmptyQuery);
    }
    let root_var = root.root_var();

    let mut path: Vec<String> = Vec::new();
    let mut terminal: Option<&'static str> = None;
    let mut filter: Option<String> = None;
    let mut orderby: Vec<String> = Vec::new();
    let mut select: Option<String> = None;
    let mut expand: Vec<String> = Vec::new();
    let mut top: Option<u64> = None;
    let mut skip: Option<u64> = None;
    let mut inline_count = false;
    let mut custom: Vec<(String, String)> = Vec::new();

    for current in chain {
        if let Some(done) = terminal {
            return Err(QueryError::composability(done, describe(current)));
        }
        match current {
            QueryNode::Source { set, .. } => path.push(escape_query_part(set)),
            QueryNode::Key { key, .. } => {
                let rendered = render_key(key);
                match path.last_mut() {
                    Some(last) => *last = format!("{last}({rendered})"),
                    None => return Err(QueryError::EmptyQuery),
                }
            }
            QueryNode::Navigation { property, .. } => path.push(escape_query_part(property)),
            QueryNode::Cast { type_name, .. } => {
                let cx = ExprCx {
                    resolver,
                    version,
                    root_var,
                    clause: Clause::Filter,
                    lambdas: Vec::new(),
                };
                path.push(cx.resolve_type(type_name)?);
            }
            QueryNode::Filter { predicate, .. } => {
                let mut cx = ExprCx {
                    resolver,
                    version,
                    root_var,
                    clause: Clause::Filter,
                    lambdas: Vec::new(),
                };
                let rendered = lower_expr(predicate, &mut cx)?;
                filter = Some(match filter {
                    Some(existing) => format!("({existing}) and ({rendered})"),
                    None => rendered,
                });
            }
            QueryNode::OrderBy { keys, .. } => {
                for (key, descending) in keys {
                    let mut cx = ExprCx {
                        resolver,
                        version,
                        root_var,
                        clause: Clause::OrderBy,
                        lambdas: Vec::new(),
                    };
                    let rendered = lower_expr(key, &mut cx)?;
                    orderby.push(if *descending {
                        format!("{rendered} desc")
                    } else {
                        rendered
                    });
                }
            }
            QueryNode::Select { projection, .. } => {
                select = Some(lower_projection(projection, resolver, version, root_var)?);
            }
            QueryNode::Expand { path: expand_path, .. } => {
                expand.push(escape_query_part(expand_path));
            }
            QueryNode::Top { count, .. } => top = Some(*count),
            QueryNode::Skip { count, .. } => skip = Some(*count),
            QueryNode::InlineCount { .. } => {
                gate("$inlinecount", version)?;
                inline_count = true;
            }
            QueryNode::CustomOption { name, value, .. } => {
                custom.push((escape_data_string(name), escape_data_string(value)));
            }
            QueryNode::Count { .. } => {
                path.push("$count".into());
                terminal = Some("$count");
            }
            QueryNode::ValueSegment { .. } => {
                path.push("$value".into());
                terminal = Some("$value");
            }
            QueryNode::RefSegment { .. } => {
                path.push("$ref".into());
                terminal = Some("$ref");
            }
        }
    }

    let mut options: Vec<String> = Vec::new();
    if let Some(filter) = filter {
        options.push(format!("$filter={filter}"));
    }
    if !orderby.is_empty() {
        options.push(format!("$orderby={}", orderby.join(",")));
    }
    if let Some(select) = select {
        options.push(format!("$select={select}"));
    }
    if !expand.is_empty() {
        options.push(format!("$expand={}", expand.join(",")));
    }
    if let Some(top) = top {
        options.push(format!("$top={top}"));
    }
    if let Some(skip) = skip {
        options.push(format!("$skip={skip}"));
    }
    if inline_count {
        options.push("$inlinecount=allpages".to_string());
    }
    for (name, value) in custom {
        options.push(format!("{name}={value}"));
    }

    Ok(TranslatedUri {
        path: path.join("/"),
        query: options.join("&"),
    })
}

fn describe(node: &QueryNode) -> String {
    match node {
        QueryNode::Source { set, .. } => set.clone(),
        QueryNode::Key { .. } => "key".into(),
        QueryNode::Navigation { property, .. } => property.clone(),
        QueryNode::Cast { type_name, .. } => type_name.clone(),
        QueryNode::Filter { .. } => "$filter".into(),
        QueryNode::OrderBy { .. } => "$orderby".into(),
        QueryNode::Select { .. } => "$select".into(),
        QueryNode::Expand { .. } => "$expand".into(),
        QueryNode::Top { .. } => "$top".into(),
        QueryNode::Skip { .. } => "$skip".into(),
        QueryNode::InlineCount { .. } => "$inlinecount".into(),
        QueryNode::CustomOption { name, .. } => name.clone(),
        QueryNode::Count { .. } => "$count".into(),
        QueryNode::ValueSegment { .. } => "$value".into(),
        QueryNode::RefSegment { .. } => "$ref".into(),
    }
}

fn render_key(key: &[(Option<String>, Value)]) -> String {
    if key.len() == 1 && key[0].0.is_none() {
        return escape_query_part(&key[0].1.to_literal());
    }
    key.iter()
        .map(|(name, value)| {
            let literal = escape_query_part(&value.to_literal());
            match name {
                Some(name) => format!("{name}={literal}"),
                None => literal,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn lower_projection(
    projection: &Projection,
    resolver: &dyn NameResolver,
    version: ProtocolVersion,
    root_var: &str,
) -> QueryResult<String> {
    match projection {
        Projection::Properties(props) => Ok(props.join(",")),
        Projection::Entity(assignments) => {
            let mut selected = Vec::with_capacity(assignments.len());
            for assignment in assignments {
                match &assignment.value {
                    ProjectionValue::Path(_) => {}
                    ProjectionValue::Init { type_name, .. } => {
                        return Err(QueryError::not_supported(
                            format!("{} = new {type_name}(...)", assignment.property),
                            "partial initialization of a complex value is not supported; \
                             assign the complete value instead",
                        ));
                    }
                    ProjectionValue::Expr(expr) => {
                        let mut cx = ExprCx {
                            resolver,
                            version,
                            root_var,
                            clause: Clause::Select,
                            lambdas: Vec::new(),
                        };
                        // Lowered only to validate; a computed column does
                        // not add anything beyond its source property list.
                        lower_expr(expr, &mut cx)?;
                    }
                }
                selected.push(assignment.property.clone());
            }
            Ok(selected.join(","))
        }
    }
}

fn lower_expr(expr: &Expr, cx: &mut ExprCx<'_>) -> QueryResult<String> {
    match expr {
        Expr::Literal(value) => Ok(escape_query_part(&value.to_literal())),
        Expr::Var(name) => lower_var(name, cx),
        Expr::Property { target, name, .. } => lower_property(target, name, cx),
        Expr::Binary { op, left, right } => {
            let lhs = lower_operand(left, op.precedence(), false, cx)?;
            let rhs = lower_operand(right, op.precedence(), true, cx)?;
            Ok(format!("{lhs} {} {rhs}", op.token()))
        }
        Expr::Not(inner) => {
            let rendered = lower_expr(inner, cx)?;
            if matches!(inner.as_ref(), Expr::Binary { .. }) {
                Ok(format!("not ({rendered})"))
            } else {
                Ok(format!("not {rendered}"))
            }
        }
        Expr::Call { function, args } => {
            let mut rendered = Vec::with_capacity(args.len());
            for arg in args {
                rendered.push(lower_expr(arg, cx)?);
            }
            Ok(format!("{}({})", function.name(), rendered.join(",")))
        }
        Expr::Any { source, binding } => {
            lower_collection_predicate("any", source, binding.as_ref().map(|(v, p)| (v, p.as_ref())), cx)
        }
        Expr::All {
            source,
            var,
            predicate,
        } => lower_collection_predicate("all", source, Some((var, predicate.as_ref())), cx),
        Expr::IsOf { expr, type_name } => {
            let wire_name = cx.resolve_type(type_name)?;
            match expr {
                None => Ok(format!("isof('{wire_name}')")),
                Some(operand) => {
                    let rendered = lower_expr(operand, cx)?;
                    Ok(format!("isof({rendered},'{wire_name}')"))
                }
            }
        }
        Expr::Cast { expr, type_name } => {
            let wire_name = cx.resolve_type(type_name)?;
            let rendered = lower_expr(expr, cx)?;
            Ok(format!("cast({rendered},'{wire_name}')"))
        }
        Expr::OfType { .. } => Err(QueryError::not_supported(
            "OfType",
            "'OfType' is only supported as the source of 'any' or 'all'",
        )),
    }
}

fn lower_operand(
    operand: &Expr,
    parent_precedence: u8,
    is_right: bool,
    cx: &mut ExprCx<'_>,
) -> QueryResult<String> {
    let rendered = lower_expr(operand, cx)?;
    if let Expr::Binary { op, .. } = operand {
        let mine = op.precedence();
        if mine < parent_precedence || (is_right && mine == parent_precedence) {
            return Ok(format!("({rendered})"));
        }
    }
    Ok(rendered)
}

fn lower_var(name: &str, cx: &ExprCx<'_>) -> QueryResult<String> {
    if let Some((_, actual)) = cx.lambdas.iter().rev().find(|(req, _)| req == name) {
        return Ok(actual.clone());
    }
    if name == cx.root_var {
        return Ok("$it".to_string());
    }
    Err(QueryError::not_supported(
        name,
        "unknown range variable; only the root alias and enclosing lambda variables are in scope",
    ))
}

fn lower_property(target: &Expr, name: &str, cx: &mut ExprCx<'_>) -> QueryResult<String> {
    if let Expr::Var(var_name) = target {
        // Access on the root alias outside any lambda elides the range
        // variable; inside a lambda the captured root is spelled $it.
        if var_name == cx.root_var && !cx.lambdas.iter().any(|(req, _)| req == var_name) {
            if cx.lambdas.is_empty() {
                return Ok(name.to_string());
            }
            return Ok(format!("$it/{name}"));
        }
    }
    let base = lower_expr(target, cx)?;
    Ok(format!("{base}/{name}"))
}

fn lower_collection_predicate(
    method: &str,
    source: &Expr,
    binding: Option<(&String, &Expr)>,
    cx: &mut ExprCx<'_>,
) -> QueryResult<String> {
    gate(method, cx.version)?;
    if cx.clause != Clause::Filter {
        return Err(QueryError::not_supported(
            method,
            cx.clause.reject_reason(method),
        ));
    }

    let source_rendered = lower_collection_source(method, source, cx)?;
    match binding {
        None => Ok(format!("{source_rendered}/{method}()")),
        Some((requested, predicate)) => {
            let actual = cx.fresh_name(requested);
            cx.lambdas.push((requested.clone(), actual.clone()));
            let predicate_rendered = lower_expr(predicate, cx);
            cx.lambdas.pop();
            Ok(format!(
                "{source_rendered}/{method}({actual}:{})",
                predicate_rendered?
            ))
        }
    }
}

/// Validates and renders the source of `any`/`all`: it must be a
/// navigation or collection property, optionally filtered to a derived
/// type.
fn lower_collection_source(
    method: &str,
    source: &Expr,
    cx: &mut ExprCx<'_>,
) -> QueryResult<String> {
    match source {
        Expr::Property { target, name, kind } => match kind {
            PropertyKind::Navigation | PropertyKind::Collection => lower_property(target, name, cx),
            PropertyKind::Scalar => Err(QueryError::not_supported(
                method,
                format!(
                    "the source parameter for the '{method}' method has to be either a \
                     navigation or a collection property"
                ),
            )),
        },
        Expr::OfType { source, type_name } => {
            gate("OfType", cx.version)?;
            let inner = lower_collection_source(method, source, cx)?;
            let wire_name = cx.resolve_type(type_name)?;
            Ok(format!("{inner}/{wire_name}"))
        }
        _ => Err(QueryError::not_supported(
            method,
            format!(
                "the source parameter for the '{method}' method has to be either a \
                 navigation or a collection property"
            ),
        )),
    }
}
