//! # Restwire Query
//!
//! Query AST and URI translation for the restwire client engine.
//!
//! Queries are built as an explicit, immutable expression tree
//! ([`QueryNode`] over [`Expr`]) through the fluent [`Query`] builder,
//! then translated into a canonical percent-escaped URI by
//! [`translate`]. Translation is a pure function of the tree, the
//! [`NameResolver`], and the negotiated protocol version; it never
//! touches the entity registry and is safe to call from any thread.
//!
//! ```
//! use restwire_query::{lit, var, Query, translate, MapResolver};
//! use restwire_protocol::ProtocolVersion;
//!
//! let query = Query::from_set_as("Movies", "m")
//!     .filter(var("m").field("Year").gt(lit(1999)))
//!     .build();
//! let uri = translate(&query, &MapResolver::new(), ProtocolVersion::V3).unwrap();
//! assert_eq!(uri.to_uri_string(), "Movies?$filter=Year gt 1999");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ast;
mod builder;
mod error;
mod translate;

pub use ast::{
    Assignment, BinaryOp, Expr, Function, Projection, ProjectionValue, PropertyKind, QueryNode,
};
pub use builder::{lit, root_is_of, var, Query};
pub use error::{QueryError, QueryResult};
pub use translate::{translate, MapResolver, NameResolver, TranslatedUri};
