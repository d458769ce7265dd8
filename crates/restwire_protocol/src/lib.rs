//! # Restwire Protocol
//!
//! Wire-level vocabulary shared by the restwire client engine.
//!
//! This crate provides:
//! - Property and literal values ([`Value`])
//! - Percent-escaping tables with the exact profile the wire format
//!   requires ([`escape_data_string`], [`escape_query_part`], [`unescape`])
//! - HTTP request/response descriptions ([`WireRequest`], [`WireResponse`])
//! - Negotiated protocol versions ([`ProtocolVersion`])
//! - Save behavior options ([`SaveOptions`])
//!
//! Everything here is plain data: no I/O, no tracked state. The actual
//! transport and payload encoding live behind traits in `restwire_client`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod escape;
mod http;
mod options;
mod value;
mod version;

pub use escape::{escape_data_string, escape_query_part, unescape};
pub use http::{headers, Headers, Method, WireRequest, WireResponse};
pub use options::SaveOptions;
pub use value::Value;
pub use version::ProtocolVersion;
