//! # Restwire Client
//!
//! Request sequencing, batching, and interception for the restwire
//! client engine.
//!
//! This crate provides:
//! - The save pipeline ([`SaveEngine`]) that turns the registry's
//!   pending changes into wire requests and applies responses back
//! - Batch envelope writing and reading ([`BatchWriter`])
//! - The three-point interception pipeline ([`InterceptionPipeline`]):
//!   BuildingRequest → SendingRequest2 → ReceivingResponse
//! - The transport and serializer seams ([`Transport`], [`Serializer`])
//!   with in-memory doubles for tests
//! - The read path ([`SaveEngine::execute_uri`], [`PreparedQuery`])
//!
//! ## Key Invariants
//!
//! - For every operation the hooks fire in exactly the order
//!   BuildingRequest, SendingRequest2, ReceivingResponse, and both
//!   request hooks see the same descriptor instance
//! - The `$batch` envelope fires its hooks with no descriptor; every
//!   inner part fires them with its own
//! - Response application mirrors request order
//! - A save call owns its registry for the duration; callers serialize
//!   concurrent saves

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod execute;
mod hooks;
mod response;
mod save;
mod sequencer;
mod serializer;
mod transport;

pub use batch::{read_batch_statuses, BatchWriter, SerializedPart};
pub use error::{ClientError, ClientResult};
pub use execute::PreparedQuery;
pub use hooks::{
    BuildingRequestArgs, HookHandle, InterceptionPipeline, ReceivingResponseArgs,
    SendingRequestArgs,
};
pub use response::{OperationResponse, SaveResponse};
pub use save::{SaveConfig, SaveEngine};
pub use sequencer::{plan_request, PlannedRequest};
pub use serializer::{JsonStubSerializer, Serializer};
pub use transport::{MockTransport, Transport};
