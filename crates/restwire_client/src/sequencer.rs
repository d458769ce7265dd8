//! Operation-to-request planning.
//!
//! Planning happens per operation, immediately before the request is
//! built, so identities assigned by earlier responses in the same save
//! are visible. Inside a batch the identity resolver maps not-yet
//! inserted entities to `$<content-id>` references instead.

use crate::error::{ClientError, ClientResult};
use restwire_core::{ChangeKind, DescriptorRef, EntityState, PendingChange};
use restwire_protocol::{Method, SaveOptions};

/// The wire shape of one planned operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRequest {
    /// HTTP method.
    pub method: Method,
    /// URI relative to the service root. A URI beginning with `$` is a
    /// batch content-id reference and stays relative inside the
    /// envelope.
    pub relative_uri: String,
    /// Whether the operation carries a serialized body.
    pub has_body: bool,
}

fn identity_of(
    descriptor: &DescriptorRef,
    resolve: &dyn Fn(&DescriptorRef) -> Option<String>,
) -> ClientResult<String> {
    resolve(descriptor).ok_or_else(|| ClientError::MissingIdentity {
        set_name: descriptor.set_name().to_string(),
    })
}

/// Plans the method and URI for one pending change.
///
/// `resolve` maps a descriptor to an addressable identity: the edit
/// link outside batches, or a `$<content-id>` reference inside one.
pub fn plan_request(
    change: &PendingChange,
    options: SaveOptions,
    resolve: &dyn Fn(&DescriptorRef) -> Option<String>,
) -> ClientResult<PlannedRequest> {
    match change {
        PendingChange::Entity(entity_change) => {
            let descriptor = &entity_change.descriptor;
            match entity_change.kind {
                ChangeKind::Insert => {
                    let relative_uri = match descriptor.parent_for_insert() {
                        Some((parent, property)) => {
                            format!("{}/{property}", identity_of(&parent, resolve)?)
                        }
                        None => descriptor.set_name().to_string(),
                    };
                    Ok(PlannedRequest {
                        method: Method::Post,
                        relative_uri,
                        has_body: true,
                    })
                }
                ChangeKind::Update => Ok(PlannedRequest {
                    method: if options.replace_on_update() {
                        Method::Put
                    } else {
                        Method::Patch
                    },
                    relative_uri: identity_of(descriptor, resolve)?,
                    has_body: true,
                }),
                ChangeKind::Delete => Ok(PlannedRequest {
                    method: Method::Delete,
                    relative_uri: identity_of(descriptor, resolve)?,
                    has_body: false,
                }),
            }
        }
        PendingChange::Link(link) => {
            let source = identity_of(link.source(), resolve)?;
            let relative_uri = format!("{source}/{}/$ref", link.property());
            let (method, has_body) = match link.state() {
                EntityState::Added => (Method::Post, true),
                EntityState::Modified => {
                    if link.target().is_some() {
                        (Method::Put, true)
                    } else {
                        // Reference removal.
                        (Method::Delete, false)
                    }
                }
                _ => (Method::Delete, false),
            };
            Ok(PlannedRequest {
                method,
                relative_uri,
                has_body,
            })
        }
    }
}
