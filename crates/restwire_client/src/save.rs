//! The save engine.
//!
//! For every outbound operation the engine, in order: (1) constructs
//! the base request, (2) fires BuildingRequest, (3) serializes the
//! body, (4) fires SendingRequest2 and freezes the transport message,
//! (5) transmits, (6) fires ReceivingResponse, (7) applies response
//! effects back to the registry. Response application mirrors request
//! order exactly.

use crate::batch::{read_batch_statuses, BatchWriter, SerializedPart};
use crate::error::{ClientError, ClientResult};
use crate::hooks::{
    BuildingRequestArgs, HookSnapshot, InterceptionPipeline, ReceivingResponseArgs,
    SendingRequestArgs,
};
use crate::response::{OperationResponse, SaveResponse};
use crate::sequencer::plan_request;
use crate::serializer::Serializer;
use crate::transport::Transport;
use bytes::Bytes;
use restwire_core::{
    build_change_list, compute_identity, ChangeKind, DescriptorRef, EntityRegistry,
    OperationDescriptor, PendingChange,
};
use restwire_protocol::{headers, Headers, Method, SaveOptions, WireRequest, WireResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = concat!("restwire/", env!("CARGO_PKG_VERSION"));

/// Configuration for a save engine.
#[derive(Debug, Clone)]
pub struct SaveConfig {
    service_root: String,
    user_agent: String,
    accept: String,
    accept_charset: String,
    content_type: String,
    max_operations: Option<usize>,
}

impl SaveConfig {
    /// Creates a configuration for the given service root.
    pub fn new(service_root: impl Into<String>) -> Self {
        let mut service_root = service_root.into();
        while service_root.ends_with('/') {
            service_root.pop();
        }
        Self {
            service_root,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: "application/json".to_string(),
            accept_charset: "UTF-8".to_string(),
            content_type: "application/json".to_string(),
            max_operations: None,
        }
    }

    /// Sets the `User-Agent` header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the `Accept` header value.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// Sets the `Accept-Charset` header value.
    pub fn with_accept_charset(mut self, charset: impl Into<String>) -> Self {
        self.accept_charset = charset.into();
        self
    }

    /// Sets the `Content-Type` used for operation bodies.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Caps the number of operations one save may carry.
    pub fn with_max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    /// Returns the normalized service root (no trailing slash).
    pub fn service_root(&self) -> &str {
        &self.service_root
    }
}

/// Drives saves and reads against one entity registry.
///
/// A save call owns the registry for its duration; concurrent saves
/// against the same registry are not supported and must be serialized
/// by the caller. The engine takes no internal save lock.
pub struct SaveEngine<T: Transport, S: Serializer> {
    config: SaveConfig,
    registry: Arc<EntityRegistry>,
    transport: Arc<T>,
    serializer: Arc<S>,
    hooks: InterceptionPipeline,
    cancelled: AtomicBool,
}

impl<T: Transport, S: Serializer> SaveEngine<T, S> {
    /// Creates an engine over a registry, transport, and serializer.
    pub fn new(config: SaveConfig, registry: Arc<EntityRegistry>, transport: T, serializer: S) -> Self {
        Self {
            config,
            registry,
            transport: Arc::new(transport),
            serializer: Arc::new(serializer),
            hooks: InterceptionPipeline::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the registry this engine saves.
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    /// Returns the interception pipeline for hook registration.
    pub fn hooks(&self) -> &InterceptionPipeline {
        &self.hooks
    }

    /// Requests cooperative cancellation of the save in flight.
    ///
    /// An operation whose response application has started is no longer
    /// cancellable; the next operation boundary honors the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> ClientResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sends every pending change and applies the responses.
    ///
    /// Returns the per-operation outcomes on full success. Failures
    /// follow the propagation policy of `options`: immediate abort by
    /// default, or a collected [`ClientError::PartialFailure`] when the
    /// options continue past failures.
    pub fn save_changes(&self, options: SaveOptions) -> ClientResult<SaveResponse> {
        self.cancelled.store(false, Ordering::SeqCst);
        let change_list = build_change_list(&self.registry)?;

        if let Some(limit) = self.config.max_operations {
            if change_list.len() > limit {
                return Err(ClientError::TooManyOperations {
                    count: change_list.len(),
                    limit,
                });
            }
        }
        if change_list.is_empty() {
            return Ok(SaveResponse::default());
        }
        debug!(operations = change_list.len(), ?options, "saving changes");

        if options.is_batch() {
            self.save_batch(change_list, options)
        } else {
            self.save_sequential(change_list, options)
        }
    }

    fn save_sequential(
        &self,
        change_list: Vec<PendingChange>,
        options: SaveOptions,
    ) -> ClientResult<SaveResponse> {
        let mut response = SaveResponse::default();

        for (index, change) in change_list.iter().enumerate() {
            self.check_cancelled()?;
            match self.execute_change(index, change, options) {
                Ok(entry) => response.results.push(entry),
                Err(ClientError::Operation {
                    index,
                    status,
                    message,
                }) if options.continue_on_error() => {
                    response.results.push(OperationResponse::failure(
                        index,
                        Some(change.operation_descriptor()),
                        status,
                        message,
                    ));
                }
                Err(error) => return Err(error),
            }
        }

        if response.failure_count() > 0 {
            Err(ClientError::PartialFailure { response })
        } else {
            Ok(response)
        }
    }

    /// Runs steps (1)–(7) for one non-batch operation.
    fn execute_change(
        &self,
        index: usize,
        change: &PendingChange,
        options: SaveOptions,
    ) -> ClientResult<OperationResponse> {
        let descriptor = change.operation_descriptor();
        let snapshot = self.hooks.snapshot();

        let resolve = |d: &DescriptorRef| d.identity();
        let plan = plan_request(change, options, &resolve)?;

        let mut building = BuildingRequestArgs {
            method: plan.method,
            uri: format!("{}/{}", self.config.service_root, plan.relative_uri),
            headers: self.base_headers(plan.has_body, change),
            descriptor: Some(descriptor.clone()),
        };
        snapshot.fire_building(&mut building);

        let body = if plan.has_body {
            Some(self.serializer.serialize(change)?)
        } else {
            None
        };

        let mut sending = SendingRequestArgs::new(
            building.method,
            building.uri.clone(),
            building.headers,
            Some(descriptor.clone()),
        );
        snapshot.fire_sending(&mut sending);

        let request = WireRequest {
            method: building.method,
            uri: building.uri,
            headers: sending.into_headers(),
            body,
        };

        // Last cancellation point: after this the response is awaited
        // and applied.
        self.check_cancelled()?;
        let response = self.transport.send(&request)?;

        snapshot.fire_receiving(&ReceivingResponseArgs::new(
            response.status,
            response.headers.clone(),
            Some(descriptor.clone()),
        ));

        if response.is_success() {
            self.apply_success(change, &response);
            Ok(OperationResponse::success(
                index,
                Some(descriptor),
                response.status,
            ))
        } else {
            Err(ClientError::Operation {
                index,
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }

    fn save_batch(
        &self,
        change_list: Vec<PendingChange>,
        options: SaveOptions,
    ) -> ClientResult<SaveResponse> {
        let writer = BatchWriter::new();
        let envelope_snapshot = self.hooks.snapshot();

        // The envelope builds first, with no descriptor attached.
        let mut envelope_headers = Headers::new();
        envelope_headers.set(headers::ACCEPT, self.config.accept.clone());
        envelope_headers.set(headers::ACCEPT_CHARSET, self.config.accept_charset.clone());
        envelope_headers.set(headers::USER_AGENT, self.config.user_agent.clone());
        envelope_headers.set(headers::CONTENT_TYPE, writer.content_type());
        let mut envelope_building = BuildingRequestArgs {
            method: Method::Post,
            uri: format!("{}/$batch", self.config.service_root),
            headers: envelope_headers,
            descriptor: None,
        };
        envelope_snapshot.fire_building(&mut envelope_building);

        // Inner parts: build, serialize, and freeze each in order.
        // Identities of entities inserted earlier in the same envelope
        // are addressed by content-id reference.
        let mut content_ids: HashMap<usize, usize> = HashMap::new();
        let mut parts: Vec<SerializedPart> = Vec::with_capacity(change_list.len());
        let mut part_snapshots: Vec<(HookSnapshot, OperationDescriptor)> =
            Vec::with_capacity(change_list.len());

        for (index, change) in change_list.iter().enumerate() {
            let content_id = index + 1;
            let descriptor = change.operation_descriptor();
            let snapshot = self.hooks.snapshot();

            let resolve = |d: &DescriptorRef| {
                d.identity().or_else(|| {
                    content_ids
                        .get(&(Arc::as_ptr(d) as usize))
                        .map(|id| format!("${id}"))
                })
            };
            let plan = plan_request(change, options, &resolve)?;

            let uri = if plan.relative_uri.starts_with('$') {
                plan.relative_uri.clone()
            } else {
                format!("{}/{}", self.config.service_root, plan.relative_uri)
            };
            let mut building = BuildingRequestArgs {
                method: plan.method,
                uri,
                headers: self.base_headers(plan.has_body, change),
                descriptor: Some(descriptor.clone()),
            };
            snapshot.fire_building(&mut building);

            let body = if plan.has_body {
                Some(self.serializer.serialize(change)?)
            } else {
                None
            };

            let mut sending = SendingRequestArgs::new(
                building.method,
                building.uri.clone(),
                building.headers,
                Some(descriptor.clone()),
            );
            snapshot.fire_sending(&mut sending);

            if let PendingChange::Entity(entity_change) = change {
                if entity_change.kind == ChangeKind::Insert {
                    content_ids.insert(
                        Arc::as_ptr(&entity_change.descriptor) as usize,
                        content_id,
                    );
                }
            }

            parts.push(SerializedPart {
                method: building.method,
                uri: building.uri,
                headers: sending.into_headers(),
                body,
                content_id,
            });
            part_snapshots.push((snapshot, descriptor));
        }

        let envelope_body = writer.write(&parts, options.is_atomic());
        let mut envelope_sending = SendingRequestArgs::new(
            envelope_building.method,
            envelope_building.uri.clone(),
            envelope_building.headers,
            None,
        );
        envelope_snapshot.fire_sending(&mut envelope_sending);

        let request = WireRequest {
            method: envelope_building.method,
            uri: envelope_building.uri,
            headers: envelope_sending.into_headers(),
            body: Some(envelope_body),
        };

        self.check_cancelled()?;
        let wire_response = self.transport.send(&request)?;

        envelope_snapshot.fire_receiving(&ReceivingResponseArgs::new(
            wire_response.status,
            wire_response.headers.clone(),
            None,
        ));

        if !wire_response.is_success() {
            let message = String::from_utf8_lossy(&wire_response.body).into_owned();
            let results = change_list
                .iter()
                .enumerate()
                .map(|(index, change)| {
                    OperationResponse::failure(
                        index,
                        Some(change.operation_descriptor()),
                        wire_response.status,
                        message.clone(),
                    )
                })
                .collect();
            return Err(ClientError::PartialFailure {
                response: SaveResponse { results },
            });
        }

        let statuses = read_batch_statuses(&wire_response.body);
        self.apply_batch_results(&change_list, &part_snapshots, &statuses, options)
    }

    /// Fires per-part ReceivingResponse hooks and applies state, in
    /// request order.
    fn apply_batch_results(
        &self,
        change_list: &[PendingChange],
        part_snapshots: &[(HookSnapshot, OperationDescriptor)],
        statuses: &[(u16, Headers)],
        options: SaveOptions,
    ) -> ClientResult<SaveResponse> {
        let atomic = options.is_atomic();
        let all_succeeded = statuses.len() == change_list.len()
            && statuses.iter().all(|(status, _)| (200..300).contains(status));
        let rollback = atomic && !all_succeeded;

        let mut response = SaveResponse::default();
        for (index, change) in change_list.iter().enumerate() {
            let (snapshot, descriptor) = &part_snapshots[index];
            match statuses.get(index) {
                Some((status, part_headers)) => {
                    snapshot.fire_receiving(&ReceivingResponseArgs::new(
                        *status,
                        part_headers.clone(),
                        Some(descriptor.clone()),
                    ));
                    if (200..300).contains(status) && !rollback {
                        let part_response = WireResponse {
                            status: *status,
                            headers: part_headers.clone(),
                            body: Bytes::new(),
                        };
                        self.apply_success(change, &part_response);
                        response.results.push(OperationResponse::success(
                            index,
                            Some(descriptor.clone()),
                            *status,
                        ));
                    } else if (200..300).contains(status) {
                        response.results.push(OperationResponse::failure(
                            index,
                            Some(descriptor.clone()),
                            *status,
                            "changeset rolled back",
                        ));
                    } else {
                        response.results.push(OperationResponse::failure(
                            index,
                            Some(descriptor.clone()),
                            *status,
                            format!("operation failed with status {status}"),
                        ));
                    }
                }
                None => {
                    response.results.push(OperationResponse::failure(
                        index,
                        Some(descriptor.clone()),
                        0,
                        "no response part received",
                    ));
                }
            }
        }

        if response.failure_count() > 0 {
            Err(ClientError::PartialFailure { response })
        } else {
            Ok(response)
        }
    }

    /// Step (7): applies one successful response to the registry.
    fn apply_success(&self, change: &PendingChange, response: &WireResponse) {
        let etag = response.etag().map(str::to_string);
        match change {
            PendingChange::Entity(entity_change) => match entity_change.kind {
                ChangeKind::Insert => {
                    let identity = response
                        .location()
                        .map(|l| self.relativize(l))
                        .or_else(|| self.computed_identity(&entity_change.descriptor));
                    self.registry.apply_insert_success(
                        &entity_change.descriptor,
                        identity,
                        etag,
                    );
                    for link in &entity_change.folded_links {
                        self.registry.apply_link_success(link);
                    }
                }
                ChangeKind::Update => {
                    self.registry
                        .apply_update_success(&entity_change.descriptor, etag);
                }
                ChangeKind::Delete => {
                    self.registry.apply_delete_success(&entity_change.descriptor);
                }
            },
            PendingChange::Link(link) => {
                self.registry.apply_link_success(link);
            }
        }
    }

    /// Strips the service root from an absolute location header.
    fn relativize(&self, location: &str) -> String {
        location
            .strip_prefix(&format!("{}/", self.config.service_root))
            .unwrap_or(location)
            .to_string()
    }

    fn computed_identity(&self, descriptor: &DescriptorRef) -> Option<String> {
        let entity = descriptor.try_entity()?;
        compute_identity(
            self.registry.metadata().as_ref(),
            descriptor.set_name(),
            &entity,
        )
        .ok()
    }

    /// Step (1): the base request headers for one operation.
    fn base_headers(&self, has_body: bool, change: &PendingChange) -> Headers {
        let mut h = Headers::new();
        h.set(headers::ACCEPT, self.config.accept.clone());
        h.set(headers::ACCEPT_CHARSET, self.config.accept_charset.clone());
        h.set(headers::USER_AGENT, self.config.user_agent.clone());
        if has_body {
            h.set(headers::CONTENT_TYPE, self.config.content_type.clone());
        }
        if let PendingChange::Entity(entity_change) = change {
            if entity_change.kind != ChangeKind::Insert {
                if let Some(etag) = entity_change.descriptor.etag() {
                    h.set(headers::IF_MATCH, etag);
                }
            }
        }
        h
    }

    pub(crate) fn base_read_headers(&self) -> Headers {
        let mut h = Headers::new();
        h.set(headers::ACCEPT, self.config.accept.clone());
        h.set(headers::ACCEPT_CHARSET, self.config.accept_charset.clone());
        h.set(headers::USER_AGENT, self.config.user_agent.clone());
        h
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) fn hook_snapshot(&self) -> HookSnapshot {
        self.hooks.snapshot()
    }

    pub(crate) fn ensure_not_cancelled(&self) -> ClientResult<()> {
        self.check_cancelled()
    }
}
