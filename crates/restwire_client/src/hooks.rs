//! The interception pipeline.
//!
//! Three named extension points fire, in order, for every outbound
//! operation: BuildingRequest → SendingRequest2 → (transmit) →
//! ReceivingResponse. Handlers are synchronous callbacks invoked inline
//! on the calling thread. The handler list is snapshotted when an
//! operation starts building, so unregistering during a save takes
//! effect at the next operation build, never retroactively.

use parking_lot::RwLock;
use restwire_core::OperationDescriptor;
use restwire_protocol::{Headers, Method};
use std::sync::Arc;

/// Mutable arguments of the BuildingRequest hook.
///
/// Method, URI, and headers may all be changed here; this is the last
/// point at which method and URI are mutable.
#[derive(Debug)]
pub struct BuildingRequestArgs {
    /// Request method.
    pub method: Method,
    /// Absolute request URI.
    pub uri: String,
    /// Request headers.
    pub headers: Headers,
    /// Descriptor of the operation, `None` for the batch envelope and
    /// plain reads.
    pub descriptor: Option<OperationDescriptor>,
}

/// Arguments of the SendingRequest2 hook.
///
/// The URI and method are frozen into the transport message at this
/// point; only headers remain mutable.
#[derive(Debug)]
pub struct SendingRequestArgs {
    method: Method,
    uri: String,
    /// Request headers; still applied to the transport message.
    pub headers: Headers,
    descriptor: Option<OperationDescriptor>,
}

impl SendingRequestArgs {
    pub(crate) fn new(
        method: Method,
        uri: String,
        headers: Headers,
        descriptor: Option<OperationDescriptor>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            descriptor,
        }
    }

    /// The frozen request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The frozen request URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Descriptor of the operation, `None` for the batch envelope and
    /// plain reads.
    pub fn descriptor(&self) -> Option<&OperationDescriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn into_headers(self) -> Headers {
        self.headers
    }
}

/// Read-only arguments of the ReceivingResponse hook.
#[derive(Debug)]
pub struct ReceivingResponseArgs {
    status: u16,
    headers: Headers,
    descriptor: Option<OperationDescriptor>,
}

impl ReceivingResponseArgs {
    pub(crate) fn new(status: u16, headers: Headers, descriptor: Option<OperationDescriptor>) -> Self {
        Self {
            status,
            headers,
            descriptor,
        }
    }

    /// Response status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Descriptor of the operation, `None` for the batch envelope and
    /// plain reads.
    pub fn descriptor(&self) -> Option<&OperationDescriptor> {
        self.descriptor.as_ref()
    }
}

type BuildingHandler = Arc<dyn Fn(&mut BuildingRequestArgs) + Send + Sync>;
type SendingHandler = Arc<dyn Fn(&mut SendingRequestArgs) + Send + Sync>;
type ReceivingHandler = Arc<dyn Fn(&ReceivingResponseArgs) + Send + Sync>;

/// Opaque handle identifying one registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

/// Ordered, multi-subscriber hook registration for the three extension
/// points.
#[derive(Default)]
pub struct InterceptionPipeline {
    inner: RwLock<PipelineInner>,
}

#[derive(Default)]
struct PipelineInner {
    next_id: u64,
    building: Vec<(u64, BuildingHandler)>,
    sending: Vec<(u64, SendingHandler)>,
    receiving: Vec<(u64, ReceivingHandler)>,
}

impl PipelineInner {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl InterceptionPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a BuildingRequest handler. Handlers fire in
    /// registration order.
    pub fn on_building_request(
        &self,
        handler: impl Fn(&mut BuildingRequestArgs) + Send + Sync + 'static,
    ) -> HookHandle {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        inner.building.push((id, Arc::new(handler)));
        HookHandle(id)
    }

    /// Registers a SendingRequest2 handler.
    pub fn on_sending_request(
        &self,
        handler: impl Fn(&mut SendingRequestArgs) + Send + Sync + 'static,
    ) -> HookHandle {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        inner.sending.push((id, Arc::new(handler)));
        HookHandle(id)
    }

    /// Registers a ReceivingResponse handler.
    pub fn on_receiving_response(
        &self,
        handler: impl Fn(&ReceivingResponseArgs) + Send + Sync + 'static,
    ) -> HookHandle {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        inner.receiving.push((id, Arc::new(handler)));
        HookHandle(id)
    }

    /// Unregisters a handler. Takes effect before the next operation
    /// build. Returns false if the handle was not registered.
    pub fn unregister(&self, handle: HookHandle) -> bool {
        let mut inner = self.inner.write();
        let before =
            inner.building.len() + inner.sending.len() + inner.receiving.len();
        inner.building.retain(|(id, _)| *id != handle.0);
        inner.sending.retain(|(id, _)| *id != handle.0);
        inner.receiving.retain(|(id, _)| *id != handle.0);
        before != inner.building.len() + inner.sending.len() + inner.receiving.len()
    }

    /// Takes the handler snapshot used for one operation.
    pub(crate) fn snapshot(&self) -> HookSnapshot {
        let inner = self.inner.read();
        HookSnapshot {
            building: inner.building.iter().map(|(_, h)| Arc::clone(h)).collect(),
            sending: inner.sending.iter().map(|(_, h)| Arc::clone(h)).collect(),
            receiving: inner.receiving.iter().map(|(_, h)| Arc::clone(h)).collect(),
        }
    }
}

/// The handlers captured for one operation.
pub(crate) struct HookSnapshot {
    building: Vec<BuildingHandler>,
    sending: Vec<SendingHandler>,
    receiving: Vec<ReceivingHandler>,
}

impl HookSnapshot {
    pub(crate) fn fire_building(&self, args: &mut BuildingRequestArgs) {
        for handler in &self.building {
            handler(args);
        }
    }

    pub(crate) fn fire_sending(&self, args: &mut SendingRequestArgs) {
        for handler in &self.sending {
            handler(args);
        }
    }

    pub(crate) fn fire_receiving(&self, args: &ReceivingResponseArgs) {
        for handler in &self.receiving {
            handler(args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn handlers_fire_in_registration_order() {
        let pipeline = InterceptionPipeline::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        pipeline.on_building_request(move |_| o.lock().push("first"));
        let o = Arc::clone(&order);
        pipeline.on_building_request(move |_| o.lock().push("second"));

        let mut args = BuildingRequestArgs {
            method: Method::Get,
            uri: "http://svc/Customers".into(),
            headers: Headers::new(),
            descriptor: None,
        };
        pipeline.snapshot().fire_building(&mut args);
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn building_handler_mutations_are_visible() {
        let pipeline = InterceptionPipeline::new();
        pipeline.on_building_request(|args| {
            args.method = Method::Put;
            args.headers.set("X-Custom", "1");
        });

        let mut args = BuildingRequestArgs {
            method: Method::Patch,
            uri: "http://svc/Customers(1)".into(),
            headers: Headers::new(),
            descriptor: None,
        };
        pipeline.snapshot().fire_building(&mut args);
        assert_eq!(args.method, Method::Put);
        assert_eq!(args.headers.get("X-Custom"), Some("1"));
    }

    #[test]
    fn unregister_takes_effect_on_next_snapshot() {
        let pipeline = InterceptionPipeline::new();
        let count = Arc::new(Mutex::new(0u32));

        let c = Arc::clone(&count);
        let handle = pipeline.on_building_request(move |_| *c.lock() += 1);

        let snapshot = pipeline.snapshot();
        assert!(pipeline.unregister(handle));

        // The snapshot taken before unregistration still fires.
        let mut args = BuildingRequestArgs {
            method: Method::Get,
            uri: String::new(),
            headers: Headers::new(),
            descriptor: None,
        };
        snapshot.fire_building(&mut args);
        assert_eq!(*count.lock(), 1);

        // The next snapshot does not.
        pipeline.snapshot().fire_building(&mut args);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn unregister_unknown_handle() {
        let pipeline = InterceptionPipeline::new();
        let handle = pipeline.on_sending_request(|_| {});
        assert!(pipeline.unregister(handle));
        assert!(!pipeline.unregister(handle));
    }

    #[test]
    fn sending_args_expose_frozen_method_and_uri() {
        let args = SendingRequestArgs::new(
            Method::Post,
            "http://svc/$batch".into(),
            Headers::new(),
            None,
        );
        assert_eq!(args.method(), Method::Post);
        assert_eq!(args.uri(), "http://svc/$batch");
        assert!(args.descriptor().is_none());
    }
}
