//! Shared test fixtures.

use parking_lot::Mutex;
use restwire_client::{
    InterceptionPipeline, JsonStubSerializer, MockTransport, SaveConfig, SaveEngine,
};
use restwire_core::{
    EntityObject, EntityRef, EntityRegistry, NavigationKind, OperationDescriptor, StaticMetadata,
};
use restwire_protocol::Value;
use std::sync::Arc;

/// The service root used by engine fixtures.
pub const SERVICE_ROOT: &str = "http://svc.example/data";

/// Initializes test logging once per process.
///
/// Controlled by `RUST_LOG`; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The engine type every fixture produces.
pub type TestEngine = SaveEngine<Arc<MockTransport>, JsonStubSerializer>;

/// A commerce schema: Customers, Orders, and OrderDetails with the
/// navigations the save scenarios exercise.
pub fn commerce_metadata() -> StaticMetadata {
    StaticMetadata::new()
        .add_type("Customer", ["Id"])
        .add_type("Order", ["Id"])
        .add_type("OrderDetail", ["Id"])
        .add_set("Customers", "Customer")
        .add_set("Orders", "Order")
        .add_set("OrderDetails", "OrderDetail")
        .add_navigation("Customer", "Orders", NavigationKind::Collection, "Orders")
        .add_navigation(
            "Order",
            "OrderDetails",
            NavigationKind::Collection,
            "OrderDetails",
        )
        .add_navigation("Order", "Customer", NavigationKind::Reference, "Customers")
}

/// A registry over the commerce schema.
pub fn commerce_registry() -> Arc<EntityRegistry> {
    Arc::new(EntityRegistry::new(Arc::new(commerce_metadata())))
}

/// Creates a Customer entity with the given key.
pub fn customer(id: i64) -> EntityRef {
    EntityObject::with_props("Customer", [("Id", Value::Int(id))])
}

/// Creates an Order entity with the given key.
pub fn order(id: i64) -> EntityRef {
    EntityObject::with_props("Order", [("Id", Value::Int(id))])
}

/// Creates an OrderDetail entity with the given key.
pub fn order_detail(id: i64) -> EntityRef {
    EntityObject::with_props("OrderDetail", [("Id", Value::Int(id))])
}

/// An engine over the given registry, wired to a shared mock transport
/// and the stub serializer.
///
/// The returned transport handle is the same instance the engine sends
/// through; queue responses and inspect requests on it.
pub fn engine(registry: Arc<EntityRegistry>) -> (TestEngine, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let engine = SaveEngine::new(
        SaveConfig::new(SERVICE_ROOT),
        registry,
        Arc::clone(&transport),
        JsonStubSerializer::new(),
    );
    (engine, transport)
}

/// One recorded hook firing.
#[derive(Debug, Clone)]
pub struct HookEvent {
    /// Hook point name: `building`, `sending`, or `receiving`.
    pub hook: &'static str,
    /// The descriptor the firing carried, if any.
    pub descriptor: Option<OperationDescriptor>,
    /// The request URI (building firings only).
    pub uri: Option<String>,
}

/// Records every hook firing for later assertions.
#[derive(Clone, Default)]
pub struct HookRecorder {
    events: Arc<Mutex<Vec<HookEvent>>>,
}

impl HookRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the recorder on all three extension points.
    pub fn attach(&self, pipeline: &InterceptionPipeline) {
        let events = Arc::clone(&self.events);
        pipeline.on_building_request(move |args| {
            events.lock().push(HookEvent {
                hook: "building",
                descriptor: args.descriptor.clone(),
                uri: Some(args.uri.clone()),
            });
        });
        let events = Arc::clone(&self.events);
        pipeline.on_sending_request(move |args| {
            events.lock().push(HookEvent {
                hook: "sending",
                descriptor: args.descriptor().cloned(),
                uri: None,
            });
        });
        let events = Arc::clone(&self.events);
        pipeline.on_receiving_response(move |args| {
            events.lock().push(HookEvent {
                hook: "receiving",
                descriptor: args.descriptor().cloned(),
                uri: None,
            });
        });
    }

    /// Returns all recorded events in firing order.
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().clone()
    }

    /// Returns the hook names in firing order.
    pub fn sequence(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.hook).collect()
    }

    /// Returns the events for one hook point.
    pub fn events_for(&self, hook: &str) -> Vec<HookEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.hook == hook)
            .cloned()
            .collect()
    }

    /// Clears all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
