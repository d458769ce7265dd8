//! End-to-end save scenarios over the in-memory transport.

use bytes::Bytes;
use restwire_client::ClientError;
use restwire_core::EntityState;
use restwire_protocol::{headers, SaveOptions, WireResponse};
use restwire_testkit::prelude::*;
use std::sync::Arc;

/// Builds a minimal batch response body with one part per entry.
fn batch_response(parts: &[(u16, Option<&str>)]) -> WireResponse {
    let mut body = String::new();
    for (status, location) in parts {
        body.push_str("--batchresponse_test\r\n");
        body.push_str("Content-Type: application/http\r\n\r\n");
        body.push_str(&format!("HTTP/1.1 {status} reason\r\n"));
        if let Some(location) = location {
            body.push_str(&format!("Location: {location}\r\n"));
        }
        body.push_str("\r\n");
    }
    body.push_str("--batchresponse_test--\r\n");
    WireResponse::new(202)
        .with_header(
            headers::CONTENT_TYPE,
            "multipart/mixed; boundary=batchresponse_test",
        )
        .with_body(Bytes::from(body))
}

#[test]
fn single_operation_fires_hooks_in_order_with_one_descriptor() {
    init_test_logging();
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));
    let recorder = HookRecorder::new();
    recorder.attach(engine.hooks());

    let c = customer(1);
    registry.add("Customers", &c).unwrap();
    transport.enqueue(
        WireResponse::new(201)
            .with_header(headers::LOCATION, format!("{SERVICE_ROOT}/Customers(1)")),
    );

    engine.save_changes(SaveOptions::None).unwrap();

    assert_eq!(recorder.sequence(), vec!["building", "sending", "receiving"]);
    let events = recorder.events();
    let built = events[0].descriptor.as_ref().unwrap();
    let sent = events[1].descriptor.as_ref().unwrap();
    let received = events[2].descriptor.as_ref().unwrap();
    assert!(built.same_as(sent), "SendingRequest2 sees the same descriptor");
    assert!(built.same_as(received));
    assert_eq!(
        built.as_entity().unwrap().set_name(),
        "Customers"
    );
}

#[test]
fn insert_save_assigns_identity_and_transitions_to_unchanged() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let c = customer(1);
    registry.add("Customers", &c).unwrap();
    transport.enqueue(
        WireResponse::new(201)
            .with_header(headers::LOCATION, format!("{SERVICE_ROOT}/Customers(1)"))
            .with_header(headers::ETAG, "W/\"1\""),
    );

    let response = engine.save_changes(SaveOptions::None).unwrap();
    assert!(response.is_success());
    assert_eq!(response.results.len(), 1);

    let descriptor = registry.descriptor_for(&c).unwrap();
    assert_eq!(descriptor.state(), EntityState::Unchanged);
    assert_eq!(descriptor.edit_link(), Some("Customers(1)".to_string()));
    assert_eq!(descriptor.etag(), Some("W/\"1\"".to_string()));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].uri, format!("{SERVICE_ROOT}/Customers"));
    assert_eq!(sent[0].method.as_str(), "POST");
    assert_eq!(sent[0].headers.get(headers::ACCEPT), Some("application/json"));
    assert!(sent[0].headers.get(headers::USER_AGENT).is_some());
}

#[test]
fn delete_save_removes_the_descriptor() {
    let registry = commerce_registry();
    let (engine, _transport) = engine(Arc::clone(&registry));

    let c = customer(1);
    registry.attach("Customers", &c).unwrap();
    registry.delete(&c).unwrap();

    engine.save_changes(SaveOptions::None).unwrap();
    assert!(registry.descriptor_for(&c).is_none());
    assert!(!registry.has_pending_changes());
}

#[test]
fn update_sends_if_match_for_tracked_etag() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let c = customer(1);
    registry
        .attach_with_etag("Customers", &c, Some("W/\"9\"".into()))
        .unwrap();
    registry.update(&c).unwrap();

    engine.save_changes(SaveOptions::None).unwrap();
    let sent = transport.sent();
    assert_eq!(sent[0].method.as_str(), "PATCH");
    assert_eq!(sent[0].headers.get(headers::IF_MATCH), Some("W/\"9\""));
}

#[test]
fn replace_on_update_uses_put() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let c = customer(1);
    registry.attach("Customers", &c).unwrap();
    registry.update(&c).unwrap();

    engine.save_changes(SaveOptions::ReplaceOnUpdate).unwrap();
    assert_eq!(transport.sent()[0].method.as_str(), "PUT");
}

#[test]
fn response_application_mirrors_request_order() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let first = customer(1);
    let second = customer(2);
    registry.add("Customers", &first).unwrap();
    registry.add("Customers", &second).unwrap();
    transport.enqueue(
        WireResponse::new(201)
            .with_header(headers::LOCATION, format!("{SERVICE_ROOT}/Customers(1)")),
    );
    transport.enqueue(
        WireResponse::new(201)
            .with_header(headers::LOCATION, format!("{SERVICE_ROOT}/Customers(2)")),
    );

    let response = engine.save_changes(SaveOptions::None).unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].index, 0);
    assert_eq!(response.results[1].index, 1);

    // Each response landed on the entity whose request produced it.
    assert_eq!(
        registry.descriptor_for(&first).unwrap().edit_link(),
        Some("Customers(1)".to_string())
    );
    assert_eq!(
        registry.descriptor_for(&second).unwrap().edit_link(),
        Some("Customers(2)".to_string())
    );
}

#[test]
fn first_failure_aborts_by_default() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let a = customer(1);
    let b = customer(2);
    registry.add("Customers", &a).unwrap();
    registry.add("Customers", &b).unwrap();
    transport.enqueue(WireResponse::new(500).with_body(Bytes::from_static(b"boom")));

    let err = engine.save_changes(SaveOptions::None).unwrap_err();
    match err {
        ClientError::Operation { index, status, message } => {
            assert_eq!(index, 0);
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The second operation was never attempted.
    assert_eq!(transport.sent_count(), 1);
    assert_eq!(
        registry.descriptor_for(&b).unwrap().state(),
        EntityState::Added
    );
}

#[test]
fn continue_on_error_collects_a_partial_failure() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let a = customer(1);
    let b = customer(2);
    registry.add("Customers", &a).unwrap();
    registry.add("Customers", &b).unwrap();
    transport.enqueue(WireResponse::new(500).with_body(Bytes::from_static(b"boom")));
    transport.enqueue(
        WireResponse::new(201)
            .with_header(headers::LOCATION, format!("{SERVICE_ROOT}/Customers(2)")),
    );

    let err = engine.save_changes(SaveOptions::ContinueOnError).unwrap_err();
    let ClientError::PartialFailure { response } = err else {
        panic!("expected partial failure");
    };
    assert_eq!(response.results.len(), 2);
    assert!(!response.results[0].is_success());
    assert_eq!(response.results[0].status, 500);
    assert!(response.results[1].is_success());

    // Applied state from the success is kept, the failure stays pending.
    assert_eq!(
        registry.descriptor_for(&a).unwrap().state(),
        EntityState::Added
    );
    assert_eq!(
        registry.descriptor_for(&b).unwrap().state(),
        EntityState::Unchanged
    );
}

#[test]
fn added_link_folds_into_the_insert_and_settles_unchanged() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let new_order = order(1);
    let existing_detail = order_detail(7);
    registry.add("Orders", &new_order).unwrap();
    registry.attach("OrderDetails", &existing_detail).unwrap();
    registry
        .add_link(&new_order, "OrderDetails", &existing_detail)
        .unwrap();

    engine.save_changes(SaveOptions::None).unwrap();

    // Exactly one request: the link rode inside the insert body.
    assert_eq!(transport.sent_count(), 1);
    let body = transport.sent()[0].body.clone().unwrap();
    assert!(String::from_utf8_lossy(&body).contains("OrderDetails"));

    let links = registry.links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].state(), EntityState::Unchanged);
    assert!(registry
        .descriptor_for(&new_order)
        .unwrap()
        .edit_link()
        .is_some());
}

#[test]
fn batch_single_changeset_fires_envelope_and_part_hooks() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));
    let recorder = HookRecorder::new();
    recorder.attach(engine.hooks());

    let c = customer(1);
    registry.add("Customers", &c).unwrap();
    let o = order(10);
    registry.add_related_object(&c, "Orders", &o).unwrap();

    let customer_location = format!("{SERVICE_ROOT}/Customers(1)");
    let order_location = format!("{SERVICE_ROOT}/Orders(10)");
    transport.enqueue(batch_response(&[
        (201, Some(customer_location.as_str())),
        (201, Some(order_location.as_str())),
    ]));

    engine
        .save_changes(SaveOptions::BatchWithSingleChangeset)
        .unwrap();

    // Exactly 3 BuildingRequest firings: envelope first with no
    // descriptor, then customer, then order.
    let buildings = recorder.events_for("building");
    assert_eq!(buildings.len(), 3);
    assert!(buildings[0].descriptor.is_none());
    assert!(buildings[0].uri.as_deref().unwrap().ends_with("/$batch"));
    assert_eq!(
        buildings[1]
            .descriptor
            .as_ref()
            .unwrap()
            .as_entity()
            .unwrap()
            .set_name(),
        "Customers"
    );
    assert_eq!(
        buildings[2]
            .descriptor
            .as_ref()
            .unwrap()
            .as_entity()
            .unwrap()
            .set_name(),
        "Orders"
    );

    // Every inner hook carries a descriptor; only the envelope does not.
    for event in recorder.events() {
        if event.uri.as_deref().map(|u| u.ends_with("/$batch")) == Some(true) {
            assert!(event.descriptor.is_none());
        }
    }

    // One wire round trip; the order's insert addressed its parent by
    // content-id reference.
    assert_eq!(transport.sent_count(), 1);
    let envelope = String::from_utf8_lossy(transport.sent()[0].body.as_ref().unwrap()).into_owned();
    assert!(envelope.contains(&format!("POST {SERVICE_ROOT}/Customers HTTP/1.1")));
    assert!(envelope.contains("POST $1/Orders HTTP/1.1"));

    // Both inserts applied in order.
    assert_eq!(
        registry.descriptor_for(&c).unwrap().edit_link(),
        Some("Customers(1)".to_string())
    );
    assert_eq!(
        registry.descriptor_for(&o).unwrap().edit_link(),
        Some("Orders(10)".to_string())
    );
}

#[test]
fn atomic_changeset_failure_rolls_back_all_application() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let a = customer(1);
    let b = customer(2);
    registry.add("Customers", &a).unwrap();
    registry.add("Customers", &b).unwrap();

    let customer_location = format!("{SERVICE_ROOT}/Customers(1)");
    transport.enqueue(batch_response(&[
        (201, Some(customer_location.as_str())),
        (500, None),
    ]));

    let err = engine
        .save_changes(SaveOptions::BatchWithSingleChangeset)
        .unwrap_err();
    let ClientError::PartialFailure { response } = err else {
        panic!("expected partial failure");
    };
    assert_eq!(response.failure_count(), 2, "rollback fails the whole changeset");

    // No client-side state was applied, including the succeeded part.
    assert_eq!(
        registry.descriptor_for(&a).unwrap().state(),
        EntityState::Added
    );
    assert_eq!(registry.descriptor_for(&a).unwrap().edit_link(), None);
    assert_eq!(
        registry.descriptor_for(&b).unwrap().state(),
        EntityState::Added
    );
}

#[test]
fn independent_batch_parts_do_not_roll_back_each_other() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));

    let a = customer(1);
    let b = customer(2);
    registry.attach("Customers", &a).unwrap();
    registry.attach("Customers", &b).unwrap();
    registry.delete(&a).unwrap();
    registry.delete(&b).unwrap();

    transport.enqueue(batch_response(&[(204, None), (404, None)]));

    let err = engine
        .save_changes(SaveOptions::BatchWithIndependentOperations)
        .unwrap_err();
    let ClientError::PartialFailure { response } = err else {
        panic!("expected partial failure");
    };
    assert_eq!(response.failure_count(), 1);

    // The successful delete applied; the failed one is still pending.
    assert!(registry.descriptor_for(&a).is_none());
    assert_eq!(
        registry.descriptor_for(&b).unwrap().state(),
        EntityState::Deleted
    );
}

#[test]
fn cancellation_before_transmit_fires_no_receiving_response() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));
    let engine = Arc::new(engine);
    let recorder = HookRecorder::new();
    recorder.attach(engine.hooks());

    let c = customer(1);
    registry.add("Customers", &c).unwrap();

    // Cancel from inside the build: the save is marked before the
    // transmission checkpoint.
    let cancel_target = Arc::clone(&engine);
    engine.hooks().on_building_request(move |_| cancel_target.cancel());

    let err = engine.save_changes(SaveOptions::None).unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(transport.sent_count(), 0, "nothing was transmitted");
    assert!(recorder.events_for("receiving").is_empty());
    assert_eq!(
        registry.descriptor_for(&c).unwrap().state(),
        EntityState::Added,
        "a cancelled operation applies nothing"
    );
}

#[test]
fn empty_save_sends_nothing() {
    let registry = commerce_registry();
    let (engine, transport) = engine(Arc::clone(&registry));
    let c = customer(1);
    registry.attach("Customers", &c).unwrap();

    let response = engine.save_changes(SaveOptions::None).unwrap();
    assert!(response.results.is_empty());
    assert_eq!(transport.sent_count(), 0);
}

#[test]
fn operation_limit_is_enforced() {
    let registry = commerce_registry();
    let transport = Arc::new(restwire_client::MockTransport::new());
    let engine = restwire_client::SaveEngine::new(
        restwire_client::SaveConfig::new(SERVICE_ROOT).with_max_operations(1),
        Arc::clone(&registry),
        Arc::clone(&transport),
        restwire_client::JsonStubSerializer::new(),
    );

    registry.add("Customers", &customer(1)).unwrap();
    registry.add("Customers", &customer(2)).unwrap();

    let err = engine.save_changes(SaveOptions::None).unwrap_err();
    assert!(matches!(
        err,
        ClientError::TooManyOperations { count: 2, limit: 1 }
    ));
    assert_eq!(transport.sent_count(), 0);
}

#[test]
fn prepared_query_runs_through_the_read_pipeline() {
    use restwire_client::PreparedQuery;
    use restwire_protocol::ProtocolVersion;
    use restwire_query::{var, MapResolver, Query};

    let registry = commerce_registry();
    let (engine, transport) = engine(registry);
    let recorder = HookRecorder::new();
    recorder.attach(engine.hooks());

    let node = Query::from_set_as("Customers", "c")
        .filter(var("c").field("Name").eq("ALFKI"))
        .build();
    let query =
        PreparedQuery::translate(&node, &MapResolver::new(), ProtocolVersion::V3).unwrap();

    transport.enqueue(WireResponse::new(200));
    query.run(&engine).unwrap();

    assert_eq!(recorder.sequence(), vec!["building", "sending", "receiving"]);
    assert!(recorder.events()[0].descriptor.is_none());
    assert_eq!(
        transport.sent()[0].uri,
        format!("{SERVICE_ROOT}/Customers?$filter=Name eq 'ALFKI'")
    );
    assert_eq!(transport.sent()[0].method.as_str(), "GET");
}

#[test]
fn unregistered_hook_stops_firing_on_the_next_save() {
    let registry = commerce_registry();
    let (engine, _transport) = engine(Arc::clone(&registry));

    let count = Arc::new(counter::Counter::default());
    let c2 = Arc::clone(&count);
    let handle = engine
        .hooks()
        .on_building_request(move |_| c2.increment());

    let a = customer(1);
    registry.add("Customers", &a).unwrap();
    engine.save_changes(SaveOptions::None).unwrap();
    assert_eq!(count.get(), 1);

    assert!(engine.hooks().unregister(handle));
    let b = customer(2);
    registry.add("Customers", &b).unwrap();
    engine.save_changes(SaveOptions::None).unwrap();
    assert_eq!(count.get(), 1, "unregistered handler no longer fires");
}

mod counter {
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    pub struct Counter(AtomicU32);

    impl Counter {
        pub fn increment(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        pub fn get(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
