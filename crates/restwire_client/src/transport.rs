//! Transport seam.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use restwire_protocol::{WireRequest, WireResponse};
use std::collections::VecDeque;

/// Delivers wire requests.
///
/// This trait abstracts the network layer so different HTTP clients (or
/// no network at all, for tests) can back the engine. Transmission is
/// the only suspension point of a save; implementations may block.
pub trait Transport: Send + Sync {
    /// Sends one request and returns the response.
    fn send(&self, request: &WireRequest) -> ClientResult<WireResponse>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &WireRequest) -> ClientResult<WireResponse> {
        (**self).send(request)
    }
}

/// An in-memory transport for tests.
///
/// Responses are served from a queue in FIFO order; when the queue is
/// empty a `204 No Content` is returned. Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<WireResponse>>,
    requests: Mutex<Vec<WireRequest>>,
    fail_message: Mutex<Option<String>>,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response to serve.
    pub fn enqueue(&self, response: WireResponse) {
        self.responses.lock().push_back(response);
    }

    /// Makes every subsequent send fail with a transport error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_message.lock() = Some(message.into());
    }

    /// Returns all requests sent so far.
    pub fn sent(&self) -> Vec<WireRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests sent.
    pub fn sent_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &WireRequest) -> ClientResult<WireResponse> {
        self.requests.lock().push(request.clone());
        if let Some(message) = self.fail_message.lock().clone() {
            return Err(ClientError::transport_retryable(message));
        }
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| WireResponse::new(204)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restwire_protocol::Method;

    #[test]
    fn serves_queued_responses_in_order() {
        let transport = MockTransport::new();
        transport.enqueue(WireResponse::new(201));
        transport.enqueue(WireResponse::new(500));

        let request = WireRequest::new(Method::Get, "http://svc/Customers");
        assert_eq!(transport.send(&request).unwrap().status, 201);
        assert_eq!(transport.send(&request).unwrap().status, 500);
        // Queue exhausted: default success.
        assert_eq!(transport.send(&request).unwrap().status, 204);
        assert_eq!(transport.sent_count(), 3);
    }

    #[test]
    fn failure_mode() {
        let transport = MockTransport::new();
        transport.fail_with("connection reset");

        let request = WireRequest::new(Method::Get, "http://svc/Customers");
        let err = transport.send(&request).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.sent_count(), 1, "failed sends are still recorded");
    }
}
