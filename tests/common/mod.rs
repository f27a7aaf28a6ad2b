//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use device_gateway::api::ApiServerBuilder;
pub use device_gateway::transport::RecordingTransport;
use device_gateway::{CommandSender, DeviceRegistry, Dispatcher, TopicConfig};

/// Registry, dispatcher and router sharing one recording transport
pub struct TestGateway {
    pub registry: Arc<DeviceRegistry>,
    pub transport: Arc<RecordingTransport>,
    pub dispatcher: Dispatcher,
    pub router: axum::Router,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_transport(RecordingTransport::default())
    }

    pub fn with_transport(transport: RecordingTransport) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let transport = Arc::new(transport);
        let topics = TopicConfig::default();

        let dispatcher = Dispatcher::new(registry.clone(), transport.clone(), topics.clone());
        let commands = CommandSender::new(registry.clone(), transport.clone(), topics);
        let router = ApiServerBuilder::new(commands).build().router();

        Self {
            registry,
            transport,
            dispatcher,
            router,
        }
    }

    /// Feed one inbound message through the dispatcher
    pub async fn inbound(&self, topic: &str, payload: &str) {
        self.dispatcher.handle(topic, payload.as_bytes()).await;
    }
}

/// Build a JSON request
pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a request without a body
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Collect a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
