//! Common test utilities for txqueue integration tests
//!
//! This module provides:
//! - Tracing setup writing to the test harness
//! - A memory broker with a declared queue and a connected facade
//! - Small helpers for contexts and messages

use std::time::Duration;
use txqueue::{connect, OperationContext, Queue, QueueConfig, TextMessage};
use txqueue_memory::{MemoryBroker, MemoryConnector};

pub const QUEUE: &str = "text_msg_queue";

/// Install a subscriber once per test binary; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txqueue=debug,txqueue_memory=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Broker with the test queue declared plus a queue connected to it
pub struct Harness {
    pub broker: MemoryBroker,
    pub queue: Queue<TextMessage>,
}

impl Harness {
    pub async fn new() -> Self {
        init_tracing();

        let broker = MemoryBroker::new();
        broker.declare_queue(QUEUE);

        let config = QueueConfig::builder(QUEUE)
            .located_at("localhost", 1521)
            .authenticated_with("app", "secret")
            .build()
            .expect("valid configuration");
        let queue = connect(&MemoryConnector::new(broker.clone()), &config)
            .await
            .expect("memory broker accepts connections");

        Self { broker, queue }
    }

    /// Enqueue `content` with a background context
    #[allow(dead_code)]
    pub async fn send(&self, content: &str) {
        self.queue
            .enqueue(&bg(), &TextMessage::new(content))
            .await
            .expect("enqueue succeeds");
    }
}

pub fn bg() -> OperationContext {
    OperationContext::background()
}

#[allow(dead_code)]
pub fn within(millis: u64) -> OperationContext {
    OperationContext::with_timeout(Duration::from_millis(millis))
}
