//! Basic usage example for retry-queue
//!
//! Simulates a flaky network with an in-process transport: requests made
//! while "offline" are queued, and going back online drains the queue.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use retry_queue::{
    ClientConfig, Event, EventKind, NetworkMonitor, OfflineClient, OutboundRequest,
    RequestConfig, Response, StorageBackend, Transport, TransportError,
};

/// Transport whose connectivity is flipped by the demo.
struct SimulatedNetwork {
    online: AtomicBool,
}

#[async_trait]
impl Transport for SimulatedNetwork {
    async fn send(&self, request: &OutboundRequest) -> Result<Response, TransportError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{} unreachable", request.url)));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Response::new(201).with_body(format!("{} {}", request.method, request.url)))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== retry-queue basic usage ===\n");

    let network = Arc::new(SimulatedNetwork {
        online: AtomicBool::new(false),
    });
    let config = ClientConfig {
        storage: StorageBackend::Memory,
        retry_limit: 3,
        base_delay_ms: 100,
        debug: true,
        ..Default::default()
    };
    let client = OfflineClient::new(config, network.clone()).await;

    let _queued = client.subscribe(EventKind::Queued, |event| {
        if let Event::Queued { record } = event {
            println!("  queued      {} {}", record.method, record.url);
        }
    });
    let _retry = client.subscribe(EventKind::Retry, |event| {
        if let Event::Retry { record, attempt } = event {
            println!("  retrying    {} (attempt {attempt})", record.url);
        }
    });
    let _success = client.subscribe(EventKind::Success, |event| {
        if let Event::Success { record, response } = event {
            println!("  delivered   {} -> {}", record.url, response.status);
        }
    });
    let _complete = client.subscribe(EventKind::FlushComplete, |event| {
        if let Event::FlushComplete { processed, failed } = event {
            println!("  flush done  processed={processed} failed={failed}");
        }
    });

    let monitor = NetworkMonitor::new(false);
    client.watch_network(&monitor);

    println!("1. Offline: issuing requests");
    let order = RequestConfig::post("https://api.example.com/orders")
        .json(json!({"sku": "A-1", "qty": 2}))
        .idempotency_key("order-42");
    for _ in 0..2 {
        // Second call is a duplicate and is not queued again
        if let Err(e) = client.execute(order.clone()).await {
            println!("  caller saw: {e}");
        }
    }
    let _ = client
        .execute(RequestConfig::put("https://api.example.com/profile").text("name=kit"))
        .await;
    let _ = client
        .execute(RequestConfig::post("https://api.example.com/analytics").retry(false))
        .await;

    println!("\n   queue size: {}", client.queue_size().await);

    println!("\n2. Back online: the monitor triggers a flush");
    network.online.store(true, Ordering::SeqCst);
    monitor.set_online(true);

    while client.queue_size().await > 0 || client.is_running() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    info!(state = %client.state(), "Queue drained");

    println!("\n3. Pause blocks manual flushes");
    client.pause();
    println!("   flush while paused: {:?}", client.flush().await);
    client.resume();

    client.destroy();
    println!("\n=== done ===");
}
