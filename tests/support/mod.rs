#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use demo_metrics::config::EngineConfig;
use demo_metrics::{Engine, OutboundRequest, OutboundResponse, ScopedMetricStore, Upstream};

pub const BACKEND: &str = "http://backend.test";
pub const RANGE: &str = "since=2024-03-01&until=2024-03-31";

pub fn url(path: &str) -> String {
    if path.contains('?') {
        format!("{}{}&{}", BACKEND, path, RANGE)
    } else {
        format!("{}{}?{}", BACKEND, path, RANGE)
    }
}

pub fn engine() -> Arc<Engine> {
    engine_with(EngineConfig {
        rng_seed: Some(7),
        ..EngineConfig::default()
    })
}

pub fn engine_with(config: EngineConfig) -> Arc<Engine> {
    let store = ScopedMetricStore::in_memory(Duration::from_secs(3600));
    Arc::new(Engine::with_store(config, store).expect("engine"))
}

type Responder = Box<dyn Fn(&OutboundRequest) -> Result<OutboundResponse, String> + Send + Sync>;

pub struct MockBackend {
    calls: AtomicUsize,
    respond: Responder,
}

impl MockBackend {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&OutboundRequest) -> Result<OutboundResponse, String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            respond: Box::new(respond),
        })
    }

    pub fn echo() -> Arc<Self> {
        MockBackend::new(|request| {
            Ok(OutboundResponse::json(
                StatusCode::OK,
                &json!({ "echo": request.url }),
            ))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for MockBackend {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(&request)
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

pub fn body(response: &OutboundResponse) -> Value {
    response.parse_json().expect("json body")
}

pub fn count(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing count {} in {}", key, value))
}

pub fn number(value: &Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(Value::as_f64)
        .unwrap_or_else(|| panic!("missing number {} in {}", key, value))
}

pub fn rows(value: &Value) -> &Vec<Value> {
    value
        .get("data")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing data in {}", value))
}

pub fn same_upstream(a: &Arc<dyn Upstream>, b: &Arc<dyn Upstream>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
