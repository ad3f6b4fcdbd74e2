pub mod activation;
pub mod baseline;
pub mod classifier;
pub mod config;
pub mod distribute;
pub mod engine;
pub mod harmonize;
pub mod intercept;
pub mod period;
pub mod store;
pub mod synth;
pub mod upstream;

use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

pub use classifier::{Classified, Classifier, Policy, ResponseKind};
pub use engine::Engine;
pub use intercept::{InterceptionController, RevertHandle};
pub use store::{EntityId, ScopedMetricStore};
pub use upstream::{HttpUpstream, OutboundRequest, OutboundResponse, OutboundSlot, Upstream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    News,
    Chat,
    Pages,
    Newsletter,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Domain::News, Domain::Chat, Domain::Pages, Domain::Newsletter];

    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "news" => Some(Domain::News),
            "chat" => Some(Domain::Chat),
            "pages" | "page" => Some(Domain::Pages),
            "newsletter" | "newsletters" | "email" => Some(Domain::Newsletter),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Domain::News => "news",
            Domain::Chat => "chat",
            Domain::Pages => "pages",
            Domain::Newsletter => "newsletter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Global,
    Campaign,
    Post,
    Newsletter,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Global => "global",
            EntityKind::Campaign => "campaign",
            EntityKind::Post => "post",
            EntityKind::Newsletter => "newsletter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Count,
    Level,
    Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub kind: MetricKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet {
    values: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64, kind: MetricKind) {
        self.values.insert(name.into(), MetricValue { value, kind });
    }

    pub fn with(mut self, name: impl Into<String>, value: f64, kind: MetricKind) -> Self {
        self.insert(name, value, kind);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|metric| metric.value)
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.values.get(name).map(|metric| metric.kind)
    }

    pub fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn count(&self, name: &str) -> u64 {
        round_count(self.value(name))
    }

    pub fn set_value(&mut self, name: &str, value: f64) {
        if let Some(metric) = self.values.get_mut(name) {
            metric.value = value;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn contains_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.contains(name))
    }

    pub fn merge(&mut self, partial: &MetricSet) {
        for (name, metric) in &partial.values {
            self.values.insert(name.clone(), *metric);
        }
    }

    pub fn prefixed(&self, prefix: &str) -> MetricSet {
        let values = self
            .values
            .iter()
            .map(|(name, metric)| (format!("{}{}", prefix, name), *metric))
            .collect();
        MetricSet { values }
    }

    pub fn strip_prefix(&self, prefix: &str) -> MetricSet {
        let values = self
            .values
            .iter()
            .filter_map(|(name, metric)| {
                name.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_string(), *metric))
            })
            .collect();
        MetricSet { values }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, MetricValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn round_count(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    value.round() as u64
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn floor1(value: f64) -> f64 {
    (value * 10.0).floor() / 10.0
}
