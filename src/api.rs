use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use demo_metrics::config::DomainFlags;
use demo_metrics::Domain;

#[derive(Debug, Deserialize)]
pub struct ApiNavigateRequest {
    pub url: Option<String>,
}

impl ApiNavigateRequest {
    pub fn into_url(self) -> Result<String, String> {
        let url = self.url.unwrap_or_default().trim().to_string();
        if url.is_empty() {
            return Err("url is required".to_string());
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiFlagsRequest {
    pub news: Option<bool>,
    pub chat: Option<bool>,
    pub pages: Option<bool>,
    pub newsletter: Option<bool>,
}

impl ApiFlagsRequest {
    pub fn apply(&self, mut flags: DomainFlags) -> DomainFlags {
        if let Some(value) = self.news {
            flags.news = value;
        }
        if let Some(value) = self.chat {
            flags.chat = value;
        }
        if let Some(value) = self.pages {
            flags.pages = value;
        }
        if let Some(value) = self.newsletter {
            flags.newsletter = value;
        }
        flags
    }
}

#[derive(Debug, Serialize)]
pub struct ApiActivationResponse {
    pub installed: bool,
    pub active_domains: Vec<String>,
}

impl ApiActivationResponse {
    pub fn new(installed: bool, domains: &BTreeSet<Domain>) -> Self {
        Self {
            installed,
            active_domains: domain_labels(domains),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiStatusResponse {
    pub installed: bool,
    pub active_domains: Vec<String>,
    pub flags: DomainFlags,
    pub page_url: Option<String>,
    pub stored_entities: usize,
    pub upstream: String,
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct ApiRevertResponse {
    pub reverted: bool,
}

pub fn domain_labels(domains: &BTreeSet<Domain>) -> Vec<String> {
    domains
        .iter()
        .map(|domain| domain.label().to_string())
        .collect()
}
