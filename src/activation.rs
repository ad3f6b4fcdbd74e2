use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{DomainFlags, PagePatterns};
use crate::intercept::InterceptionController;
use crate::Domain;

#[derive(Debug, Clone)]
pub struct PageMatcher {
    patterns: BTreeMap<Domain, Vec<Regex>>,
}

impl PageMatcher {
    pub fn compile(config: &PagePatterns) -> Result<Self, String> {
        let mut patterns = BTreeMap::new();
        for domain in Domain::ALL {
            let compiled = config
                .for_domain(domain)
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|err| {
                        format!("invalid page pattern for {}: {}", domain.label(), err)
                    })
                })
                .collect::<Result<Vec<_>, String>>()?;
            patterns.insert(domain, compiled);
        }
        Ok(Self { patterns })
    }

    pub fn matches(&self, domain: Domain, page_url: &str) -> bool {
        match self.patterns.get(&domain) {
            Some(patterns) if !patterns.is_empty() => {
                patterns.iter().any(|pattern| pattern.is_match(page_url))
            }
            _ => true,
        }
    }
}

pub fn active_domains(
    flags: &DomainFlags,
    matcher: &PageMatcher,
    page_url: Option<&str>,
) -> BTreeSet<Domain> {
    Domain::ALL
        .into_iter()
        .filter(|domain| flags.enabled(*domain))
        .filter(|domain| match page_url {
            Some(url) => matcher.matches(*domain, url),
            None => true,
        })
        .collect()
}

struct ActivationState {
    flags: DomainFlags,
    page_url: Option<String>,
}

pub struct Activation {
    controller: Arc<InterceptionController>,
    matcher: PageMatcher,
    state: Mutex<ActivationState>,
}

impl Activation {
    pub fn new(
        controller: Arc<InterceptionController>,
        flags: DomainFlags,
        pages: &PagePatterns,
    ) -> Result<Self, String> {
        Ok(Self {
            controller,
            matcher: PageMatcher::compile(pages)?,
            state: Mutex::new(ActivationState {
                flags,
                page_url: None,
            }),
        })
    }

    pub fn controller(&self) -> &Arc<InterceptionController> {
        &self.controller
    }

    pub async fn flags(&self) -> DomainFlags {
        self.state.lock().await.flags
    }

    pub async fn page_url(&self) -> Option<String> {
        self.state.lock().await.page_url.clone()
    }

    pub async fn navigate(&self, page_url: &str) -> BTreeSet<Domain> {
        let mut state = self.state.lock().await;
        state.page_url = Some(page_url.to_string());
        self.apply(&state).await
    }

    pub async fn update_flags(&self, flags: DomainFlags) -> BTreeSet<Domain> {
        let mut state = self.state.lock().await;
        state.flags = flags;
        self.apply(&state).await
    }

    pub async fn evaluate(&self) -> BTreeSet<Domain> {
        let state = self.state.lock().await;
        self.apply(&state).await
    }

    async fn apply(&self, state: &ActivationState) -> BTreeSet<Domain> {
        let active = active_domains(&state.flags, &self.matcher, state.page_url.as_deref());
        self.controller.set_domains(active.clone()).await;

        let changed = if active.is_empty() {
            self.controller.revert().await
        } else {
            self.controller.install().await
        };
        if changed {
            let names: Vec<&str> = active.iter().map(|domain| domain.label()).collect();
            info!(
                page = state.page_url.as_deref().unwrap_or("-"),
                domains = %names.join(","),
                installed = self.controller.is_installed(),
                "activation changed"
            );
        }
        active
    }
}
