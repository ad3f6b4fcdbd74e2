use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::classifier::{Classified, Policy, Unrecognized};
use crate::engine::Engine;
use crate::synth::{empty_payload, synthesize, SynthError};
use crate::upstream::{OutboundRequest, OutboundResponse, OutboundSlot, Upstream};
use crate::Domain;

pub struct InterceptionController {
    slot: Arc<OutboundSlot>,
    engine: Arc<Engine>,
    domains: Arc<RwLock<BTreeSet<Domain>>>,
    original: Mutex<Option<Arc<dyn Upstream>>>,
    installed: AtomicBool,
}

impl InterceptionController {
    pub fn new(slot: Arc<OutboundSlot>, engine: Arc<Engine>) -> Self {
        Self {
            slot,
            engine,
            domains: Arc::new(RwLock::new(Domain::ALL.into_iter().collect())),
            original: Mutex::new(None),
            installed: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn slot(&self) -> &Arc<OutboundSlot> {
        &self.slot
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub async fn active_domains(&self) -> BTreeSet<Domain> {
        self.domains.read().await.clone()
    }

    pub async fn set_domains(&self, domains: BTreeSet<Domain>) {
        let mut guard = self.domains.write().await;
        *guard = domains;
    }

    pub async fn install(&self) -> bool {
        let mut original = self.original.lock().await;
        if original.is_some() {
            return false;
        }

        let engine = self.engine.clone();
        let domains = self.domains.clone();
        let captured = self
            .slot
            .wrap(move |current| {
                let wrapper: Arc<dyn Upstream> = Arc::new(InterceptingUpstream {
                    original: current,
                    engine,
                    domains,
                });
                wrapper
            })
            .await;

        info!(original = %captured.describe(), "interception installed");
        *original = Some(captured);
        self.installed.store(true, Ordering::SeqCst);
        true
    }

    pub async fn revert(&self) -> bool {
        let mut original = self.original.lock().await;
        let Some(captured) = original.take() else {
            return false;
        };

        self.slot.replace(captured).await;
        self.installed.store(false, Ordering::SeqCst);
        self.engine.reset_session().await;
        info!("interception reverted");
        true
    }

    pub fn revert_handle(self: &Arc<Self>) -> RevertHandle {
        RevertHandle {
            controller: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RevertHandle {
    controller: Arc<InterceptionController>,
}

impl RevertHandle {
    pub async fn revert(&self) -> bool {
        self.controller.revert().await
    }
}

pub struct InterceptingUpstream {
    original: Arc<dyn Upstream>,
    engine: Arc<Engine>,
    domains: Arc<RwLock<BTreeSet<Domain>>>,
}

impl InterceptingUpstream {
    async fn fabricate(&self, classified: &Classified) -> OutboundResponse {
        match synthesize(&self.engine, classified, None, Policy::Fabricate).await {
            Ok(payload) => OutboundResponse::synthesized(&payload),
            Err(err) => {
                warn!(kind = classified.kind.label(), "synthesis failed, answering empty: {}", err);
                OutboundResponse::synthesized(&empty_payload(classified))
            }
        }
    }

    async fn augment(
        &self,
        request: OutboundRequest,
        classified: &Classified,
    ) -> OutboundResponse {
        let real = match self.original.send(request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(
                    kind = classified.kind.label(),
                    status = %response.status,
                    "upstream call failed, answering empty"
                );
                return OutboundResponse::synthesized(&empty_payload(classified));
            }
            Err(err) => {
                warn!(kind = classified.kind.label(), "upstream call failed, answering empty: {}", err);
                return OutboundResponse::synthesized(&empty_payload(classified));
            }
        };

        let parsed = match real.parse_json() {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(kind = classified.kind.label(), "{}", err);
                return self.unrecognized(classified, real);
            }
        };

        match synthesize(&self.engine, classified, Some(&parsed), Policy::Augment).await {
            Ok(payload) => OutboundResponse::synthesized(&payload),
            Err(SynthError::UnrecognizedShape(reason)) => {
                debug!(kind = classified.kind.label(), "unrecognized shape: {}", reason);
                self.unrecognized(classified, real)
            }
            Err(err) => {
                warn!(kind = classified.kind.label(), "synthesis failed, passing real response: {}", err);
                real
            }
        }
    }

    fn unrecognized(&self, classified: &Classified, real: OutboundResponse) -> OutboundResponse {
        match classified.unrecognized {
            Unrecognized::Empty => OutboundResponse::synthesized(&empty_payload(classified)),
            Unrecognized::Passthrough => real,
        }
    }
}

#[async_trait]
impl Upstream for InterceptingUpstream {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, String> {
        let domains = self.domains.read().await.clone();
        let classified =
            self.engine
                .classifier()
                .classify_enabled(&request.method, &request.url, &domains);
        let Some(classified) = classified else {
            return self.original.send(request).await;
        };

        debug!(
            kind = classified.kind.label(),
            entity = %classified.entity,
            policy = classified.policy.label(),
            "intercepted"
        );
        let response = match classified.policy {
            Policy::Fabricate => self.fabricate(&classified).await,
            Policy::Augment => self.augment(request, &classified).await,
        };
        Ok(response)
    }

    fn describe(&self) -> String {
        format!("intercepting({})", self.original.describe())
    }
}
