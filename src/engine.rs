use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::baseline::{generate_baseline, Profile};
use crate::classifier::{Classifier, Policy, ResponseKind};
use crate::config::EngineConfig;
use crate::period::{scale, PeriodRequest};
use crate::store::{EntityId, ScopedMetricStore};
use crate::MetricSet;

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

pub struct Engine {
    config: EngineConfig,
    classifier: Classifier,
    store: ScopedMetricStore,
    requests: AtomicU64,
}

impl Engine {
    pub async fn load(config: EngineConfig) -> Result<Self, String> {
        let store =
            ScopedMetricStore::load(config.store.persist_path.clone(), config.baseline_ttl()).await;
        Engine::with_store(config, store)
    }

    pub fn with_store(config: EngineConfig, store: ScopedMetricStore) -> Result<Self, String> {
        config.validate()?;
        let classifier = Classifier::with_policies(|kind, default| {
            config.policy_override(kind).unwrap_or(default)
        })?;
        Ok(Self {
            config,
            classifier,
            store,
            requests: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn store(&self) -> &ScopedMetricStore {
        &self.store
    }

    pub fn policy(&self, kind: ResponseKind) -> Option<Policy> {
        self.classifier
            .signatures()
            .iter()
            .find(|signature| signature.kind == kind)
            .map(|signature| signature.policy)
    }

    pub fn rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => {
                let request = self.requests.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed ^ request.wrapping_mul(SEED_STRIDE))
            }
            None => StdRng::from_entropy(),
        }
    }

    pub async fn baseline(&self, profile: Profile, entity: &EntityId, rng: &mut StdRng) -> MetricSet {
        let names = profile.field_names();
        if let Some(stored) = self.store.get(entity).await {
            if stored.contains_all(&names) {
                return pick(&stored, &names);
            }
        }

        let generated = generate_baseline(profile, rng);
        debug!(entity = %entity, profile = ?profile, "generated baseline");
        let merged = self.store.merge_partial(entity, &generated).await;
        pick(&merged, &names)
    }

    pub async fn period_totals(
        &self,
        profile: Profile,
        entity: &EntityId,
        request: &PeriodRequest,
        rng: &mut StdRng,
    ) -> MetricSet {
        let prefix = format!("period:{}:", request.key());
        let names = profile.field_names();
        if let Some(remembered) = self.remembered(entity, &prefix, &names).await {
            return remembered;
        }

        let baseline = self.baseline(profile, entity, rng).await;
        let totals = scale(
            &baseline,
            request,
            profile.ceilings(),
            profile.ordering(),
            &self.config.period,
            rng,
        );
        self.remember(entity, &prefix, &totals).await;
        totals
    }

    pub async fn remembered(
        &self,
        entity: &EntityId,
        prefix: &str,
        names: &[&str],
    ) -> Option<MetricSet> {
        let stored = self.store.get(entity).await?;
        let values = stored.strip_prefix(prefix);
        if values.contains_all(names) {
            Some(values)
        } else {
            None
        }
    }

    pub async fn remember(&self, entity: &EntityId, prefix: &str, values: &MetricSet) {
        self.store.merge_partial(entity, &values.prefixed(prefix)).await;
    }

    pub async fn reset_session(&self) {
        self.store.clear().await;
        debug!("session store cleared");
    }
}

fn pick(set: &MetricSet, names: &[&str]) -> MetricSet {
    let mut picked = MetricSet::new();
    for name in names {
        if let (Some(value), Some(kind)) = (set.get(name), set.kind(name)) {
            picked.insert(*name, value, kind);
        }
    }
    picked
}
