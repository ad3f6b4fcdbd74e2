use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use super::{base_object, buckets_for, series_chain, timeseries_payload, SynthError};
use crate::baseline::metric::*;
use crate::baseline::Profile;
use crate::classifier::Classified;
use crate::distribute::{decay_weights, filler_title};
use crate::engine::Engine;
use crate::harmonize::{harmonize, HarmonizerConfig};
use crate::period::PeriodRequest;
use crate::{round_count, MetricKind, MetricSet};

pub const STATS_FIELDS: &[&str] = &[SENDS, DELIVERIES, OPENS, CLICKS, OPEN_RATE, CLICK_RATE];

pub const SERIES: &[&str] = &[OPENS, CLICKS];

pub async fn funnel_figures(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> MetricSet {
    let prefix = format!("stats:{}:", request.key());
    if let Some(remembered) = engine.remembered(&classified.entity, &prefix, STATS_FIELDS).await {
        return remembered;
    }

    let period = engine
        .period_totals(Profile::Newsletter, &classified.entity, request, rng)
        .await;
    let figures = derive_funnel(&period, &engine.config().harmonizer, rng);
    engine.remember(&classified.entity, &prefix, &figures).await;
    figures
}

pub fn derive_funnel<R: Rng>(period: &MetricSet, config: &HarmonizerConfig, rng: &mut R) -> MetricSet {
    let sends = period.count(RECIPIENTS);
    let deliveries = round_count(sends as f64 * period.value(DELIVERY_RATE)).min(sends);
    let (open_pct, click_pct) = harmonize(
        period.value(OPEN_RATE) * 100.0,
        period.value(CLICK_RATE) * 100.0,
        config,
        rng,
    );
    let opens = round_count(deliveries as f64 * open_pct / 100.0).min(deliveries);
    let clicks = round_count(deliveries as f64 * click_pct / 100.0).min(opens);

    MetricSet::new()
        .with(SENDS, sends as f64, MetricKind::Level)
        .with(DELIVERIES, deliveries as f64, MetricKind::Level)
        .with(OPENS, opens as f64, MetricKind::Count)
        .with(CLICKS, clicks as f64, MetricKind::Count)
        .with(OPEN_RATE, open_pct, MetricKind::Rate)
        .with(CLICK_RATE, click_pct, MetricKind::Rate)
}

pub async fn stats(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let mut payload = base_object(real)?;
    let id = classified.raw_id.clone().unwrap_or_default();
    let figures = funnel_figures(engine, classified, request, rng).await;

    payload
        .entry("newsletterId")
        .or_insert_with(|| json!(id));
    payload
        .entry("subject")
        .or_insert_with(|| json!(filler_title("Newsletter:", &id)));
    for name in [SENDS, DELIVERIES, OPENS, CLICKS] {
        payload.insert(name.to_string(), json!(figures.count(name)));
    }
    payload.insert(OPEN_RATE.to_string(), json!(figures.value(OPEN_RATE)));
    payload.insert(CLICK_RATE.to_string(), json!(figures.value(CLICK_RATE)));
    Ok(Value::Object(payload))
}

pub async fn timeseries(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let figures = funnel_figures(engine, classified, request, rng).await;
    let (granularity, buckets) = buckets_for(request);
    let weights = decay_weights(buckets.len(), engine.config().distribution.ranking_decay);
    let chain = [(OPENS, figures.count(OPENS)), (CLICKS, figures.count(CLICKS))];
    let series = series_chain(
        &buckets,
        granularity,
        &chain,
        Some(weights),
        engine.config().distribution.time_spread,
        rng,
    );
    timeseries_payload(request, granularity, &buckets, &series)
}
