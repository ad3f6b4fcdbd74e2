use rand::rngs::StdRng;
use serde_json::{json, Value};

use super::{buckets_for, series_chain, timeseries_payload};
use crate::baseline::metric::*;
use crate::baseline::Profile;
use crate::classifier::Classified;
use crate::engine::Engine;
use crate::harmonize::bounded_percentage;
use crate::period::PeriodRequest;

pub const OVERVIEW_FIELDS: &[&str] = &[
    REGISTERED_USERS,
    ACTIVE_USERS,
    MESSAGES_SENT,
    CHANNELS_ACTIVE,
    "activeUsersPercentage",
];

pub const SERIES: &[&str] = &[MESSAGES_SENT, ACTIVE_USERS];

pub async fn overview(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let totals = engine
        .period_totals(Profile::ChatGlobal, &classified.entity, request, rng)
        .await;
    let active = totals.count(ACTIVE_USERS);
    let registered = totals.count(REGISTERED_USERS);

    json!({
        "since": request.range.since_label(),
        "until": request.range.until_label(),
        REGISTERED_USERS: registered,
        ACTIVE_USERS: active,
        MESSAGES_SENT: totals.count(MESSAGES_SENT),
        CHANNELS_ACTIVE: totals.count(CHANNELS_ACTIVE),
        "activeUsersPercentage": bounded_percentage(
            active,
            registered,
            &engine.config().harmonizer,
        ),
    })
}

pub async fn timeseries(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let totals = engine
        .period_totals(Profile::ChatGlobal, &classified.entity, request, rng)
        .await;
    let (granularity, buckets) = buckets_for(request);
    let chain = [
        (MESSAGES_SENT, totals.count(MESSAGES_SENT)),
        (ACTIVE_USERS, totals.count(ACTIVE_USERS)),
    ];
    let series = series_chain(
        &buckets,
        granularity,
        &chain,
        None,
        engine.config().distribution.time_spread,
        rng,
    );
    timeseries_payload(request, granularity, &buckets, &series)
}
