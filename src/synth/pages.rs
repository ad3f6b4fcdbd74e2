use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use super::{buckets_for, ranking_payload, ranking_rows, series_chain, timeseries_payload, SynthError};
use crate::baseline::metric::*;
use crate::baseline::Profile;
use crate::classifier::Classified;
use crate::distribute::{distribute_dependent, distribute_ranking, Anchor};
use crate::engine::Engine;
use crate::period::PeriodRequest;
use crate::round1;

pub const SERIES: &[&str] = &[VISITS, UNIQUE_VISITORS];

pub async fn ranking(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let rows = ranking_rows(
        engine,
        real,
        &["id", "contentId", "pageId"],
        &["title", "name"],
        "pages:content:page",
        "Page",
    )?;
    let totals = engine
        .period_totals(Profile::PagesGlobal, &classified.entity, request, rng)
        .await;
    let decay = engine.config().distribution.ranking_decay;
    let average_time = totals.value(AVG_TIME_ON_PAGE);

    let visits = distribute_ranking(totals.count(VISITS), rows.len(), decay, rng);
    let unique = distribute_dependent(&visits, totals.count(UNIQUE_VISITORS), Anchor::First, rng);

    let data = rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let time_on_page = if visits[idx] > 0 {
                round1(average_time * rng.gen_range(0.7..=1.3))
            } else {
                0.0
            };
            let mut fields = row.fields;
            fields.entry("id").or_insert_with(|| json!(row.id));
            fields.entry("title").or_insert_with(|| json!(row.title));
            fields.insert(VISITS.to_string(), json!(visits[idx]));
            fields.insert(UNIQUE_VISITORS.to_string(), json!(unique[idx]));
            fields.insert(AVG_TIME_ON_PAGE.to_string(), json!(time_on_page));
            Value::Object(fields)
        })
        .collect();
    ranking_payload(real, data)
}

pub async fn timeseries(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let totals = engine
        .period_totals(Profile::PagesGlobal, &classified.entity, request, rng)
        .await;
    let (granularity, buckets) = buckets_for(request);
    let chain = [
        (VISITS, totals.count(VISITS)),
        (UNIQUE_VISITORS, totals.count(UNIQUE_VISITORS)),
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
