pub mod chat;
pub mod news;
pub mod newsletter;
pub mod pages;

use chrono::Utc;
use rand::rngs::StdRng;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::classifier::{Classified, Policy, ResponseKind};
use crate::distribute::{
    bucket_weights, distribute_dependent, distribute_time, effective_granularity, filler_rows,
    time_buckets, Anchor, Bucket,
};
use crate::engine::Engine;
use crate::period::{Granularity, PeriodRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum SynthError {
    UnrecognizedShape(String),
    Invalid(String),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::UnrecognizedShape(reason) => write!(f, "unrecognized response shape: {}", reason),
            SynthError::Invalid(reason) => write!(f, "invalid request: {}", reason),
        }
    }
}

pub async fn synthesize(
    engine: &Engine,
    classified: &Classified,
    real: Option<&Value>,
    policy: Policy,
) -> Result<Value, SynthError> {
    let request =
        PeriodRequest::from_query(&classified.query, Utc::now()).map_err(SynthError::Invalid)?;
    let real = match policy {
        Policy::Augment => real,
        Policy::Fabricate => None,
    };
    let mut rng = engine.rng();

    match classified.kind {
        ResponseKind::NewsCampaignPosts => {
            news::campaign_posts(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::NewsCampaignStats => {
            news::campaign_stats(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::NewsCampaignRanking => {
            news::campaign_ranking(engine, &request, real, &mut rng).await
        }
        ResponseKind::NewsPostStats => {
            news::post_stats(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::NewsPostRanking => {
            news::post_ranking(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::PagesRanking => {
            pages::ranking(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::NewsOverview => Ok(news::overview(engine, classified, &request, &mut rng).await),
        ResponseKind::NewsTimeseries => {
            Ok(news::timeseries(engine, classified, &request, &mut rng).await)
        }
        ResponseKind::ChatOverview => Ok(chat::overview(engine, classified, &request, &mut rng).await),
        ResponseKind::ChatTimeseries => {
            Ok(chat::timeseries(engine, classified, &request, &mut rng).await)
        }
        ResponseKind::PagesTimeseries => {
            Ok(pages::timeseries(engine, classified, &request, &mut rng).await)
        }
        ResponseKind::NewsletterStats => {
            newsletter::stats(engine, classified, &request, real, &mut rng).await
        }
        ResponseKind::NewsletterTimeseries => {
            Ok(newsletter::timeseries(engine, classified, &request, &mut rng).await)
        }
    }
}

pub fn empty_payload(classified: &Classified) -> Value {
    let request = PeriodRequest::from_query(&classified.query, Utc::now()).ok();
    let since = request.as_ref().map(|request| request.range.since_label());
    let until = request.as_ref().map(|request| request.range.until_label());
    let id = classified.raw_id.clone().unwrap_or_default();

    match classified.kind {
        ResponseKind::NewsCampaignRanking
        | ResponseKind::NewsPostRanking
        | ResponseKind::PagesRanking => json!({ "data": [], "total": 0 }),
        ResponseKind::NewsCampaignPosts => json!({ "campaignId": id, "data": [], "total": 0 }),
        ResponseKind::NewsCampaignStats => json!({
            "campaignId": id,
            "name": Value::Null,
            "stats": zeros(news::REACH_FIELDS),
        }),
        ResponseKind::NewsPostStats => json!({
            "postId": id,
            "title": Value::Null,
            "stats": zeros(news::REACH_FIELDS),
        }),
        ResponseKind::NewsOverview => {
            with_range(zeros(news::OVERVIEW_FIELDS), since, until)
        }
        ResponseKind::ChatOverview => {
            with_range(zeros(chat::OVERVIEW_FIELDS), since, until)
        }
        ResponseKind::NewsTimeseries => empty_series(request.as_ref(), news::SERIES),
        ResponseKind::ChatTimeseries => empty_series(request.as_ref(), chat::SERIES),
        ResponseKind::PagesTimeseries => empty_series(request.as_ref(), pages::SERIES),
        ResponseKind::NewsletterTimeseries => empty_series(request.as_ref(), newsletter::SERIES),
        ResponseKind::NewsletterStats => {
            let mut payload = zeros(newsletter::STATS_FIELDS);
            if let Value::Object(map) = &mut payload {
                map.insert("newsletterId".to_string(), json!(id));
                map.insert("subject".to_string(), Value::Null);
            }
            payload
        }
    }
}

fn zeros(fields: &[&str]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|field| (field.to_string(), json!(0)))
        .collect();
    Value::Object(map)
}

fn with_range(mut payload: Value, since: Option<String>, until: Option<String>) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("since".to_string(), json!(since));
        map.insert("until".to_string(), json!(until));
    }
    payload
}

fn empty_series(request: Option<&PeriodRequest>, series: &[&str]) -> Value {
    json!({
        "groupBy": request.map(|request| request.granularity.label()),
        "since": request.map(|request| request.range.since_label()),
        "until": request.map(|request| request.range.until_label()),
        "data": [],
        "totals": zeros(series),
    })
}

pub(crate) struct RankedRow {
    pub id: String,
    pub title: String,
    pub fields: Map<String, Value>,
}

pub(crate) fn ranking_rows(
    engine: &Engine,
    real: Option<&Value>,
    id_keys: &[&str],
    title_keys: &[&str],
    filler_prefix: &str,
    filler_label: &str,
) -> Result<Vec<RankedRow>, SynthError> {
    let Some(real) = real else {
        let count = engine.config().distribution.filler_rows;
        return Ok(filler_rows(filler_prefix, filler_label, count)
            .into_iter()
            .map(|row| RankedRow {
                id: row.id,
                title: row.title,
                fields: Map::new(),
            })
            .collect());
    };

    data_array(real)?
        .iter()
        .map(|row| {
            let fields = row
                .as_object()
                .cloned()
                .ok_or_else(|| SynthError::UnrecognizedShape("data row is not an object".to_string()))?;
            let id = string_field(row, id_keys)
                .ok_or_else(|| SynthError::UnrecognizedShape(format!("data row has no {}", id_keys.join("/"))))?;
            let title = string_field(row, title_keys).unwrap_or_default();
            Ok(RankedRow { id, title, fields })
        })
        .collect()
}

pub(crate) fn data_array(real: &Value) -> Result<&Vec<Value>, SynthError> {
    real.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SynthError::UnrecognizedShape("missing data array".to_string()))
}

pub(crate) fn base_object(real: Option<&Value>) -> Result<Map<String, Value>, SynthError> {
    match real {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(SynthError::UnrecognizedShape("payload is not an object".to_string())),
        None => Ok(Map::new()),
    }
}

pub(crate) fn string_field(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    })
}

pub(crate) fn ranking_payload(real: Option<&Value>, rows: Vec<Value>) -> Result<Value, SynthError> {
    let mut payload = base_object(real)?;
    payload.insert("total".to_string(), json!(rows.len()));
    payload.insert("data".to_string(), Value::Array(rows));
    Ok(Value::Object(payload))
}

pub(crate) fn series_chain(
    buckets: &[Bucket],
    granularity: Granularity,
    chain: &[(&'static str, u64)],
    weights: Option<Vec<f64>>,
    spread: f64,
    rng: &mut StdRng,
) -> Vec<(&'static str, Vec<u64>)> {
    let weights = weights.unwrap_or_else(|| bucket_weights(buckets, granularity));
    let mut series: Vec<(&'static str, Vec<u64>)> = Vec::with_capacity(chain.len());
    for (name, total) in chain {
        let parts = match series.last() {
            None => distribute_time(*total, &weights, spread, rng),
            Some((_, parents)) => distribute_dependent(parents, *total, Anchor::Last, rng),
        };
        series.push((*name, parts));
    }
    series
}

pub(crate) fn timeseries_payload(
    request: &PeriodRequest,
    granularity: Granularity,
    buckets: &[Bucket],
    series: &[(&'static str, Vec<u64>)],
) -> Value {
    let data: Vec<Value> = buckets
        .iter()
        .enumerate()
        .map(|(idx, bucket)| {
            let mut point = Map::new();
            point.insert("date".to_string(), json!(bucket.label(granularity)));
            for (name, parts) in series {
                point.insert(name.to_string(), json!(parts.get(idx).copied().unwrap_or(0)));
            }
            Value::Object(point)
        })
        .collect();

    let totals: Map<String, Value> = series
        .iter()
        .map(|(name, parts)| (name.to_string(), json!(parts.iter().sum::<u64>())))
        .collect();

    json!({
        "groupBy": granularity.label(),
        "since": request.range.since_label(),
        "until": request.range.until_label(),
        "data": data,
        "totals": totals,
    })
}

pub(crate) fn buckets_for(request: &PeriodRequest) -> (Granularity, Vec<Bucket>) {
    let granularity = effective_granularity(&request.range, request.granularity);
    (granularity, time_buckets(&request.range, granularity))
}
