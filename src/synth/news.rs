use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Map, Value};

use super::{
    base_object, buckets_for, ranking_payload, ranking_rows, series_chain, timeseries_payload,
    SynthError,
};
use crate::baseline::metric::*;
use crate::baseline::Profile;
use crate::classifier::Classified;
use crate::distribute::{distribute_dependent, distribute_ranking, filler_title, Anchor};
use crate::engine::Engine;
use crate::harmonize::{bounded_percentage, harmonize, HarmonizerConfig};
use crate::period::PeriodRequest;
use crate::store::EntityId;
use crate::{round_count, Domain, EntityKind, MetricKind, MetricSet};

pub const REACH_FIELDS: &[&str] = &[
    POTENTIAL_REACH,
    VISITED,
    ENGAGED,
    VISITED_PERCENTAGE,
    ENGAGED_PERCENTAGE,
];

pub const OVERVIEW_FIELDS: &[&str] = &[
    REGISTERED_VISITORS,
    VISITS,
    UNIQUE_VISITORS,
    ENGAGED,
    LIKES,
    COMMENTS,
    SHARES,
    "engagementRate",
];

pub const SERIES: &[&str] = &[VISITS, UNIQUE_VISITORS, ENGAGED];

fn stats_prefix(request: &PeriodRequest) -> String {
    format!("stats:{}:", request.key())
}

pub async fn reach_figures(
    engine: &Engine,
    profile: Profile,
    entity: &EntityId,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> MetricSet {
    let prefix = stats_prefix(request);
    if let Some(remembered) = engine.remembered(entity, &prefix, REACH_FIELDS).await {
        return remembered;
    }

    let period = engine.period_totals(profile, entity, request, rng).await;
    let figures = derive_reach(&period, &engine.config().harmonizer, rng);
    engine.remember(entity, &prefix, &figures).await;
    figures
}

pub fn derive_reach<R: Rng>(period: &MetricSet, config: &HarmonizerConfig, rng: &mut R) -> MetricSet {
    let potential = period.count(POTENTIAL_REACH);
    let (visited_pct, engaged_pct) = harmonize(
        period.value(VISITED_RATE) * 100.0,
        period.value(ENGAGED_RATE) * 100.0,
        config,
        rng,
    );
    let visited = round_count(potential as f64 * visited_pct / 100.0).min(potential);
    let engaged = round_count(potential as f64 * engaged_pct / 100.0).min(visited);

    MetricSet::new()
        .with(POTENTIAL_REACH, potential as f64, MetricKind::Level)
        .with(VISITED, visited as f64, MetricKind::Count)
        .with(ENGAGED, engaged as f64, MetricKind::Count)
        .with(VISITED_PERCENTAGE, visited_pct, MetricKind::Rate)
        .with(ENGAGED_PERCENTAGE, engaged_pct, MetricKind::Rate)
}

fn post_figures(potential: u64, visited: u64, engaged: u64, config: &HarmonizerConfig) -> MetricSet {
    MetricSet::new()
        .with(POTENTIAL_REACH, potential as f64, MetricKind::Level)
        .with(VISITED, visited as f64, MetricKind::Count)
        .with(ENGAGED, engaged as f64, MetricKind::Count)
        .with(
            VISITED_PERCENTAGE,
            bounded_percentage(visited, potential, config),
            MetricKind::Rate,
        )
        .with(
            ENGAGED_PERCENTAGE,
            bounded_percentage(engaged, potential, config),
            MetricKind::Rate,
        )
}

fn stats_object(figures: &MetricSet) -> Value {
    json!({
        POTENTIAL_REACH: figures.count(POTENTIAL_REACH),
        VISITED: figures.count(VISITED),
        ENGAGED: figures.count(ENGAGED),
        VISITED_PERCENTAGE: figures.value(VISITED_PERCENTAGE),
        ENGAGED_PERCENTAGE: figures.value(ENGAGED_PERCENTAGE),
    })
}

fn merge_stats(fields: &mut Map<String, Value>, figures: &MetricSet) {
    if let Value::Object(stats) = stats_object(figures) {
        fields.extend(stats);
    }
}

pub async fn campaign_stats(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let mut payload = base_object(real)?;
    let id = classified.raw_id.clone().unwrap_or_default();
    let figures = reach_figures(engine, Profile::Campaign, &classified.entity, request, rng).await;

    payload
        .entry("campaignId")
        .or_insert_with(|| json!(id));
    payload
        .entry("name")
        .or_insert_with(|| json!(filler_title("Campaign", &id)));
    payload.insert("stats".to_string(), stats_object(&figures));
    Ok(Value::Object(payload))
}

pub async fn campaign_ranking(
    engine: &Engine,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let rows = ranking_rows(
        engine,
        real,
        &["campaignId", "id"],
        &["name", "title"],
        "news:campaign",
        "Campaign",
    )?;

    let mut ranked = Vec::with_capacity(rows.len());
    for row in rows {
        let entity = EntityId::scoped(Domain::News, EntityKind::Campaign, &row.id);
        let figures = reach_figures(engine, Profile::Campaign, &entity, request, rng).await;

        let mut fields = row.fields;
        fields
            .entry("campaignId")
            .or_insert_with(|| json!(row.id));
        fields.entry("name").or_insert_with(|| json!(row.title));
        merge_stats(&mut fields, &figures);
        ranked.push((figures.count(VISITED), Value::Object(fields)));
    }

    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranking_payload(real, ranked.into_iter().map(|(_, row)| row).collect())
}

pub async fn campaign_posts(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let campaign_id = classified.raw_id.clone().unwrap_or_default();
    let rows = ranking_rows(
        engine,
        real,
        &["postId", "id"],
        &["title", "name"],
        &format!("news:campaign:{}:post", campaign_id),
        "Post",
    )?;
    let campaign = reach_figures(engine, Profile::Campaign, &classified.entity, request, rng).await;
    let potential = campaign.count(POTENTIAL_REACH);
    let prefix = stats_prefix(request);

    let entities: Vec<EntityId> = rows
        .iter()
        .map(|row| EntityId::scoped(Domain::News, EntityKind::Post, &row.id))
        .collect();

    let mut per_post = Vec::with_capacity(rows.len());
    for entity in &entities {
        match engine.remembered(entity, &prefix, REACH_FIELDS).await {
            Some(figures) => per_post.push(figures),
            None => break,
        }
    }
    let reusable = !per_post.is_empty()
        && per_post.len() == rows.len()
        && per_post
            .iter()
            .all(|figures| figures.count(POTENTIAL_REACH) == potential)
        && per_post.iter().map(|figures| figures.count(VISITED)).sum::<u64>()
            == campaign.count(VISITED);

    if !reusable {
        let decay = engine.config().distribution.ranking_decay;
        let harmonizer = &engine.config().harmonizer;
        let visited = distribute_ranking(campaign.count(VISITED), rows.len(), decay, rng);
        let engaged = distribute_dependent(&visited, campaign.count(ENGAGED), Anchor::First, rng);

        per_post.clear();
        for (idx, entity) in entities.iter().enumerate() {
            let figures = post_figures(potential, visited[idx], engaged[idx], harmonizer);
            engine.remember(entity, &prefix, &figures).await;
            per_post.push(figures);
        }
    }

    let mut ranked: Vec<(u64, Value)> = rows
        .into_iter()
        .zip(per_post.iter())
        .map(|(row, figures)| {
            let mut fields = row.fields;
            fields.entry("postId").or_insert_with(|| json!(row.id));
            fields.entry("title").or_insert_with(|| json!(row.title));
            fields.insert(POTENTIAL_REACH.to_string(), json!(figures.count(POTENTIAL_REACH)));
            fields.insert(VISITED.to_string(), json!(figures.count(VISITED)));
            fields.insert(ENGAGED.to_string(), json!(figures.count(ENGAGED)));
            (figures.count(VISITED), Value::Object(fields))
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    let mut payload = match ranking_payload(real, ranked.into_iter().map(|(_, row)| row).collect())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload
        .entry("campaignId")
        .or_insert_with(|| json!(campaign_id));
    Ok(Value::Object(payload))
}

pub async fn post_stats(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let mut payload = base_object(real)?;
    let id = classified.raw_id.clone().unwrap_or_default();
    let figures = reach_figures(engine, Profile::Post, &classified.entity, request, rng).await;

    payload.entry("postId").or_insert_with(|| json!(id));
    payload
        .entry("title")
        .or_insert_with(|| json!(filler_title("Post", &id)));
    payload.insert("stats".to_string(), stats_object(&figures));
    Ok(Value::Object(payload))
}

pub async fn post_ranking(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    real: Option<&Value>,
    rng: &mut StdRng,
) -> Result<Value, SynthError> {
    let rows = ranking_rows(
        engine,
        real,
        &["id", "contentId", "postId"],
        &["title", "name"],
        "news:content:post",
        "Post",
    )?;
    let totals = engine
        .period_totals(Profile::NewsGlobal, &classified.entity, request, rng)
        .await;
    let decay = engine.config().distribution.ranking_decay;

    let visits = distribute_ranking(totals.count(VISITS), rows.len(), decay, rng);
    let unique = distribute_dependent(&visits, totals.count(UNIQUE_VISITORS), Anchor::First, rng);
    let likes = distribute_dependent(&unique, totals.count(LIKES), Anchor::First, rng);
    let comments = distribute_dependent(&likes, totals.count(COMMENTS), Anchor::First, rng);

    let data = rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut fields = row.fields;
            fields.entry("id").or_insert_with(|| json!(row.id));
            fields.entry("title").or_insert_with(|| json!(row.title));
            fields.insert(VISITS.to_string(), json!(visits[idx]));
            fields.insert(UNIQUE_VISITORS.to_string(), json!(unique[idx]));
            fields.insert(LIKES.to_string(), json!(likes[idx]));
            fields.insert(COMMENTS.to_string(), json!(comments[idx]));
            Value::Object(fields)
        })
        .collect();
    ranking_payload(real, data)
}

pub async fn overview(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let totals = engine
        .period_totals(Profile::NewsGlobal, &classified.entity, request, rng)
        .await;
    let engagement_rate = bounded_percentage(
        totals.count(ENGAGED),
        totals.count(UNIQUE_VISITORS),
        &engine.config().harmonizer,
    );

    json!({
        "since": request.range.since_label(),
        "until": request.range.until_label(),
        REGISTERED_VISITORS: totals.count(REGISTERED_VISITORS),
        VISITS: totals.count(VISITS),
        UNIQUE_VISITORS: totals.count(UNIQUE_VISITORS),
        ENGAGED: totals.count(ENGAGED),
        LIKES: totals.count(LIKES),
        COMMENTS: totals.count(COMMENTS),
        SHARES: totals.count(SHARES),
        "engagementRate": engagement_rate,
    })
}

pub async fn timeseries(
    engine: &Engine,
    classified: &Classified,
    request: &PeriodRequest,
    rng: &mut StdRng,
) -> Value {
    let totals = engine
        .period_totals(Profile::NewsGlobal, &classified.entity, request, rng)
        .await;
    let (granularity, buckets) = buckets_for(request);
    let chain = [
        (VISITS, totals.count(VISITS)),
        (UNIQUE_VISITORS, totals.count(UNIQUE_VISITORS)),
        (ENGAGED, totals.count(ENGAGED)),
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
