use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::period::{DateRange, Granularity};

const MAX_BUCKETS: usize = 744;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub time_spread: f64,
    pub ranking_decay: f64,
    pub filler_rows: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            time_spread: 0.35,
            ranking_decay: 0.72,
            filler_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Bucket {
    pub fn label(&self, granularity: Granularity) -> String {
        match granularity {
            Granularity::Hour => self.start.format("%Y-%m-%dT%H:00:00Z").to_string(),
            Granularity::Day | Granularity::Week => self.start.format("%Y-%m-%d").to_string(),
            Granularity::Month => self.start.format("%Y-%m").to_string(),
        }
    }

    fn covered_days(&self) -> f64 {
        (self.end - self.start).num_seconds().max(0) as f64 / 86_400.0
    }
}

pub fn effective_granularity(range: &DateRange, requested: Granularity) -> Granularity {
    let mut granularity = requested;
    while approx_bucket_count(range, granularity) > MAX_BUCKETS {
        match granularity.coarser() {
            Some(next) => granularity = next,
            None => break,
        }
    }
    granularity
}

fn approx_bucket_count(range: &DateRange, granularity: Granularity) -> usize {
    let days = range.days();
    let count = match granularity {
        Granularity::Hour => days * 24.0,
        Granularity::Day => days,
        Granularity::Week => days / 7.0,
        Granularity::Month => days / 28.0,
    };
    count.ceil() as usize + 1
}

pub fn time_buckets(range: &DateRange, granularity: Granularity) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut cursor = align_start(range.since, granularity);

    while cursor < range.until && buckets.len() < MAX_BUCKETS {
        let next = step(cursor, granularity);
        if next <= cursor {
            break;
        }
        buckets.push(Bucket {
            start: cursor.max(range.since),
            end: next.min(range.until),
        });
        cursor = next;
    }

    if buckets.is_empty() {
        buckets.push(Bucket {
            start: range.since,
            end: range.until,
        });
    }
    buckets
}

fn align_start(instant: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    let date = instant.date_naive();
    match granularity {
        Granularity::Hour => {
            let hour = date.and_hms_opt(instant.hour(), 0, 0);
            hour.map(|value| Utc.from_utc_datetime(&value)).unwrap_or(instant)
        }
        Granularity::Day => midnight(date).unwrap_or(instant),
        Granularity::Week => {
            let offset = date.weekday().num_days_from_monday() as i64;
            midnight(date - Duration::days(offset)).unwrap_or(instant)
        }
        Granularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
            .and_then(midnight)
            .unwrap_or(instant),
    }
}

fn step(start: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Hour => start + Duration::hours(1),
        Granularity::Day => start + Duration::days(1),
        Granularity::Week => start + Duration::days(7),
        Granularity::Month => {
            let date = start.date_naive();
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(midnight)
                .unwrap_or(start + Duration::days(30))
        }
    }
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|value| Utc.from_utc_datetime(&value))
}

pub fn bucket_weights(buckets: &[Bucket], granularity: Granularity) -> Vec<f64> {
    buckets
        .iter()
        .map(|bucket| {
            let covered = bucket.covered_days();
            match granularity {
                Granularity::Hour => hour_weight(bucket.start.hour()) * covered * 24.0,
                Granularity::Day => day_weight(bucket.start.weekday()) * covered,
                Granularity::Week | Granularity::Month => covered,
            }
        })
        .collect()
}

fn day_weight(day: Weekday) -> f64 {
    match day {
        Weekday::Sat | Weekday::Sun => 0.35,
        _ => 1.0,
    }
}

fn hour_weight(hour: u32) -> f64 {
    match hour {
        8..=18 => 1.0,
        19..=22 | 6..=7 => 0.35,
        _ => 0.08,
    }
}

pub fn decay_weights(count: usize, decay: f64) -> Vec<f64> {
    let decay = sanitize_decay(decay);
    (0..count).map(|idx| decay.powi(idx as i32)).collect()
}

pub fn distribute_time<R: Rng>(total: u64, weights: &[f64], spread: f64, rng: &mut R) -> Vec<u64> {
    match weights.len() {
        0 => return Vec::new(),
        1 => return vec![total],
        _ => {}
    }
    if total == 0 {
        return vec![0; weights.len()];
    }

    let spread = spread.clamp(0.0, 0.95);
    let shares: Vec<f64> = weights
        .iter()
        .map(|weight| {
            let wobble = if spread > 0.0 {
                rng.gen_range((1.0 - spread)..=(1.0 + spread))
            } else {
                1.0
            };
            weight.max(0.0) * wobble
        })
        .collect();

    round_with_drift(&shares, total, Anchor::Last)
}

pub fn distribute_ranking<R: Rng>(total: u64, rows: usize, decay: f64, rng: &mut R) -> Vec<u64> {
    if rows == 0 {
        return Vec::new();
    }
    let shares: Vec<f64> = decay_weights(rows, decay)
        .into_iter()
        .map(|weight| weight * rng.gen_range(0.9..=1.1))
        .collect();

    let mut parts = round_with_drift(&shares, total, Anchor::First);
    parts.sort_by(|a, b| b.cmp(a));
    parts
}

// Each part stays at or below its parent; the total is capped at the parents' sum.
pub fn distribute_dependent<R: Rng>(
    parents: &[u64],
    total: u64,
    anchor: Anchor,
    rng: &mut R,
) -> Vec<u64> {
    let parent_sum: u64 = parents.iter().sum();
    let target = total.min(parent_sum);
    if parents.is_empty() || target == 0 {
        return vec![0; parents.len()];
    }

    let ratio = target as f64 / parent_sum as f64;
    let mut parts: Vec<u64> = parents
        .iter()
        .map(|parent| {
            let raw = *parent as f64 * ratio * rng.gen_range(0.85..=1.15);
            (raw.round().max(0.0) as u64).min(*parent)
        })
        .collect();

    let assigned: u64 = parts.iter().sum();
    match assigned.cmp(&target) {
        Ordering::Less => {
            let mut missing = target - assigned;
            for idx in drift_order(parts.len(), anchor) {
                if missing == 0 {
                    break;
                }
                let room = parents[idx] - parts[idx];
                let take = room.min(missing);
                parts[idx] += take;
                missing -= take;
            }
        }
        Ordering::Greater => {
            let mut surplus = assigned - target;
            for idx in drift_order(parts.len(), anchor) {
                if surplus == 0 {
                    break;
                }
                let take = parts[idx].min(surplus);
                parts[idx] -= take;
                surplus -= take;
            }
        }
        Ordering::Equal => {}
    }
    parts
}

fn round_with_drift(shares: &[f64], total: u64, anchor: Anchor) -> Vec<u64> {
    let sum: f64 = shares.iter().sum();
    let shares: Vec<f64> = if sum > 0.0 && sum.is_finite() {
        shares.iter().map(|share| share / sum).collect()
    } else {
        vec![1.0 / shares.len() as f64; shares.len()]
    };

    let mut parts: Vec<u64> = shares
        .iter()
        .map(|share| (share * total as f64).round().max(0.0) as u64)
        .collect();

    let assigned: u64 = parts.iter().sum();
    match assigned.cmp(&total) {
        Ordering::Less => {
            let idx = anchor_index(parts.len(), anchor);
            parts[idx] += total - assigned;
        }
        Ordering::Greater => {
            let mut surplus = assigned - total;
            for idx in drift_order(parts.len(), anchor) {
                if surplus == 0 {
                    break;
                }
                let take = parts[idx].min(surplus);
                parts[idx] -= take;
                surplus -= take;
            }
        }
        Ordering::Equal => {}
    }
    parts
}

fn anchor_index(len: usize, anchor: Anchor) -> usize {
    match anchor {
        Anchor::First => 0,
        Anchor::Last => len.saturating_sub(1),
    }
}

fn drift_order(len: usize, anchor: Anchor) -> Box<dyn Iterator<Item = usize>> {
    match anchor {
        Anchor::First => Box::new(0..len),
        Anchor::Last => Box::new((0..len).rev()),
    }
}

fn sanitize_decay(decay: f64) -> f64 {
    if decay.is_nan() {
        return 0.72;
    }
    decay.clamp(0.05, 1.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillerRow {
    pub id: String,
    pub title: String,
}

pub fn filler_rows(prefix: &str, label: &str, count: usize) -> Vec<FillerRow> {
    (0..count)
        .map(|idx| {
            let hash = stable_hash64(&format!("{}:{}", prefix, idx));
            FillerRow {
                id: format!("{:012x}", hash & 0xffff_ffff_ffff),
                title: format!("{} {}", label, FILLER_TITLES[idx % FILLER_TITLES.len()]),
            }
        })
        .collect()
}

pub fn filler_title(label: &str, key: &str) -> String {
    let idx = (stable_hash64(key) % FILLER_TITLES.len() as u64) as usize;
    format!("{} {}", label, FILLER_TITLES[idx])
}

const FILLER_TITLES: &[&str] = &[
    "Quarterly kickoff",
    "Benefits update",
    "Welcome our new team members",
    "Office move FAQ",
    "Product roadmap highlights",
    "Wellbeing week",
    "Security reminder",
    "Town hall recap",
];

pub fn stable_hash64(value: &str) -> u64 {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
