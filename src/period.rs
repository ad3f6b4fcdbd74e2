use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::baseline::{enforce_ceilings, enforce_ordering};
use crate::classifier::QueryParams;
use crate::{MetricKind, MetricSet};

const BASELINE_HORIZON_DAYS: f64 = 365.0;
const DEFAULT_RANGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub filter_factor: f64,
    pub jitter: f64,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            filter_factor: 0.6,
            jitter: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hour" | "hourly" | "h" => Some(Granularity::Hour),
            "day" | "daily" | "d" => Some(Granularity::Day),
            "week" | "weekly" | "w" => Some(Granularity::Week),
            "month" | "monthly" | "m" => Some(Granularity::Month),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    pub fn for_range(range: &DateRange) -> Self {
        let days = range.days();
        if days <= 2.0 {
            Granularity::Hour
        } else if days > 180.0 {
            Granularity::Month
        } else {
            Granularity::Day
        }
    }

    pub fn coarser(self) -> Option<Self> {
        match self {
            Granularity::Hour => Some(Granularity::Day),
            Granularity::Day => Some(Granularity::Week),
            Granularity::Week => Some(Granularity::Month),
            Granularity::Month => None,
        }
    }
}

// Half-open: [since, until).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl DateRange {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, String> {
        if until <= since {
            return Err(format!("invalid date range: {} is not after {}", until, since));
        }
        Ok(Self { since, until })
    }

    pub fn last_days(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            since: now - Duration::days(days.max(1)),
            until: now,
        }
    }

    pub fn parse(
        since: Option<&str>,
        until: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, String> {
        let until = match until.filter(|value| !value.trim().is_empty()) {
            Some(value) => parse_instant(value, true)?,
            None => end_of_day(now)?,
        };
        let since = match since.filter(|value| !value.trim().is_empty()) {
            Some(value) => parse_instant(value, false)?,
            None => until - Duration::days(DEFAULT_RANGE_DAYS),
        };
        DateRange::new(since, until)
    }

    pub fn days(&self) -> f64 {
        (self.until - self.since).num_seconds().max(0) as f64 / 86_400.0
    }

    pub fn key(&self) -> String {
        format!("{}..{}", self.since.timestamp(), self.until.timestamp())
    }

    pub fn since_label(&self) -> String {
        self.since.format("%Y-%m-%d").to_string()
    }

    pub fn until_label(&self) -> String {
        (self.until - Duration::seconds(1)).format("%Y-%m-%d").to_string()
    }
}

fn end_of_day(now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("date out of range: {}", now))?;
    Ok(Utc.from_utc_datetime(&next))
}

fn parse_instant(value: &str, inclusive: bool) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| format!("invalid date '{}': {}", value, err))?;
    let date = if inclusive {
        date.succ_opt()
            .ok_or_else(|| format!("date out of range: {}", value))?
    } else {
        date
    };
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date '{}'", value))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRequest {
    pub range: DateRange,
    pub granularity: Granularity,
    pub filters: Vec<(String, String)>,
}

impl PeriodRequest {
    pub fn from_query(query: &QueryParams, now: DateTime<Utc>) -> Result<Self, String> {
        let range = DateRange::parse(query.since.as_deref(), query.until.as_deref(), now)?;
        let granularity = match query.group_by.as_deref() {
            Some(value) => Granularity::from_label(value)
                .ok_or_else(|| format!("invalid groupBy: {}", value))?,
            None => Granularity::for_range(&range),
        };
        Ok(Self {
            range,
            granularity,
            filters: sorted_filters(&query.filters),
        })
    }

    pub fn key(&self) -> String {
        let filters: Vec<String> = self
            .filters
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{}|{}", self.range.key(), filters.join("&"))
    }
}

fn sorted_filters(filters: &[(String, String)]) -> Vec<(String, String)> {
    let mut sorted = filters.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

pub fn scale<R: Rng>(
    baseline: &MetricSet,
    request: &PeriodRequest,
    ceilings: &[(&'static str, &'static str)],
    ordering: &[(&'static str, &'static str)],
    config: &PeriodConfig,
    rng: &mut R,
) -> MetricSet {
    let time_fraction = request.range.days() / BASELINE_HORIZON_DAYS;
    let filter_fraction = config
        .filter_factor
        .clamp(0.0, 1.0)
        .powi(request.filters.len().min(i32::MAX as usize) as i32);
    let jitter = config.jitter.clamp(0.0, 0.95);

    let mut scaled = MetricSet::new();
    for (name, metric) in baseline.iter() {
        let value = match metric.kind {
            MetricKind::Count => {
                let factor = time_fraction * filter_fraction * jitter_factor(jitter, rng);
                floor_positive(metric.value, (metric.value * factor).max(0.0).round())
            }
            MetricKind::Level => {
                floor_positive(metric.value, (metric.value * filter_fraction).max(0.0).round())
            }
            MetricKind::Rate => metric.value,
        };
        scaled.insert(name.clone(), value, metric.kind);
    }

    enforce_ceilings(&mut scaled, ceilings, rng);
    enforce_ordering(&mut scaled, ordering, rng);
    scaled
}

fn jitter_factor<R: Rng>(jitter: f64, rng: &mut R) -> f64 {
    if jitter <= 0.0 {
        return 1.0;
    }
    rng.gen_range((1.0 - jitter)..=(1.0 + jitter))
}

fn floor_positive(original: f64, scaled: f64) -> f64 {
    if original > 0.0 {
        scaled.max(1.0)
    } else {
        scaled.max(0.0)
    }
}
