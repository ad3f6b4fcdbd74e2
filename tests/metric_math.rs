use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use demo_metrics::baseline::metric::*;
use demo_metrics::baseline::{enforce_ceilings, generate_baseline, Profile};
use demo_metrics::distribute::{
    bucket_weights, distribute_dependent, distribute_ranking, distribute_time,
    effective_granularity, filler_rows, time_buckets, Anchor,
};
use demo_metrics::harmonize::{bounded_percentage, harmonize, HarmonizerConfig};
use demo_metrics::period::{scale, DateRange, Granularity, PeriodConfig, PeriodRequest};
use demo_metrics::classifier::QueryParams;
use demo_metrics::{MetricKind, MetricSet};

fn march() -> DateRange {
    DateRange::parse(Some("2024-03-01"), Some("2024-03-30"), Utc::now()).expect("range")
}

fn request(range: DateRange, filters: usize) -> PeriodRequest {
    PeriodRequest {
        range,
        granularity: Granularity::Day,
        filters: (0..filters)
            .map(|idx| (format!("filter{}", idx), idx.to_string()))
            .collect(),
    }
}

fn no_jitter() -> PeriodConfig {
    PeriodConfig {
        filter_factor: 0.6,
        jitter: 0.0,
    }
}

#[test]
fn baselines_respect_their_orderings() {
    let profiles = [
        Profile::NewsGlobal,
        Profile::ChatGlobal,
        Profile::PagesGlobal,
        Profile::Campaign,
        Profile::Post,
        Profile::Newsletter,
    ];
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        for profile in profiles {
            let set = generate_baseline(profile, &mut rng);
            assert!(set.contains_all(&profile.field_names()));
            for (lesser, greater) in profile.ordering() {
                assert!(
                    set.value(lesser) <= set.value(greater),
                    "{:?}: {} > {}",
                    profile,
                    lesser,
                    greater
                );
            }
        }
    }
}

#[test]
fn news_baseline_is_a_chain() {
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let set = generate_baseline(Profile::NewsGlobal, &mut rng);
        assert!(set.value(ENGAGED) <= set.value(UNIQUE_VISITORS));
        assert!(set.value(UNIQUE_VISITORS) <= set.value(VISITS));
    }
}

#[test]
fn counts_scale_with_the_window() {
    let mut rng = StdRng::seed_from_u64(1);
    let baseline = MetricSet::new().with(VISITS, 12_000.0, MetricKind::Count);

    let scaled = scale(&baseline, &request(march(), 0), &[], &[], &no_jitter(), &mut rng);

    assert_eq!(march().days(), 30.0);
    assert_eq!(scaled.count(VISITS), 986);
}

#[test]
fn filters_shrink_counts_and_levels_but_not_rates() {
    let mut rng = StdRng::seed_from_u64(1);
    let baseline = MetricSet::new()
        .with(VISITS, 12_000.0, MetricKind::Count)
        .with(POTENTIAL_REACH, 1_000.0, MetricKind::Level)
        .with(VISITED_RATE, 0.8, MetricKind::Rate);

    let scaled = scale(&baseline, &request(march(), 2), &[], &[], &no_jitter(), &mut rng);

    assert_eq!(scaled.count(VISITS), 355);
    assert_eq!(scaled.count(POTENTIAL_REACH), 360);
    assert_eq!(scaled.value(VISITED_RATE), 0.8);
}

#[test]
fn positive_baselines_never_scale_to_zero() {
    let mut rng = StdRng::seed_from_u64(3);
    let day = DateRange::parse(Some("2024-03-01"), Some("2024-03-01"), Utc::now()).expect("range");
    let baseline = MetricSet::new()
        .with(COMMENTS, 10.0, MetricKind::Count)
        .with(SHARES, 0.0, MetricKind::Count);

    let scaled = scale(&baseline, &request(day, 3), &[], &[], &PeriodConfig::default(), &mut rng);

    assert_eq!(scaled.count(COMMENTS), 1);
    assert_eq!(scaled.count(SHARES), 0);
}

#[test]
fn jitter_stays_within_bounds() {
    let baseline = MetricSet::new().with(VISITS, 36_500.0, MetricKind::Count);
    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        let scaled = scale(&baseline, &request(march(), 0), &[], &[], &PeriodConfig::default(), &mut rng);
        let visits = scaled.count(VISITS);
        assert!((2_550..=3_450).contains(&visits), "{}", visits);
    }
}

#[test]
fn missing_bounds_default_to_thirty_days() {
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
    let range = DateRange::parse(None, None, now).expect("range");

    assert_eq!(range.until, Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    assert_eq!(range.days(), 30.0);
    assert_eq!(range.until_label(), "2024-03-15");
}

#[test]
fn rejects_inverted_ranges() {
    assert!(DateRange::parse(Some("2024-03-10"), Some("2024-03-01"), Utc::now()).is_err());
    assert!(DateRange::parse(Some("yesterday"), None, Utc::now()).is_err());
}

#[test]
fn granularity_follows_range_length() {
    let now = Utc::now();
    assert_eq!(Granularity::for_range(&DateRange::last_days(1, now)), Granularity::Hour);
    assert_eq!(Granularity::for_range(&DateRange::last_days(30, now)), Granularity::Day);
    assert_eq!(Granularity::for_range(&DateRange::last_days(365, now)), Granularity::Month);
}

#[test]
fn buckets_are_calendar_aligned() {
    let range = march();
    assert_eq!(time_buckets(&range, Granularity::Day).len(), 30);
    assert_eq!(time_buckets(&range, Granularity::Month).len(), 1);

    let day = DateRange::parse(Some("2024-03-04"), Some("2024-03-04"), Utc::now()).expect("range");
    let hours = time_buckets(&day, Granularity::Hour);
    assert_eq!(hours.len(), 24);
    assert_eq!(hours[9].label(Granularity::Hour), "2024-03-04T09:00:00Z");

    let weeks = time_buckets(&range, Granularity::Week);
    assert_eq!(weeks.len(), 5);
    assert_eq!(weeks[0].start, range.since);
    assert_eq!(weeks[4].end, range.until);
}

#[test]
fn oversized_hourly_ranges_are_coarsened() {
    let range = DateRange::parse(Some("2024-01-01"), Some("2024-03-31"), Utc::now()).expect("range");
    let granularity = effective_granularity(&range, Granularity::Hour);
    assert_eq!(granularity, Granularity::Day);
    assert!(time_buckets(&range, granularity).len() <= 744);
}

#[test]
fn weekends_and_nights_weigh_less() {
    let week = DateRange::parse(Some("2024-03-04"), Some("2024-03-10"), Utc::now()).expect("range");
    let weights = bucket_weights(&time_buckets(&week, Granularity::Day), Granularity::Day);
    assert_eq!(weights.len(), 7);
    assert!(weights[0] > weights[5]);
    assert!(weights[5] == weights[6]);

    let day = DateRange::parse(Some("2024-03-04"), Some("2024-03-04"), Utc::now()).expect("range");
    let hourly = bucket_weights(&time_buckets(&day, Granularity::Hour), Granularity::Hour);
    assert!(hourly[10] > hourly[20]);
    assert!(hourly[20] > hourly[3]);
}

#[test]
fn time_distribution_sums_to_the_total() {
    let buckets = time_buckets(&march(), Granularity::Day);
    let weights = bucket_weights(&buckets, Granularity::Day);
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        for total in [0_u64, 1, 7, 986, 123_457] {
            let parts = distribute_time(total, &weights, 0.35, &mut rng);
            assert_eq!(parts.len(), 30);
            assert_eq!(parts.iter().sum::<u64>(), total);
        }
    }
}

#[test]
fn single_bucket_takes_everything() {
    let mut rng = StdRng::seed_from_u64(5);
    assert_eq!(distribute_time(42, &[0.3], 0.35, &mut rng), vec![42]);
}

#[test]
fn ranking_is_descending_and_complete() {
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let parts = distribute_ranking(500, 5, 0.72, &mut rng);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts.iter().sum::<u64>(), 500);
        assert!(parts.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    let mut rng = StdRng::seed_from_u64(0);
    assert!(distribute_ranking(500, 0, 0.72, &mut rng).is_empty());
}

#[test]
fn dependents_never_exceed_their_parent() {
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let parents = vec![120, 80, 0, 33, 1];
        for (total, expected) in [(100_u64, 100_u64), (234, 234), (999, 234), (0, 0)] {
            let parts = distribute_dependent(&parents, total, Anchor::First, &mut rng);
            assert_eq!(parts.iter().sum::<u64>(), expected);
            for (part, parent) in parts.iter().zip(parents.iter()) {
                assert!(part <= parent);
            }
        }
    }
}

#[test]
fn filler_rows_are_stable() {
    let first = filler_rows("news:campaign", "Campaign", 5);
    let second = filler_rows("news:campaign", "Campaign", 5);
    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
    assert_ne!(first[0].id, first[1].id);
    assert!(first[0].title.starts_with("Campaign "));
}

#[test]
fn harmonized_pairs_stay_ordered_and_capped() {
    let config = HarmonizerConfig::default();
    let inputs = [0.5, 3.0, 12.0, 24.9, 25.0, 49.0, 50.0, 74.0, 75.0, 89.0, 90.0, 97.0, 100.0, 140.0];
    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        for primary in inputs {
            for secondary in inputs {
                let (p, q) = harmonize(primary, secondary, &config, &mut rng);
                assert!(q >= 0.0);
                assert!(q < p, "{} / {} -> {} / {}", primary, secondary, p, q);
                assert!(p < 89.0);
                assert!(p - q <= 35.2, "{} / {} -> {} / {}", primary, secondary, p, q);
                assert_eq!((p * 10.0).round() / 10.0, p);
                assert_eq!((q * 10.0).round() / 10.0, q);
            }
        }
    }
}

#[test]
fn harmonizer_keeps_zeros() {
    let config = HarmonizerConfig::default();
    let mut rng = StdRng::seed_from_u64(9);

    assert_eq!(harmonize(0.0, 40.0, &config, &mut rng), (0.0, 0.0));
    let (p, q) = harmonize(60.0, 0.0, &config, &mut rng);
    assert!(p > 0.0);
    assert_eq!(q, 0.0);
}

#[test]
fn bounded_percentages_avoid_the_edges() {
    let config = HarmonizerConfig::default();
    assert_eq!(bounded_percentage(0, 100, &config), 0.0);
    assert_eq!(bounded_percentage(5, 0, &config), 0.0);
    assert_eq!(bounded_percentage(100, 100, &config), 88.9);
    assert_eq!(bounded_percentage(1, 1_000_000, &config), 0.5);
    assert_eq!(bounded_percentage(25, 100, &config), 25.0);
}

#[test]
fn reach_never_outgrows_its_population() {
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        for profile in [Profile::NewsGlobal, Profile::ChatGlobal] {
            let baseline = generate_baseline(profile, &mut rng);
            for range in [march(), DateRange::parse(Some("2024-01-01"), Some("2024-12-31"), Utc::now()).expect("range")] {
                let scaled = scale(
                    &baseline,
                    &request(range, 0),
                    profile.ceilings(),
                    profile.ordering(),
                    &PeriodConfig::default(),
                    &mut rng,
                );
                for (reach, population) in profile.ceilings() {
                    assert!(
                        scaled.value(reach) <= scaled.value(population),
                        "{:?}: {} {} > {} {}",
                        profile,
                        reach,
                        scaled.value(reach),
                        population,
                        scaled.value(population)
                    );
                }
                for (lesser, greater) in profile.ordering() {
                    assert!(scaled.value(lesser) <= scaled.value(greater));
                }
            }
        }
    }
}

#[test]
fn ceilings_shrink_counts_together() {
    let mut rng = StdRng::seed_from_u64(4);
    let mut set = MetricSet::new()
        .with(REGISTERED_VISITORS, 1_000.0, MetricKind::Level)
        .with(UNIQUE_VISITORS, 4_000.0, MetricKind::Count)
        .with(VISITS, 12_000.0, MetricKind::Count)
        .with(ENGAGED, 800.0, MetricKind::Count);

    enforce_ceilings(&mut set, Profile::NewsGlobal.ceilings(), &mut rng);

    let unique = set.value(UNIQUE_VISITORS);
    assert!(unique <= 1_000.0 && unique >= 500.0, "{}", unique);
    assert_eq!(set.value(REGISTERED_VISITORS), 1_000.0);
    let engaged_share = set.value(ENGAGED) / unique;
    assert!((engaged_share - 0.2).abs() < 0.01, "{}", engaged_share);
    assert!(set.value(VISITS) > unique);
}

#[test]
fn period_key_follows_filter_values() {
    let query = |raw: &str| {
        let url = reqwest::Url::parse(&format!("http://backend.test/x?since=2024-03-01&until=2024-03-31&{}", raw))
            .expect("url");
        PeriodRequest::from_query(&QueryParams::from_url(&url), Utc::now()).expect("request")
    };

    let first = query("audienceId=1");
    let second = query("audienceId=2");
    let reordered_a = query("audienceId=1&groupId=4");
    let reordered_b = query("groupId=4&audienceId=1");

    assert_ne!(first.key(), second.key());
    assert_eq!(reordered_a.key(), reordered_b.key());
    assert_eq!(first.filters.len(), 1);
}
