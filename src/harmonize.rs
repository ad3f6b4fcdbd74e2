use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{floor1, round1};

const HARD_CAP: f64 = 99.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizerConfig {
    pub floor: f64,
    pub cap: f64,
    pub min_lead: f64,
    pub max_lead: f64,
    pub max_gap: f64,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            floor: 0.5,
            cap: 89.0,
            min_lead: 3.0,
            max_lead: 9.0,
            max_gap: 35.0,
        }
    }
}

impl HarmonizerConfig {
    fn cap(&self) -> f64 {
        if self.cap.is_nan() {
            return HARD_CAP;
        }
        self.cap.clamp(2.0, HARD_CAP)
    }

    fn ceiling(&self) -> f64 {
        floor1(self.cap() - 0.1)
    }

    fn floor(&self) -> f64 {
        if self.floor.is_nan() {
            return 0.0;
        }
        self.floor.clamp(0.0, self.ceiling() / 4.0)
    }

    fn lead_range(&self) -> (f64, f64) {
        let room = ((self.ceiling() - self.floor()) / 2.0).max(0.2);
        let low = self.min_lead.max(0.2).min(room);
        let high = self.max_lead.max(low).min(room);
        (low, high)
    }
}

pub fn remap<R: Rng>(raw: f64, rng: &mut R) -> f64 {
    if raw >= 90.0 {
        rng.gen_range(62.0..74.0)
    } else if raw >= 75.0 {
        rng.gen_range(50.0..62.0)
    } else if raw >= 50.0 {
        rng.gen_range(38.0..50.0)
    } else if raw >= 25.0 {
        rng.gen_range(24.0..38.0)
    } else {
        raw
    }
}

// 0 <= secondary < primary < cap, both with one decimal.
pub fn harmonize<R: Rng>(
    primary_raw: f64,
    secondary_raw: f64,
    config: &HarmonizerConfig,
    rng: &mut R,
) -> (f64, f64) {
    if !(primary_raw > 0.0) {
        return (0.0, 0.0);
    }

    let floor = config.floor().max(0.1);
    let ceiling = config.ceiling();
    let (lead_low, lead_high) = config.lead_range();
    let lead = if lead_high > lead_low {
        rng.gen_range(lead_low..=lead_high)
    } else {
        lead_low
    };
    let max_gap = config.max_gap.max(lead);

    let mut primary = remap(primary_raw, rng).clamp(floor, ceiling);
    if !(secondary_raw > 0.0) {
        return (floor1(primary).max(0.1), 0.0);
    }

    let mut secondary = remap(secondary_raw, rng).clamp(floor, ceiling);

    if primary < floor + lead {
        primary = (floor + lead).min(ceiling);
    }
    if secondary > primary - lead {
        secondary = primary - lead;
    }
    if primary - secondary > max_gap {
        secondary = primary - max_gap;
    }
    secondary = secondary.max(floor);

    let primary = floor1(primary).min(ceiling);
    let secondary = round1(secondary).min(round1(primary - 0.1)).max(0.0);
    (primary, secondary)
}

pub fn bounded_percentage(part: u64, whole: u64, config: &HarmonizerConfig) -> f64 {
    if part == 0 || whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    round1(raw.clamp(config.floor().max(0.1), config.ceiling()))
}
