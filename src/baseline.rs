use rand::Rng;

use crate::{Domain, EntityKind, MetricKind, MetricSet};

pub mod metric {
    pub const REGISTERED_VISITORS: &str = "registeredVisitors";
    pub const VISITS: &str = "visits";
    pub const UNIQUE_VISITORS: &str = "uniqueVisitors";
    pub const ENGAGED: &str = "engaged";
    pub const LIKES: &str = "likes";
    pub const COMMENTS: &str = "comments";
    pub const SHARES: &str = "shares";

    pub const REGISTERED_USERS: &str = "registeredUsers";
    pub const MESSAGES_SENT: &str = "messagesSent";
    pub const ACTIVE_USERS: &str = "activeUsers";
    pub const CHANNELS_ACTIVE: &str = "channelsActive";

    pub const AVG_TIME_ON_PAGE: &str = "avgTimeOnPage";

    pub const POTENTIAL_REACH: &str = "potentialReach";
    pub const VISITED_RATE: &str = "visitedRate";
    pub const ENGAGED_RATE: &str = "engagedRate";
    pub const VISITED: &str = "visited";
    pub const VISITED_PERCENTAGE: &str = "visitedPercentage";
    pub const ENGAGED_PERCENTAGE: &str = "engagedPercentage";

    pub const RECIPIENTS: &str = "recipients";
    pub const DELIVERY_RATE: &str = "deliveryRate";
    pub const OPEN_RATE: &str = "openRate";
    pub const CLICK_RATE: &str = "clickRate";
    pub const SENDS: &str = "sends";
    pub const DELIVERIES: &str = "deliveries";
    pub const OPENS: &str = "opens";
    pub const CLICKS: &str = "clicks";
}

use metric::*;

#[derive(Debug, Clone, Copy)]
pub struct FieldBand {
    pub name: &'static str,
    pub kind: MetricKind,
    pub of: Option<&'static str>,
    pub min: f64,
    pub max: f64,
}

const fn band(name: &'static str, kind: MetricKind, min: f64, max: f64) -> FieldBand {
    FieldBand {
        name,
        kind,
        of: None,
        min,
        max,
    }
}

// Drawn as a multiple of an earlier field in the same table.
const fn share(
    name: &'static str,
    kind: MetricKind,
    of: &'static str,
    min: f64,
    max: f64,
) -> FieldBand {
    FieldBand {
        name,
        kind,
        of: Some(of),
        min,
        max,
    }
}

// Yearly reach is a multiple of the population so that a month lands at
// roughly a quarter to two thirds of it.
const NEWS_GLOBAL: &[FieldBand] = &[
    band(REGISTERED_VISITORS, MetricKind::Level, 8_000.0, 25_000.0),
    share(UNIQUE_VISITORS, MetricKind::Count, REGISTERED_VISITORS, 3.0, 8.0),
    share(VISITS, MetricKind::Count, UNIQUE_VISITORS, 1.8, 4.0),
    share(ENGAGED, MetricKind::Count, UNIQUE_VISITORS, 0.12, 0.40),
    share(LIKES, MetricKind::Count, ENGAGED, 0.4, 0.9),
    share(COMMENTS, MetricKind::Count, LIKES, 0.08, 0.3),
    share(SHARES, MetricKind::Count, LIKES, 0.04, 0.2),
];

const CHAT_GLOBAL: &[FieldBand] = &[
    band(REGISTERED_USERS, MetricKind::Level, 800.0, 6_000.0),
    share(ACTIVE_USERS, MetricKind::Count, REGISTERED_USERS, 3.0, 8.0),
    share(MESSAGES_SENT, MetricKind::Count, ACTIVE_USERS, 8.0, 40.0),
    band(CHANNELS_ACTIVE, MetricKind::Level, 20.0, 300.0),
];

const PAGES_GLOBAL: &[FieldBand] = &[
    band(VISITS, MetricKind::Count, 40_000.0, 200_000.0),
    band(UNIQUE_VISITORS, MetricKind::Count, 15_000.0, 70_000.0),
    band(AVG_TIME_ON_PAGE, MetricKind::Rate, 30.0, 240.0),
];

const REACH_ENTITY: &[FieldBand] = &[
    band(POTENTIAL_REACH, MetricKind::Level, 150.0, 6_000.0),
    band(VISITED_RATE, MetricKind::Rate, 0.35, 0.98),
    band(ENGAGED_RATE, MetricKind::Rate, 0.05, 0.60),
];

const NEWSLETTER: &[FieldBand] = &[
    band(RECIPIENTS, MetricKind::Level, 200.0, 8_000.0),
    band(DELIVERY_RATE, MetricKind::Rate, 0.92, 0.995),
    band(OPEN_RATE, MetricKind::Rate, 0.35, 0.95),
    band(CLICK_RATE, MetricKind::Rate, 0.05, 0.50),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    NewsGlobal,
    ChatGlobal,
    PagesGlobal,
    Campaign,
    Post,
    Newsletter,
}

impl Profile {
    pub fn for_scope(domain: Domain, entity: EntityKind) -> Self {
        match (domain, entity) {
            (_, EntityKind::Campaign) => Profile::Campaign,
            (_, EntityKind::Post) => Profile::Post,
            (_, EntityKind::Newsletter) | (Domain::Newsletter, _) => Profile::Newsletter,
            (Domain::News, EntityKind::Global) => Profile::NewsGlobal,
            (Domain::Chat, EntityKind::Global) => Profile::ChatGlobal,
            (Domain::Pages, EntityKind::Global) => Profile::PagesGlobal,
        }
    }

    pub fn fields(self) -> &'static [FieldBand] {
        match self {
            Profile::NewsGlobal => NEWS_GLOBAL,
            Profile::ChatGlobal => CHAT_GLOBAL,
            Profile::PagesGlobal => PAGES_GLOBAL,
            Profile::Campaign | Profile::Post => REACH_ENTITY,
            Profile::Newsletter => NEWSLETTER,
        }
    }

    pub fn ordering(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Profile::NewsGlobal => &[(UNIQUE_VISITORS, VISITS), (ENGAGED, UNIQUE_VISITORS)],
            Profile::ChatGlobal => &[(ACTIVE_USERS, MESSAGES_SENT)],
            Profile::PagesGlobal => &[(UNIQUE_VISITORS, VISITS)],
            Profile::Campaign | Profile::Post => &[(ENGAGED_RATE, VISITED_RATE)],
            Profile::Newsletter => &[(CLICK_RATE, OPEN_RATE)],
        }
    }

    pub fn ceilings(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Profile::NewsGlobal => &[(UNIQUE_VISITORS, REGISTERED_VISITORS)],
            Profile::ChatGlobal => &[(ACTIVE_USERS, REGISTERED_USERS)],
            _ => &[],
        }
    }

    pub fn field_names(self) -> Vec<&'static str> {
        self.fields().iter().map(|field| field.name).collect()
    }
}

pub fn generate_baseline<R: Rng>(profile: Profile, rng: &mut R) -> MetricSet {
    let mut set = MetricSet::new();
    for field in profile.fields() {
        let drawn = if field.max > field.min {
            rng.gen_range(field.min..=field.max)
        } else {
            field.min
        };
        let raw = match field.of {
            Some(base) => set.value(base) * drawn,
            None => drawn,
        };
        let value = match field.kind {
            MetricKind::Count | MetricKind::Level => raw.round(),
            MetricKind::Rate => raw,
        };
        set.insert(field.name, value, field.kind);
    }
    enforce_ordering(&mut set, profile.ordering(), rng);
    set
}

// Chains must be listed outermost pair first.
pub fn enforce_ordering<R: Rng>(
    set: &mut MetricSet,
    pairs: &[(&'static str, &'static str)],
    rng: &mut R,
) {
    for (lesser, greater) in pairs {
        let (Some(low), Some(high)) = (set.get(lesser), set.get(greater)) else {
            continue;
        };
        if low <= high {
            continue;
        }
        let redrawn = high * rng.gen_range(0.35..0.85);
        let value = match set.kind(lesser) {
            Some(MetricKind::Rate) | None => redrawn,
            Some(_) => redrawn.floor().max(if high >= 1.0 { 1.0 } else { 0.0 }),
        };
        set.set_value(lesser, value.min(high));
    }
}

// Shrinks every count by one factor, so ratios between counts survive.
pub fn enforce_ceilings<R: Rng>(
    set: &mut MetricSet,
    ceilings: &[(&'static str, &'static str)],
    rng: &mut R,
) {
    for (reach, population) in ceilings {
        let (Some(value), Some(ceiling)) = (set.get(reach), set.get(population)) else {
            continue;
        };
        if value <= ceiling {
            continue;
        }
        let factor = ceiling * rng.gen_range(0.55..0.9) / value;
        let counts: Vec<(String, f64)> = set
            .iter()
            .filter(|(_, metric)| metric.kind == MetricKind::Count)
            .map(|(name, metric)| (name.clone(), metric.value))
            .collect();
        for (name, original) in counts {
            let shrunk = (original * factor).round();
            let shrunk = if original > 0.0 { shrunk.max(1.0) } else { 0.0 };
            set.set_value(&name, shrunk.min(original));
        }
        set.set_value(reach, (value * factor).round().min(ceiling).max(0.0));
    }
}
