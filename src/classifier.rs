use regex::Regex;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::store::EntityId;
use crate::{Domain, EntityKind};

const FILTER_PARAMS: &[&str] = &["audienceId", "channelId", "siteId", "groupId"];
const CONTENT_TYPE_CLAUSE: &str = "contentType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    NewsCampaignPosts,
    NewsCampaignStats,
    NewsCampaignRanking,
    NewsPostStats,
    NewsPostRanking,
    PagesRanking,
    NewsOverview,
    NewsTimeseries,
    ChatOverview,
    ChatTimeseries,
    PagesTimeseries,
    NewsletterStats,
    NewsletterTimeseries,
}

impl ResponseKind {
    pub const ALL: [ResponseKind; 13] = [
        ResponseKind::NewsCampaignPosts,
        ResponseKind::NewsCampaignStats,
        ResponseKind::NewsCampaignRanking,
        ResponseKind::NewsPostStats,
        ResponseKind::NewsPostRanking,
        ResponseKind::PagesRanking,
        ResponseKind::NewsOverview,
        ResponseKind::NewsTimeseries,
        ResponseKind::ChatOverview,
        ResponseKind::ChatTimeseries,
        ResponseKind::PagesTimeseries,
        ResponseKind::NewsletterStats,
        ResponseKind::NewsletterTimeseries,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResponseKind::NewsCampaignPosts => "news_campaign_posts",
            ResponseKind::NewsCampaignStats => "news_campaign_stats",
            ResponseKind::NewsCampaignRanking => "news_campaign_ranking",
            ResponseKind::NewsPostStats => "news_post_stats",
            ResponseKind::NewsPostRanking => "news_post_ranking",
            ResponseKind::PagesRanking => "pages_ranking",
            ResponseKind::NewsOverview => "news_overview",
            ResponseKind::NewsTimeseries => "news_timeseries",
            ResponseKind::ChatOverview => "chat_overview",
            ResponseKind::ChatTimeseries => "chat_timeseries",
            ResponseKind::PagesTimeseries => "pages_timeseries",
            ResponseKind::NewsletterStats => "newsletter_stats",
            ResponseKind::NewsletterTimeseries => "newsletter_timeseries",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase().replace('-', "_");
        ResponseKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.label() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Augment,
    Fabricate,
}

impl Policy {
    pub fn label(self) -> &'static str {
        match self {
            Policy::Augment => "augment",
            Policy::Fabricate => "fabricate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unrecognized {
    Empty,
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct EndpointSignature {
    pub kind: ResponseKind,
    pub domain: Domain,
    pub entity: EntityKind,
    pub method: Method,
    pub content_type: Option<&'static str>,
    pub policy: Policy,
    pub unrecognized: Unrecognized,
    path: Regex,
}

impl EndpointSignature {
    pub fn matches(
        &self,
        method: &Method,
        path: &str,
        query: &QueryParams,
    ) -> Option<Option<String>> {
        if &self.method != method {
            return None;
        }
        let captures = self.path.captures(path)?;
        if let Some(expected) = self.content_type {
            let actual = query.content_type.as_deref()?;
            if !actual.eq_ignore_ascii_case(expected) {
                return None;
            }
        }
        let id = captures
            .get(1)
            .map(|raw| decode_segment(raw.as_str()))
            .filter(|id| !id.is_empty());
        if !matches!(self.entity, EntityKind::Global) && id.is_none() {
            return None;
        }
        Some(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub since: Option<String>,
    pub until: Option<String>,
    pub group_by: Option<String>,
    pub content_type: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl QueryParams {
    pub fn from_url(url: &Url) -> Self {
        let mut params = QueryParams::default();
        for (key, value) in url.query_pairs() {
            let value = value.trim().to_string();
            match key.as_ref() {
                "since" | "from" | "startDate" => params.since = Some(value),
                "until" | "to" | "endDate" => params.until = Some(value),
                "groupBy" | "granularity" | "interval" => params.group_by = Some(value),
                "filter" => params.absorb_filter(&value),
                name if FILTER_PARAMS.contains(&name) && !value.is_empty() => {
                    params.filters.push((name.to_string(), value));
                }
                _ => {}
            }
        }
        params
    }

    fn absorb_filter(&mut self, raw: &str) {
        for clause in raw.split(|c: char| c == ';' || c == ',') {
            let Some((name, value)) = split_clause(clause) else {
                continue;
            };
            if name.eq_ignore_ascii_case(CONTENT_TYPE_CLAUSE) {
                self.content_type = Some(value.to_lowercase());
            } else {
                self.filters.push((name.to_string(), value.to_string()));
            }
        }
    }
}

fn split_clause(clause: &str) -> Option<(&str, &str)> {
    let clause = clause.trim();
    let (name, value) = ["==", "=", ":"]
        .iter()
        .find_map(|separator| clause.split_once(separator))?;
    let name = name.trim();
    let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Classified {
    pub kind: ResponseKind,
    pub domain: Domain,
    pub entity_kind: EntityKind,
    pub entity: EntityId,
    pub raw_id: Option<String>,
    pub policy: Policy,
    pub unrecognized: Unrecognized,
    pub query: QueryParams,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: Vec<EndpointSignature>,
}

impl Classifier {
    pub fn new() -> Result<Self, String> {
        Self::with_policies(|_, policy| policy)
    }

    pub fn with_policies<F>(policy_for: F) -> Result<Self, String>
    where
        F: Fn(ResponseKind, Policy) -> Policy,
    {
        let signatures = SIGNATURES
            .iter()
            .map(|spec| {
                let path = Regex::new(spec.path)
                    .map_err(|err| format!("invalid signature for {}: {}", spec.kind.label(), err))?;
                Ok(EndpointSignature {
                    kind: spec.kind,
                    domain: spec.domain,
                    entity: spec.entity,
                    method: Method::GET,
                    content_type: spec.content_type,
                    policy: policy_for(spec.kind, spec.policy),
                    unrecognized: spec.unrecognized,
                    path,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self { signatures })
    }

    pub fn signatures(&self) -> &[EndpointSignature] {
        &self.signatures
    }

    pub fn classify(&self, method: &Method, url: &str) -> Option<Classified> {
        self.classify_where(method, url, |_| true)
    }

    pub fn classify_enabled(
        &self,
        method: &Method,
        url: &str,
        domains: &BTreeSet<Domain>,
    ) -> Option<Classified> {
        if domains.is_empty() {
            return None;
        }
        self.classify_where(method, url, |domain| domains.contains(&domain))
    }

    fn classify_where<F>(&self, method: &Method, url: &str, enabled: F) -> Option<Classified>
    where
        F: Fn(Domain) -> bool,
    {
        let parsed = Url::parse(url).ok()?;
        let path = parsed.path();
        let query = QueryParams::from_url(&parsed);

        self.signatures
            .iter()
            .filter(|signature| enabled(signature.domain))
            .find_map(|signature| {
                let id = signature.matches(method, path, &query)?;
                let entity = match id.as_deref() {
                    Some(raw) => EntityId::scoped(signature.domain, signature.entity, raw),
                    None => EntityId::global(signature.domain),
                };
                Some(Classified {
                    kind: signature.kind,
                    domain: signature.domain,
                    entity_kind: signature.entity,
                    entity,
                    raw_id: id,
                    policy: signature.policy,
                    unrecognized: signature.unrecognized,
                    query: query.clone(),
                })
            })
    }
}

struct SignatureSpec {
    kind: ResponseKind,
    domain: Domain,
    entity: EntityKind,
    path: &'static str,
    content_type: Option<&'static str>,
    policy: Policy,
    unrecognized: Unrecognized,
}

const fn spec(
    kind: ResponseKind,
    domain: Domain,
    entity: EntityKind,
    path: &'static str,
    policy: Policy,
) -> SignatureSpec {
    SignatureSpec {
        kind,
        domain,
        entity,
        path,
        content_type: None,
        policy,
        unrecognized: Unrecognized::Empty,
    }
}

const fn filtered(signature: SignatureSpec, content_type: &'static str) -> SignatureSpec {
    SignatureSpec {
        content_type: Some(content_type),
        ..signature
    }
}

const fn passthrough(signature: SignatureSpec) -> SignatureSpec {
    SignatureSpec {
        unrecognized: Unrecognized::Passthrough,
        ..signature
    }
}

// Priority order: entity-scoped paths before the shorter paths they extend.
const SIGNATURES: &[SignatureSpec] = &[
    spec(
        ResponseKind::NewsCampaignPosts,
        Domain::News,
        EntityKind::Campaign,
        r"/api/v1/analytics/news/campaigns/([^/]+)/posts/?$",
        Policy::Augment,
    ),
    passthrough(spec(
        ResponseKind::NewsCampaignStats,
        Domain::News,
        EntityKind::Campaign,
        r"/api/v1/analytics/news/campaigns/([^/]+)/stats/?$",
        Policy::Augment,
    )),
    spec(
        ResponseKind::NewsCampaignRanking,
        Domain::News,
        EntityKind::Global,
        r"/api/v1/analytics/news/campaigns/ranking/?$",
        Policy::Augment,
    ),
    passthrough(spec(
        ResponseKind::NewsPostStats,
        Domain::News,
        EntityKind::Post,
        r"/api/v1/analytics/news/posts/([^/]+)/stats/?$",
        Policy::Augment,
    )),
    filtered(
        spec(
            ResponseKind::NewsPostRanking,
            Domain::News,
            EntityKind::Global,
            r"/api/v1/analytics/contents/ranking/?$",
            Policy::Augment,
        ),
        "post",
    ),
    filtered(
        spec(
            ResponseKind::PagesRanking,
            Domain::Pages,
            EntityKind::Global,
            r"/api/v1/analytics/contents/ranking/?$",
            Policy::Augment,
        ),
        "page",
    ),
    spec(
        ResponseKind::NewsOverview,
        Domain::News,
        EntityKind::Global,
        r"/api/v1/analytics/news/overview/?$",
        Policy::Fabricate,
    ),
    spec(
        ResponseKind::NewsTimeseries,
        Domain::News,
        EntityKind::Global,
        r"/api/v1/analytics/news/timeseries/?$",
        Policy::Fabricate,
    ),
    spec(
        ResponseKind::ChatOverview,
        Domain::Chat,
        EntityKind::Global,
        r"/api/v1/analytics/chat/overview/?$",
        Policy::Fabricate,
    ),
    spec(
        ResponseKind::ChatTimeseries,
        Domain::Chat,
        EntityKind::Global,
        r"/api/v1/analytics/chat/timeseries/?$",
        Policy::Fabricate,
    ),
    spec(
        ResponseKind::PagesTimeseries,
        Domain::Pages,
        EntityKind::Global,
        r"/api/v1/analytics/pages/timeseries/?$",
        Policy::Fabricate,
    ),
    passthrough(spec(
        ResponseKind::NewsletterStats,
        Domain::Newsletter,
        EntityKind::Newsletter,
        r"/api/v1/analytics/newsletters/([^/]+)/stats/?$",
        Policy::Augment,
    )),
    spec(
        ResponseKind::NewsletterTimeseries,
        Domain::Newsletter,
        EntityKind::Newsletter,
        r"/api/v1/analytics/newsletters/([^/]+)/timeseries/?$",
        Policy::Fabricate,
    ),
];
