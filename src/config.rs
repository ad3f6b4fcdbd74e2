use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::{Policy, ResponseKind};
use crate::distribute::DistributionConfig;
use crate::harmonize::HarmonizerConfig;
use crate::period::PeriodConfig;
use crate::Domain;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainFlags {
    pub news: bool,
    pub chat: bool,
    pub pages: bool,
    pub newsletter: bool,
}

impl Default for DomainFlags {
    fn default() -> Self {
        Self {
            news: true,
            chat: true,
            pages: true,
            newsletter: true,
        }
    }
}

impl DomainFlags {
    pub fn none() -> Self {
        Self {
            news: false,
            chat: false,
            pages: false,
            newsletter: false,
        }
    }

    pub fn enabled(&self, domain: Domain) -> bool {
        match domain {
            Domain::News => self.news,
            Domain::Chat => self.chat,
            Domain::Pages => self.pages,
            Domain::Newsletter => self.newsletter,
        }
    }

    pub fn set(&mut self, domain: Domain, enabled: bool) {
        match domain {
            Domain::News => self.news = enabled,
            Domain::Chat => self.chat = enabled,
            Domain::Pages => self.pages = enabled,
            Domain::Newsletter => self.newsletter = enabled,
        }
    }

    pub fn from_list(value: &str) -> Self {
        let mut flags = DomainFlags::none();
        for name in value.split(',') {
            if let Some(domain) = Domain::from_label(name) {
                flags.set(domain, true);
            }
        }
        flags
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePatterns {
    pub news: Vec<String>,
    pub chat: Vec<String>,
    pub pages: Vec<String>,
    pub newsletter: Vec<String>,
}

impl Default for PagePatterns {
    fn default() -> Self {
        Self {
            news: vec![r"/news(/|$|\?)".to_string(), r"/analytics/news".to_string()],
            chat: vec![r"/chat(/|$|\?)".to_string(), r"/analytics/chat".to_string()],
            pages: vec![r"/pages(/|$|\?)".to_string(), r"/analytics/pages".to_string()],
            newsletter: vec![r"/newsletters?(/|$|\?)".to_string()],
        }
    }
}

impl PagePatterns {
    pub fn for_domain(&self, domain: Domain) -> &[String] {
        match domain {
            Domain::News => &self.news,
            Domain::Chat => &self.chat,
            Domain::Pages => &self.pages,
            Domain::Newsletter => &self.newsletter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub ttl_secs: u64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub persist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rng_seed: Option<u64>,
    pub upstream: UpstreamConfig,
    pub flags: DomainFlags,
    pub pages: PagePatterns,
    pub baseline: BaselineConfig,
    pub period: PeriodConfig,
    pub distribution: DistributionConfig,
    pub harmonizer: HarmonizerConfig,
    pub policies: BTreeMap<String, Policy>,
    pub store: StoreConfig,
}

impl EngineConfig {
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), String> {
        let config_path = path.or_else(default_config_path);
        let mut config = if let Some(path) = config_path.as_ref() {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .map_err(|err| format!("failed to read config: {}", err))?;
                toml::from_str(&contents)
                    .map_err(|err| format!("failed to parse config: {}", err))?
            } else {
                EngineConfig::default()
            }
        } else {
            EngineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok((config, config_path))
    }

    pub fn write(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| format!("failed to create config dir: {}", err))?;
            }
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| format!("failed to serialize config: {}", err))?;
        std::fs::write(path, payload).map_err(|err| format!("failed to write config: {}", err))?;
        Ok(())
    }

    pub fn baseline_ttl(&self) -> Duration {
        Duration::from_secs(self.baseline.ttl_secs)
    }

    pub fn policy_override(&self, kind: ResponseKind) -> Option<Policy> {
        self.policies.get(kind.label()).copied()
    }

    pub fn validate(&self) -> Result<(), String> {
        for name in self.policies.keys() {
            if ResponseKind::from_label(name).is_none() {
                return Err(format!("unknown endpoint in [policies]: {}", name));
            }
        }
        if !(0.0..=1.0).contains(&self.period.filter_factor) {
            return Err(format!(
                "period.filter_factor must be within 0..=1, got {}",
                self.period.filter_factor
            ));
        }
        if self.harmonizer.cap >= 100.0 {
            return Err(format!("harmonizer.cap must stay below 100, got {}", self.harmonizer.cap));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("DEMO_UPSTREAM_URL") {
            if !url.trim().is_empty() {
                self.upstream.base_url = url;
            }
        }
        if let Ok(timeout) = env::var("DEMO_UPSTREAM_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.upstream.timeout_ms = value;
            }
        }
        if let Ok(ttl) = env::var("DEMO_BASELINE_TTL_SECS") {
            if let Ok(value) = ttl.parse::<u64>() {
                self.baseline.ttl_secs = value;
            }
        }
        if let Ok(path) = env::var("DEMO_STORE_PATH") {
            if !path.trim().is_empty() {
                self.store.persist_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(seed) = env::var("DEMO_RNG_SEED") {
            if let Ok(value) = seed.parse::<u64>() {
                self.rng_seed = Some(value);
            }
        }
        if let Ok(flags) = env::var("DEMO_FLAGS") {
            self.flags = DomainFlags::from_list(&flags);
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var("DEMO_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/demo.toml")))
}
