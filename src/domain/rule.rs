use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {0} has a cadence of 0 minutes")]
    ZeroCadence(String),
    #[error("rule {0} has no keywords")]
    EmptyKeywords(String),
    #[error("rule {0} has no sources")]
    EmptySources(String),
    #[error("rule id must not be empty")]
    EmptyId,
    #[error("unknown rule: {0}")]
    UnknownRule(String),
    #[error("unknown rule template: {0}")]
    UnknownTemplate(String),
    #[error("unknown source: {0}")]
    UnknownSource(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Google,
    Darkweb,
    SocialMedia,
    PasteSites,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Google => "google",
            Source::Darkweb => "darkweb",
            Source::SocialMedia => "social_media",
            Source::PasteSites => "paste_sites",
        }
    }

    /// Rate bucket the source draws from. Everything answered by the search engine shares one.
    pub fn rate_bucket(&self) -> &'static str {
        match self {
            Source::Darkweb => "darkweb",
            Source::Google | Source::SocialMedia | Source::PasteSites => "google",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Source::Google),
            "darkweb" => Ok(Source::Darkweb),
            "social_media" => Ok(Source::SocialMedia),
            "paste_sites" => Ok(Source::PasteSites),
            other => Err(RuleError::UnknownSource(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRule {
    pub id: String,
    pub keywords: Vec<String>,
    pub sources: Vec<Source>,
    pub frequency_minutes: u32,
    pub enabled: bool,
    pub last_run: DateTime<Utc>,
    pub filters: BTreeMap<String, String>,
}

impl MonitoringRule {
    pub fn new(
        id: impl Into<String>,
        keywords: Vec<String>,
        sources: Vec<Source>,
        frequency_minutes: u32,
    ) -> Result<Self, RuleError> {
        let rule = Self {
            id: id.into(),
            keywords,
            sources,
            frequency_minutes,
            enabled: true,
            last_run: Utc::now(),
            filters: BTreeMap::new(),
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_last_run(mut self, last_run: DateTime<Utc>) -> Self {
        self.last_run = last_run;
        self
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::EmptyId);
        }
        if self.frequency_minutes == 0 {
            return Err(RuleError::ZeroCadence(self.id.clone()));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(RuleError::EmptyKeywords(self.id.clone()));
        }
        if self.sources.is_empty() {
            return Err(RuleError::EmptySources(self.id.clone()));
        }
        Ok(())
    }

    pub fn cadence(&self) -> Duration {
        Duration::minutes(i64::from(self.frequency_minutes))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && now - self.last_run >= self.cadence()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub keywords: Option<Vec<String>>,
    pub sources: Option<Vec<Source>>,
    pub frequency_minutes: Option<u32>,
    pub enabled: Option<bool>,
    pub filters: Option<BTreeMap<String, String>>,
}

impl RuleUpdate {
    pub fn applied_to(&self, rule: &MonitoringRule) -> Result<MonitoringRule, RuleError> {
        let mut updated = rule.clone();
        if let Some(keywords) = &self.keywords {
            updated.keywords = keywords.clone();
        }
        if let Some(sources) = &self.sources {
            updated.sources = sources.clone();
        }
        if let Some(frequency) = self.frequency_minutes {
            updated.frequency_minutes = frequency;
        }
        if let Some(enabled) = self.enabled {
            updated.enabled = enabled;
        }
        if let Some(filters) = &self.filters {
            updated.filters = filters.clone();
        }
        updated.validate()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(frequency: u32) -> Result<MonitoringRule, RuleError> {
        MonitoringRule::new("r1", vec!["acme".into()], vec![Source::Google], frequency)
    }

    #[test]
    fn zero_cadence_is_rejected() {
        assert_eq!(rule(0).unwrap_err(), RuleError::ZeroCadence("r1".into()));
    }

    #[test]
    fn empty_keywords_are_rejected() {
        let err = MonitoringRule::new("r1", vec![" ".into()], vec![Source::Google], 5).unwrap_err();
        assert_eq!(err, RuleError::EmptyKeywords("r1".into()));
    }

    #[test]
    fn due_only_after_full_cadence() {
        let start = Utc::now();
        let rule = rule(30).unwrap().with_last_run(start);
        assert!(!rule.is_due(start + Duration::minutes(29)));
        assert!(rule.is_due(start + Duration::minutes(30)));
        assert!(rule.is_due(start + Duration::minutes(45)));
    }

    #[test]
    fn disabled_rule_is_never_due() {
        let start = Utc::now();
        let mut rule = rule(1).unwrap().with_last_run(start);
        rule.enabled = false;
        assert!(!rule.is_due(start + Duration::hours(5)));
    }

    #[test]
    fn update_is_validated_before_applying() {
        let original = rule(10).unwrap();
        let bad = RuleUpdate {
            frequency_minutes: Some(0),
            ..Default::default()
        };
        assert!(bad.applied_to(&original).is_err());

        let good = RuleUpdate {
            enabled: Some(false),
            keywords: Some(vec!["globex".into()]),
            ..Default::default()
        };
        let updated = good.applied_to(&original).unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.keywords, vec!["globex".to_string()]);
        assert_eq!(updated.frequency_minutes, 10);
    }

    #[test]
    fn sources_parse_and_share_buckets() {
        assert_eq!("paste_sites".parse::<Source>().unwrap(), Source::PasteSites);
        assert!("irc".parse::<Source>().is_err());
        assert_eq!(Source::SocialMedia.rate_bucket(), "google");
        assert_eq!(Source::Darkweb.rate_bucket(), "darkweb");
    }
}
