use chrono::{DateTime, Utc};

use crate::domain::{MonitoringRule, RuleError, Source};

pub struct RuleTemplate {
    pub name: &'static str,
    pub sources: &'static [Source],
    pub frequency_minutes: u32,
    pub filters: &'static [(&'static str, &'static str)],
}

pub const TEMPLATES: &[RuleTemplate] = &[
    RuleTemplate {
        name: "security_monitoring",
        sources: &[Source::Google, Source::Darkweb, Source::PasteSites],
        frequency_minutes: 60,
        filters: &[("date_range", "1d")],
    },
    RuleTemplate {
        name: "brand_monitoring",
        sources: &[Source::Google, Source::SocialMedia],
        frequency_minutes: 30,
        filters: &[],
    },
    RuleTemplate {
        name: "threat_intelligence",
        sources: &[Source::Darkweb, Source::PasteSites],
        frequency_minutes: 120,
        filters: &[],
    },
];

pub fn template(name: &str) -> Option<&'static RuleTemplate> {
    TEMPLATES.iter().find(|template| template.name == name)
}

pub fn create_rule_from_template(
    name: &str,
    keywords: Vec<String>,
    now: DateTime<Utc>,
) -> Result<MonitoringRule, RuleError> {
    let template = template(name).ok_or_else(|| RuleError::UnknownTemplate(name.to_string()))?;
    let rule = MonitoringRule::new(
        format!("{}_{}", template.name, now.timestamp()),
        keywords,
        template.sources.to_vec(),
        template.frequency_minutes,
    )?;
    Ok(template
        .filters
        .iter()
        .fold(rule.with_last_run(now), |rule, (key, value)| {
            rule.with_filter(*key, *value)
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_template_carries_date_filter() {
        let now = Utc::now();
        let rule = create_rule_from_template("security_monitoring", vec!["acme".into()], now).unwrap();
        assert_eq!(rule.id, format!("security_monitoring_{}", now.timestamp()));
        assert_eq!(rule.sources, vec![Source::Google, Source::Darkweb, Source::PasteSites]);
        assert_eq!(rule.frequency_minutes, 60);
        assert_eq!(rule.filters.get("date_range").map(String::as_str), Some("1d"));
        assert_eq!(rule.last_run, now);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let err = create_rule_from_template("nope", vec!["acme".into()], Utc::now()).unwrap_err();
        assert_eq!(err, RuleError::UnknownTemplate("nope".into()));
    }

    #[test]
    fn template_rules_still_need_keywords() {
        let err = create_rule_from_template("brand_monitoring", vec![], Utc::now()).unwrap_err();
        assert!(matches!(err, RuleError::EmptyKeywords(_)));
    }
}
