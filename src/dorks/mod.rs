//! Structured search-engine queries ("dorks") built from a fixed template table, plus a
//! client that runs them and parses the result pages.

pub mod search;

use once_cell::sync::Lazy;
use regex::Regex;

pub use search::{summarize_hits, HitSummary, SearchEngine, SearchHit};

type TemplateTable = &'static [(&'static str, &'static [(&'static str, &'static str)])];

const TEMPLATES: TemplateTable = &[
    (
        "file_types",
        &[
            ("pdf", r#"filetype:pdf "{query}""#),
            ("doc", r#"filetype:doc OR filetype:docx "{query}""#),
            ("xls", r#"filetype:xls OR filetype:xlsx "{query}""#),
            ("ppt", r#"filetype:ppt OR filetype:pptx "{query}""#),
            ("txt", r#"filetype:txt "{query}""#),
            ("sql", r#"filetype:sql "{query}""#),
            ("log", r#"filetype:log "{query}""#),
            ("backup", r#"filetype:bak OR filetype:backup "{query}""#),
        ],
    ),
    (
        "sensitive_info",
        &[
            ("login_pages", r#"inurl:login OR inurl:signin OR inurl:admin "{query}""#),
            ("config_files", r#"filetype:conf OR filetype:config OR filetype:ini "{query}""#),
            ("database_dumps", r#"filetype:sql OR "database dump" "{query}""#),
            ("api_keys", r#""api_key" OR "api-key" OR "apikey" "{query}""#),
            ("passwords", r#"filetype:txt "password" "{query}""#),
            ("emails", "@{query} filetype:txt OR filetype:pdf OR filetype:doc"),
            ("phone_numbers", r#""{query}" phone OR mobile OR cell"#),
            ("social_security", r#""{query}" ssn OR "social security""#),
        ],
    ),
    (
        "social_media",
        &[
            ("twitter", r#"site:twitter.com "{query}""#),
            ("facebook", r#"site:facebook.com "{query}""#),
            ("linkedin", r#"site:linkedin.com "{query}""#),
            ("instagram", r#"site:instagram.com "{query}""#),
            ("github", r#"site:github.com "{query}""#),
            ("pastebin", r#"site:pastebin.com "{query}""#),
        ],
    ),
    (
        "vulnerabilities",
        &[
            ("directory_listing", r#"intitle:"index of" "{query}""#),
            ("error_pages", r#"intext:"error" OR intext:"warning" "{query}""#),
            ("debug_info", r#"intext:"debug" OR intext:"trace" "{query}""#),
            ("version_info", r#"intext:"version" OR intext:"build" "{query}""#),
        ],
    ),
    (
        "domain_info",
        &[
            ("subdomains", "site:{query} -www"),
            ("specific_site", "site:{query}"),
            ("exclude_site", r#""{query}" -site:{exclude}"#),
            ("related_sites", "related:{query}"),
        ],
    ),
];

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[A-Za-z_]+\}").expect("valid placeholder regex"));

pub fn template(category: &str, subcategory: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(name, _)| *name == category)
        .and_then(|(_, entries)| entries.iter().find(|(name, _)| *name == subcategory))
        .map(|(_, template)| *template)
}

pub fn categories() -> impl Iterator<Item = (&'static str, Vec<&'static str>)> {
    TEMPLATES
        .iter()
        .map(|(name, entries)| (*name, entries.iter().map(|(sub, _)| *sub).collect()))
}

/// Fills a template. Unknown category or subcategory yields `query` unchanged.
///
/// `extra` supplies named placeholders other than `{query}`. A template clause whose
/// placeholder is not supplied is dropped rather than sent with a literal `{name}`.
pub fn build(category: &str, subcategory: &str, query: &str, extra: &[(&str, &str)]) -> String {
    let Some(template) = template(category, subcategory) else {
        return query.to_string();
    };
    if !template.contains("{query}") {
        return format!("{template} {query}");
    }

    let missing: Vec<&str> = PLACEHOLDER
        .find_iter(template)
        .map(|m| m.as_str())
        .filter(|placeholder| *placeholder != "{query}")
        .filter(|placeholder| !extra.iter().any(|(name, _)| format!("{{{name}}}") == *placeholder))
        .collect();
    let mut dork = if missing.is_empty() {
        template.to_string()
    } else {
        template
            .split(' ')
            .filter(|clause| !missing.iter().any(|placeholder| clause.contains(placeholder)))
            .collect::<Vec<_>>()
            .join(" ")
    };
    for (name, value) in extra {
        dork = dork.replace(&format!("{{{name}}}"), value);
    }
    dork.replace("{query}", query)
}

pub fn file_type(query: &str, file_type: &str) -> String {
    match template("file_types", file_type) {
        Some(_) => build("file_types", file_type, query, &[]),
        None => format!(r#"filetype:{file_type} "{query}""#),
    }
}

pub fn social_media(query: &str, platform: &str) -> String {
    match template("social_media", platform) {
        Some(_) => build("social_media", platform, query, &[]),
        None => format!(r#"site:{platform}.com "{query}""#),
    }
}

/// `exclude` only applies to the `exclude_site` kind. Unknown kinds search the whole site.
pub fn domain(domain: &str, kind: &str, exclude: Option<&str>) -> String {
    if template("domain_info", kind).is_none() {
        return format!("site:{domain}");
    }
    match exclude {
        Some(excluded) if kind == "exclude_site" => {
            build("domain_info", kind, domain, &[("exclude", excluded)])
        }
        _ => build("domain_info", kind, domain, &[]),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for OperatorValue {
    fn from(value: &str) -> Self {
        OperatorValue::One(value.to_string())
    }
}

impl From<String> for OperatorValue {
    fn from(value: String) -> Self {
        OperatorValue::One(value)
    }
}

impl From<Vec<String>> for OperatorValue {
    fn from(values: Vec<String>) -> Self {
        OperatorValue::Many(values)
    }
}

impl OperatorValue {
    fn joined(&self, separator: &str) -> String {
        match self {
            OperatorValue::One(value) => value.clone(),
            OperatorValue::Many(values) => values.join(separator),
        }
    }
}

pub fn custom(query: &str, operators: &[(&str, OperatorValue)]) -> String {
    let mut parts = vec![query.to_string()];
    for (operator, value) in operators {
        let clause = match *operator {
            "site" => format!("site:{}", value.joined(" ")),
            "filetype" => format!("filetype:{}", value.joined(" ")),
            "inurl" => format!("inurl:{}", value.joined(" ")),
            "intitle" => format!("intitle:{}", value.joined(" ")),
            "intext" => format!("intext:{}", value.joined(" ")),
            "exclude_site" => format!("-site:{}", value.joined(" ")),
            "exclude_term" => format!("-{}", value.joined(" ")),
            "exact_phrase" => format!("\"{}\"", value.joined(" ")),
            "or_terms" => match value {
                OperatorValue::Many(terms) => terms.join(" OR "),
                OperatorValue::One(term) => format!("OR {term}"),
            },
            "wildcard" => format!("*{}*", value.joined(" ")),
            _ => continue,
        };
        parts.push(clause);
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_file_type_dork() {
        assert_eq!(build("file_types", "pdf", "invoice", &[]), r#"filetype:pdf "invoice""#);
    }

    #[test]
    fn unknown_keys_return_query_unchanged() {
        assert_eq!(build("unknown_cat", "x", "q", &[]), "q");
        assert_eq!(build("file_types", "exe", "q", &[]), "q");
    }

    #[test]
    fn extra_placeholders_are_substituted() {
        assert_eq!(
            build("domain_info", "exclude_site", "acme", &[("exclude", "acme.com")]),
            r#""acme" -site:acme.com"#
        );
    }

    #[test]
    fn missing_placeholder_drops_its_clause() {
        assert_eq!(build("domain_info", "exclude_site", "acme", &[]), r#""acme""#);
    }

    #[test]
    fn braces_in_the_query_are_kept() {
        assert_eq!(build("file_types", "pdf", "{x}", &[]), r#"filetype:pdf "{x}""#);
        assert_eq!(
            build("domain_info", "exclude_site", "{exclude}", &[]),
            r#""{exclude}""#
        );
    }

    #[test]
    fn unknown_types_fall_back_to_plain_operators() {
        assert_eq!(file_type("acme", "pdf"), r#"filetype:pdf "acme""#);
        assert_eq!(file_type("acme", "csv"), r#"filetype:csv "acme""#);
        assert_eq!(social_media("acme", "github"), r#"site:github.com "acme""#);
        assert_eq!(social_media("acme", "mastodon"), r#"site:mastodon.com "acme""#);
        assert_eq!(domain("acme.com", "whois", None), "site:acme.com");
        assert_eq!(domain("acme.com", "subdomains", None), "site:acme.com -www");
    }

    #[test]
    fn domain_exclusion_needs_exclude_kind() {
        assert_eq!(
            domain("acme", "exclude_site", Some("acme.com")),
            r#""acme" -site:acme.com"#
        );
        assert_eq!(domain("acme", "exclude_site", None), r#""acme""#);
        assert_eq!(domain("acme.com", "specific_site", Some("x.com")), "site:acme.com");
    }

    #[test]
    fn custom_appends_operators_in_order() {
        let dork = custom(
            "acme",
            &[
                ("intitle", "index of".into()),
                ("bogus", "ignored".into()),
                ("exclude_site", "acme.com".into()),
                ("or_terms", vec!["leak".to_string(), "dump".to_string()].into()),
                ("exact_phrase", "internal use only".into()),
                ("wildcard", "backup".into()),
                ("exclude_term", "jobs".into()),
            ],
        );
        assert_eq!(
            dork,
            r#"acme intitle:index of -site:acme.com leak OR dump "internal use only" *backup* -jobs"#
        );
    }

    #[test]
    fn custom_single_or_term_is_prefixed() {
        assert_eq!(custom("a", &[("or_terms", "b".into())]), "a OR b");
        assert_eq!(custom("a", &[]), "a");
    }

    #[test]
    fn every_template_mentions_query() {
        for (category, subs) in categories() {
            for sub in subs {
                assert!(template(category, sub).unwrap().contains("{query}"));
            }
        }
    }
}
