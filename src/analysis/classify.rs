use serde::Serialize;

use crate::domain::{FormDescriptor, ScanResult};

const INTEREST_KEYWORDS: &[&str] = &[
    "marketplace",
    "market",
    "shop",
    "store",
    "buy",
    "sell",
    "forum",
    "board",
    "discussion",
    "community",
    "leak",
    "database",
    "dump",
    "breach",
    "hack",
    "drugs",
    "weapons",
    "counterfeit",
    "fraud",
    "bitcoin",
    "cryptocurrency",
    "payment",
    "escrow",
    "login",
    "register",
    "account",
    "profile",
];

const MARKETPLACE_INDICATORS: &[&str] = &["buy", "sell", "price", "payment", "escrow", "vendor"];
const MARKETPLACE_THRESHOLD: usize = 3;

const SUSPICIOUS_WORDS: &[&str] = &["hack", "crack", "stolen", "leaked", "dump", "breach"];

const IDENTITY_FIELDS: &[&str] = &["username", "email", "login"];
const SECRET_FIELDS: &[&str] = &["password", "pass"];
const REGISTRATION_FIELDS: &[&str] = &["register", "signup", "email"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentClassification {
    pub keywords_found: Vec<String>,
    pub potential_marketplace: bool,
    pub has_login_form: bool,
    pub has_registration_form: bool,
    pub suspicious_indicators: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentReport {
    #[serde(flatten)]
    pub classification: ContentClassification,
    pub email_count: usize,
    pub link_count: usize,
    pub form_count: usize,
    pub content_length: usize,
}

pub fn classify(text: &str, forms: &[FormDescriptor]) -> ContentClassification {
    let lowered = text.to_lowercase();
    let matching = |terms: &[&str]| -> Vec<String> {
        terms
            .iter()
            .filter(|term| lowered.contains(*term))
            .map(|term| term.to_string())
            .collect()
    };

    let marketplace_hits = MARKETPLACE_INDICATORS
        .iter()
        .filter(|term| lowered.contains(*term))
        .count();

    // Login detection is per form: the identity and secret fields must share one form.
    let has_login_form = forms.iter().any(|form| {
        let names: Vec<String> = form.field_names_lower().collect();
        names.iter().any(|n| IDENTITY_FIELDS.contains(&n.as_str()))
            && names.iter().any(|n| SECRET_FIELDS.contains(&n.as_str()))
    });
    let has_registration_form = forms.iter().any(|form| {
        form.field_names_lower()
            .any(|n| REGISTRATION_FIELDS.contains(&n.as_str()))
    });

    ContentClassification {
        keywords_found: matching(INTEREST_KEYWORDS),
        potential_marketplace: marketplace_hits >= MARKETPLACE_THRESHOLD,
        has_login_form,
        has_registration_form,
        suspicious_indicators: matching(SUSPICIOUS_WORDS),
    }
}

pub fn classify_result(result: &ScanResult) -> ContentReport {
    ContentReport {
        classification: classify(&result.content, &result.forms),
        email_count: result.emails.len(),
        link_count: result.links.len(),
        form_count: result.forms.len(),
        content_length: result.content.chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldDescriptor;

    fn form(names: &[&str]) -> FormDescriptor {
        FormDescriptor {
            action: String::new(),
            method: "POST".into(),
            fields: names
                .iter()
                .map(|name| FieldDescriptor {
                    field_type: "text".into(),
                    name: name.to_string(),
                    placeholder: String::new(),
                    required: false,
                })
                .collect(),
        }
    }

    #[test]
    fn marketplace_needs_three_indicators() {
        let two = classify("Buy now, best PRICE", &[]);
        assert!(!two.potential_marketplace);
        let three = classify("Buy now, best PRICE, trusted Vendor", &[]);
        assert!(three.potential_marketplace);
        assert!(three.keywords_found.contains(&"buy".to_string()));
    }

    #[test]
    fn login_requires_both_fields_in_the_same_form() {
        let split = classify("", &[form(&["Username"]), form(&["password"])]);
        assert!(!split.has_login_form);

        let joined = classify("", &[form(&["login", "PASS"])]);
        assert!(joined.has_login_form);
        assert!(!joined.has_registration_form);
    }

    #[test]
    fn email_field_marks_registration() {
        let result = classify("", &[form(&["email", "password"])]);
        assert!(result.has_login_form);
        assert!(result.has_registration_form);
    }

    #[test]
    fn suspicious_terms_are_case_folded() {
        let result = classify("Fresh LEAKED combo list, stolen cards", &[]);
        assert_eq!(
            result.suspicious_indicators,
            vec!["stolen".to_string(), "leaked".to_string()]
        );
        assert!(result.keywords_found.contains(&"leak".to_string()));
    }

    #[test]
    fn report_counts_page_features() {
        let result = ScanResult {
            url: "http://a.onion/".into(),
            depth: 0,
            title: String::new(),
            content: "escrow".into(),
            links: vec!["http://b.onion/".into()],
            forms: vec![form(&["q"])],
            emails: vec![],
            status: 200,
            error: None,
            timestamp: chrono::Utc::now(),
        };
        let report = classify_result(&result);
        assert_eq!(report.link_count, 1);
        assert_eq!(report.form_count, 1);
        assert_eq!(report.email_count, 0);
        assert_eq!(report.content_length, 6);
        assert_eq!(report.classification.keywords_found, vec!["escrow".to_string()]);
    }
}
