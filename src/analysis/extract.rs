use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::{FieldDescriptor, FormDescriptor};

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid title selector"));
static LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], link[href]").expect("valid link selector"));
static FORMS: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("valid form selector"));
static FIELDS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, textarea, select").expect("valid field selector"));
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});

const NON_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
    pub forms: Vec<FormDescriptor>,
    pub emails: Vec<String>,
}

/// Extracts title, capped text, in-scope links, forms and emails from a page.
///
/// Malformed markup never fails: the parser recovers and missing parts come back empty.
/// Links are resolved against `base_url` and kept only when their host ends with
/// `address_suffix`; order of first appearance is preserved.
pub fn analyze(html: &str, base_url: &str, address_suffix: &str, max_chars: usize) -> PageAnalysis {
    let document = Html::parse_document(html);
    PageAnalysis {
        title: extract_title(&document),
        text: extract_text(&document, max_chars),
        links: extract_links(&document, base_url, address_suffix),
        forms: extract_forms(&document),
        emails: extract_emails(html),
    }
}

pub fn in_scope(url: &str, address_suffix: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    parsed
        .host_str()
        .map(|host| {
            host.to_ascii_lowercase()
                .ends_with(&address_suffix.to_ascii_lowercase())
        })
        .unwrap_or(false)
}

fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE)
        .next()
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .unwrap_or_default()
}

fn extract_text(document: &Html, max_chars: usize) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|parent| NON_TEXT_ELEMENTS.contains(&parent.value().name()))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            text.push(' ');
            text.push_str(chunk);
        }
    }
    collapse_whitespace(&text).chars().take(max_chars).collect()
}

fn extract_links(document: &Html, base_url: &str, address_suffix: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let mut links: Vec<String> = Vec::new();
    for element in document.select(&LINKS) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let resolved = match &base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(mut resolved) = resolved else {
            continue;
        };
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if in_scope(&resolved, address_suffix) && !links.contains(&resolved) {
            links.push(resolved);
        }
    }
    links
}

fn extract_forms(document: &Html) -> Vec<FormDescriptor> {
    document
        .select(&FORMS)
        .map(|form| {
            let attrs = form.value();
            let fields = form
                .select(&FIELDS)
                .map(|field| {
                    let attrs = field.value();
                    FieldDescriptor {
                        field_type: attrs.attr("type").unwrap_or("text").to_string(),
                        name: attrs.attr("name").unwrap_or_default().to_string(),
                        placeholder: attrs.attr("placeholder").unwrap_or_default().to_string(),
                        required: attrs.attr("required").is_some(),
                    }
                })
                .collect();
            FormDescriptor {
                action: attrs.attr("action").unwrap_or_default().to_string(),
                method: attrs.attr("method").unwrap_or("GET").to_uppercase(),
                fields,
            }
        })
        .collect()
}

fn extract_emails(raw: &str) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for found in EMAIL_REGEX.find_iter(raw) {
        let email = found.as_str().to_string();
        if !emails.contains(&email) {
            emails.push(email);
        }
    }
    emails
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://abcdefghijklmnop.onion/forum/";

    #[test]
    fn keeps_only_onion_links_resolved_and_deduplicated() {
        let html = r#"
            <html><head><link rel="stylesheet" href="/style.css"></head><body>
                <a href="thread/1">Thread</a>
                <a href="thread/1#reply">Thread again</a>
                <a href="http://otherhiddensvc.onion/">Other</a>
                <a href="https://clearnet.example.com/">Clearnet</a>
                <a href="mailto:admin@market.onion">Mail</a>
                <a href="">Empty</a>
            </body></html>
        "#;
        let page = analyze(html, BASE, ".onion", 5_000);
        assert_eq!(
            page.links,
            vec![
                "http://abcdefghijklmnop.onion/style.css".to_string(),
                "http://abcdefghijklmnop.onion/forum/thread/1".to_string(),
                "http://otherhiddensvc.onion/".to_string(),
            ]
        );
    }

    #[test]
    fn extracts_title_and_caps_text() {
        let html = "<html><head><title>  Hidden\n Market </title><script>var x = 1;</script></head>\
                    <body><p>Привет мир</p><p>buy sell</p></body></html>";
        let page = analyze(html, BASE, ".onion", 8);
        assert_eq!(page.title, "Hidden Market");
        assert_eq!(page.text.chars().count(), 8);
        assert!(page.text.starts_with("Hidden"));

        let full = analyze(html, BASE, ".onion", 5_000);
        assert!(full.text.contains("Привет мир"));
        assert!(!full.text.contains("var x"));
    }

    #[test]
    fn extracts_forms_with_field_details() {
        let html = r#"
            <form action="/login" method="post">
                <input type="text" name="username" placeholder="User" required>
                <input type="password" name="password">
                <textarea name="note"></textarea>
            </form>
            <form><select name="category"></select></form>
        "#;
        let page = analyze(html, BASE, ".onion", 5_000);
        assert_eq!(page.forms.len(), 2);
        let login = &page.forms[0];
        assert_eq!(login.action, "/login");
        assert_eq!(login.method, "POST");
        assert_eq!(login.fields.len(), 3);
        assert_eq!(login.fields[0].placeholder, "User");
        assert!(login.fields[0].required);
        assert!(!login.fields[1].required);
        assert_eq!(login.fields[2].field_type, "text");
        assert_eq!(page.forms[1].method, "GET");
        assert_eq!(page.forms[1].action, "");
    }

    #[test]
    fn extracts_unique_emails_from_raw_markup() {
        let html = r#"<p>contact admin@market.onion or admin@market.onion</p>
                      <a href="mailto:sales@vendor.net">sales</a>"#;
        let page = analyze(html, BASE, ".onion", 5_000);
        assert_eq!(
            page.emails,
            vec!["admin@market.onion".to_string(), "sales@vendor.net".to_string()]
        );
    }

    #[test]
    fn malformed_markup_degrades_to_defaults() {
        let page = analyze("<<<>>> <a href=", "not a base", ".onion", 5_000);
        assert!(page.title.is_empty());
        assert!(page.links.is_empty());
        assert!(page.forms.is_empty());
    }

    #[test]
    fn scope_requires_http_and_suffix() {
        assert!(in_scope("http://abc.onion/x", ".onion"));
        assert!(in_scope("https://ABC.ONION/", ".onion"));
        assert!(!in_scope("ftp://abc.onion/", ".onion"));
        assert!(!in_scope("http://onion.example.com/", ".onion"));
        assert!(!in_scope("relative/path", ".onion"));
    }
}
