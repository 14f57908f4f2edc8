use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uniform outcome of one fetch. Transport failures surface as `status == 0` with `error` set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn ok(status: u16, body: String) -> Self {
        Self {
            status,
            body,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: 0,
            body: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    pub placeholder: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDescriptor {
    pub action: String,
    pub method: String,
    pub fields: Vec<FieldDescriptor>,
}

impl FormDescriptor {
    pub fn field_names_lower(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.iter().map(|field| field.name.to_lowercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub url: String,
    pub depth: usize,
    pub title: String,
    pub content: String,
    pub links: Vec<String>,
    pub forms: Vec<FormDescriptor>,
    pub emails: Vec<String>,
    pub status: u16,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_links: usize,
    pub total_emails: usize,
    pub total_forms: usize,
    pub unique_domains: usize,
}
