pub mod alert;
pub mod rule;
pub mod scan;

pub use alert::{Alert, RawHit, Severity};
pub use rule::{MonitoringRule, RuleError, RuleUpdate, Source};
pub use scan::{CrawlSummary, FetchResult, FieldDescriptor, FormDescriptor, ScanResult};
