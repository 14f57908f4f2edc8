pub mod buffer;
pub mod dedup;
pub mod scorer;

use anyhow::Result;

use crate::domain::Alert;

pub use buffer::AlertBuffer;
pub use dedup::{fingerprint, SeenHits};
pub use scorer::{alert_from_hit, score};

pub fn export_json(alerts: &[Alert]) -> Result<String> {
    Ok(serde_json::to_string_pretty(alerts)?)
}
