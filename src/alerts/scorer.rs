use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{Alert, RawHit, Severity};

const CRITICAL_TERMS: &[&str] = &["hack", "breach", "leak", "dump", "stolen", "password", "database"];
const HIGH_TERMS: &[&str] = &["vulnerability", "exploit", "attack", "malware", "threat"];
const MEDIUM_TERMS: &[&str] = &["security", "risk", "warning", "suspicious"];

const BASE_CONFIDENCE: f64 = 0.5;

/// Severity and confidence for a keyword hit.
///
/// Tiers are checked from critical down and only the first matching tier counts, so a
/// critical term outranks any number of lower-tier terms.
pub fn score(keyword: &str, content: &str) -> (Severity, f64) {
    let lowered = content.to_lowercase();
    let mut confidence = BASE_CONFIDENCE;
    if lowered.contains(&keyword.to_lowercase()) {
        confidence += 0.3;
    }
    if content.contains(keyword) {
        confidence += 0.2;
    }

    let tiers: [(&[&str], Severity, f64); 3] = [
        (CRITICAL_TERMS, Severity::Critical, 0.2),
        (HIGH_TERMS, Severity::High, 0.15),
        (MEDIUM_TERMS, Severity::Medium, 0.1),
    ];
    let severity = tiers
        .iter()
        .find(|(terms, _, _)| terms.iter().any(|term| lowered.contains(term)))
        .map(|(_, severity, bonus)| {
            confidence += bonus;
            *severity
        })
        .unwrap_or(Severity::Low);

    (severity, confidence.clamp(0.0, 1.0))
}

/// The id digests keyword, address and content, so two versions of one page emitted in
/// the same millisecond still get distinct ids.
pub fn alert_from_hit(keyword: &str, hit: &RawHit, now: DateTime<Utc>) -> Alert {
    let (severity, confidence) = score(keyword, &hit.content);
    let digest = Sha256::new()
        .chain_update(keyword.as_bytes())
        .chain_update(b"|")
        .chain_update(hit.url.as_bytes())
        .chain_update(b"|")
        .chain_update(hit.content.as_bytes())
        .finalize();
    let id = format!(
        "{}_{}_{}",
        hit.source,
        &hex::encode(digest)[..16],
        now.timestamp_millis()
    );
    Alert {
        id,
        keyword: keyword.to_string(),
        source: hit.source.clone(),
        content: hit.content.clone(),
        url: hit.url.clone(),
        timestamp: now,
        severity,
        confidence,
    }
}
