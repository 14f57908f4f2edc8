use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Alert, Severity};

/// Bounded in-memory alert history. Reads never remove entries; the oldest alert is
/// evicted once capacity is reached.
#[derive(Debug)]
pub struct AlertBuffer {
    capacity: usize,
    entries: VecDeque<Alert>,
}

impl AlertBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1_024)),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(alert);
    }

    pub fn recent(&self, hours: u32, now: DateTime<Utc>) -> Vec<Alert> {
        let cutoff = now - Duration::hours(i64::from(hours));
        let mut alerts: Vec<Alert> = self
            .entries
            .iter()
            .filter(|alert| alert.timestamp >= cutoff)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    pub fn by_severity(&self, severity: Severity, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = self.recent(24 * 7, now);
        alerts.retain(|alert| alert.severity == severity);
        alerts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, age_hours: i64, severity: Severity, now: DateTime<Utc>) -> Alert {
        Alert {
            id: id.into(),
            keyword: "k".into(),
            source: "google".into(),
            content: String::new(),
            url: String::new(),
            timestamp: now - Duration::hours(age_hours),
            severity,
            confidence: 0.5,
        }
    }

    #[test]
    fn recent_is_newest_first_and_non_destructive() {
        let now = Utc::now();
        let mut buffer = AlertBuffer::new(10);
        buffer.push(alert("old", 30, Severity::Low, now));
        buffer.push(alert("mid", 5, Severity::Low, now));
        buffer.push(alert("new", 1, Severity::Low, now));

        let ids: Vec<_> = buffer.recent(24, now).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.recent(48, now).len(), 3);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let now = Utc::now();
        let mut buffer = AlertBuffer::new(2);
        for id in ["a", "b", "c"] {
            buffer.push(alert(id, 0, Severity::Low, now));
        }
        assert_eq!(buffer.len(), 2);
        let ids: Vec<_> = buffer.recent(1, now).into_iter().map(|a| a.id).collect();
        assert!(!ids.contains(&"a".to_string()));
    }

    #[test]
    fn severity_filter_covers_one_week() {
        let now = Utc::now();
        let mut buffer = AlertBuffer::new(10);
        buffer.push(alert("stale", 24 * 8, Severity::Critical, now));
        buffer.push(alert("fresh", 24 * 6, Severity::Critical, now));
        buffer.push(alert("low", 1, Severity::Low, now));
        let found = buffer.by_severity(Severity::Critical, now);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "fresh");
    }
}
