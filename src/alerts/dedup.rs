use std::collections::{HashSet, VecDeque};

use sha2::{Digest, Sha256};

use crate::domain::RawHit;

pub fn fingerprint(hit: &RawHit) -> String {
    let digest = Sha256::new()
        .chain_update(hit.source.as_bytes())
        .chain_update(b"|")
        .chain_update(hit.url.as_bytes())
        .chain_update(b"|")
        .chain_update(hit.content.as_bytes())
        .finalize();
    hex::encode(digest)
}

#[derive(Debug)]
pub struct SeenHits {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl SeenHits {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn insert(&mut self, fingerprint: String) -> bool {
        if self.seen.contains(&fingerprint) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(fingerprint.clone());
        self.order.push_back(fingerprint);
        true
    }

    pub fn preload(&mut self, fingerprints: impl IntoIterator<Item = String>) {
        for fingerprint in fingerprints {
            self.insert(fingerprint);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, content: &str) -> RawHit {
        RawHit {
            source: "google".into(),
            url: url.into(),
            title: String::new(),
            content: content.into(),
        }
    }

    #[test]
    fn fingerprint_ignores_title_but_not_content() {
        let mut a = hit("https://x.test/", "same");
        let b = hit("https://x.test/", "same");
        a.title = "different".into();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&hit("https://x.test/", "changed")));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn rejects_repeats_and_forgets_oldest() {
        let mut seen = SeenHits::new(2);
        assert!(seen.insert("a".into()));
        assert!(!seen.insert("a".into()));
        assert!(seen.insert("b".into()));
        assert!(seen.insert("c".into()));
        assert_eq!(seen.len(), 2);
        assert!(seen.insert("a".into()));
        assert!(!seen.insert("c".into()));
    }
}
