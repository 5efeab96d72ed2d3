use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// A fresh queue identity. Backed by the platform's cryptographic UUID-v4
/// generator via the `uuid` crate's `v4` feature, matching the default the
/// distilled specification prefers over a math-based fallback.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Epoch-ms `timestamp_ms` stamp for an entry entering the queue.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_well_formed() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 4);
    }

    #[test]
    fn now_ms_is_plausibly_recent() {
        let stamp = now_ms();
        assert!(stamp > 1_700_000_000_000);
    }
}
