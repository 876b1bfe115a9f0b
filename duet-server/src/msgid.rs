//! Message ids.
//!
//! ULIDs built from the message's server timestamp, so ids sort by the time
//! the store assigned. Ties within one millisecond are ordered by insertion
//! sequence in the store, not by id.

use rand::Rng;
use ulid::Ulid;

/// Generate an id for a message stamped at `timestamp_ms`.
pub fn generate(timestamp_ms: i64) -> String {
    let random: u128 = rand::thread_rng().r#gen();
    Ulid::from_parts(timestamp_ms.max(0) as u64, random).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_ulids() {
        let a = generate(1_700_000_000_000);
        let b = generate(1_700_000_000_000);
        assert_eq!(a.len(), 26);
        assert_ne!(a, b);
        assert!(Ulid::from_string(&a).is_ok(), "{a}");
    }

    #[test]
    fn id_carries_server_timestamp() {
        let id = Ulid::from_string(&generate(1_700_000_000_123)).unwrap();
        assert_eq!(id.timestamp_ms(), 1_700_000_000_123);
        assert_eq!(Ulid::from_string(&generate(-5)).unwrap().timestamp_ms(), 0);
    }

    #[test]
    fn ids_sort_by_timestamp() {
        let a = generate(1_700_000_000_000);
        let b = generate(1_700_000_000_001);
        assert!(a < b, "ids should sort chronologically: {a} vs {b}");
    }
}
