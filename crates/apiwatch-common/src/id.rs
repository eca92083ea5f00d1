use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, OnceLock};

static BUCKET: OnceLock<Mutex<SnowflakeIdBucket>> = OnceLock::new();

/// Installs the process-wide id generator. The first call wins; later
/// calls (and any id minted before configuration) keep the installed
/// generator, so ids stay unique within the process either way.
pub fn init(machine_id: i32, node_id: i32) {
    let _ = BUCKET.set(Mutex::new(SnowflakeIdBucket::new(machine_id, node_id)));
}

/// Mints the next id in the string form every entity in the system uses
/// (targets, probe results, logs, analyses, alerts).
pub fn next_id() -> String {
    let bucket = BUCKET.get_or_init(|| Mutex::new(SnowflakeIdBucket::new(1, 1)));
    let mut bucket = bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_non_empty() {
        init(2, 3);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(!id.is_empty());
            assert!(seen.insert(id), "duplicate id minted");
        }
    }

    #[test]
    fn reinitialization_does_not_reset_the_generator() {
        init(2, 3);
        let before = next_id();
        // second init is a no-op; the sequence keeps advancing
        init(4, 5);
        let after = next_id();
        assert_ne!(before, after);
    }
}
