use regex::Regex;
use std::sync::LazyLock;

// Replacement order matters: UUIDs and timestamps contain digit runs, so
// they must be rewritten before bare numbers.
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid regex")
});
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("timestamp regex")
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email regex")
});
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("number regex"));

/// Normalizes an error message into a recurrence pattern by replacing the
/// variable parts: UUIDs, ISO-8601 timestamps, email addresses and digit
/// runs. Idempotent: extracting a pattern from a pattern is a no-op.
pub fn extract_pattern(message: &str) -> String {
    let pattern = UUID.replace_all(message, "UUID");
    let pattern = TIMESTAMP.replace_all(&pattern, "TIMESTAMP");
    let pattern = EMAIL.replace_all(&pattern, "EMAIL");
    NUMBER.replace_all(&pattern, "N").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_variable_part() {
        let message = "user 42 at 2024-01-02T03:04:05Z from a@b.co id 550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(
            extract_pattern(message),
            "user N at TIMESTAMP from EMAIL id UUID"
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let messages = [
            "user 42 at 2024-01-02T03:04:05Z from a@b.co",
            "connection reset by peer on 10.0.0.3:5432",
            "request 7f3a completed",
        ];
        for message in messages {
            let once = extract_pattern(message);
            assert_eq!(extract_pattern(&once), once);
        }
    }

    #[test]
    fn handles_space_separated_timestamps_and_offsets() {
        assert_eq!(
            extract_pattern("failed at 2024-06-01 10:20:30+02:00"),
            "failed at TIMESTAMP"
        );
    }

    #[test]
    fn plain_messages_pass_through() {
        assert_eq!(
            extract_pattern("database connection refused"),
            "database connection refused"
        );
    }
}
