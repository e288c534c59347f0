//! Topic matching and validation
//!
//! Topics and filters are `/`-delimited level lists. In a filter, `+` matches
//! exactly one level and `#` (only as the last level) matches the remaining
//! levels, including none at all. Both functions are pure so they can run
//! with or without the broker lock held.

/// Longest topic or filter accepted by default, in bytes.
pub const MAX_TOPIC_LENGTH: usize = 255;

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Returns true when `topic` is matched by `filter`.
///
/// Matching is case-sensitive and byte-for-byte outside of wildcard levels.
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL), _) => return filter_levels.peek().is_none(),
            (Some(SINGLE_LEVEL), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validate a publish topic (`allow_wildcards = false`) or a subscription
/// filter (`allow_wildcards = true`) against the default length limit.
pub fn validate_topic(topic: &str, allow_wildcards: bool) -> bool {
    validate_topic_with_limit(topic, allow_wildcards, MAX_TOPIC_LENGTH)
}

/// Same as [`validate_topic`] with an explicit maximum length.
///
/// Rejects empty topics, topics over `max_length`, reserved `$` topics and
/// NUL bytes. Wildcards must occupy a whole level and `#` must be last.
pub fn validate_topic_with_limit(topic: &str, allow_wildcards: bool, max_length: usize) -> bool {
    if topic.is_empty() || topic.len() > max_length {
        return false;
    }
    if topic.starts_with('$') || topic.contains('\0') {
        return false;
    }

    let last = topic.split('/').count() - 1;
    for (index, level) in topic.split('/').enumerate() {
        if !level.contains(['+', '#']) {
            continue;
        }
        if !allow_wildcards {
            return false;
        }
        match level {
            SINGLE_LEVEL => {}
            MULTI_LEVEL if index == last => {}
            _ => return false,
        }
    }
    true
}
