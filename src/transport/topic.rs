/// Returns true when `topic` is matched by the subscription `filter`.
///
/// `+` matches exactly one level and `#` matches the remaining levels,
/// including the parent level itself (`a/#` matches `a`). Topics starting
/// with `$` are never matched by a leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::topic_matches;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("home/sw/state", "home/sw/state"));
        assert!(!topic_matches("home/sw/state", "home/sw/State"));
        assert!(!topic_matches("home/sw/state", "home/sw"));
        assert!(!topic_matches("home/sw", "home/sw/state"));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(topic_matches("home/+/state", "home/sw/state"));
        assert!(topic_matches("home/+/state", "home//state"));
        assert!(!topic_matches("home/+/state", "home/a/b/state"));
        assert!(!topic_matches("home/+", "home/sw/state"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(topic_matches("home/#", "home/sw/state"));
        assert!(topic_matches("home/#", "home"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("home/#", "office/sw"));
    }

    #[test]
    fn test_system_topics_skip_leading_wildcards() {
        assert!(!topic_matches("#", "$SYS/broker/uptime"));
        assert!(!topic_matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(topic_matches("$SYS/#", "$SYS/broker/uptime"));
    }
}
