//! Request parameter coercion
//!
//! Public endpoints never reject a malformed id: it becomes 0, which takes
//! the empty-result path.

/// Absolute integer value of the leading digits of `raw`, or 0.
pub fn absint(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };
    let raw = raw.trim();
    let unsigned = raw
        .strip_prefix('-')
        .or_else(|| raw.strip_prefix('+'))
        .unwrap_or(raw);
    let digits: &str = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .map_or(unsigned, |end| &unsigned[..end]);

    digits.parse::<i64>().unwrap_or(0)
}

/// A JSONP callback name made only of word characters, `.` and `$`, or `None`.
pub fn sanitize_callback(raw: Option<&str>) -> Option<&str> {
    let callback = raw?.trim();
    let valid = !callback.is_empty()
        && callback.len() <= 128
        && callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'));
    valid.then_some(callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absint() {
        assert_eq!(absint(None), 0);
        assert_eq!(absint(Some("")), 0);
        assert_eq!(absint(Some("15")), 15);
        assert_eq!(absint(Some(" 15 ")), 15);
        assert_eq!(absint(Some("-7")), 7);
        assert_eq!(absint(Some("12abc")), 12);
        assert_eq!(absint(Some("abc")), 0);
        assert_eq!(absint(Some("99999999999999999999999")), 0);
    }

    #[test]
    fn test_sanitize_callback() {
        assert_eq!(sanitize_callback(Some("adServerPushAJAXAds")), Some("adServerPushAJAXAds"));
        assert_eq!(sanitize_callback(Some("jQuery.cb_1")), Some("jQuery.cb_1"));
        assert_eq!(sanitize_callback(Some("$.cb")), Some("$.cb"));
        assert_eq!(sanitize_callback(Some("alert(1)")), None);
        assert_eq!(sanitize_callback(Some("a;b")), None);
        assert_eq!(sanitize_callback(Some("")), None);
        assert_eq!(sanitize_callback(None), None);
    }
}
