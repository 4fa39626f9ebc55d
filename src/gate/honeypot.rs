//! Hidden form field check.
//!
//! The download form carries a field that is invisible to people. Anything
//! typed into it came from an automated form filler.

/// Signal key reported when the honeypot field is filled.
pub const HONEYPOT_SIGNAL: &str = "honeypot_field";

/// Returns true when the hidden field carries any non-whitespace value.
#[must_use]
pub fn is_tripped(field_value: Option<&str>) -> bool {
    field_value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_or_missing_field_is_not_tripped() {
        assert!(!is_tripped(None));
        assert!(!is_tripped(Some("")));
        assert!(!is_tripped(Some("   ")));
    }

    #[test]
    fn test_filled_field_is_tripped() {
        assert!(is_tripped(Some("https://spam.example")));
    }
}
