//! Text normalization and fuzzy similarity
//!
//! Uses normalized Levenshtein similarity from `strsim`. All comparisons are
//! case-insensitive and ignore surrounding whitespace.

/// Similarity ratio in [0.0, 1.0] between two strings
///
/// Returns 0.0 when either side is empty after trimming: an absent value
/// never counts as a match.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let a = a.trim().to_uppercase();
    let b = b.trim().to_uppercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Strip a phone number to its last 10 digits
pub fn normalize_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

/// Uppercase, trimmed code (state abbreviations, status codes)
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Case-insensitive equality of two non-empty codes
pub fn codes_match(a: &str, b: &str) -> bool {
    let a = normalize_code(a);
    !a.is_empty() && a == normalize_code(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_ignore_case() {
        assert_eq!(fuzzy_ratio("Jane Doe", "  JANE DOE "), 1.0);
    }

    #[test]
    fn test_empty_is_never_a_match() {
        assert_eq!(fuzzy_ratio("", "Jane"), 0.0);
        assert_eq!(fuzzy_ratio("Jane", "   "), 0.0);
    }

    #[test]
    fn test_single_typo_stays_above_pass_threshold() {
        assert!(fuzzy_ratio("John Smith", "Jon Smith") >= 0.85);
    }

    #[test]
    fn test_normalize_phone_keeps_last_ten_digits() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "5551234567");
        assert_eq!(normalize_phone("555.123.4567"), "5551234567");
        assert_eq!(normalize_phone("ext"), "");
    }

    #[test]
    fn test_codes_match() {
        assert!(codes_match("ca", "CA "));
        assert!(!codes_match("", ""));
        assert!(!codes_match("CA", "NV"));
    }
}
