//! Shared host passphrase check.

/// Compare a login attempt against the configured passphrase.
pub fn passphrase_matches(expected: &str, given: &str) -> bool {
    constant_time_eq(expected.as_bytes(), given.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        assert!(passphrase_matches("123@123", "123@123"));
        assert!(!passphrase_matches("123@123", "123@12"));
        assert!(!passphrase_matches("123@123", "123@124"));
        assert!(!passphrase_matches("Secret", "secret"));
        assert!(!passphrase_matches("Secret", ""));
    }
}
