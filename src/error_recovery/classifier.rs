//! Recoverable/fatal classification of reported errors
//!
//! An error is recoverable only when its message matches none of the fatal
//! patterns and at least one transient marker. Everything else is fatal.
//! Classification never fails.

use crate::error::{ErrorClass, ReportedError};

const FATAL_PATTERNS: &[&str] = &[
    "typeerror",
    "referenceerror",
    "syntaxerror",
    "rangeerror",
    "undefined is not",
    "cannot read propert",
    "is not a function",
    "panicked",
    "unauthorized",
    "forbidden",
    "invalid api key",
    "permission denied",
    "out of memory",
    "quota exceeded",
];

const FATAL_STATUS_CODES: &[&str] = &["400", "401", "403", "404", "422"];

const TRANSIENT_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "econnrefused",
    "econnreset",
    "connection refused",
    "connection reset",
    "socket hang up",
    "fetch failed",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "internal server error",
];

const TRANSIENT_STATUS_CODES: &[&str] = &["500", "502", "503", "504"];

/// Message-inspection classifier
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    fatal_patterns: Vec<String>,
    transient_markers: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            fatal_patterns: FATAL_PATTERNS.iter().map(|s| s.to_string()).collect(),
            transient_markers: TRANSIENT_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ErrorClassifier {
    /// Add an extra transient marker (matched case-insensitively)
    pub fn with_transient_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.transient_markers.push(marker.into().to_lowercase());
        self
    }

    /// Add an extra fatal pattern (matched case-insensitively)
    pub fn with_fatal_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.fatal_patterns.push(pattern.into().to_lowercase());
        self
    }

    pub fn classify(&self, error: &ReportedError) -> ErrorClass {
        self.classify_message(&error.message)
    }

    pub fn classify_message(&self, message: &str) -> ErrorClass {
        let message = message.to_lowercase();

        let fatal = self.fatal_patterns.iter().any(|p| message.contains(p.as_str()))
            || FATAL_STATUS_CODES
                .iter()
                .any(|code| contains_status_code(&message, code));
        if fatal {
            return ErrorClass::Fatal;
        }

        let transient = self
            .transient_markers
            .iter()
            .any(|m| message.contains(m.as_str()))
            || TRANSIENT_STATUS_CODES
                .iter()
                .any(|code| contains_status_code(&message, code));
        if transient {
            ErrorClass::Recoverable
        } else {
            ErrorClass::Fatal
        }
    }
}

/// Match `code` only where it is not part of a longer number
fn contains_status_code(message: &str, code: &str) -> bool {
    let bytes = message.as_bytes();
    message.match_indices(code).any(|(start, _)| {
        let end = start + code.len();
        let before = start == 0 || !bytes[start - 1].is_ascii_digit();
        let after = end == bytes.len() || !bytes[end].is_ascii_digit();
        before && after
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Network request failed", ErrorClass::Recoverable)]
    #[case("Request timeout after 5000ms", ErrorClass::Recoverable)]
    #[case("HTTP 503 Service Unavailable", ErrorClass::Recoverable)]
    #[case("upstream returned 502", ErrorClass::Recoverable)]
    #[case("connect ECONNREFUSED 127.0.0.1:8081", ErrorClass::Recoverable)]
    #[case("TypeError: undefined is not an object", ErrorClass::Fatal)]
    #[case("HTTP 401 Unauthorized", ErrorClass::Fatal)]
    #[case("network call rejected: 403", ErrorClass::Fatal)]
    #[case("something odd happened", ErrorClass::Fatal)]
    #[case("", ErrorClass::Fatal)]
    fn test_classification(#[case] message: &str, #[case] expected: ErrorClass) {
        let classifier = ErrorClassifier::default();
        assert_eq!(classifier.classify_message(message), expected);
    }

    #[test]
    fn test_status_codes_need_boundaries() {
        let classifier = ErrorClassifier::default();
        // 15003 is not a 500-class status
        assert_eq!(
            classifier.classify_message("processed 15003 items"),
            ErrorClass::Fatal
        );
        assert!(contains_status_code("status=504", "504"));
        assert!(!contains_status_code("id 5040", "504"));
    }

    #[test]
    fn test_custom_markers() {
        let classifier = ErrorClassifier::default()
            .with_transient_marker("Bundler Restarting")
            .with_fatal_pattern("schema mismatch");

        assert_eq!(
            classifier.classify(&ReportedError::new("bundler restarting, retry later")),
            ErrorClass::Recoverable
        );
        assert_eq!(
            classifier.classify(&ReportedError::new("network schema mismatch")),
            ErrorClass::Fatal
        );
    }
}
