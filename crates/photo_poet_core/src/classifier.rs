//! crates/photo_poet_core/src/classifier.rs
//!
//! Maps raw remote failures to a fixed set of user-facing categories. The
//! rules are an ordered table; the first rule that matches wins.

use crate::domain::Capability;
use crate::ports::PortError;
use regex::Regex;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    SafetyRejection,
    Misconfiguration,
    ServiceUnavailable,
    Generic,
}

/// A failure as seen at the action boundary: its message and, when the
/// remote service reported one, an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError<'a> {
    pub message: &'a str,
    pub status: Option<u16>,
}

impl<'a> RawError<'a> {
    pub fn new(message: &'a str) -> Self {
        Self {
            message,
            status: None,
        }
    }

    pub fn with_status(message: &'a str, status: u16) -> Self {
        Self {
            message,
            status: Some(status),
        }
    }
}

struct Rule {
    pattern: Regex,
    statuses: Vec<RangeInclusive<u16>>,
    category: ErrorCategory,
}

impl Rule {
    fn matches(&self, raw: &RawError<'_>) -> bool {
        raw.status
            .is_some_and(|status| self.statuses.iter().any(|range| range.contains(&status)))
            || self.pattern.is_match(raw.message)
    }
}

fn rule(pattern: &str, statuses: Vec<RangeInclusive<u16>>, category: ErrorCategory) -> Rule {
    Rule {
        // The patterns are literals below; a typo is caught by the unit tests.
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid classifier rule: {e}")),
        statuses,
        category,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"Deadline exceeded|504", vec![504..=504], ErrorCategory::Timeout),
        rule(r"safety policy", vec![], ErrorCategory::SafetyRejection),
        rule(
            r"API key not valid|API_KEY_INVALID|missing credential",
            vec![],
            ErrorCategory::Misconfiguration,
        ),
        // 504 is claimed by the timeout rule above.
        rule(r"(?i)server error|500|503", vec![500..=599], ErrorCategory::ServiceUnavailable),
    ]
});

pub fn classify(raw: &RawError<'_>) -> ErrorCategory {
    RULES
        .iter()
        .find(|rule| rule.matches(raw))
        .map(|rule| rule.category)
        .unwrap_or(ErrorCategory::Generic)
}

pub fn classify_port_error(error: &PortError) -> ErrorCategory {
    let message = error.to_string();
    let raw = match error.status() {
        Some(status) => RawError::with_status(&message, status),
        None => RawError::new(&message),
    };
    classify(&raw)
}

/// The sentence shown to the user. Only the generic fallback depends on the
/// capability that failed.
pub fn user_message(category: ErrorCategory, capability: Capability) -> &'static str {
    match category {
        ErrorCategory::Timeout => {
            "The AI is taking a bit too long to respond. Please try again in a moment."
        }
        ErrorCategory::SafetyRejection => {
            "The request was blocked by the content safety filter. Please adjust your prompt or image and try again."
        }
        ErrorCategory::Misconfiguration => {
            "The server is not configured correctly. Please contact support."
        }
        ErrorCategory::ServiceUnavailable => {
            "The AI service is currently unavailable. Please try again later."
        }
        ErrorCategory::Generic => match capability {
            Capability::Poem => {
                "An unexpected error occurred while generating your poem. Please try again."
            }
            Capability::Revision => {
                "An unexpected error occurred while revising the poem. Please try again."
            }
            Capability::Image => {
                "An unexpected error occurred while creating your image. Please try again."
            }
            Capability::Audio => {
                "An unexpected error occurred while generating the audio. Please try again."
            }
            Capability::Video => {
                "An unexpected error occurred while animating your photo. Please try again."
            }
            Capability::VoiceTest => "An unexpected error occurred. Please try again.",
        },
    }
}
