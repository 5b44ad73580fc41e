//! services/api/src/actions/outcome.rs
//!
//! Result shapes returned by the action layer. A result is either the
//! capability's output record or `{"error": "..."}`, never both.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PoemOutput {
    pub poem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionOutput {
    pub revised_poem: String,
}

/// Speech as `data:audio/wav;base64,...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutput {
    pub audio_data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageOutput {
    pub image_data_uri: String,
}

/// The animation as `data:video/mp4;base64,...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoOutput {
    pub video_data_uri: String,
}

/// A user-facing failure sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionOutcome<T> {
    Success(T),
    Failure(ErrorBody),
}

impl<T> ActionOutcome<T> {
    pub fn failure(message: impl Into<String>) -> Self {
        ActionOutcome::Failure(ErrorBody {
            error: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_as_the_output_record() {
        let outcome = ActionOutcome::Success(PoemOutput {
            poem: "Sun on water".into(),
        });
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({ "poem": "Sun on water" }));
    }

    #[test]
    fn failure_serializes_as_error_only() {
        let outcome: ActionOutcome<AudioOutput> = ActionOutcome::failure("Text to speak is missing.");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({ "error": "Text to speak is missing." })
        );
    }

    #[test]
    fn field_names_are_camel_case() {
        let outcome = ActionOutcome::Success(RevisionOutput {
            revised_poem: "x".into(),
        });
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({ "revisedPoem": "x" }));
    }
}
