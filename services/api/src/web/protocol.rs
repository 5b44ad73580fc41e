//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for a Photo Poet session.

use photo_poet_core::{domain::AspectRatio, view::ViewSnapshot, ViewEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Adds reference photos (data URIs) to the selection.
    SelectPhotos { photos: Vec<String> },

    RemovePhoto { index: usize },

    /// Opens the description form for the selected photos.
    Describe,

    CancelDescribe,

    /// Synthesizes a new image from the selected photos, then writes a poem about it.
    SubmitPrompt {
        prompt: String,
        #[serde(default)]
        aspect_ratio: Option<AspectRatio>,
        #[serde(default)]
        tone: Option<String>,
        #[serde(default)]
        style: Option<String>,
    },

    /// Writes a poem directly about a single photo.
    UploadPhoto {
        photo: String,
        #[serde(default)]
        tone: Option<String>,
        #[serde(default)]
        style: Option<String>,
    },

    Revise { tone: String },

    ReadAloud {
        #[serde(default)]
        voice: Option<String>,
    },

    CreateArtwork {
        #[serde(default)]
        aspect_ratio: Option<AspectRatio>,
        #[serde(default)]
        match_style: bool,
    },

    Animate,

    /// Discards everything and returns to the upload screen.
    Reset,
}

impl From<ClientMessage> for ViewEvent {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::SelectPhotos { photos } => ViewEvent::PhotosSelected { photos },
            ClientMessage::RemovePhoto { index } => ViewEvent::PhotoRemoved { index },
            ClientMessage::Describe => ViewEvent::DescribeRequested,
            ClientMessage::CancelDescribe => ViewEvent::DescribeCancelled,
            ClientMessage::SubmitPrompt {
                prompt,
                aspect_ratio,
                tone,
                style,
            } => ViewEvent::PromptSubmitted {
                prompt,
                aspect_ratio,
                tone,
                style,
            },
            ClientMessage::UploadPhoto { photo, tone, style } => {
                ViewEvent::SinglePhotoUploaded { photo, tone, style }
            }
            ClientMessage::Revise { tone } => ViewEvent::ReviseRequested { tone },
            ClientMessage::ReadAloud { voice } => ViewEvent::ReadAloudRequested { voice },
            ClientMessage::CreateArtwork {
                aspect_ratio,
                match_style,
            } => ViewEvent::ArtworkRequested {
                aspect_ratio,
                match_style,
            },
            ClientMessage::Animate => ViewEvent::AnimationRequested,
            ClientMessage::Reset => ViewEvent::Reset,
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the connection opens.
    SessionStarted { session_id: Uuid },

    /// The full view to render. Sent after every change.
    State { snapshot: ViewSnapshot },

    /// A transient notification, e.g. a classified generation failure.
    Notification { title: String, message: String },

    /// The client sent something the server could not act on.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"submit_prompt","prompt":"a castle","aspect_ratio":"9:16"}"#,
        )
        .unwrap();
        assert_eq!(
            ViewEvent::from(message),
            ViewEvent::PromptSubmitted {
                prompt: "a castle".into(),
                aspect_ratio: Some(AspectRatio::Tall),
                tone: None,
                style: None,
            }
        );

        let message: ClientMessage = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(message, ClientMessage::Reset);
    }

    #[test]
    fn server_notification_shape() {
        let json = serde_json::to_value(ServerMessage::Notification {
            title: "Error".into(),
            message: "Photo data is missing.".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["message"], "Photo data is missing.");
    }
}
