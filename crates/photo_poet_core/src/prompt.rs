//! crates/photo_poet_core/src/prompt.rs
//!
//! The request shapes handed to the generation service: an ordered list of
//! text and media segments plus either a declared output schema (text
//! capabilities) or the requested output modalities (media capabilities).

use crate::domain::{AspectRatio, DataUri, MediaRef, Operation};
use serde_json::{json, Map, Value};

/// Which configured model a request should run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Text,
    Image,
    Speech,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Media(DataUri),
}

/// An ordered sequence of prompt segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    parts: Vec<PromptPart>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(PromptPart::Text(text.into()));
        self
    }

    pub fn media(mut self, uri: DataUri) -> Self {
        self.parts.push(PromptPart::Media(uri));
        self
    }

    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All text segments joined by newlines, without media.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Media(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn media_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, PromptPart::Media(_)))
            .count()
    }
}

/// A required string field of a structured text response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputField {
    pub name: &'static str,
    pub description: &'static str,
}

/// The structured shape a text response must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub fields: Vec<OutputField>,
}

impl OutputSchema {
    pub fn single(name: &'static str, description: &'static str) -> Self {
        Self {
            fields: vec![OutputField { name, description }],
        }
    }

    /// Renders the schema in the OpenAPI subset the generation service accepts.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                (
                    field.name.to_string(),
                    json!({ "type": "STRING", "description": field.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|field| field.name).collect();

        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub prompt: Prompt,
    pub schema: OutputSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "TEXT",
            Modality::Image => "IMAGE",
            Modality::Audio => "AUDIO",
        }
    }
}

/// Capability-specific generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaConfig {
    Image {
        aspect_ratio: AspectRatio,
    },
    Speech {
        voice: String,
    },
    Video {
        duration_seconds: u32,
        aspect_ratio: AspectRatio,
        person_generation: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub model: ModelKind,
    pub prompt: Prompt,
    pub modalities: Vec<Modality>,
    pub config: MediaConfig,
}

/// What a media generation call returned: inline media, an operation to
/// poll, or (on a contract violation) neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaOutput {
    pub media: Option<MediaRef>,
    pub operation: Option<Operation>,
}

impl MediaOutput {
    pub fn media(media: MediaRef) -> Self {
        Self {
            media: Some(media),
            operation: None,
        }
    }

    pub fn operation(operation: Operation) -> Self {
        Self {
            media: None,
            operation: Some(operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_keeps_segment_order() {
        let photo = DataUri::parse("data:image/png;base64,AAAA").unwrap();
        let prompt = Prompt::new().text("first").media(photo.clone()).text("second");

        assert_eq!(
            prompt.parts(),
            &[
                PromptPart::Text("first".into()),
                PromptPart::Media(photo),
                PromptPart::Text("second".into()),
            ]
        );
        assert_eq!(prompt.text_content(), "first\nsecond");
        assert_eq!(prompt.media_count(), 1);
    }

    #[test]
    fn schema_lists_every_field_as_required() {
        let schema = OutputSchema::single("poem", "The generated poem.");
        let rendered = schema.to_json_schema();
        assert_eq!(rendered["type"], "OBJECT");
        assert_eq!(rendered["properties"]["poem"]["type"], "STRING");
        assert_eq!(rendered["required"], json!(["poem"]));
    }
}
