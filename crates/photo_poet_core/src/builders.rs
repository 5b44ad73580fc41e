//! crates/photo_poet_core/src/builders.rs
//!
//! Request builders: one per capability. Each takes the raw input record a
//! caller submitted, checks that the required fields are present and well
//! formed, and assembles the prompt and declared output shape for the
//! generation service. Nothing in here performs I/O.

use crate::domain::{
    AspectRatio, Capability, DataUri, PhotoAsset, Voice, DEFAULT_STYLE, DEFAULT_TONE,
    MAX_REFERENCE_PHOTOS,
};
use crate::ports::{PortError, PortResult};
use crate::prompt::{
    MediaConfig, MediaRequest, Modality, ModelKind, OutputSchema, Prompt, TextRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub const POEM_FIELD: &str = "poem";
pub const REVISED_POEM_FIELD: &str = "revisedPoem";
pub const STYLE_FIELD: &str = "styleInstructions";

pub const VIDEO_PROMPT: &str = "Make the image come to life with subtle motion.";
pub const VIDEO_DURATION_SECONDS: u32 = 5;
pub const VIDEO_PERSON_GENERATION: &str = "allow_adult";

const PRESERVE_PEOPLE: &str = "Preserve the apparent ethnicity, gender, and other key physical \
attributes of any people depicted in the original image.";

const DEFAULT_ARTWORK_STYLE: &str = "Generate a beautiful, artistic, and painterly image that \
visually represents the mood and subjects in this poem.";

//=========================================================================================
// Validation
//=========================================================================================

/// A required input was missing or malformed. The message is shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Photo data is missing.")]
    MissingPhoto,
    #[error("Photo data is not a valid image data URI.")]
    InvalidPhoto,
    #[error("Original poem or new tone is missing.")]
    MissingPoemOrTone,
    #[error("Text to speak is missing.")]
    MissingText,
    #[error("Voice name is missing.")]
    MissingVoice,
    #[error("Voice name is not supported.")]
    UnsupportedVoice,
    #[error("Required image data or prompt is missing.")]
    MissingImageInputs,
    #[error("You can upload a maximum of {} images.", MAX_REFERENCE_PHOTOS)]
    TooManyPhotos,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn parse_photo(raw: &str) -> Result<PhotoAsset, ValidationError> {
    PhotoAsset::parse(raw).map_err(|_| ValidationError::InvalidPhoto)
}

//=========================================================================================
// Input records
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoemRequest {
    /// The photo as a `data:<mime>;base64,<payload>` URI.
    pub photo_data_uri: Option<String>,
    pub tone: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionRequest {
    pub original_poem: Option<String>,
    pub tone: Option<String>,
}

/// Either `photoDataUris` + `prompt` (synthesis) or `photoDataUri` + `poem` (artwork).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub poem: Option<String>,
    pub prompt: Option<String>,
    pub photo_data_uri: Option<String>,
    pub photo_data_uris: Option<Vec<String>>,
    pub aspect_ratio: Option<AspectRatio>,
    /// Ask the model to describe a matching art style before rendering artwork.
    #[serde(default)]
    pub match_style: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: Option<String>,
    pub voice_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub photo_data_uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProbeRequest {
    pub voice_name: Option<String>,
    /// Custom text to speak; a short greeting naming the voice is used when blank.
    pub text: Option<String>,
}

/// Any capability's input, for callers that dispatch generically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum GenerationRequest {
    Poem(PoemRequest),
    Revision(RevisionRequest),
    Image(ImageRequest),
    Speech(SpeechRequest),
    Video(VideoRequest),
    VoiceProbe(VoiceProbeRequest),
}

impl GenerationRequest {
    pub fn capability(&self) -> Capability {
        match self {
            GenerationRequest::Poem(_) => Capability::Poem,
            GenerationRequest::Revision(_) => Capability::Revision,
            GenerationRequest::Image(_) => Capability::Image,
            GenerationRequest::Speech(_) => Capability::Audio,
            GenerationRequest::Video(_) => Capability::Video,
            GenerationRequest::VoiceProbe(_) => Capability::VoiceTest,
        }
    }
}

/// Any capability's successful output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    Poem(String),
    RevisedPoem(String),
    Audio(DataUri),
    Image(DataUri),
    Video(DataUri),
}

//=========================================================================================
// Builders
//=========================================================================================

pub fn poem(request: &PoemRequest) -> Result<TextRequest, ValidationError> {
    let photo = present(&request.photo_data_uri).ok_or(ValidationError::MissingPhoto)?;
    let photo = parse_photo(photo)?;
    let tone = present(&request.tone).unwrap_or(DEFAULT_TONE);
    let style = present(&request.style).unwrap_or(DEFAULT_STYLE);

    let instructions = format!(
        "You are an expert poet who writes lyrical, evocative poems inspired by images. \
Study the photo below and compose a poem that captures its essence.\n\n\
Instructions:\n\
1. Observe the main subjects, setting, mood, and any telling details in the photo.\n\
2. Write a poem that reflects what you see.\n\
3. Follow the requested tone and style.\n\n\
Tone: {tone}\n\
Style: {style}\n\
Photo:"
    );

    Ok(TextRequest {
        prompt: Prompt::new().text(instructions).media(photo.into_data_uri()),
        schema: OutputSchema::single(POEM_FIELD, "The generated poem."),
    })
}

pub fn revision(request: &RevisionRequest) -> Result<TextRequest, ValidationError> {
    let (Some(original), Some(tone)) = (present(&request.original_poem), present(&request.tone))
    else {
        return Err(ValidationError::MissingPoemOrTone);
    };

    let instructions = format!(
        "You are a skilled poet who adapts the tone of existing poems.\n\n\
Original poem:\n{original}\n\n\
Revise the poem above so that it has a {tone} tone. Keep the original poem's subject \
and overall structure as much as possible."
    );

    Ok(TextRequest {
        prompt: Prompt::new().text(instructions),
        schema: OutputSchema::single(
            REVISED_POEM_FIELD,
            "The poem revised with the requested tone.",
        ),
    })
}

/// How an image request will be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePlan {
    /// Several reference photos and a description, rendered in one call.
    Synthesis(MediaRequest),
    /// One photo and a poem, optionally preceded by a style classification call.
    Artwork(ArtworkPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkPlan {
    photo: PhotoAsset,
    poem: String,
    aspect_ratio: AspectRatio,
    match_style: bool,
}

impl ArtworkPlan {
    /// The style classification request to run first, if one was asked for.
    pub fn style_probe(&self) -> Option<TextRequest> {
        if !self.match_style {
            return None;
        }
        let instructions = format!(
            "You are an art director. Look at the photo and read the poem, then describe in \
one or two sentences the painterly style an illustrator should use so the artwork matches \
the poem's mood: name the medium, palette, brushwork, and lighting.\n\nPoem:\n{}",
            self.poem
        );
        Some(TextRequest {
            prompt: Prompt::new()
                .text(instructions)
                .media(self.photo.data_uri().clone()),
            schema: OutputSchema::single(
                STYLE_FIELD,
                "Concise style instructions for an illustrator.",
            ),
        })
    }

    /// The final rendering request, using classified style instructions when available.
    pub fn compose(&self, style_instructions: Option<&str>) -> MediaRequest {
        let style = style_instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                format!(
                    "Generate an artistic image that visually represents the mood and subjects \
in this poem, in the following style: {s}"
                )
            })
            .unwrap_or_else(|| DEFAULT_ARTWORK_STYLE.to_string());

        let prompt = Prompt::new()
            .text(format!(
                "{style} {PRESERVE_PEOPLE} The image should have an aspect ratio of {}.",
                self.aspect_ratio
            ))
            .media(self.photo.data_uri().clone())
            .text(format!("Poem for inspiration: {}", self.poem));

        image_request(prompt, self.aspect_ratio)
    }
}

fn image_request(prompt: Prompt, aspect_ratio: AspectRatio) -> MediaRequest {
    MediaRequest {
        model: ModelKind::Image,
        prompt,
        modalities: vec![Modality::Text, Modality::Image],
        config: MediaConfig::Image { aspect_ratio },
    }
}

pub fn image(request: &ImageRequest) -> Result<ImagePlan, ValidationError> {
    let photos: Vec<&str> = request
        .photo_data_uris
        .iter()
        .flatten()
        .map(|uri| uri.trim())
        .filter(|uri| !uri.is_empty())
        .collect();
    let photo = present(&request.photo_data_uri);
    let poem = present(&request.poem);
    let description = present(&request.prompt);

    if (photo.is_none() && photos.is_empty()) || (poem.is_none() && description.is_none()) {
        return Err(ValidationError::MissingImageInputs);
    }
    let aspect_ratio = request.aspect_ratio.unwrap_or_default();

    if let Some(description) = description.filter(|_| !photos.is_empty()) {
        if photos.len() > MAX_REFERENCE_PHOTOS {
            return Err(ValidationError::TooManyPhotos);
        }
        let mut prompt = Prompt::new().text(format!(
            "Generate a new, synthesized image based on the following instructions and photo \
references. The final image should have an aspect ratio of {aspect_ratio}. When generating the \
new image, you MUST preserve the apparent ethnicity, gender, and other key physical attributes \
of any people depicted in the original images. Instructions: {description}"
        ));
        for raw in photos {
            prompt = prompt.media(parse_photo(raw)?.into_data_uri());
        }
        return Ok(ImagePlan::Synthesis(image_request(prompt, aspect_ratio)));
    }

    match (poem, photo) {
        (Some(poem), Some(photo)) => Ok(ImagePlan::Artwork(ArtworkPlan {
            photo: parse_photo(photo)?,
            poem: poem.to_string(),
            aspect_ratio,
            match_style: request.match_style,
        })),
        _ => Err(ValidationError::MissingImageInputs),
    }
}

fn speech_request(text: String, voice: &str) -> MediaRequest {
    MediaRequest {
        model: ModelKind::Speech,
        prompt: Prompt::new().text(text),
        modalities: vec![Modality::Audio],
        config: MediaConfig::Speech {
            voice: voice.to_string(),
        },
    }
}

pub fn speech(request: &SpeechRequest) -> Result<MediaRequest, ValidationError> {
    let text = present(&request.text).ok_or(ValidationError::MissingText)?;
    let voice = match present(&request.voice_name) {
        Some(name) => name
            .parse::<Voice>()
            .map_err(|_| ValidationError::UnsupportedVoice)?,
        None => Voice::default(),
    };
    Ok(speech_request(text.to_string(), voice.as_str()))
}

/// Unlike [`speech`], any voice name is accepted: the point of a probe is to
/// find out whether the service honours it.
pub fn voice_probe(request: &VoiceProbeRequest) -> Result<MediaRequest, ValidationError> {
    let voice = present(&request.voice_name)
        .ok_or(ValidationError::MissingVoice)?
        .trim();
    let text = present(&request.text)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Hello, this is a test of the {voice} voice."));
    Ok(speech_request(text, voice))
}

pub fn video(request: &VideoRequest) -> Result<MediaRequest, ValidationError> {
    let photo = present(&request.photo_data_uri).ok_or(ValidationError::MissingPhoto)?;
    let photo = parse_photo(photo)?;
    Ok(MediaRequest {
        model: ModelKind::Video,
        prompt: Prompt::new().text(VIDEO_PROMPT).media(photo.into_data_uri()),
        modalities: Vec::new(),
        config: MediaConfig::Video {
            duration_seconds: VIDEO_DURATION_SECONDS,
            aspect_ratio: AspectRatio::Widescreen,
            person_generation: VIDEO_PERSON_GENERATION.to_string(),
        },
    })
}

/// Pulls a required string field out of a structured text response.
pub fn text_field(output: &Value, field: &str) -> PortResult<String> {
    output
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            PortError::MissingOutput(format!(
                "The AI model failed to produce a valid `{field}` output. This may be due to a \
safety policy violation or a temporary issue."
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptPart;
    use serde_json::json;

    const PHOTO: &str = "data:image/png;base64,AAAA";

    #[test]
    fn poem_requires_photo() {
        assert_eq!(poem(&PoemRequest::default()), Err(ValidationError::MissingPhoto));
        let blank = PoemRequest {
            photo_data_uri: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(poem(&blank), Err(ValidationError::MissingPhoto));
    }

    #[test]
    fn poem_rejects_non_image_data() {
        let request = PoemRequest {
            photo_data_uri: Some("data:text/plain;base64,AAAA".into()),
            ..Default::default()
        };
        assert_eq!(poem(&request), Err(ValidationError::InvalidPhoto));
    }

    #[test]
    fn poem_uses_defaults_for_missing_tone_and_style() {
        let request = PoemRequest {
            photo_data_uri: Some(PHOTO.into()),
            tone: None,
            style: Some(" ".into()),
        };
        let built = poem(&request).unwrap();
        let text = built.prompt.text_content();
        assert!(text.contains("Tone: Reflective"));
        assert!(text.contains("Style: Free Verse"));
        assert_eq!(built.prompt.media_count(), 1);
        assert_eq!(built.schema.fields[0].name, POEM_FIELD);
    }

    #[test]
    fn poem_interpolates_tone_and_style() {
        let request = PoemRequest {
            photo_data_uri: Some(PHOTO.into()),
            tone: Some("Joyful".into()),
            style: Some("Haiku".into()),
        };
        let text = poem(&request).unwrap().prompt.text_content();
        assert!(text.contains("Tone: Joyful"));
        assert!(text.contains("Style: Haiku"));
    }

    #[test]
    fn revision_requires_poem_and_tone() {
        let missing_tone = RevisionRequest {
            original_poem: Some("Roses".into()),
            tone: None,
        };
        assert_eq!(revision(&missing_tone), Err(ValidationError::MissingPoemOrTone));

        let ok = RevisionRequest {
            original_poem: Some("Roses".into()),
            tone: Some("Humorous".into()),
        };
        let built = revision(&ok).unwrap();
        assert!(built.prompt.text_content().contains("Roses"));
        assert!(built.prompt.text_content().contains("Humorous tone"));
        assert_eq!(built.schema.fields[0].name, REVISED_POEM_FIELD);
    }

    #[test]
    fn image_with_nothing_is_rejected() {
        assert_eq!(image(&ImageRequest::default()), Err(ValidationError::MissingImageInputs));
    }

    #[test]
    fn image_with_photo_but_no_text_is_rejected() {
        let request = ImageRequest {
            photo_data_uri: Some(PHOTO.into()),
            ..Default::default()
        };
        assert_eq!(image(&request), Err(ValidationError::MissingImageInputs));
    }

    #[test]
    fn image_with_prompt_and_single_photo_has_no_complete_mode() {
        let request = ImageRequest {
            prompt: Some("a castle".into()),
            photo_data_uri: Some(PHOTO.into()),
            ..Default::default()
        };
        assert_eq!(image(&request), Err(ValidationError::MissingImageInputs));
    }

    #[test]
    fn synthesis_attaches_every_reference_photo() {
        let request = ImageRequest {
            prompt: Some("us at the beach".into()),
            photo_data_uris: Some(vec![PHOTO.into(), PHOTO.into()]),
            aspect_ratio: Some(AspectRatio::Tall),
            ..Default::default()
        };
        let ImagePlan::Synthesis(built) = image(&request).unwrap() else {
            panic!("expected synthesis");
        };
        assert_eq!(built.prompt.media_count(), 2);
        assert!(built.prompt.text_content().contains("aspect ratio of 9:16"));
        assert!(built.prompt.text_content().contains("us at the beach"));
        assert_eq!(
            built.config,
            MediaConfig::Image {
                aspect_ratio: AspectRatio::Tall
            }
        );
    }

    #[test]
    fn synthesis_limits_reference_photos() {
        let request = ImageRequest {
            prompt: Some("group shot".into()),
            photo_data_uris: Some(vec![PHOTO.into(); 4]),
            ..Default::default()
        };
        assert_eq!(image(&request), Err(ValidationError::TooManyPhotos));
    }

    #[test]
    fn artwork_without_style_probe_uses_default_style() {
        let request = ImageRequest {
            poem: Some("Sun on water".into()),
            photo_data_uri: Some(PHOTO.into()),
            ..Default::default()
        };
        let ImagePlan::Artwork(plan) = image(&request).unwrap() else {
            panic!("expected artwork");
        };
        assert!(plan.style_probe().is_none());

        let built = plan.compose(None);
        let parts = built.prompt.parts();
        assert!(matches!(&parts[0], PromptPart::Text(t) if t.contains("painterly") && t.contains("1:1")));
        assert!(matches!(&parts[1], PromptPart::Media(_)));
        assert!(matches!(&parts[2], PromptPart::Text(t) if t.ends_with("Sun on water")));
    }

    #[test]
    fn artwork_style_probe_feeds_final_prompt() {
        let request = ImageRequest {
            poem: Some("Night rain".into()),
            photo_data_uri: Some(PHOTO.into()),
            match_style: true,
            ..Default::default()
        };
        let ImagePlan::Artwork(plan) = image(&request).unwrap() else {
            panic!("expected artwork");
        };
        let probe = plan.style_probe().expect("probe requested");
        assert_eq!(probe.schema.fields[0].name, STYLE_FIELD);
        assert!(probe.prompt.text_content().contains("Night rain"));

        let built = plan.compose(Some("Moody ink wash in deep blues"));
        assert!(built
            .prompt
            .text_content()
            .contains("in the following style: Moody ink wash in deep blues"));
    }

    #[test]
    fn speech_validates_text_and_voice() {
        assert_eq!(speech(&SpeechRequest::default()), Err(ValidationError::MissingText));

        let unknown = SpeechRequest {
            text: Some("hi".into()),
            voice_name: Some("alpha".into()),
        };
        assert_eq!(speech(&unknown), Err(ValidationError::UnsupportedVoice));

        let default_voice = SpeechRequest {
            text: Some("hi".into()),
            voice_name: None,
        };
        let built = speech(&default_voice).unwrap();
        assert_eq!(built.config, MediaConfig::Speech { voice: "algenib".into() });
        assert_eq!(built.modalities, vec![Modality::Audio]);
    }

    #[test]
    fn voice_probe_accepts_any_name_and_defaults_text() {
        assert_eq!(voice_probe(&VoiceProbeRequest::default()), Err(ValidationError::MissingVoice));

        let request = VoiceProbeRequest {
            voice_name: Some("alpha".into()),
            text: Some("".into()),
        };
        let built = voice_probe(&request).unwrap();
        assert_eq!(built.prompt.text_content(), "Hello, this is a test of the alpha voice.");
        assert_eq!(built.config, MediaConfig::Speech { voice: "alpha".into() });
    }

    #[test]
    fn video_uses_fixed_motion_settings() {
        assert_eq!(video(&VideoRequest::default()), Err(ValidationError::MissingPhoto));

        let built = video(&VideoRequest {
            photo_data_uri: Some(PHOTO.into()),
        })
        .unwrap();
        assert_eq!(built.model, ModelKind::Video);
        assert_eq!(built.prompt.text_content(), VIDEO_PROMPT);
        assert_eq!(
            built.config,
            MediaConfig::Video {
                duration_seconds: 5,
                aspect_ratio: AspectRatio::Widescreen,
                person_generation: "allow_adult".into(),
            }
        );
    }

    #[test]
    fn text_field_returns_value_unmodified() {
        let output = json!({ "poem": "Sun on water,\nLight dances free." });
        assert_eq!(text_field(&output, "poem").unwrap(), "Sun on water,\nLight dances free.");
        assert!(matches!(
            text_field(&json!({ "poem": "  " }), "poem"),
            Err(PortError::MissingOutput(_))
        ));
        assert!(text_field(&json!({}), "poem").is_err());
    }

    #[test]
    fn generation_request_is_tagged_by_capability() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "capability": "revision",
            "originalPoem": "Roses",
            "tone": "Joyful"
        }))
        .unwrap();
        assert_eq!(request.capability(), Capability::Revision);
    }
}
