//! crates/photo_poet_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! Every value here is transient and request-scoped; nothing is persisted.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Maximum number of reference photos accepted for one synthesis request.
pub const MAX_REFERENCE_PHOTOS: usize = 3;

/// Maximum decoded size of a single reference photo.
pub const MAX_REFERENCE_PHOTO_BYTES: usize = 4 * 1024 * 1024;

/// Maximum decoded size of the photo used by the single-photo poem path.
pub const MAX_SINGLE_PHOTO_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_TONE: &str = "Reflective";
pub const DEFAULT_STYLE: &str = "Free Verse";

/// Tones offered by the front end. Any free text is accepted.
pub const SUGGESTED_TONES: [&str; 6] =
    ["Reflective", "Joyful", "Melancholic", "Romantic", "Humorous", "Dramatic"];

/// Styles offered by the front end. Any free text is accepted.
pub const SUGGESTED_STYLES: [&str; 5] = ["Free Verse", "Haiku", "Sonnet", "Limerick", "Ode"];

//=========================================================================================
// Data URIs
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUriError {
    #[error("data URI must start with `data:`")]
    MissingScheme,
    #[error("data URI must use base64 encoding")]
    NotBase64,
    #[error("data URI has an invalid MIME type: {0:?}")]
    InvalidMimeType(String),
    #[error("data URI payload is empty")]
    EmptyPayload,
    #[error("data URI payload is not valid base64")]
    InvalidPayload,
    #[error("expected an image MIME type, got {0}")]
    NotAnImage(String),
}

/// Binary content carried inline as `data:<mimetype>;base64,<payload>`.
///
/// A `DataUri` always has a MIME type and a non-empty base64 payload. The MIME
/// type may carry parameters, e.g. `audio/L16;codec=pcm;rate=24000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataUri {
    mime_type: String,
    payload: String,
}

impl DataUri {
    /// Parses a `data:` URI string.
    pub fn parse(raw: &str) -> Result<Self, DataUriError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or(DataUriError::MissingScheme)?;
        let (mime_type, payload) = rest.split_once(";base64,").ok_or(DataUriError::NotBase64)?;
        Self::new(mime_type, payload)
    }

    /// Builds a data URI from an already base64-encoded payload.
    pub fn new(
        mime_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<Self, DataUriError> {
        let mime_type = mime_type.into();
        let payload = payload.into();

        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        match essence.split_once('/') {
            Some((kind, subtype)) if !kind.is_empty() && !subtype.is_empty() => {}
            _ => return Err(DataUriError::InvalidMimeType(mime_type)),
        }
        if payload.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        // Padding, length, and trailing bits are all checked by a real decode.
        base64::engine::general_purpose::STANDARD
            .decode(&payload)
            .map_err(|_| DataUriError::InvalidPayload)?;

        Ok(Self { mime_type, payload })
    }

    /// Encodes raw bytes into a data URI with the given MIME type.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Result<Self, DataUriError> {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::new(mime_type, payload)
    }

    /// The full MIME type, including any parameters.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The MIME type without parameters, e.g. `audio/L16`.
    pub fn essence(&self) -> &str {
        self.mime_type.split(';').next().unwrap_or_default().trim()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.payload)
            .map_err(|_| DataUriError::InvalidPayload)
    }

    /// Size of the decoded content, computed from the payload length. Exact
    /// because construction only accepts canonical padded base64.
    pub fn decoded_len(&self) -> usize {
        let padding = self.payload.bytes().rev().take_while(|b| *b == b'=').count();
        (self.payload.len() / 4 * 3).saturating_sub(padding)
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.payload)
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DataUri {
    type Error = DataUriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DataUri> for String {
    fn from(value: DataUri) -> Self {
        value.to_string()
    }
}

/// An uploaded (or generated) photo: a data URI with an `image/*` MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhotoAsset(DataUri);

impl PhotoAsset {
    pub fn parse(raw: &str) -> Result<Self, DataUriError> {
        Self::from_data_uri(DataUri::parse(raw)?)
    }

    pub fn from_data_uri(uri: DataUri) -> Result<Self, DataUriError> {
        if uri.essence().starts_with("image/") {
            Ok(Self(uri))
        } else {
            Err(DataUriError::NotAnImage(uri.essence().to_string()))
        }
    }

    pub fn data_uri(&self) -> &DataUri {
        &self.0
    }

    pub fn into_data_uri(self) -> DataUri {
        self.0
    }
}

impl TryFrom<String> for PhotoAsset {
    type Error = DataUriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhotoAsset> for String {
    fn from(value: PhotoAsset) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for PhotoAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//=========================================================================================
// Poems
//=========================================================================================

/// A generated poem and its revisions.
///
/// The original text is kept untouched so every revision starts from the
/// same source poem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoemRecord {
    original: String,
    current: String,
    tone: Option<String>,
    style: Option<String>,
}

impl PoemRecord {
    pub fn new(poem: String, tone: Option<String>, style: Option<String>) -> Self {
        Self {
            current: poem.clone(),
            original: poem,
            tone,
            style,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// The text currently shown to the user.
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn tone(&self) -> Option<&str> {
        self.tone.as_deref()
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    /// Replaces the displayed text with a revision in a new tone.
    pub fn revise(&mut self, revised: String, tone: String) {
        self.current = revised;
        self.tone = Some(tone);
    }
}

//=========================================================================================
// Enumerated options
//=========================================================================================

/// Aspect ratios the image synthesis capability accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "3:4")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Widescreen,
        AspectRatio::Landscape,
        AspectRatio::Tall,
        AspectRatio::Portrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Portrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| format!("Unsupported aspect ratio '{s}'"))
    }
}

/// Prebuilt voices supported by the speech capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Achernar,
    Achird,
    #[default]
    Algenib,
    Algieba,
    Alnilam,
    Aoede,
    Autonoe,
    Callirrhoe,
    Charon,
    Despina,
    Enceladus,
    Erinome,
    Fenrir,
    Gacrux,
    Iapetus,
    Kore,
    Laomedeia,
    Leda,
    Orus,
    Puck,
    Pulcherrima,
    Rasalgethi,
    Sadachbia,
    Sadaltager,
    Schedar,
    Sulafat,
    Umbriel,
    Vindemiatrix,
    Zephyr,
    Zubenelgenubi,
}

impl Voice {
    pub const ALL: [Voice; 30] = [
        Voice::Achernar,
        Voice::Achird,
        Voice::Algenib,
        Voice::Algieba,
        Voice::Alnilam,
        Voice::Aoede,
        Voice::Autonoe,
        Voice::Callirrhoe,
        Voice::Charon,
        Voice::Despina,
        Voice::Enceladus,
        Voice::Erinome,
        Voice::Fenrir,
        Voice::Gacrux,
        Voice::Iapetus,
        Voice::Kore,
        Voice::Laomedeia,
        Voice::Leda,
        Voice::Orus,
        Voice::Puck,
        Voice::Pulcherrima,
        Voice::Rasalgethi,
        Voice::Sadachbia,
        Voice::Sadaltager,
        Voice::Schedar,
        Voice::Sulafat,
        Voice::Umbriel,
        Voice::Vindemiatrix,
        Voice::Zephyr,
        Voice::Zubenelgenubi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Achernar => "achernar",
            Voice::Achird => "achird",
            Voice::Algenib => "algenib",
            Voice::Algieba => "algieba",
            Voice::Alnilam => "alnilam",
            Voice::Aoede => "aoede",
            Voice::Autonoe => "autonoe",
            Voice::Callirrhoe => "callirrhoe",
            Voice::Charon => "charon",
            Voice::Despina => "despina",
            Voice::Enceladus => "enceladus",
            Voice::Erinome => "erinome",
            Voice::Fenrir => "fenrir",
            Voice::Gacrux => "gacrux",
            Voice::Iapetus => "iapetus",
            Voice::Kore => "kore",
            Voice::Laomedeia => "laomedeia",
            Voice::Leda => "leda",
            Voice::Orus => "orus",
            Voice::Puck => "puck",
            Voice::Pulcherrima => "pulcherrima",
            Voice::Rasalgethi => "rasalgethi",
            Voice::Sadachbia => "sadachbia",
            Voice::Sadaltager => "sadaltager",
            Voice::Schedar => "schedar",
            Voice::Sulafat => "sulafat",
            Voice::Umbriel => "umbriel",
            Voice::Vindemiatrix => "vindemiatrix",
            Voice::Zephyr => "zephyr",
            Voice::Zubenelgenubi => "zubenelgenubi",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unsupported voice '{s}'"))
    }
}

/// The generation capabilities a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Poem,
    Revision,
    Image,
    Audio,
    Video,
    VoiceTest,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Poem => "poem",
            Capability::Revision => "revision",
            Capability::Image => "image",
            Capability::Audio => "audio",
            Capability::Video => "video",
            Capability::VoiceTest => "voice_test",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Long-running operations
//=========================================================================================

/// Where generated media can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    /// Media returned inline.
    Inline(DataUri),
    /// A (possibly time-limited) link that must be downloaded.
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub code: Option<i32>,
    pub message: String,
}

/// A handle to a long-running remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub error: Option<OperationError>,
    pub media: Option<MediaRef>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            error: None,
            media: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_data_uri() {
        let uri = DataUri::parse("data:image/png;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type(), "image/png");
        assert_eq!(uri.payload(), "AAAA");
        assert_eq!(uri.to_string(), "data:image/png;base64,AAAA");
        assert_eq!(uri.decode().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn keeps_mime_parameters() {
        let uri = DataUri::parse("data:audio/L16;codec=pcm;rate=24000;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type(), "audio/L16;codec=pcm;rate=24000");
        assert_eq!(uri.essence(), "audio/L16");
    }

    #[test]
    fn rejects_malformed_data_uris() {
        assert_eq!(DataUri::parse("image/png;base64,AAAA"), Err(DataUriError::MissingScheme));
        assert_eq!(DataUri::parse("data:image/png,AAAA"), Err(DataUriError::NotBase64));
        assert!(matches!(
            DataUri::parse("data:png;base64,AAAA"),
            Err(DataUriError::InvalidMimeType(_))
        ));
        assert!(matches!(
            DataUri::parse("data:;base64,AAAA"),
            Err(DataUriError::InvalidMimeType(_))
        ));
        assert_eq!(DataUri::parse("data:image/png;base64,"), Err(DataUriError::EmptyPayload));
        assert_eq!(
            DataUri::parse("data:image/png;base64,not base64!"),
            Err(DataUriError::InvalidPayload)
        );
        for payload in ["A", "A=A=", "AAAAA", "AB==", "=AAA"] {
            assert_eq!(
                DataUri::parse(&format!("data:image/png;base64,{payload}")),
                Err(DataUriError::InvalidPayload),
                "{payload}"
            );
        }
    }

    #[test]
    fn photo_asset_requires_image_mime() {
        assert!(PhotoAsset::parse("data:image/jpeg;base64,AAAA").is_ok());
        assert_eq!(
            PhotoAsset::parse("data:video/mp4;base64,AAAA"),
            Err(DataUriError::NotAnImage("video/mp4".to_string()))
        );
    }

    #[test]
    fn decoded_len_accounts_for_padding() {
        let uri = DataUri::from_bytes("image/png", &[1, 2, 3, 4]).unwrap();
        assert_eq!(uri.payload(), "AQIDBA==");
        assert_eq!(uri.decoded_len(), 4);

        for len in 1..=7 {
            let uri = DataUri::from_bytes("image/png", &vec![7u8; len]).unwrap();
            assert_eq!(uri.decoded_len(), uri.decode().unwrap().len());
        }
    }

    #[test]
    fn data_uri_deserializes_from_string() {
        let uri: DataUri = serde_json::from_str("\"data:image/png;base64,AAAA\"").unwrap();
        assert_eq!(uri.essence(), "image/png");
        assert!(serde_json::from_str::<DataUri>("\"https://example.com/cat.png\"").is_err());
    }

    #[test]
    fn revision_keeps_original_poem() {
        let mut record = PoemRecord::new("first".into(), Some("Joyful".into()), None);
        record.revise("second".into(), "Dramatic".into());
        record.revise("third".into(), "Humorous".into());
        assert_eq!(record.original(), "first");
        assert_eq!(record.current(), "third");
        assert_eq!(record.tone(), Some("Humorous"));
    }

    #[test]
    fn voice_parsing_is_case_insensitive() {
        assert_eq!("Zephyr".parse::<Voice>().unwrap(), Voice::Zephyr);
        assert_eq!(" kore ".parse::<Voice>().unwrap(), Voice::Kore);
        assert!("alpha".parse::<Voice>().is_err());
        assert_eq!(Voice::default(), Voice::Algenib);
    }

    #[test]
    fn aspect_ratio_round_trips_through_serde() {
        let json = serde_json::to_string(&AspectRatio::Portrait).unwrap();
        assert_eq!(json, "\"3:4\"");
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Widescreen);
        assert!("21:9".parse::<AspectRatio>().is_err());
    }
}
