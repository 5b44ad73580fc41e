//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for the Gemini REST API.
//! It implements the `GenerationClient` port from the `core` crate.

use crate::config::GeminiConfig;
use async_trait::async_trait;
use bytes::Bytes;
use photo_poet_core::{
    domain::{DataUri, MediaRef, Operation, OperationError},
    ports::{GenerationClient, PortError, PortResult},
    prompt::{MediaConfig, MediaOutput, MediaRequest, ModelKind, Prompt, PromptPart, TextRequest},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-goog-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const SAFETY_FINISH_REASONS: [&str; 5] =
    ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "IMAGE_SAFETY"];

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationClient` against the Gemini API.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> PortResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn api_key(&self) -> PortResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| PortError::MissingCredential("GEMINI_API_KEY is not set".to_string()))
    }

    fn model(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Text => &self.config.text_model,
            ModelKind::Image => &self.config.image_model,
            ModelKind::Speech => &self.config.speech_model,
            ModelKind::Video => &self.config.video_model,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url, self.config.api_version, path
        )
    }

    async fn post_json(&self, url: &str, body: &Value) -> PortResult<Value> {
        debug!(%url, "Calling Gemini");
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, self.api_key()?)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn generate_content(&self, model: &str, body: &Value) -> PortResult<ContentResponse> {
        let url = self.url(&format!("models/{model}:generateContent"));
        let value = self.post_json(&url, body).await?;
        let response: ContentResponse = serde_json::from_value(value)
            .map_err(|e| PortError::Protocol(format!("failed to parse response: {e}")))?;
        response.check_blocked()?;
        Ok(response)
    }

    async fn submit_video(&self, request: &MediaRequest) -> PortResult<MediaOutput> {
        let MediaConfig::Video {
            duration_seconds,
            aspect_ratio,
            person_generation,
        } = &request.config
        else {
            return Err(PortError::Unexpected(
                "video model requires a video configuration".to_string(),
            ));
        };

        let mut instance = json!({ "prompt": request.prompt.text_content() });
        if let Some(image) = first_media(&request.prompt) {
            instance["image"] = json!({
                "bytesBase64Encoded": image.payload(),
                "mimeType": image.essence(),
            });
        }
        let body = json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": aspect_ratio.as_str(),
                "durationSeconds": duration_seconds,
                "personGeneration": person_generation,
                "sampleCount": 1,
            }
        });

        let url = self.url(&format!(
            "models/{}:predictLongRunning",
            self.model(ModelKind::Video)
        ));
        let value = self.post_json(&url, &body).await?;
        let operation: OperationBody = serde_json::from_value(value)
            .map_err(|e| PortError::Protocol(format!("failed to parse operation: {e}")))?;

        // A submission without a name gives the poller nothing to track.
        Ok(match operation.into_domain(None) {
            Some(operation) => MediaOutput::operation(operation),
            None => MediaOutput::default(),
        })
    }
}

//=========================================================================================
// `GenerationClient` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationClient for GeminiClient {
    /// Generates a JSON object matching the request's declared output fields.
    async fn generate_text(&self, request: &TextRequest) -> PortResult<Value> {
        let body = json!({
            "contents": contents(&request.prompt),
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": request.schema.to_json_schema(),
            }
        });
        let response = self
            .generate_content(self.model(ModelKind::Text), &body)
            .await?;

        let text = response.first_text().ok_or_else(|| {
            PortError::MissingOutput("the model returned no text".to_string())
        })?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| PortError::Protocol(format!("model returned invalid JSON: {e}")))?;
        if !value.is_object() {
            return Err(PortError::Protocol(
                "model returned JSON that is not an object".to_string(),
            ));
        }
        Ok(value)
    }

    /// Generates an image or speech inline, or submits a video operation.
    async fn generate_media(&self, request: &MediaRequest) -> PortResult<MediaOutput> {
        let mut generation_config = json!({
            "responseModalities": request
                .modalities
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>(),
        });
        match &request.config {
            MediaConfig::Image { aspect_ratio } => {
                generation_config["imageConfig"] = json!({ "aspectRatio": aspect_ratio.as_str() });
            }
            MediaConfig::Speech { voice } => {
                generation_config["speechConfig"] = json!({
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                });
            }
            MediaConfig::Video { .. } => return self.submit_video(request).await,
        }

        let body = json!({
            "contents": contents(&request.prompt),
            "generationConfig": generation_config,
        });
        let response = self
            .generate_content(self.model(request.model), &body)
            .await?;

        match response.first_media()? {
            Some(media) => Ok(MediaOutput::media(media)),
            None => {
                warn!(model = self.model(request.model), "Gemini returned no media part");
                Ok(MediaOutput::default())
            }
        }
    }

    async fn check_operation(&self, operation: &Operation) -> PortResult<Operation> {
        let url = self.url(&operation.name);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await
            .map_err(transport_error)?;
        let value = read_json(response).await?;
        let body: OperationBody = serde_json::from_value(value)
            .map_err(|e| PortError::Protocol(format!("failed to parse operation: {e}")))?;

        body.into_domain(Some(&operation.name)).ok_or_else(|| {
            PortError::Protocol("operation status has no name".to_string())
        })
    }

    async fn fetch_media(&self, url: &str) -> PortResult<Bytes> {
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, %status, "Failed to read media download error body");
                    format!("media download failed with status {status}: {e}")
                }
            };
            return Err(api_error(status.as_u16(), &body));
        }
        response.bytes().await.map_err(transport_error)
    }
}

//=========================================================================================
// Request and Response Helpers
//=========================================================================================

fn contents(prompt: &Prompt) -> Value {
    let parts: Vec<Value> = prompt
        .parts()
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Media(uri) => json!({
                "inlineData": { "mimeType": uri.essence(), "data": uri.payload() }
            }),
        })
        .collect();
    json!([{ "role": "user", "parts": parts }])
}

fn first_media(prompt: &Prompt) -> Option<&DataUri> {
    prompt.parts().iter().find_map(|part| match part {
        PromptPart::Media(uri) => Some(uri),
        PromptPart::Text(_) => None,
    })
}

fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout(e.to_string())
    } else {
        PortError::Network(e.to_string())
    }
}

/// Builds an API error, preferring the service's own `error.message`.
fn api_error(status: u16, body: &str) -> PortError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| body.chars().take(500).collect());
    PortError::Api { status, message }
}

async fn read_json(response: reqwest::Response) -> PortResult<Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(api_error(status.as_u16(), &text));
    }
    serde_json::from_str(&text)
        .map_err(|e| PortError::Protocol(format!("response is not JSON: {e}")))
}

// --- Gemini API response types ---

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    file_data: Option<FileData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
}

impl ContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Fails when the prompt or the only candidate was stopped by a safety filter.
    fn check_blocked(&self) -> PortResult<()> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return Err(PortError::Unexpected(format!(
                "The prompt was blocked by the safety policy ({reason})."
            )));
        }
        let finish = self
            .candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref());
        if let Some(reason) = finish.filter(|r| SAFETY_FINISH_REASONS.contains(r)) {
            if self.parts().next().is_none() {
                return Err(PortError::Unexpected(format!(
                    "The response was blocked by the safety policy ({reason})."
                )));
            }
        }
        Ok(())
    }

    fn first_text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|part| part.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    fn first_media(&self) -> PortResult<Option<MediaRef>> {
        for part in self.parts() {
            if let Some(inline) = &part.inline_data {
                let uri = DataUri::new(inline.mime_type.clone(), inline.data.clone())
                    .map_err(|e| PortError::Protocol(format!("invalid inline media: {e}")))?;
                return Ok(Some(MediaRef::Inline(uri)));
            }
            if let Some(file) = &part.file_data {
                return Ok(Some(MediaRef::Url(file.file_uri.clone())));
            }
        }
        Ok(None)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<VideoResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    generated_samples: Vec<VideoSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Deserialize)]
struct VideoSample {
    #[serde(default)]
    video: Option<VideoFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoFile {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

impl OperationBody {
    /// Converts to the domain type, keeping `fallback_name` when the body omits it.
    fn into_domain(self, fallback_name: Option<&str>) -> Option<Operation> {
        let name = self.name.or_else(|| fallback_name.map(str::to_string))?;
        let mut operation = Operation {
            name,
            done: self.done,
            error: self.error.map(|e| OperationError {
                code: e.code,
                message: e.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
            media: None,
        };

        let Some(video) = self.response.and_then(|r| r.generate_video_response) else {
            return Some(operation);
        };
        operation.media = video.generated_samples.into_iter().find_map(|sample| {
            let file = sample.video?;
            if let Some(uri) = file.uri {
                return Some(MediaRef::Url(uri));
            }
            let mime = file.mime_type.unwrap_or_else(|| "video/mp4".to_string());
            DataUri::new(mime, file.bytes_base64_encoded?)
                .ok()
                .map(MediaRef::Inline)
        });
        let filtered = !video.rai_media_filtered_reasons.is_empty();
        if filtered && operation.media.is_none() && operation.error.is_none() {
            operation.error = Some(OperationError {
                code: None,
                message: format!(
                    "The video was blocked by the safety policy: {}",
                    video.rai_media_filtered_reasons.join("; ")
                ),
            });
        }
        Some(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_message_is_preferred() {
        let err = api_error(
            400,
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "remote service returned 400: API key not valid. Please pass a valid API key."
        );
        assert!(matches!(api_error(502, "bad gateway"), PortError::Api { status: 502, .. }));
    }

    #[test]
    fn finished_operation_exposes_video_uri() {
        let body: OperationBody = serde_json::from_value(json!({
            "name": "models/veo/operations/abc",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [{ "video": { "uri": "https://files.example/v.mp4" } }]
                }
            }
        }))
        .unwrap();
        let operation = body.into_domain(None).unwrap();
        assert!(operation.done);
        assert_eq!(
            operation.media,
            Some(MediaRef::Url("https://files.example/v.mp4".to_string()))
        );
    }

    #[test]
    fn filtered_video_becomes_safety_error() {
        let body: OperationBody = serde_json::from_value(json!({
            "done": true,
            "response": {
                "generateVideoResponse": { "raiMediaFilteredReasons": ["child safety"] }
            }
        }))
        .unwrap();
        let operation = body.into_domain(Some("operations/1")).unwrap();
        assert_eq!(operation.name, "operations/1");
        assert!(operation.error.unwrap().message.contains("safety policy"));
    }

    #[test]
    fn blocked_prompt_mentions_safety_policy() {
        let response: ContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = response.check_blocked().unwrap_err();
        assert!(err.to_string().contains("safety policy"));
    }
}
