//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every generation endpoint answers with the `ActionOutcome` shape: the
//! output record on success, `{"error": ...}` on failure. The status code
//! tells the two failure kinds apart.

use crate::actions::{
    self, ActionOutcome, ActionResult, AudioOutput, ErrorBody, FailureKind, ImageOutput,
    PoemOutput, RevisionOutput, VideoOutput, VoiceBatchRequest, VoiceProbeResult,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use photo_poet_core::{
    builders::{
        ImageRequest, PoemRequest, RevisionRequest, SpeechRequest, VideoRequest,
        VoiceProbeRequest,
    },
    domain::{AspectRatio, Voice},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        generate_poem_handler,
        customize_poem_handler,
        text_to_speech_handler,
        generate_image_handler,
        generate_video_handler,
        test_voice_handler,
        probe_voices_handler,
        list_voices_handler,
        health_handler,
    ),
    components(
        schemas(
            PoemRequest, RevisionRequest, SpeechRequest, ImageRequest, VideoRequest,
            VoiceProbeRequest, VoiceBatchRequest, AspectRatio, Voice,
            PoemOutput, RevisionOutput, AudioOutput, ImageOutput, VideoOutput, ErrorBody,
            VoiceProbeEntry, VoiceList, HealthResponse,
        )
    ),
    tags(
        (name = "Photo Poet API", description = "Poems, artwork, narration and animation generated from photos.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

/// The voices accepted by the speech endpoint.
#[derive(Serialize, ToSchema)]
pub struct VoiceList {
    voices: Vec<Voice>,
    default: Voice,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// Documentation shape of one entry in a voice probe batch. The wire shape is
/// the voice name merged with either `audioDataUri` or `error`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProbeEntry {
    voice_name: String,
    audio_data_uri: Option<String>,
    error: Option<String>,
}

/// Maps an action result onto the HTTP response.
fn respond<T: Serialize>(result: ActionResult<T>) -> (StatusCode, Json<ActionOutcome<T>>) {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => match err.kind {
            FailureKind::Validation => StatusCode::BAD_REQUEST,
            FailureKind::Remote(_) => StatusCode::BAD_GATEWAY,
        },
    };
    (status, Json(result.into()))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Write a poem about a photo.
#[utoipa::path(
    post,
    path = "/api/poem",
    request_body = PoemRequest,
    responses(
        (status = 200, description = "Poem generated", body = PoemOutput),
        (status = 400, description = "The photo is missing or not an image", body = ErrorBody),
        (status = 502, description = "The generation service failed", body = ErrorBody)
    )
)]
pub async fn generate_poem_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<PoemRequest>,
) -> impl IntoResponse {
    respond(actions::generate_poem(&app_state.actions, &input).await)
}

/// Rewrite a poem in a new tone.
#[utoipa::path(
    post,
    path = "/api/poem/revise",
    request_body = RevisionRequest,
    responses(
        (status = 200, description = "Poem revised", body = RevisionOutput),
        (status = 400, description = "The poem or tone is missing", body = ErrorBody),
        (status = 502, description = "The generation service failed", body = ErrorBody)
    )
)]
pub async fn customize_poem_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<RevisionRequest>,
) -> impl IntoResponse {
    respond(actions::customize_poem(&app_state.actions, &input).await)
}

/// Read text aloud in one of the supported voices.
#[utoipa::path(
    post,
    path = "/api/speech",
    request_body = SpeechRequest,
    responses(
        (status = 200, description = "WAV audio as a data URI", body = AudioOutput),
        (status = 400, description = "The text is missing or the voice is unsupported", body = ErrorBody),
        (status = 502, description = "The generation service failed", body = ErrorBody)
    )
)]
pub async fn text_to_speech_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<SpeechRequest>,
) -> impl IntoResponse {
    respond(actions::text_to_speech(&app_state.actions, &input).await)
}

/// Create artwork for a poem, or synthesize an image from reference photos and a prompt.
#[utoipa::path(
    post,
    path = "/api/image",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Image generated", body = ImageOutput),
        (status = 400, description = "Required image data or prompt is missing", body = ErrorBody),
        (status = 502, description = "The generation service failed", body = ErrorBody)
    )
)]
pub async fn generate_image_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<ImageRequest>,
) -> impl IntoResponse {
    respond(actions::generate_image(&app_state.actions, &input).await)
}

/// Animate a photo into a short video. Waits for the long-running job to finish.
#[utoipa::path(
    post,
    path = "/api/video",
    request_body = VideoRequest,
    responses(
        (status = 200, description = "Video generated", body = VideoOutput),
        (status = 400, description = "The photo is missing or not an image", body = ErrorBody),
        (status = 502, description = "The generation service failed or timed out", body = ErrorBody)
    )
)]
pub async fn generate_video_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<VideoRequest>,
) -> impl IntoResponse {
    respond(actions::generate_video(&app_state.actions, &input).await)
}

/// Speak a short sample in any voice name.
#[utoipa::path(
    post,
    path = "/api/voices/test",
    request_body = VoiceProbeRequest,
    responses(
        (status = 200, description = "Sample audio", body = AudioOutput),
        (status = 400, description = "The voice name is missing", body = ErrorBody),
        (status = 502, description = "The generation service failed", body = ErrorBody)
    )
)]
pub async fn test_voice_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<VoiceProbeRequest>,
) -> impl IntoResponse {
    respond(actions::test_voice(&app_state.actions, &input).await)
}

/// Probe several voices at once. Each voice succeeds or fails on its own.
#[utoipa::path(
    post,
    path = "/api/voices/probe",
    request_body = VoiceBatchRequest,
    responses(
        (status = 200, description = "One result per requested voice, in request order", body = [VoiceProbeEntry])
    )
)]
pub async fn probe_voices_handler(
    State(app_state): State<Arc<AppState>>,
    Json(input): Json<VoiceBatchRequest>,
) -> Json<Vec<VoiceProbeResult>> {
    Json(actions::test_voices(&app_state.actions, &input).await)
}

/// List the supported speech voices.
#[utoipa::path(
    get,
    path = "/api/voices",
    responses(
        (status = 200, description = "Supported voices", body = VoiceList)
    )
)]
pub async fn list_voices_handler() -> Json<VoiceList> {
    Json(VoiceList {
        voices: Voice::ALL.to_vec(),
        default: Voice::default(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The service is up", body = HealthResponse)
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionError;
    use photo_poet_core::ErrorCategory;

    #[test]
    fn failures_map_to_status_codes() {
        let (status, _) = respond::<PoemOutput>(Err(ActionError {
            kind: FailureKind::Validation,
            message: "Photo data is missing.".into(),
        }));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) = respond::<PoemOutput>(Err(ActionError {
            kind: FailureKind::Remote(ErrorCategory::Timeout),
            message: "slow".into(),
        }));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, ActionOutcome::failure("slow"));

        let (status, _) = respond(Ok(PoemOutput {
            poem: "Roses".into(),
        }));
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/poem",
            "/api/poem/revise",
            "/api/speech",
            "/api/image",
            "/api/video",
            "/api/voices/test",
            "/api/voices/probe",
            "/api/voices",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
