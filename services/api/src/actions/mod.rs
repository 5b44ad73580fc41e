//! services/api/src/actions/mod.rs
//!
//! The action layer: one entry point per capability. Each validates its input
//! through the core request builders before any remote call, runs the call
//! through the generation port, and turns every failure into a fixed,
//! user-facing sentence. Raw failure detail only reaches the log.

pub mod outcome;

use futures::future::join_all;
use photo_poet_core::{
    audio::wav_data_uri,
    builders::{
        self, ImagePlan, ImageRequest, PoemRequest, RevisionRequest, SpeechRequest,
        VideoRequest, VoiceProbeRequest, POEM_FIELD, REVISED_POEM_FIELD, STYLE_FIELD,
    },
    classifier::{classify_port_error, user_message, ErrorCategory},
    domain::{Capability, DataUri, MediaRef},
    poller::{await_operation, resolve_media, PollPolicy},
    ports::{GenerationClient, PortError, PortResult},
    prompt::{MediaOutput, MediaRequest, TextRequest},
    GenerationOutput, GenerationRequest, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

pub use outcome::{
    ActionOutcome, AudioOutput, ErrorBody, ImageOutput, PoemOutput, RevisionOutput, VideoOutput,
};

/// MIME type the speech model uses for raw PCM when it does not say otherwise.
const RAW_SPEECH_MIME: &str = "audio/L16;codec=pcm;rate=24000";

//=========================================================================================
// Context and Errors
//=========================================================================================

/// Everything an action needs: the generation client and the polling policy.
/// Built once at startup and shared read-only.
#[derive(Clone)]
pub struct ActionContext {
    client: Arc<dyn GenerationClient>,
    poll_policy: PollPolicy,
}

impl ActionContext {
    pub fn new(client: Arc<dyn GenerationClient>, poll_policy: PollPolicy) -> Self {
        Self {
            client,
            poll_policy,
        }
    }

    pub fn client(&self) -> &dyn GenerationClient {
        self.client.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A required input was missing; no remote call was made.
    Validation,
    Remote(ErrorCategory),
}

/// A failed action, already reduced to the sentence shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    pub kind: FailureKind,
    pub message: String,
}

pub type ActionResult<T> = Result<T, ActionError>;

impl<T> From<ActionResult<T>> for ActionOutcome<T> {
    fn from(result: ActionResult<T>) -> Self {
        match result {
            Ok(output) => ActionOutcome::Success(output),
            Err(err) => ActionOutcome::failure(err.message),
        }
    }
}

fn rejected(err: ValidationError, capability: Capability) -> ActionError {
    warn!(%capability, reason = %err, "Rejected generation request");
    ActionError {
        kind: FailureKind::Validation,
        message: err.to_string(),
    }
}

/// Runs the remote part of an action and classifies any failure.
async fn remote<T, F>(capability: Capability, call: F) -> ActionResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    call.await.map_err(|err| {
        let category = classify_port_error(&err);
        error!(%capability, ?category, error = %err, "Generation failed");
        ActionError {
            kind: FailureKind::Remote(category),
            message: user_message(category, capability).to_string(),
        }
    })
}

fn inline_media(output: MediaOutput, what: &str) -> PortResult<MediaRef> {
    output
        .media
        .ok_or_else(|| PortError::MissingOutput(format!("{what} generation returned no media.")))
}

async fn speak(ctx: &ActionContext, request: &MediaRequest) -> PortResult<DataUri> {
    let output = ctx.client.generate_media(request).await?;
    let media = inline_media(output, "Speech")?;
    let audio = resolve_media(ctx.client(), media, RAW_SPEECH_MIME).await?;
    wav_data_uri(&audio).map_err(|e| PortError::Unexpected(e.to_string()))
}

async fn render_image(ctx: &ActionContext, request: &MediaRequest) -> PortResult<DataUri> {
    let output = ctx.client.generate_media(request).await?;
    let media = inline_media(output, "Image")?;
    resolve_media(ctx.client(), media, "image/png").await
}

//=========================================================================================
// Entry Points
//=========================================================================================

pub async fn generate_poem(ctx: &ActionContext, input: &PoemRequest) -> ActionResult<PoemOutput> {
    let capability = Capability::Poem;
    let request = builders::poem(input).map_err(|e| rejected(e, capability))?;

    let poem = remote(capability, async {
        let output = ctx.client.generate_text(&request).await?;
        builders::text_field(&output, POEM_FIELD)
    })
    .await?;

    info!(%capability, "Poem generated");
    Ok(PoemOutput { poem })
}

pub async fn customize_poem(
    ctx: &ActionContext,
    input: &RevisionRequest,
) -> ActionResult<RevisionOutput> {
    let capability = Capability::Revision;
    let request = builders::revision(input).map_err(|e| rejected(e, capability))?;

    let revised_poem = remote(capability, async {
        let output = ctx.client.generate_text(&request).await?;
        builders::text_field(&output, REVISED_POEM_FIELD)
    })
    .await?;

    info!(%capability, "Poem revised");
    Ok(RevisionOutput { revised_poem })
}

pub async fn text_to_speech(ctx: &ActionContext, input: &SpeechRequest) -> ActionResult<AudioOutput> {
    let audio = speech_uri(ctx, input).await?;
    Ok(AudioOutput {
        audio_data_uri: audio.to_string(),
    })
}

async fn speech_uri(ctx: &ActionContext, input: &SpeechRequest) -> ActionResult<DataUri> {
    let capability = Capability::Audio;
    let request = builders::speech(input).map_err(|e| rejected(e, capability))?;

    let audio = remote(capability, speak(ctx, &request)).await?;

    info!(%capability, bytes = audio.decoded_len(), "Speech generated");
    Ok(audio)
}

pub async fn generate_image(ctx: &ActionContext, input: &ImageRequest) -> ActionResult<ImageOutput> {
    let image = image_uri(ctx, input).await?;
    Ok(ImageOutput {
        image_data_uri: image.to_string(),
    })
}

async fn image_uri(ctx: &ActionContext, input: &ImageRequest) -> ActionResult<DataUri> {
    let capability = Capability::Image;
    let plan = builders::image(input).map_err(|e| rejected(e, capability))?;

    let image = remote(capability, async {
        let request = match plan {
            ImagePlan::Synthesis(request) => request,
            ImagePlan::Artwork(plan) => {
                let style = match plan.style_probe() {
                    Some(probe) => classify_style(ctx, &probe).await,
                    None => None,
                };
                plan.compose(style.as_deref())
            }
        };
        render_image(ctx, &request).await
    })
    .await?;

    info!(%capability, mime = image.essence(), "Image generated");
    Ok(image)
}

/// The style sub-call is best effort: on failure the default style is used.
async fn classify_style(ctx: &ActionContext, probe: &TextRequest) -> Option<String> {
    let result = ctx
        .client
        .generate_text(probe)
        .await
        .and_then(|output| builders::text_field(&output, STYLE_FIELD));
    match result {
        Ok(style) => Some(style),
        Err(err) => {
            warn!(error = %err, "Style classification failed, using the default style");
            None
        }
    }
}

pub async fn generate_video(ctx: &ActionContext, input: &VideoRequest) -> ActionResult<VideoOutput> {
    let video = video_uri(ctx, input).await?;
    Ok(VideoOutput {
        video_data_uri: video.to_string(),
    })
}

async fn video_uri(ctx: &ActionContext, input: &VideoRequest) -> ActionResult<DataUri> {
    let capability = Capability::Video;
    let request = builders::video(input).map_err(|e| rejected(e, capability))?;

    let video = remote(capability, async {
        let output = ctx.client.generate_media(&request).await?;
        info!(%capability, "Video generation submitted, waiting for the operation");
        let media = await_operation(ctx.client(), output, &ctx.poll_policy).await?;
        resolve_media(ctx.client(), media, "video/mp4").await
    })
    .await?;

    info!(%capability, bytes = video.decoded_len(), "Video generated");
    Ok(video)
}

pub async fn test_voice(ctx: &ActionContext, input: &VoiceProbeRequest) -> ActionResult<AudioOutput> {
    let audio = voice_uri(ctx, input).await?;
    Ok(AudioOutput {
        audio_data_uri: audio.to_string(),
    })
}

async fn voice_uri(ctx: &ActionContext, input: &VoiceProbeRequest) -> ActionResult<DataUri> {
    let capability = Capability::VoiceTest;
    let request = builders::voice_probe(input).map_err(|e| rejected(e, capability))?;
    remote(capability, speak(ctx, &request)).await
}

//=========================================================================================
// Voice Probe Batch
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceBatchRequest {
    pub voice_names: Vec<String>,
    /// Custom text spoken by every voice.
    pub text: Option<String>,
}

/// One voice's result within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProbeResult {
    pub voice_name: String,
    #[serde(flatten)]
    pub outcome: ActionOutcome<AudioOutput>,
}

/// Probes every voice concurrently. Each voice's result is independent: one
/// failing voice does not affect the others.
pub async fn test_voices(ctx: &ActionContext, input: &VoiceBatchRequest) -> Vec<VoiceProbeResult> {
    let probes = input.voice_names.iter().map(|voice_name| async move {
        let request = VoiceProbeRequest {
            voice_name: Some(voice_name.clone()),
            text: input.text.clone(),
        };
        VoiceProbeResult {
            voice_name: voice_name.clone(),
            outcome: test_voice(ctx, &request).await.into(),
        }
    });
    let results = join_all(probes).await;

    let succeeded = results.iter().filter(|r| r.outcome.is_success()).count();
    info!(total = results.len(), succeeded, "Voice probe batch finished");
    results
}

//=========================================================================================
// Generic Dispatch
//=========================================================================================

/// Runs any capability. Used by the session endpoint to carry out effects.
pub async fn run(ctx: &ActionContext, request: &GenerationRequest) -> ActionResult<GenerationOutput> {
    Ok(match request {
        GenerationRequest::Poem(input) => GenerationOutput::Poem(generate_poem(ctx, input).await?.poem),
        GenerationRequest::Revision(input) => {
            GenerationOutput::RevisedPoem(customize_poem(ctx, input).await?.revised_poem)
        }
        GenerationRequest::Image(input) => GenerationOutput::Image(image_uri(ctx, input).await?),
        GenerationRequest::Speech(input) => GenerationOutput::Audio(speech_uri(ctx, input).await?),
        GenerationRequest::VoiceProbe(input) => GenerationOutput::Audio(voice_uri(ctx, input).await?),
        GenerationRequest::Video(input) => GenerationOutput::Video(video_uri(ctx, input).await?),
    })
}
