//! crates/photo_poet_core/src/view.rs
//!
//! The view state machine behind one browser session.
//!
//! States carry the data they need, so an event that makes no sense in the
//! current state (revising before a poem exists, for example) is rejected
//! with a [`TransitionError`] and leaves the machine untouched. Every request
//! the machine asks for is tagged with a fresh [`RequestToken`]; a completion
//! whose token is no longer awaited is reported as [`Transition::Stale`].

use crate::builders::{
    GenerationOutput, GenerationRequest, ImageRequest, PoemRequest, RevisionRequest,
    SpeechRequest, ValidationError, VideoRequest,
};
use crate::domain::{
    AspectRatio, DataUri, PhotoAsset, PoemRecord, MAX_REFERENCE_PHOTOS,
    MAX_REFERENCE_PHOTO_BYTES, MAX_SINGLE_PHOTO_BYTES,
};
use serde::{Deserialize, Serialize};
use std::fmt;

const MIB: usize = 1024 * 1024;

/// Identifies one dispatched request. Tokens are never reused within a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct TokenCounter(u64);

impl TokenCounter {
    fn next(&mut self) -> RequestToken {
        self.0 += 1;
        RequestToken(self.0)
    }
}

/// The screen currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Initial,
    ImagesSelected,
    DescribeImage,
    LoadingImage,
    LoadingPoem,
    PoemReady,
    Error,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Initial => "initial",
            ViewKind::ImagesSelected => "images_selected",
            ViewKind::DescribeImage => "describe_image",
            ViewKind::LoadingImage => "loading_image",
            ViewKind::LoadingPoem => "loading_poem",
            ViewKind::PoemReady => "poem_ready",
            ViewKind::Error => "error",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local progress of a secondary generation on the poem screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SubTask<T> {
    Idle,
    Loading(RequestToken),
    Ready(T),
    Failed(String),
}

impl<T> SubTask<T> {
    fn awaits(&self, token: RequestToken) -> bool {
        matches!(self, SubTask::Loading(current) if *current == token)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SubTask::Idle)
    }
}

/// The secondary generations on the poem screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Revision,
    Audio,
    Artwork,
    Video,
}

impl Slot {
    fn as_str(self) -> &'static str {
        match self {
            Slot::Revision => "revision",
            Slot::Audio => "audio",
            Slot::Artwork => "artwork",
            Slot::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PoemView {
    photo: PhotoAsset,
    poem: PoemRecord,
    revising: Option<(RequestToken, String)>,
    voice: Option<String>,
    audio: SubTask<DataUri>,
    artwork: SubTask<DataUri>,
    video: SubTask<DataUri>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum ViewState {
    #[default]
    Initial,
    Error,
    ImagesSelected {
        photos: Vec<PhotoAsset>,
    },
    DescribeImage {
        photos: Vec<PhotoAsset>,
    },
    LoadingImage {
        token: RequestToken,
        photos: Vec<PhotoAsset>,
        tone: Option<String>,
        style: Option<String>,
    },
    LoadingPoem {
        token: RequestToken,
        photo: PhotoAsset,
        tone: Option<String>,
        style: Option<String>,
    },
    PoemReady(Box<PoemView>),
}

impl ViewState {
    fn kind(&self) -> ViewKind {
        match self {
            ViewState::Initial => ViewKind::Initial,
            ViewState::Error => ViewKind::Error,
            ViewState::ImagesSelected { .. } => ViewKind::ImagesSelected,
            ViewState::DescribeImage { .. } => ViewKind::DescribeImage,
            ViewState::LoadingImage { .. } => ViewKind::LoadingImage,
            ViewState::LoadingPoem { .. } => ViewKind::LoadingPoem,
            ViewState::PoemReady(_) => ViewKind::PoemReady,
        }
    }
}

/// Something the user did, or a dispatched request finishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    PhotosSelected {
        photos: Vec<String>,
    },
    PhotoRemoved {
        index: usize,
    },
    DescribeRequested,
    DescribeCancelled,
    PromptSubmitted {
        prompt: String,
        aspect_ratio: Option<AspectRatio>,
        tone: Option<String>,
        style: Option<String>,
    },
    SinglePhotoUploaded {
        photo: String,
        tone: Option<String>,
        style: Option<String>,
    },
    ReviseRequested {
        tone: String,
    },
    ReadAloudRequested {
        voice: Option<String>,
    },
    ArtworkRequested {
        aspect_ratio: Option<AspectRatio>,
        match_style: bool,
    },
    AnimationRequested,
    Reset,
    Completed {
        token: RequestToken,
        output: GenerationOutput,
    },
    Failed {
        token: RequestToken,
        message: String,
    },
}

impl ViewEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ViewEvent::PhotosSelected { .. } => "photos_selected",
            ViewEvent::PhotoRemoved { .. } => "photo_removed",
            ViewEvent::DescribeRequested => "describe_requested",
            ViewEvent::DescribeCancelled => "describe_cancelled",
            ViewEvent::PromptSubmitted { .. } => "prompt_submitted",
            ViewEvent::SinglePhotoUploaded { .. } => "single_photo_uploaded",
            ViewEvent::ReviseRequested { .. } => "revise_requested",
            ViewEvent::ReadAloudRequested { .. } => "read_aloud_requested",
            ViewEvent::ArtworkRequested { .. } => "artwork_requested",
            ViewEvent::AnimationRequested => "animation_requested",
            ViewEvent::Reset => "reset",
            ViewEvent::Completed { .. } => "completed",
            ViewEvent::Failed { .. } => "failed",
        }
    }
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    GeneratePoem {
        token: RequestToken,
        request: PoemRequest,
    },
    GenerateImage {
        token: RequestToken,
        request: ImageRequest,
    },
    RevisePoem {
        token: RequestToken,
        request: RevisionRequest,
    },
    Speak {
        token: RequestToken,
        request: SpeechRequest,
    },
    AnimatePhoto {
        token: RequestToken,
        request: VideoRequest,
    },
    Notify {
        title: String,
        message: String,
    },
}

impl Effect {
    /// The request to run for this effect, or `None` for a notification.
    pub fn into_dispatch(self) -> Option<(RequestToken, GenerationRequest)> {
        match self {
            Effect::GeneratePoem { token, request } => Some((token, GenerationRequest::Poem(request))),
            Effect::GenerateImage { token, request } => {
                Some((token, GenerationRequest::Image(request)))
            }
            Effect::RevisePoem { token, request } => {
                Some((token, GenerationRequest::Revision(request)))
            }
            Effect::Speak { token, request } => Some((token, GenerationRequest::Speech(request))),
            Effect::AnimatePhoto { token, request } => {
                Some((token, GenerationRequest::Video(request)))
            }
            Effect::Notify { .. } => None,
        }
    }
}

fn notify(title: &str, message: impl Into<String>) -> Effect {
    Effect::Notify {
        title: title.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(Vec<Effect>),
    /// A completion nobody is waiting for any more; nothing changed.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("`{event}` is not allowed in the {state} state")]
    InvalidEvent { event: &'static str, state: ViewKind },
    #[error("there is no photo at position {index} (selected: {count})")]
    NoSuchPhoto { index: usize, count: usize },
    #[error("the result does not match the pending {slot} request")]
    UnexpectedOutput { slot: &'static str },
}

/// What the browser renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub state: ViewKind,
    pub photo_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoAsset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poem: Option<PoemRecord>,
    pub revising: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<SubTask<DataUri>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork: Option<SubTask<DataUri>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<SubTask<DataUri>>,
}

type Step = (ViewState, Result<Transition, TransitionError>);

fn applied(state: ViewState, effects: Vec<Effect>) -> Step {
    (state, Ok(Transition::Applied(effects)))
}

#[derive(Debug, Default)]
pub struct ViewMachine {
    state: ViewState,
    tokens: TokenCounter,
}

impl ViewMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> ViewKind {
        self.state.kind()
    }

    /// Applies one event. On error the machine is left unchanged.
    pub fn handle(&mut self, event: ViewEvent) -> Result<Transition, TransitionError> {
        let state = std::mem::take(&mut self.state);
        let (next, result) = self.step(state, event);
        self.state = next;
        result
    }

    fn step(&mut self, state: ViewState, event: ViewEvent) -> Step {
        use ViewEvent as E;
        use ViewState as S;

        match (state, event) {
            (_, E::Reset) => applied(S::Initial, Vec::new()),

            (state @ (S::Initial | S::Error), E::PhotosSelected { photos }) => {
                match check_selection(0, &photos) {
                    Ok(selected) if !selected.is_empty() => {
                        applied(S::ImagesSelected { photos: selected }, Vec::new())
                    }
                    Ok(_) => applied(state, Vec::new()),
                    Err(notice) => applied(state, vec![notice]),
                }
            }
            (S::ImagesSelected { mut photos }, E::PhotosSelected { photos: incoming }) => {
                match check_selection(photos.len(), &incoming) {
                    Ok(selected) => {
                        photos.extend(selected);
                        applied(S::ImagesSelected { photos }, Vec::new())
                    }
                    Err(notice) => applied(S::ImagesSelected { photos }, vec![notice]),
                }
            }

            (S::ImagesSelected { photos }, E::PhotoRemoved { index }) => {
                match remove_photo(photos, index) {
                    Ok(photos) if photos.is_empty() => applied(S::Initial, Vec::new()),
                    Ok(photos) => applied(S::ImagesSelected { photos }, Vec::new()),
                    Err((photos, err)) => (S::ImagesSelected { photos }, Err(err)),
                }
            }
            (S::DescribeImage { photos }, E::PhotoRemoved { index }) => {
                match remove_photo(photos, index) {
                    Ok(photos) if photos.is_empty() => applied(S::Initial, Vec::new()),
                    Ok(photos) => applied(S::DescribeImage { photos }, Vec::new()),
                    Err((photos, err)) => (S::DescribeImage { photos }, Err(err)),
                }
            }

            (S::ImagesSelected { photos }, E::DescribeRequested) => {
                applied(S::DescribeImage { photos }, Vec::new())
            }
            (S::DescribeImage { photos }, E::DescribeCancelled) => {
                applied(S::ImagesSelected { photos }, Vec::new())
            }

            (
                S::DescribeImage { photos },
                E::PromptSubmitted {
                    prompt,
                    aspect_ratio,
                    tone,
                    style,
                },
            ) => {
                if prompt.trim().is_empty() {
                    return applied(
                        S::DescribeImage { photos },
                        vec![notify(
                            "Missing description",
                            "Please describe the image you want to create.",
                        )],
                    );
                }
                let token = self.tokens.next();
                let request = ImageRequest {
                    prompt: Some(prompt),
                    photo_data_uris: Some(photos.iter().map(ToString::to_string).collect()),
                    aspect_ratio,
                    ..Default::default()
                };
                applied(
                    S::LoadingImage {
                        token,
                        photos,
                        tone,
                        style,
                    },
                    vec![Effect::GenerateImage { token, request }],
                )
            }

            (state @ (S::Initial | S::Error), E::SinglePhotoUploaded { photo, tone, style }) => {
                let photo = match PhotoAsset::parse(&photo) {
                    Ok(photo) => photo,
                    Err(_) => {
                        return applied(
                            state,
                            vec![notify("Invalid image", ValidationError::InvalidPhoto.to_string())],
                        )
                    }
                };
                if photo.data_uri().decoded_len() > MAX_SINGLE_PHOTO_BYTES {
                    return applied(
                        state,
                        vec![notify(
                            "Image too large",
                            format!("Images must be smaller than {} MB.", MAX_SINGLE_PHOTO_BYTES / MIB),
                        )],
                    );
                }
                self.request_poem(photo, tone, style)
            }

            (
                S::LoadingImage {
                    token: awaited,
                    photos,
                    tone,
                    style,
                },
                E::Completed { token, output },
            ) if token == awaited => match output {
                GenerationOutput::Image(image) => match PhotoAsset::from_data_uri(image) {
                    Ok(photo) => self.request_poem(photo, tone, style),
                    Err(_) => applied(
                        S::Error,
                        vec![notify(
                            "Error",
                            "The generated image could not be used. Please try again.",
                        )],
                    ),
                },
                _ => (
                    S::LoadingImage {
                        token: awaited,
                        photos,
                        tone,
                        style,
                    },
                    Err(TransitionError::UnexpectedOutput { slot: "image" }),
                ),
            },

            (
                S::LoadingPoem {
                    token: awaited,
                    photo,
                    tone,
                    style,
                },
                E::Completed { token, output },
            ) if token == awaited => match output {
                GenerationOutput::Poem(text) => {
                    let view = PoemView {
                        photo,
                        poem: PoemRecord::new(text, tone, style),
                        revising: None,
                        voice: None,
                        audio: SubTask::Idle,
                        artwork: SubTask::Idle,
                        video: SubTask::Idle,
                    };
                    applied(S::PoemReady(Box::new(view)), Vec::new())
                }
                _ => (
                    S::LoadingPoem {
                        token: awaited,
                        photo,
                        tone,
                        style,
                    },
                    Err(TransitionError::UnexpectedOutput { slot: "poem" }),
                ),
            },

            (S::LoadingImage { token: awaited, .. }, E::Failed { token, message })
            | (S::LoadingPoem { token: awaited, .. }, E::Failed { token, message })
                if token == awaited =>
            {
                applied(S::Error, vec![notify("Error", message)])
            }

            (S::PoemReady(mut view), E::Completed { token, output }) => {
                match view.complete(token, output, &mut self.tokens) {
                    Ok(Some(effects)) => applied(S::PoemReady(view), effects),
                    Ok(None) => (S::PoemReady(view), Ok(Transition::Stale)),
                    Err(err) => (S::PoemReady(view), Err(err)),
                }
            }
            (S::PoemReady(mut view), E::Failed { token, message }) => match view.fail(token, &message) {
                Some(effects) => applied(S::PoemReady(view), effects),
                None => (S::PoemReady(view), Ok(Transition::Stale)),
            },

            (S::PoemReady(mut view), E::ReviseRequested { tone }) => {
                if tone.trim().is_empty() {
                    return applied(
                        S::PoemReady(view),
                        vec![notify("Missing tone", "Please choose a tone for the revision.")],
                    );
                }
                let token = self.tokens.next();
                let request = RevisionRequest {
                    original_poem: Some(view.poem.original().to_string()),
                    tone: Some(tone.clone()),
                };
                view.revising = Some((token, tone));
                applied(S::PoemReady(view), vec![Effect::RevisePoem { token, request }])
            }
            (S::PoemReady(mut view), E::ReadAloudRequested { voice }) => {
                view.voice = voice;
                let effect = view.speak(&mut self.tokens);
                applied(S::PoemReady(view), vec![effect])
            }
            (
                S::PoemReady(mut view),
                E::ArtworkRequested {
                    aspect_ratio,
                    match_style,
                },
            ) => {
                let token = self.tokens.next();
                let request = ImageRequest {
                    poem: Some(view.poem.current().to_string()),
                    photo_data_uri: Some(view.photo.to_string()),
                    aspect_ratio,
                    match_style,
                    ..Default::default()
                };
                view.artwork = SubTask::Loading(token);
                applied(S::PoemReady(view), vec![Effect::GenerateImage { token, request }])
            }
            (S::PoemReady(mut view), E::AnimationRequested) => {
                let token = self.tokens.next();
                let request = VideoRequest {
                    photo_data_uri: Some(view.photo.to_string()),
                };
                view.video = SubTask::Loading(token);
                applied(S::PoemReady(view), vec![Effect::AnimatePhoto { token, request }])
            }

            (state, E::Completed { .. } | E::Failed { .. }) => (state, Ok(Transition::Stale)),

            (state, event) => {
                let err = TransitionError::InvalidEvent {
                    event: event.name(),
                    state: state.kind(),
                };
                (state, Err(err))
            }
        }
    }

    fn request_poem(
        &mut self,
        photo: PhotoAsset,
        tone: Option<String>,
        style: Option<String>,
    ) -> Step {
        let token = self.tokens.next();
        let request = PoemRequest {
            photo_data_uri: Some(photo.to_string()),
            tone: tone.clone(),
            style: style.clone(),
        };
        applied(
            ViewState::LoadingPoem {
                token,
                photo,
                tone,
                style,
            },
            vec![Effect::GeneratePoem { token, request }],
        )
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let mut snapshot = ViewSnapshot {
            state: self.kind(),
            photo_count: 0,
            photo: None,
            poem: None,
            revising: false,
            audio: None,
            artwork: None,
            video: None,
        };
        match &self.state {
            ViewState::Initial | ViewState::Error => {}
            ViewState::ImagesSelected { photos }
            | ViewState::DescribeImage { photos }
            | ViewState::LoadingImage { photos, .. } => snapshot.photo_count = photos.len(),
            ViewState::LoadingPoem { photo, .. } => {
                snapshot.photo_count = 1;
                snapshot.photo = Some(photo.clone());
            }
            ViewState::PoemReady(view) => {
                snapshot.photo_count = 1;
                snapshot.photo = Some(view.photo.clone());
                snapshot.poem = Some(view.poem.clone());
                snapshot.revising = view.revising.is_some();
                snapshot.audio = Some(view.audio.clone());
                snapshot.artwork = Some(view.artwork.clone());
                snapshot.video = Some(view.video.clone());
            }
        }
        snapshot
    }
}

/// Validates newly selected photos against the selection limits.
fn check_selection(already: usize, incoming: &[String]) -> Result<Vec<PhotoAsset>, Effect> {
    if already + incoming.len() > MAX_REFERENCE_PHOTOS {
        return Err(notify("Too many images", ValidationError::TooManyPhotos.to_string()));
    }
    incoming
        .iter()
        .map(|raw| {
            let photo = PhotoAsset::parse(raw)
                .map_err(|_| notify("Invalid image", ValidationError::InvalidPhoto.to_string()))?;
            if photo.data_uri().decoded_len() > MAX_REFERENCE_PHOTO_BYTES {
                return Err(notify(
                    "Image too large",
                    format!(
                        "Each image must be smaller than {} MB.",
                        MAX_REFERENCE_PHOTO_BYTES / MIB
                    ),
                ));
            }
            Ok(photo)
        })
        .collect()
}

fn remove_photo(
    mut photos: Vec<PhotoAsset>,
    index: usize,
) -> Result<Vec<PhotoAsset>, (Vec<PhotoAsset>, TransitionError)> {
    if index >= photos.len() {
        let count = photos.len();
        return Err((photos, TransitionError::NoSuchPhoto { index, count }));
    }
    photos.remove(index);
    Ok(photos)
}

impl PoemView {
    fn slot_awaiting(&self, token: RequestToken) -> Option<Slot> {
        if self.revising.as_ref().is_some_and(|(awaited, _)| *awaited == token) {
            Some(Slot::Revision)
        } else if self.audio.awaits(token) {
            Some(Slot::Audio)
        } else if self.artwork.awaits(token) {
            Some(Slot::Artwork)
        } else if self.video.awaits(token) {
            Some(Slot::Video)
        } else {
            None
        }
    }

    fn speak(&mut self, tokens: &mut TokenCounter) -> Effect {
        let token = tokens.next();
        self.audio = SubTask::Loading(token);
        Effect::Speak {
            token,
            request: SpeechRequest {
                text: Some(self.poem.current().to_string()),
                voice_name: self.voice.clone(),
            },
        }
    }

    fn complete(
        &mut self,
        token: RequestToken,
        output: GenerationOutput,
        tokens: &mut TokenCounter,
    ) -> Result<Option<Vec<Effect>>, TransitionError> {
        let Some(slot) = self.slot_awaiting(token) else {
            return Ok(None);
        };
        match (slot, output) {
            (Slot::Revision, GenerationOutput::RevisedPoem(text)) => {
                let tone = self.revising.take().map(|(_, tone)| tone).unwrap_or_default();
                self.poem.revise(text, tone);
                // Narration of the old text is out of date.
                if self.audio.is_idle() {
                    Ok(Some(Vec::new()))
                } else {
                    Ok(Some(vec![self.speak(tokens)]))
                }
            }
            (Slot::Audio, GenerationOutput::Audio(audio)) => {
                self.audio = SubTask::Ready(audio);
                Ok(Some(Vec::new()))
            }
            (Slot::Artwork, GenerationOutput::Image(image)) => {
                self.artwork = SubTask::Ready(image);
                Ok(Some(Vec::new()))
            }
            (Slot::Video, GenerationOutput::Video(video)) => {
                self.video = SubTask::Ready(video);
                Ok(Some(Vec::new()))
            }
            (slot, _) => Err(TransitionError::UnexpectedOutput {
                slot: slot.as_str(),
            }),
        }
    }

    fn fail(&mut self, token: RequestToken, message: &str) -> Option<Vec<Effect>> {
        match self.slot_awaiting(token)? {
            Slot::Revision => self.revising = None,
            Slot::Audio => self.audio = SubTask::Failed(message.to_string()),
            Slot::Artwork => self.artwork = SubTask::Failed(message.to_string()),
            Slot::Video => self.video = SubTask::Failed(message.to_string()),
        }
        Some(vec![notify("Error", message)])
    }
}
