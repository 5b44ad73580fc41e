//! Shared test double for the generation port.
//!
//! `StubClient` answers each port method from a script and counts every call,
//! so tests can assert that validation failures never reach the remote side.

#![allow(dead_code)]

use api_lib::actions::ActionContext;
use async_trait::async_trait;
use bytes::Bytes;
use photo_poet_core::{
    domain::{DataUri, MediaRef, Operation},
    poller::PollPolicy,
    ports::{GenerationClient, PortError, PortResult},
    prompt::{MediaOutput, MediaRequest, TextRequest},
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const PHOTO: &str = "data:image/png;base64,AAAA";

/// Six bytes of silent 16-bit PCM, as the speech model returns it.
pub const RAW_SPEECH: &str = "data:audio/L16;codec=pcm;rate=24000;base64,AAAAAAAA";

type TextScript = Box<dyn Fn(&TextRequest) -> PortResult<Value> + Send + Sync>;
type MediaScript = Box<dyn Fn(&MediaRequest) -> PortResult<MediaOutput> + Send + Sync>;
/// Receives the 1-based poll number.
type OperationScript = Box<dyn Fn(usize, &Operation) -> PortResult<Operation> + Send + Sync>;
type FetchScript = Box<dyn Fn(&str) -> PortResult<Bytes> + Send + Sync>;

#[derive(Default)]
pub struct Calls {
    pub text: AtomicUsize,
    pub media: AtomicUsize,
    pub polls: AtomicUsize,
    pub fetches: AtomicUsize,
}

pub struct StubClient {
    pub calls: Calls,
    text: Option<TextScript>,
    media: Option<MediaScript>,
    operation: Option<OperationScript>,
    fetch: Option<FetchScript>,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            calls: Calls::default(),
            text: None,
            media: None,
            operation: None,
            fetch: None,
        }
    }

    pub fn on_text(
        mut self,
        script: impl Fn(&TextRequest) -> PortResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.text = Some(Box::new(script));
        self
    }

    pub fn on_media(
        mut self,
        script: impl Fn(&MediaRequest) -> PortResult<MediaOutput> + Send + Sync + 'static,
    ) -> Self {
        self.media = Some(Box::new(script));
        self
    }

    pub fn on_operation(
        mut self,
        script: impl Fn(usize, &Operation) -> PortResult<Operation> + Send + Sync + 'static,
    ) -> Self {
        self.operation = Some(Box::new(script));
        self
    }

    pub fn on_fetch(
        mut self,
        script: impl Fn(&str) -> PortResult<Bytes> + Send + Sync + 'static,
    ) -> Self {
        self.fetch = Some(Box::new(script));
        self
    }

    /// Every remote call made so far, of any kind.
    pub fn total_calls(&self) -> usize {
        self.calls.text.load(Ordering::SeqCst)
            + self.calls.media.load(Ordering::SeqCst)
            + self.calls.polls.load(Ordering::SeqCst)
            + self.calls.fetches.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.calls.polls.load(Ordering::SeqCst)
    }
}

fn unscripted(method: &str) -> PortError {
    PortError::Unexpected(format!("{method} was not scripted"))
}

#[async_trait]
impl GenerationClient for StubClient {
    async fn generate_text(&self, request: &TextRequest) -> PortResult<Value> {
        self.calls.text.fetch_add(1, Ordering::SeqCst);
        match &self.text {
            Some(script) => script(request),
            None => Err(unscripted("generate_text")),
        }
    }

    async fn generate_media(&self, request: &MediaRequest) -> PortResult<MediaOutput> {
        self.calls.media.fetch_add(1, Ordering::SeqCst);
        match &self.media {
            Some(script) => script(request),
            None => Err(unscripted("generate_media")),
        }
    }

    async fn check_operation(&self, operation: &Operation) -> PortResult<Operation> {
        let poll = self.calls.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.operation {
            Some(script) => script(poll, operation),
            None => Err(unscripted("check_operation")),
        }
    }

    async fn fetch_media(&self, url: &str) -> PortResult<Bytes> {
        self.calls.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.fetch {
            Some(script) => script(url),
            None => Err(unscripted("fetch_media")),
        }
    }
}

/// Wraps a stub in an action context with the default polling policy.
pub fn context(stub: StubClient) -> (Arc<StubClient>, ActionContext) {
    let stub = Arc::new(stub);
    let ctx = ActionContext::new(stub.clone(), PollPolicy::default());
    (stub, ctx)
}

pub fn inline(raw: &str) -> MediaOutput {
    let uri = DataUri::parse(raw).expect("test data URI is valid");
    MediaOutput::media(MediaRef::Inline(uri))
}
