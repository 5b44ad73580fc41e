//! crates/photo_poet_core/src/poller.rs
//!
//! Drives a long-running remote operation to completion and turns its result
//! into a self-contained data URI.

use crate::domain::{DataUri, MediaRef, Operation};
use crate::ports::{GenerationClient, PortError, PortResult};
use crate::prompt::MediaOutput;
use std::time::Duration;
use tokio::time::Instant;

/// How often and for how long to check an operation's status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff_factor: 1.5,
            max_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    /// A constant interval with no backoff.
    pub fn fixed(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            backoff_factor: 1.0,
            max_interval: interval,
            max_wait,
        }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        let cap = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(cap)
            .min(cap)
    }
}

/// Waits for the media produced by a generation call.
///
/// Inline media is returned immediately. Otherwise the returned operation is
/// checked after each interval until it is done, it fails, or `max_wait`
/// elapses.
pub async fn await_operation(
    client: &dyn GenerationClient,
    output: MediaOutput,
    policy: &PollPolicy,
) -> PortResult<MediaRef> {
    if let Some(media) = output.media {
        return Ok(media);
    }
    let mut operation = output.operation.ok_or_else(|| {
        PortError::Protocol("The generation service did not return an operation handle.".into())
    })?;

    // A wait too long to represent as an instant never expires.
    let deadline = Instant::now().checked_add(policy.max_wait);
    let mut interval = policy.interval;

    while !operation.done {
        let wait = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(PortError::Timeout(format!(
                        "operation {} did not finish within {}s",
                        operation.name,
                        policy.max_wait.as_secs()
                    )));
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        tokio::time::sleep(wait).await;
        operation = client.check_operation(&operation).await?;
        interval = policy.next_interval(interval);
    }

    finish(operation)
}

fn finish(operation: Operation) -> PortResult<MediaRef> {
    if let Some(error) = operation.error {
        return Err(PortError::OperationFailed(error.message));
    }
    operation.media.ok_or_else(|| {
        PortError::MissingOutput("The operation finished without a media result.".into())
    })
}

/// Converts a media reference into a data URI, downloading it if needed.
/// `fallback_mime` labels downloaded bytes.
pub async fn resolve_media(
    client: &dyn GenerationClient,
    media: MediaRef,
    fallback_mime: &str,
) -> PortResult<DataUri> {
    match media {
        MediaRef::Inline(uri) => Ok(uri),
        MediaRef::Url(url) => {
            let bytes = client.fetch_media(&url).await?;
            DataUri::from_bytes(fallback_mime, &bytes)
                .map_err(|e| PortError::MissingOutput(format!("downloaded media is unusable: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OperationError;
    use crate::prompt::{MediaRequest, TextRequest};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns the scripted operation states in order, repeating the last one.
    struct ScriptedClient {
        states: Mutex<Vec<Operation>>,
        checks: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(states: Vec<Operation>) -> Self {
            Self {
                states: Mutex::new(states),
                checks: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn generate_text(&self, _: &TextRequest) -> PortResult<serde_json::Value> {
            unreachable!("not used by the poller")
        }

        async fn generate_media(&self, _: &MediaRequest) -> PortResult<MediaOutput> {
            unreachable!("not used by the poller")
        }

        async fn check_operation(&self, _: &Operation) -> PortResult<Operation> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                Ok(states.remove(0))
            } else {
                Ok(states[0].clone())
            }
        }

        async fn fetch_media(&self, _: &str) -> PortResult<Bytes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"mp4"))
        }
    }

    fn done_with(media: MediaRef) -> Operation {
        Operation {
            done: true,
            media: Some(media),
            ..Operation::pending("operations/1")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_done_then_returns_media() {
        let client = ScriptedClient::new(vec![
            Operation::pending("operations/1"),
            done_with(MediaRef::Url("https://example.com/v.mp4".into())),
        ]);
        let output = MediaOutput::operation(Operation::pending("operations/1"));

        let media = await_operation(&client, output, &PollPolicy::default()).await.unwrap();
        assert_eq!(media, MediaRef::Url("https://example.com/v.mp4".into()));
        assert_eq!(client.checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn inline_media_skips_polling() {
        let client = ScriptedClient::new(vec![Operation::pending("unused")]);
        let uri = DataUri::parse("data:image/png;base64,AAAA").unwrap();
        let media = await_operation(&client, MediaOutput::media(MediaRef::Inline(uri.clone())), &PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(media, MediaRef::Inline(uri));
        assert_eq!(client.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_handle_is_a_protocol_error() {
        let client = ScriptedClient::new(vec![Operation::pending("unused")]);
        let err = await_operation(&client, MediaOutput::default(), &PollPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_message_is_propagated() {
        let failed = Operation {
            done: true,
            error: Some(OperationError {
                code: Some(3),
                message: "prompt violates safety policy".into(),
            }),
            ..Operation::pending("operations/1")
        };
        let client = ScriptedClient::new(vec![failed]);
        let output = MediaOutput::operation(Operation::pending("operations/1"));
        let err = await_operation(&client, output, &PollPolicy::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate video: prompt violates safety policy");
    }

    #[tokio::test(start_paused = true)]
    async fn done_without_media_is_missing_output() {
        let finished = Operation {
            done: true,
            ..Operation::pending("operations/1")
        };
        let client = ScriptedClient::new(vec![finished]);
        let output = MediaOutput::operation(Operation::pending("operations/1"));
        let err = await_operation(&client, output, &PollPolicy::default()).await.unwrap_err();
        assert!(matches!(err, PortError::MissingOutput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_wait() {
        let client = ScriptedClient::new(vec![Operation::pending("operations/1")]);
        let policy = PollPolicy::fixed(Duration::from_secs(5), Duration::from_secs(20));
        let started = Instant::now();

        let err = await_operation(&client, MediaOutput::operation(Operation::pending("operations/1")), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::Timeout(_)));
        assert!(err.to_string().starts_with("Deadline exceeded"));
        assert_eq!(client.checks.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.interval;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(interval.as_millis());
            interval = policy.next_interval(interval);
        }
        assert_eq!(seen, vec![5000, 7500, 11250, 16875, 25312, 30000]);
    }

    #[test]
    fn huge_intervals_saturate_at_the_cap() {
        let policy = PollPolicy {
            interval: Duration::from_secs(u64::MAX),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
        };
        assert_eq!(
            policy.next_interval(policy.interval),
            Duration::from_secs(u64::MAX)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_max_wait_does_not_panic() {
        let client = ScriptedClient::new(vec![
            Operation::pending("operations/1"),
            done_with(MediaRef::Url("https://example.com/v.mp4".into())),
        ]);
        let policy = PollPolicy::fixed(Duration::from_secs(5), Duration::from_secs(u64::MAX));

        let media = await_operation(&client, MediaOutput::operation(Operation::pending("operations/1")), &policy)
            .await
            .unwrap();

        assert_eq!(media, MediaRef::Url("https://example.com/v.mp4".into()));
        assert_eq!(client.checks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = PollPolicy::fixed(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(policy.next_interval(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn url_media_is_downloaded_and_encoded() {
        let client = ScriptedClient::new(vec![Operation::pending("unused")]);
        let uri = resolve_media(&client, MediaRef::Url("https://example.com/v".into()), "video/mp4")
            .await
            .unwrap();
        assert_eq!(uri.to_string(), "data:video/mp4;base64,bXA0");
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }
}
