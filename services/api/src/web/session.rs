//! services/api/src/web/session.rs
//!
//! The control loop for one connected browser. It owns the session's view
//! state machine, feeds it client events and finished generations, and runs
//! every requested generation as its own task through the action layer.
//!
//! The loop only talks to channels, so it can run without a socket.

use crate::actions::{self, ActionContext};
use crate::web::protocol::{ClientMessage, ServerMessage};
use photo_poet_core::{
    view::{Effect, Transition, ViewMachine},
    GenerationRequest, RequestToken, ViewEvent,
};
use tokio::sync::mpsc::{self, error::SendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Outbound = mpsc::Sender<ServerMessage>;

/// State for a single, active session.
struct Session {
    id: Uuid,
    machine: ViewMachine,
    actions: ActionContext,
    outbound: Outbound,
    completions: mpsc::Sender<ViewEvent>,
    cancel: CancellationToken,
}

/// Runs a session until the client goes away or `cancel` fires. In-flight
/// generations are cancelled when it returns.
pub async fn run_session(
    id: Uuid,
    actions: ActionContext,
    mut inbound: mpsc::Receiver<ClientMessage>,
    outbound: Outbound,
    cancel: CancellationToken,
) {
    let (completions, mut finished) = mpsc::channel::<ViewEvent>(16);
    let mut session = Session {
        id,
        machine: ViewMachine::new(),
        actions,
        outbound,
        completions,
        cancel: cancel.clone(),
    };
    info!(session_id = %id, "Session started");

    let started = session
        .send(ServerMessage::SessionStarted { session_id: id })
        .await;
    if started.is_ok() && session.send_snapshot().await.is_ok() {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => session.apply(message.into()).await,
                    None => break,
                },
                Some(event) = finished.recv() => session.apply(event).await,
            };
            if result.is_err() {
                debug!(session_id = %id, "Client stopped listening");
                break;
            }
        }
    }

    cancel.cancel();
    info!(session_id = %id, "Session ended");
}

impl Session {
    async fn send(&self, message: ServerMessage) -> Result<(), SendError<ServerMessage>> {
        self.outbound.send(message).await
    }

    async fn send_snapshot(&self) -> Result<(), SendError<ServerMessage>> {
        self.send(ServerMessage::State {
            snapshot: self.machine.snapshot(),
        })
        .await
    }

    async fn apply(&mut self, event: ViewEvent) -> Result<(), SendError<ServerMessage>> {
        let name = event.name();
        match self.machine.handle(event) {
            Ok(Transition::Applied(effects)) => {
                debug!(session_id = %self.id, event = name, state = %self.machine.kind(), "Transition applied");
                for effect in effects {
                    match effect {
                        Effect::Notify { title, message } => {
                            self.send(ServerMessage::Notification { title, message }).await?;
                        }
                        other => {
                            if let Some((token, request)) = other.into_dispatch() {
                                self.dispatch(token, request);
                            }
                        }
                    }
                }
                self.send_snapshot().await
            }
            Ok(Transition::Stale) => {
                debug!(session_id = %self.id, event = name, "Ignoring a result nobody is waiting for");
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %self.id, event = name, error = %err, "Rejected client event");
                self.send(ServerMessage::Error {
                    message: err.to_string(),
                })
                .await
            }
        }
    }

    fn dispatch(&self, token: RequestToken, request: GenerationRequest) {
        let actions = self.actions.clone();
        let completions = self.completions.clone();
        let cancel = self.cancel.child_token();
        let session_id = self.id;
        let capability = request.capability();
        debug!(%session_id, %capability, token = token.value(), "Dispatching generation");

        tokio::spawn(async move {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                result = actions::run(&actions, &request) => match result {
                    Ok(output) => ViewEvent::Completed { token, output },
                    Err(err) => ViewEvent::Failed { token, message: err.message },
                },
            };
            if completions.send(event).await.is_err() {
                debug!(%session_id, %capability, "Session closed before the result arrived");
            }
        });
    }
}
