use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{JubenError, JubenResult};
use crate::models::{EventKind, EventPayload, StreamEvent, READER_SOURCE};
use crate::stream::{parse_frame, FrameDecoder};
use crate::transport::ByteStream;

/// Where a single exchange is. A [`ChatStream`] starts in `Streaming`;
/// validation and sending happen before it exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Streaming)
    }
}

/// What to do with non-fatal `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Deliver them and keep streaming.
    #[default]
    ContinueOnError,
    /// Treat any `error` event as the end of the exchange.
    StopOnError,
}

/// The outcome of a completed exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    /// Concatenated text of every content event.
    pub content: String,
    /// Payload of the `done`/`complete` event, if it carried one.
    pub metadata: Option<EventPayload>,
    /// Set when the body ended without a done event or `[DONE]` marker.
    pub synthesized: bool,
    pub event_count: usize,
}

/// The events of one chat exchange, pulled one at a time.
///
/// Nothing runs in the background: frames are decoded only when the caller
/// polls, and dropping the stream (or calling [`ChatStream::cancel`])
/// releases the response body at once.
pub struct ChatStream {
    decoder: Option<FrameDecoder<ByteStream>>,
    policy: ErrorPolicy,
    agent_id: String,
    session_id: String,
    state: SessionState,
    content: String,
    metadata: Option<EventPayload>,
    event_count: usize,
    completion: Option<Completion>,
    failure: Option<JubenError>,
}

impl ChatStream {
    pub(crate) fn new(
        body: ByteStream,
        policy: ErrorPolicy,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            decoder: Some(FrameDecoder::new(body)),
            policy,
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            state: SessionState::Streaming,
            content: String::new(),
            metadata: None,
            event_count: 0,
            completion: None,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The session id the request was sent with.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn failure(&self) -> Option<&JubenError> {
        self.failure.as_ref()
    }

    /// Abandon the exchange. The body is dropped and no further events are
    /// produced. Has no effect once the stream has finished.
    pub fn cancel(&mut self) {
        if self.state != SessionState::Streaming {
            return;
        }
        self.decoder = None;
        self.state = SessionState::Cancelled;
        debug!(
            agent = %self.agent_id,
            session_id = %self.session_id,
            events = self.event_count,
            "Chat stream cancelled"
        );
    }

    /// Drain the remaining events and return the completion.
    pub async fn into_completion(mut self) -> JubenResult<Completion> {
        while self.next().await.is_some() {}

        match self.state {
            SessionState::Completed => self
                .completion
                .take()
                .ok_or_else(|| JubenError::Internal("completed stream without completion".into())),
            SessionState::Failed => Err(self
                .failure
                .take()
                .unwrap_or_else(|| JubenError::Internal("failed stream without error".into()))),
            SessionState::Cancelled => {
                Err(JubenError::RequestAborted("chat stream cancelled".to_string()))
            }
            SessionState::Streaming => Err(JubenError::Internal(
                "stream drained while still streaming".to_string(),
            )),
        }
    }

    fn complete(&mut self, synthesized: bool) {
        self.decoder = None;
        self.state = SessionState::Completed;
        self.completion = Some(Completion {
            content: self.content.clone(),
            metadata: self.metadata.take(),
            synthesized,
            event_count: self.event_count,
        });

        if synthesized {
            debug!(
                agent = %self.agent_id,
                "Body ended without a done event, completing with accumulated content"
            );
        }
        info!(
            agent = %self.agent_id,
            session_id = %self.session_id,
            events = self.event_count,
            chars = self.content.chars().count(),
            synthesized,
            "Chat exchange completed"
        );
    }

    fn fail(&mut self, err: JubenError) {
        self.decoder = None;
        self.state = SessionState::Failed;
        error!(
            agent = %self.agent_id,
            session_id = %self.session_id,
            error_code = err.error_code(),
            "Chat exchange failed: {}",
            err
        );
        self.failure = Some(err);
    }

    fn accept(&mut self, event: StreamEvent) -> StreamEvent {
        self.event_count += 1;

        match event.kind {
            EventKind::Content => self.content.push_str(&event.content),
            EventKind::Done | EventKind::Complete => {
                self.metadata = event.payload.clone();
                self.complete(false);
            }
            EventKind::Error => {
                if event.is_fatal_error() || self.policy == ErrorPolicy::StopOnError {
                    self.fail(JubenError::TerminalEvent(event.content.clone()));
                } else {
                    warn!(
                        agent = %self.agent_id,
                        source = %event.source,
                        "Agent reported an error, continuing: {}",
                        event.content
                    );
                }
            }
        }

        event
    }
}

impl Stream for ChatStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.state != SessionState::Streaming {
                return Poll::Ready(None);
            }

            let Some(decoder) = this.decoder.as_mut() else {
                this.complete(true);
                return Poll::Ready(None);
            };

            match Pin::new(&mut *decoder).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    let saw_done = decoder.saw_done_marker();
                    this.complete(!saw_done);
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    let event = StreamEvent::error(
                        format!("Stream interrupted: {}", err.message),
                        READER_SOURCE,
                    );
                    this.event_count += 1;
                    this.fail(JubenError::StreamInterrupted(err.to_string()));
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(Some(Ok(frame))) => {
                    if let Some(event) = parse_frame(&frame) {
                        return Poll::Ready(Some(this.accept(event)));
                    }
                }
            }
        }
    }
}
