use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::error::WebSocketError;
use crate::websocket::frame::{close_code, CloseFrame, Frame};
use crate::websocket::policy::{EchoPolicy, MessagePolicy};
use crate::websocket::transport::Transport;

/// Lifecycle of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Receiving,
    Processing,
    Closing,
    Closed,
}

/// Why a session left its receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame, possibly without a code.
    PeerClosed(Option<CloseFrame>),
    /// The inbound stream ended without a close frame.
    PeerGone,
    ReceiveFailed(WebSocketError),
    SendFailed(WebSocketError),
    MessageTooBig { limit: usize },
    ProtocolViolation(String),
    InvalidPayload,
    Cancelled,
}

impl SessionEnd {
    /// The close frame sent back to the peer for this ending.
    pub fn close_frame(&self) -> CloseFrame {
        match self {
            SessionEnd::PeerClosed(Some(frame)) => frame.clone(),
            SessionEnd::PeerClosed(None)
            | SessionEnd::PeerGone
            | SessionEnd::ReceiveFailed(_)
            | SessionEnd::SendFailed(_) => CloseFrame::normal(),
            SessionEnd::MessageTooBig { .. } => {
                CloseFrame::new(close_code::MESSAGE_TOO_BIG, "message too big")
            }
            SessionEnd::ProtocolViolation(reason) => {
                CloseFrame::new(close_code::PROTOCOL_ERROR, reason.clone())
            }
            SessionEnd::InvalidPayload => {
                CloseFrame::new(close_code::INVALID_PAYLOAD, "invalid utf-8 payload")
            }
            SessionEnd::Cancelled => CloseFrame::new(close_code::GOING_AWAY, "server shutting down"),
        }
    }

    /// True when the peer initiated the close handshake.
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed(_))
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub connection_id: Uuid,
    pub end: SessionEnd,
    pub messages_processed: u64,
}

enum Step {
    Continue,
    End(SessionEnd),
}

struct PendingMessage {
    binary: bool,
    data: Vec<u8>,
}

impl PendingMessage {
    fn into_text(self) -> Result<String, SessionEnd> {
        if self.binary {
            Ok(String::from_utf8_lossy(&self.data).into_owned())
        } else {
            String::from_utf8(self.data).map_err(|_| SessionEnd::InvalidPayload)
        }
    }
}

/// One upgraded connection, from acceptance to transport release.
///
/// The session reads one frame at a time and answers it before reading the
/// next, so the transport never sees concurrent reads and writes.
pub struct Connection<P = EchoPolicy> {
    id: Uuid,
    config: WebSocketConfig,
    policy: P,
    cancel: CancellationToken,
    state: SessionState,
    pending: Option<PendingMessage>,
    messages_processed: u64,
}

impl Connection<EchoPolicy> {
    pub fn new(config: WebSocketConfig, cancel: CancellationToken) -> Self {
        Self::with_policy(config, cancel, EchoPolicy)
    }
}

impl<P: MessagePolicy> Connection<P> {
    pub fn with_policy(config: WebSocketConfig, cancel: CancellationToken, policy: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            policy,
            cancel,
            state: SessionState::Open,
            pending: None,
            messages_processed: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to completion. The transport is moved in and is
    /// always dropped before this returns, on every path.
    pub async fn run<T: Transport>(mut self, mut transport: T) -> SessionOutcome {
        debug!("Session {} started", self.id);
        self.transition(SessionState::Receiving);

        let end = loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break SessionEnd::Cancelled,
                received = transport.recv() => received,
            };

            let frame = match received {
                None => break SessionEnd::PeerGone,
                Some(Err(WebSocketError::Overflow)) => {
                    break SessionEnd::MessageTooBig {
                        limit: self.config.max_message_size,
                    }
                }
                Some(Err(WebSocketError::Protocol(reason))) => {
                    break SessionEnd::ProtocolViolation(reason)
                }
                Some(Err(e)) => break SessionEnd::ReceiveFailed(e),
                Some(Ok(frame)) => frame,
            };

            self.transition(SessionState::Processing);
            match self.handle_frame(frame, &mut transport).await {
                Step::Continue => self.transition(SessionState::Receiving),
                Step::End(end) => break end,
            }
        };

        self.transition(SessionState::Closing);
        self.close(transport, &end).await;
        self.transition(SessionState::Closed);

        if end.is_clean() {
            info!("Session {} closed by peer", self.id);
        } else {
            warn!("Session {} ended: {:?}", self.id, end);
        }

        SessionOutcome {
            connection_id: self.id,
            end,
            messages_processed: self.messages_processed,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!("Session {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    async fn handle_frame<T: Transport>(&mut self, frame: Frame, transport: &mut T) -> Step {
        trace!("Session {} received {} frame", self.id, frame.kind());

        let assembled = match frame {
            Frame::Text { payload, fin } => self.start_message(false, payload, fin),
            Frame::Binary { payload, fin } => self.start_message(true, payload, fin),
            Frame::Continuation { payload, fin } => self.continue_message(payload, fin),
            Frame::Ping(payload) => return self.send(transport, Frame::Pong(payload)).await,
            Frame::Pong(_) => return Step::Continue,
            Frame::Close(close) => return Step::End(SessionEnd::PeerClosed(close)),
        };

        let message = match assembled {
            Ok(Some(message)) => message,
            Ok(None) => return Step::Continue,
            Err(end) => return Step::End(end),
        };

        let text = match message.into_text() {
            Ok(text) => text,
            Err(end) => return Step::End(end),
        };

        self.messages_processed += 1;
        match self.policy.apply(text) {
            Some(reply) => self.send(transport, Frame::text(reply)).await,
            None => Step::Continue,
        }
    }

    fn start_message(
        &mut self,
        binary: bool,
        payload: Vec<u8>,
        fin: bool,
    ) -> Result<Option<PendingMessage>, SessionEnd> {
        if self.pending.is_some() {
            return Err(SessionEnd::ProtocolViolation(
                "new message started before the previous one finished".to_string(),
            ));
        }
        if payload.len() > self.config.max_message_size {
            return Err(SessionEnd::MessageTooBig {
                limit: self.config.max_message_size,
            });
        }
        if fin {
            return Ok(Some(PendingMessage { binary, data: payload }));
        }

        let mut data = Vec::with_capacity(self.config.read_buffer_size.max(payload.len()));
        data.extend_from_slice(&payload);
        self.pending = Some(PendingMessage { binary, data });
        Ok(None)
    }

    fn continue_message(
        &mut self,
        payload: Vec<u8>,
        fin: bool,
    ) -> Result<Option<PendingMessage>, SessionEnd> {
        let limit = self.config.max_message_size;
        let pending = self.pending.as_mut().ok_or_else(|| {
            SessionEnd::ProtocolViolation("continuation frame without a message in progress".to_string())
        })?;

        if pending.data.len() + payload.len() > limit {
            self.pending = None;
            return Err(SessionEnd::MessageTooBig { limit });
        }
        pending.data.extend_from_slice(&payload);

        if fin {
            Ok(self.pending.take())
        } else {
            Ok(None)
        }
    }

    async fn send<T: Transport>(&self, transport: &mut T, frame: Frame) -> Step {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::End(SessionEnd::Cancelled),
            sent = transport.send(frame) => match sent {
                Ok(()) => Step::Continue,
                Err(e) => Step::End(SessionEnd::SendFailed(e)),
            },
        }
    }

    /// Best-effort close handshake. Failures are logged and dropped; the
    /// transport is released when this returns either way.
    async fn close<T: Transport>(&self, mut transport: T, end: &SessionEnd) {
        let frame = end.close_frame();
        debug!("Session {} sending close {} {:?}", self.id, frame.code, frame.reason);

        match timeout(self.config.close_timeout(), transport.close(Some(frame))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Session {} close handshake failed: {}", self.id, e),
            Err(_) => debug!("Session {} close handshake timed out", self.id),
        }
        drop(transport);
    }
}
