use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::WebSocketError;
use crate::websocket::frame::{CloseFrame, Frame};

/// A message-framed, bidirectional transport owned by exactly one session.
///
/// Sessions are not `Send`: actix runs each one on the worker that accepted
/// the connection, so implementations may hold thread-local handles.
#[async_trait(?Send)]
pub trait Transport {
    /// Next inbound frame. `None` means the peer went away without a close frame.
    async fn recv(&mut self) -> Option<Result<Frame, WebSocketError>>;

    async fn send(&mut self, frame: Frame) -> Result<(), WebSocketError>;

    /// Sends the closing frame and flushes. The transport is unusable afterwards.
    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), WebSocketError>;
}

fn map_receive_error(err: TungsteniteError) -> WebSocketError {
    match err {
        TungsteniteError::Capacity(_) => WebSocketError::Overflow,
        TungsteniteError::ConnectionClosed
        | TungsteniteError::AlreadyClosed
        | TungsteniteError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            WebSocketError::ConnectionClosed
        }
        TungsteniteError::Protocol(e) => WebSocketError::Protocol(e.to_string()),
        other => WebSocketError::ReceiveError(other.to_string()),
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text { payload, .. } => {
            Message::Text(String::from_utf8_lossy(&payload).into_owned())
        }
        Frame::Binary { payload, .. } | Frame::Continuation { payload, .. } => {
            Message::Binary(payload)
        }
        Frame::Ping(payload) => Message::Ping(payload),
        Frame::Pong(payload) => Message::Pong(payload),
        Frame::Close(close) => Message::Close(close.map(|c| TungsteniteCloseFrame {
            code: CloseCode::from(c.code),
            reason: c.reason.into(),
        })),
    }
}

/// tungstenite reassembles fragments itself, so every data frame it yields is final.
#[async_trait(?Send)]
impl<S> Transport for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn recv(&mut self) -> Option<Result<Frame, WebSocketError>> {
        loop {
            let message = match StreamExt::next(self).await? {
                Ok(message) => message,
                Err(e) => return Some(Err(map_receive_error(e))),
            };

            let frame = match message {
                Message::Text(text) => Frame::text(text),
                Message::Binary(payload) => Frame::Binary { payload, fin: true },
                Message::Ping(payload) => Frame::Ping(payload),
                Message::Pong(payload) => Frame::Pong(payload),
                Message::Close(close) => Frame::Close(
                    close.map(|c| CloseFrame::new(u16::from(c.code), c.reason.into_owned())),
                ),
                // Raw frames are only produced when writing.
                Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), WebSocketError> {
        SinkExt::send(self, into_message(frame))
            .await
            .map_err(|e| WebSocketError::SendError(e.to_string()))
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), WebSocketError> {
        let frame = frame.map(|c| TungsteniteCloseFrame {
            code: CloseCode::from(c.code),
            reason: c.reason.into(),
        });

        match WebSocketStream::close(self, frame).await {
            Ok(()) | Err(TungsteniteError::ConnectionClosed) => Ok(()),
            // The peer closed first; tungstenite already queued the echo, it only needs flushing.
            Err(TungsteniteError::Protocol(ProtocolError::SendAfterClosing)) => {
                match SinkExt::flush(self).await {
                    Ok(()) | Err(TungsteniteError::ConnectionClosed) => Ok(()),
                    Err(e) => Err(WebSocketError::SendError(e.to_string())),
                }
            }
            Err(e) => Err(WebSocketError::SendError(e.to_string())),
        }
    }
}
