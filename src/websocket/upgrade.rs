//! Upgrading an actix-web request into a session transport.
//!
//! The handshake response carries a streaming body fed by a channel; the
//! request payload is decoded with the actix-http websocket codec. Together
//! they form the `ActixTransport` a `Connection` owns.

use std::convert::Infallible;

use actix_codec::{Decoder, Encoder};
use actix_http::ws::{CloseCode, CloseReason, Codec, Frame as WsFrame, Item, Message, ProtocolError};
use actix_web::dev::Payload;
use actix_web::error::PayloadError;
use actix_web::{HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::stream::LocalBoxStream;
use futures::{SinkExt, Stream, StreamExt};
use async_trait::async_trait;

use crate::error::WebSocketError;
use crate::websocket::frame::{CloseFrame, Frame};
use crate::websocket::transport::Transport;

/// Outbound frames buffered between the session and the response body.
const OUTBOUND_BUFFER: usize = 16;

/// Validates the handshake and returns the `101 Switching Protocols`
/// response together with the transport for the new session.
pub fn upgrade(
    req: &HttpRequest,
    payload: Payload,
    max_frame_size: usize,
) -> Result<(HttpResponse, ActixTransport), WebSocketError> {
    let mut response = actix_web_actors::ws::handshake(req)
        .map_err(|e| WebSocketError::InvalidUpgrade(e.to_string()))?;

    let (transport, body) = ActixTransport::new(payload, max_frame_size);
    Ok((response.streaming(body), transport))
}

pub struct ActixTransport {
    inbound: LocalBoxStream<'static, Result<Bytes, PayloadError>>,
    read_buf: BytesMut,
    codec: Codec,
    outbound: mpsc::Sender<Bytes>,
}

impl ActixTransport {
    /// Builds the transport and the byte stream to use as the response body.
    pub fn new<S>(
        inbound: S,
        max_frame_size: usize,
    ) -> (Self, impl Stream<Item = Result<Bytes, Infallible>> + 'static)
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + 'static,
    {
        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let transport = Self {
            inbound: inbound.boxed_local(),
            read_buf: BytesMut::new(),
            codec: Codec::new().max_size(max_frame_size),
            outbound,
        };
        (transport, rx.map(Ok::<Bytes, Infallible>))
    }

    async fn write(&mut self, message: Message) -> Result<(), WebSocketError> {
        let mut buf = BytesMut::new();
        self.codec
            .encode(message, &mut buf)
            .map_err(|e| WebSocketError::SendError(e.to_string()))?;

        self.outbound
            .send(buf.freeze())
            .await
            .map_err(|_| WebSocketError::ConnectionClosed)
    }
}

fn map_protocol_error(err: ProtocolError) -> WebSocketError {
    match err {
        ProtocolError::Overflow => WebSocketError::Overflow,
        ProtocolError::Io(e) => WebSocketError::ReceiveError(e.to_string()),
        other => WebSocketError::Protocol(other.to_string()),
    }
}

fn from_ws_frame(frame: WsFrame) -> Frame {
    match frame {
        WsFrame::Text(payload) => Frame::Text { payload: payload.to_vec(), fin: true },
        WsFrame::Binary(payload) => Frame::Binary { payload: payload.to_vec(), fin: true },
        WsFrame::Continuation(Item::FirstText(payload)) => {
            Frame::Text { payload: payload.to_vec(), fin: false }
        }
        WsFrame::Continuation(Item::FirstBinary(payload)) => {
            Frame::Binary { payload: payload.to_vec(), fin: false }
        }
        WsFrame::Continuation(Item::Continue(payload)) => {
            Frame::Continuation { payload: payload.to_vec(), fin: false }
        }
        WsFrame::Continuation(Item::Last(payload)) => {
            Frame::Continuation { payload: payload.to_vec(), fin: true }
        }
        WsFrame::Ping(payload) => Frame::Ping(payload.to_vec()),
        WsFrame::Pong(payload) => Frame::Pong(payload.to_vec()),
        WsFrame::Close(reason) => Frame::Close(reason.map(|r| {
            CloseFrame::new(u16::from(r.code), r.description.unwrap_or_default())
        })),
    }
}

fn close_reason(frame: CloseFrame) -> CloseReason {
    CloseReason {
        code: CloseCode::from(frame.code),
        description: if frame.reason.is_empty() { None } else { Some(frame.reason) },
    }
}

#[async_trait(?Send)]
impl Transport for ActixTransport {
    async fn recv(&mut self) -> Option<Result<Frame, WebSocketError>> {
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(frame)) => return Some(Ok(from_ws_frame(frame))),
                Ok(None) => {}
                Err(e) => return Some(Err(map_protocol_error(e))),
            }

            match self.inbound.next().await? {
                Ok(chunk) => self.read_buf.extend_from_slice(&chunk),
                Err(e) => return Some(Err(WebSocketError::ReceiveError(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), WebSocketError> {
        let message = match frame {
            Frame::Text { payload, fin: true } => match String::from_utf8(payload) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => Message::Binary(Bytes::from(e.into_bytes())),
            },
            Frame::Text { payload, fin: false } => {
                Message::Continuation(Item::FirstText(Bytes::from(payload)))
            }
            Frame::Binary { payload, fin: true } => Message::Binary(Bytes::from(payload)),
            Frame::Binary { payload, fin: false } => {
                Message::Continuation(Item::FirstBinary(Bytes::from(payload)))
            }
            Frame::Continuation { payload, fin: true } => {
                Message::Continuation(Item::Last(Bytes::from(payload)))
            }
            Frame::Continuation { payload, fin: false } => {
                Message::Continuation(Item::Continue(Bytes::from(payload)))
            }
            Frame::Ping(payload) => Message::Ping(Bytes::from(payload)),
            Frame::Pong(payload) => Message::Pong(Bytes::from(payload)),
            Frame::Close(frame) => Message::Close(frame.map(close_reason)),
        };
        self.write(message).await
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> Result<(), WebSocketError> {
        let result = self.write(Message::Close(frame.map(close_reason))).await;
        // Ending the body stream lets actix finish the response and drop the socket.
        self.outbound.close_channel();
        result
    }
}
