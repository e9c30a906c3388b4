//! Transport-neutral frame model shared by every `Transport` implementation.

/// Standard close codes used by the session.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// 1000 with an empty reason.
    pub fn normal() -> Self {
        Self::new(close_code::NORMAL, "")
    }
}

/// One unit of data on the wire. Data frames carry the final-fragment flag;
/// a message split across fragments starts with `Text`/`Binary` with
/// `fin: false` and continues with `Continuation` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text { payload: Vec<u8>, fin: bool },
    Binary { payload: Vec<u8>, fin: bool },
    Continuation { payload: Vec<u8>, fin: bool },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Frame {
    /// A complete, single-fragment text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text {
            payload: text.into().into_bytes(),
            fin: true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text { .. } => "text",
            Frame::Binary { .. } => "binary",
            Frame::Continuation { .. } => "continuation",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}
