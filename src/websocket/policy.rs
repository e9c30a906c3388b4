/// What a session does with each complete inbound message.
///
/// Returning `None` sends nothing back. A chat engine that routes messages to
/// other sessions replaces `EchoPolicy` here without touching the lifecycle.
pub trait MessagePolicy {
    fn apply(&mut self, text: String) -> Option<String>;
}

/// Sends every message back to its sender unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoPolicy;

impl MessagePolicy for EchoPolicy {
    fn apply(&mut self, text: String) -> Option<String> {
        Some(text)
    }
}
