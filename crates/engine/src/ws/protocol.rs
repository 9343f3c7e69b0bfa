use axum::extract::ws::{Message, WebSocket};
use maplive_common::error::LiveError;
use maplive_common::protocol::ws::LiveMessage;

pub fn decode_message(raw: &str) -> Result<LiveMessage, serde_json::Error> {
    serde_json::from_str::<LiveMessage>(raw)
}

pub fn encode_message(message: &LiveMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub async fn send_ws_message(socket: &mut WebSocket, message: &LiveMessage) -> Result<(), ()> {
    let encoded = encode_message(message).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

/// Render an engine error as the wire error frame.
pub fn error_frame(error: &LiveError) -> LiveMessage {
    LiveMessage::Error {
        code: error.code.as_str().to_string(),
        message: error.message.clone(),
        retryable: error.code.retryable(),
    }
}
