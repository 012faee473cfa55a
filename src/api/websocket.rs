use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{future, sink::SinkExt, stream::StreamExt};
use tracing::debug;

use crate::api::state::AppState;
use crate::domain::AgentId;
use crate::stream::{InboundFrame, OutboundFrame};

/// GET /ws/:agent_id
///
/// The upgrade is always accepted; unknown agents are closed with code 4004.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<AgentId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tracker = state.shutdown.sessions().clone();
    ws.on_upgrade(move |socket| tracker.track_future(handle_socket(socket, agent_id, state)))
}

async fn handle_socket(socket: WebSocket, agent_id: AgentId, state: AppState) {
    let (sender, receiver) = socket.split();
    let sink = sender.with(|frame: OutboundFrame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = receiver.map(|message| message.map(from_message));

    let outcome = state.sessions.run(agent_id.clone(), sink, stream).await;
    debug!(agent = %agent_id, outcome = ?outcome, "WebSocket handler finished");
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text),
        OutboundFrame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}

fn from_message(message: Message) -> InboundFrame {
    match message {
        Message::Text(text) => InboundFrame::Text(text),
        Message::Binary(bytes) => InboundFrame::Binary(bytes),
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Control,
        Message::Close(_) => InboundFrame::Close,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_carries_code_and_reason() {
        let message = to_message(OutboundFrame::Close {
            code: 4004,
            reason: "Agent not found".into(),
        });
        match message {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 4004);
                assert_eq!(frame.reason, "Agent not found");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_inbound_mapping() {
        assert_eq!(from_message(Message::Text("hi".into())), InboundFrame::Text("hi".into()));
        assert_eq!(from_message(Message::Ping(vec![1])), InboundFrame::Control);
        assert_eq!(from_message(Message::Close(None)), InboundFrame::Close);
    }
}
