use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use wagewiz_agent::events::{EventEnvelope, Subscription};
use wagewiz_core::domain::conversation::ConversationId;

use crate::routes::ApiState;

/// Envelopes for one conversation. Holding the subscription here ties its
/// lifetime to the response body, so a client disconnect unsubscribes.
struct ConversationStream {
    conversation_id: ConversationId,
    envelopes: UnboundedReceiverStream<EventEnvelope>,
    _subscription: Subscription,
}

impl Stream for ConversationStream {
    type Item = EventEnvelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.envelopes).poll_next(cx)
    }
}

impl Drop for ConversationStream {
    fn drop(&mut self) {
        debug!(
            event_name = "server.sse.disconnected",
            conversation_id = %self.conversation_id,
            "event stream closed"
        );
    }
}

pub async fn stream(
    Path(conversation_id): Path<String>,
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let conversation_id = ConversationId::new(conversation_id);
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = state.events.subscribe(
        &conversation_id,
        Box::new(move |envelope| {
            let _ = tx.send(envelope.clone());
        }),
    );

    info!(
        event_name = "server.sse.connected",
        conversation_id = %conversation_id,
        "event stream opened"
    );

    let greeting = tokio_stream::once(
        Event::default().data(json!({ "message": "Connection established" }).to_string()),
    );
    let updates = ConversationStream {
        conversation_id,
        envelopes: UnboundedReceiverStream::new(rx),
        _subscription: subscription,
    }
    .map(|envelope| frame(&envelope));

    Sse::new(greeting.chain(updates).map(Ok)).keep_alive(KeepAlive::default())
}

fn frame(envelope: &EventEnvelope) -> Event {
    match serde_json::to_string(envelope) {
        Ok(data) => Event::default().data(data),
        Err(_) => Event::default().comment("unserializable event"),
    }
}
