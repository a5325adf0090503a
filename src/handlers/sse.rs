use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc as tokio_mpsc;

use super::JsonBody;
use crate::auth::AuthUser;
use crate::chat_service::{self, ChatRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub struct SseStream {
    pub receiver: tokio_mpsc::Receiver<Result<Event, Infallible>>,
}

impl Stream for SseStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub async fn chat(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<ChatRequest>,
) -> ApiResult<Sse<SseStream>> {
    let messages = chat_service::prepare_messages(&request)?;
    log::info!("Chat for {} with {} messages", user.id, messages.len());

    let (tx, rx) = tokio_mpsc::channel(100);
    let ai = state.ai.clone();
    tokio::spawn(async move {
        chat_service::stream_reply(ai, messages, tx).await;
    });

    Ok(Sse::new(SseStream { receiver: rx }).keep_alive(KeepAlive::default()))
}
