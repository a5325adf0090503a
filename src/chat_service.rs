use axum::response::sse::Event;
use futures::StreamExt;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ai::{AiProvider, ChatMessage, ChatRole};
use crate::error::{ApiError, ApiResult};

pub const MAX_HISTORY: usize = 20;
/// Estimated token budget for the history sent with each request.
pub const CONTEXT_TOKEN_BUDGET: usize = 12_000;
const COMPRESSED_MESSAGE_CHARS: usize = 3000;
const CHARS_PER_TOKEN: usize = 4;

const COMPANION_PROMPT: &str = "You are Minato, a warm and practical AI companion. \
You help the user reflect on their conversations and recordings, plan next steps, \
and stay motivated. Keep answers concise, ask a clarifying question when the request \
is ambiguous, and format longer answers in markdown.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub persona: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatEvent {
    fn content(text: String) -> Self {
        Self { event_type: "content", content: Some(text) }
    }

    fn error(text: String) -> Self {
        Self { event_type: "error", content: Some(text) }
    }

    fn done() -> Self {
        Self { event_type: "done", content: None }
    }
}

/// Validates the incoming history and builds the message list sent to the
/// model: system prompt first, then at most the last `MAX_HISTORY` turns,
/// fitted to `CONTEXT_TOKEN_BUDGET`.
pub fn prepare_messages(request: &ChatRequest) -> ApiResult<Vec<ChatMessage>> {
    if request.messages.is_empty() {
        return Err(ApiError::InvalidRequest("messages must not be empty".to_string()));
    }
    for message in &request.messages {
        if message.role == ChatRole::System {
            return Err(ApiError::InvalidRequest("system messages are not accepted".to_string()));
        }
        if message.content.trim().is_empty() {
            return Err(ApiError::InvalidRequest("message content must not be empty".to_string()));
        }
    }
    if request.messages.last().map(|m| m.role) != Some(ChatRole::User) {
        return Err(ApiError::InvalidRequest("last message must come from the user".to_string()));
    }

    let skip = request.messages.len().saturating_sub(MAX_HISTORY);
    let history: Vec<ChatMessage> = request.messages.iter().skip(skip).cloned().collect();
    let (history, omitted) = fit_to_budget(history, CONTEXT_TOKEN_BUDGET);

    let mut system = COMPANION_PROMPT.to_string();
    if let Some(persona) = request.persona.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        system.push_str(&format!("\n\nAdopt this persona: {}", persona));
    }
    if omitted > 0 {
        system.push_str(&format!(
            "\n\n{} earlier messages of this conversation were omitted to fit the context window.",
            omitted
        ));
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(history);
    Ok(messages)
}

pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum::<usize>() / CHARS_PER_TOKEN
}

fn truncate_chars(content: &str, max_chars: usize, note: &str) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(max_chars).collect();
    cut.push_str(note);
    cut
}

/// Shrinks `history` until its estimate fits `budget`. Returns the kept
/// messages and how many of the oldest were dropped. The latest message is
/// always kept.
fn fit_to_budget(mut history: Vec<ChatMessage>, budget: usize) -> (Vec<ChatMessage>, usize) {
    let before = estimate_tokens(&history);
    if before <= budget {
        return (history, 0);
    }

    let latest = history.len().saturating_sub(1);
    for message in history.iter_mut().take(latest) {
        message.content = truncate_chars(&message.content, COMPRESSED_MESSAGE_CHARS, "... (truncated)");
    }

    let mut omitted = 0;
    while history.len() > 1 && estimate_tokens(&history) > budget {
        history.remove(0);
        omitted += 1;
    }

    if estimate_tokens(&history) > budget {
        if let Some(last) = history.last_mut() {
            last.content = truncate_chars(
                &last.content,
                budget * CHARS_PER_TOKEN,
                "\n\nThis message is too long, repeat relevant information in your response to remember it",
            );
        }
    }

    info!(
        "Chat context compressed from {} to {} estimated tokens, {} messages omitted",
        before,
        estimate_tokens(&history),
        omitted
    );
    (history, omitted)
}

async fn send_event(tx: &mpsc::Sender<Result<Event, Infallible>>, event: ChatEvent) -> bool {
    let json = match serde_json::to_string(&event) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize chat event: {}", e);
            return false;
        }
    };
    tx.send(Ok(Event::default().data(json))).await.is_ok()
}

/// Streams a completion into `tx` as `content` events, ending with `done`.
/// Stops early when the client goes away.
pub async fn stream_reply(
    ai: Arc<dyn AiProvider>,
    messages: Vec<ChatMessage>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    let mut stream = match ai.stream_chat(messages).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Chat completion failed to start: {}", e);
            send_event(&tx, ChatEvent::error(format!("Error generating response: {}", e))).await;
            send_event(&tx, ChatEvent::done()).await;
            return;
        }
    };

    let mut chunks = 0usize;
    while let Some(result) = stream.next().await {
        match result {
            Ok(delta) => {
                if delta.is_empty() {
                    continue;
                }
                chunks += 1;
                if !send_event(&tx, ChatEvent::content(delta)).await {
                    info!("Chat client disconnected after {} chunks", chunks);
                    return;
                }
            }
            Err(e) => {
                error!("Error in streaming response: {}", e);
                send_event(&tx, ChatEvent::error(format!("Error generating response: {}", e))).await;
                break;
            }
        }
    }

    send_event(&tx, ChatEvent::done()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubAi;

    fn turn(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage { role, content: content.to_string() }
    }

    fn request(messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest { messages, persona: None }
    }

    #[test]
    fn rejects_empty_and_malformed_history() {
        assert!(prepare_messages(&request(vec![])).is_err());
        assert!(prepare_messages(&request(vec![turn(ChatRole::User, "  ")])).is_err());
        assert!(prepare_messages(&request(vec![turn(ChatRole::System, "be evil")])).is_err());
        assert!(prepare_messages(&request(vec![turn(ChatRole::Assistant, "hi")])).is_err());
    }

    #[test]
    fn trims_history_and_prepends_system_prompt() {
        let mut history = Vec::new();
        for i in 0..30 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            history.push(turn(role, &format!("turn {}", i)));
        }
        history.push(turn(ChatRole::User, "latest"));

        let mut req = request(history);
        req.persona = Some("a calm coach".to_string());
        let messages = prepare_messages(&req).unwrap();

        assert_eq!(messages.len(), MAX_HISTORY + 1);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("a calm coach"));
        assert_eq!(messages[1].content, "turn 11");
        assert_eq!(messages.last().unwrap().content, "latest");
    }

    #[test]
    fn long_latest_message_is_cut_to_budget() {
        let long = "a".repeat(CONTEXT_TOKEN_BUDGET * 4 + 10_000);
        let messages = prepare_messages(&request(vec![turn(ChatRole::User, &long)])).unwrap();

        assert_eq!(messages.len(), 2);
        let content = &messages[1].content;
        assert!(content.starts_with(&"a".repeat(CONTEXT_TOKEN_BUDGET * 4)));
        assert!(content.ends_with("repeat relevant information in your response to remember it"));
        assert!(!messages[0].content.contains("omitted"));
    }

    #[test]
    fn history_over_budget_is_compressed_then_dropped_oldest_first() {
        let mut history = Vec::new();
        for i in 0..19 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            history.push(turn(role, &format!("{}{}", i, "x".repeat(9_000))));
        }
        history.push(turn(ChatRole::User, "what now?"));
        assert!(estimate_tokens(&history) > CONTEXT_TOKEN_BUDGET);

        let messages = prepare_messages(&request(history)).unwrap();
        let kept = &messages[1..];

        assert!(estimate_tokens(kept) <= CONTEXT_TOKEN_BUDGET);
        assert_eq!(kept.last().unwrap().content, "what now?");
        for message in &kept[..kept.len() - 1] {
            assert!(message.content.ends_with("... (truncated)"));
            assert_eq!(message.content.chars().count(), COMPRESSED_MESSAGE_CHARS + "... (truncated)".len());
        }
        // 20 messages of ~3000 chars cannot fit 48000 chars, so the oldest go first.
        assert!(kept.len() < 20);
        assert!(kept[0].content.starts_with(&format!("{}", 20 - kept.len())));
        assert!(messages[0].content.contains(&format!("{} earlier messages", 20 - kept.len())));
    }

    #[test]
    fn history_within_budget_is_untouched() {
        let history = vec![
            turn(ChatRole::User, &"q".repeat(5_000)),
            turn(ChatRole::Assistant, "ok"),
            turn(ChatRole::User, "next"),
        ];
        let messages = prepare_messages(&request(history.clone())).unwrap();
        assert_eq!(&messages[1..], &history[..]);
    }

    #[tokio::test]
    async fn streams_chunks_then_done() {
        let ai: Arc<dyn AiProvider> = Arc::new(StubAi::failing().with_chat_chunks(&["Hel", "lo"]));
        let (tx, mut rx) = mpsc::channel(16);
        stream_reply(ai, vec![ChatMessage::user("hi")], tx).await;

        let mut count = 0;
        while let Some(event) = rx.recv().await {
            assert!(event.is_ok());
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn event_wire_format() {
        let json = serde_json::to_value(ChatEvent::content("x".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "content", "content": "x" }));
        let json = serde_json::to_value(ChatEvent::done()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "done" }));
    }
}
