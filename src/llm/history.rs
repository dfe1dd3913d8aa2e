//! Conversation history with per-call usage accounting.

use serde::Serialize;

use super::{ChatMessage, Role, Usage};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageRecord {
    pub time: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Totals over all generator calls of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub rounds: usize,
    pub time: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl std::fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "| {} | {:.3}s | Tokens: {}/{}/{}",
            self.rounds, self.time, self.input_tokens, self.output_tokens, self.total_tokens
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
    usage: Vec<UsageRecord>,
}

impl ChatHistory {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    pub fn pop(&mut self) -> Option<ChatMessage> {
        self.messages.pop()
    }

    pub fn record(&mut self, elapsed: f64, usage: Option<&Usage>) {
        let (input, output, total) = usage
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default();
        self.usage.push(UsageRecord {
            time: elapsed,
            input_tokens: input,
            output_tokens: output,
            total_tokens: total,
        });
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::Assistant))
            .map(|m| m.content.as_str())
    }

    pub fn summary(&self) -> Option<UsageSummary> {
        if self.usage.is_empty() {
            return None;
        }
        Some(self.usage.iter().fold(
            UsageSummary { rounds: self.usage.len(), ..Default::default() },
            |mut acc, r| {
                acc.time += r.time;
                acc.input_tokens += r.input_tokens;
                acc.output_tokens += r.output_tokens;
                acc.total_tokens += r.total_tokens;
                acc
            },
        ))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.usage.clear();
    }
}
