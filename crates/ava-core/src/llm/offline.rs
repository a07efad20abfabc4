//! Deterministic responder used when no language model is configured.

use async_trait::async_trait;

use super::{LlmClient, LlmError, LlmResult, Message, Role, SUMMARY_PROMPT};
use crate::emotion::EmotionAnalyzer;

pub const OFFLINE_MODEL: &str = "offline";

/// Replies from canned templates keyed on the emotion of the last user
/// message. Never touches the network.
pub struct OfflineResponder {
    analyzer: EmotionAnalyzer,
}

impl Default for OfflineResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineResponder {
    pub fn new() -> Self {
        Self {
            analyzer: EmotionAnalyzer::new(OFFLINE_MODEL),
        }
    }

    fn reply_for(&self, text: &str) -> String {
        let primary = self
            .analyzer
            .analyze(text)
            .map(|ctx| ctx.primary)
            .unwrap_or_else(|_| "neutral".to_string());
        let reply = match primary.as_str() {
            "joy" => "That sounds wonderful! I'm glad to hear it. What made it so good?",
            "sadness" => "I'm sorry you're going through that. I'm here to listen.",
            "anger" => "That sounds really frustrating. Do you want to tell me what happened?",
            "fear" => "That sounds worrying. What's weighing on you most?",
            "surprise" => "Oh, I didn't see that coming either! Tell me more.",
            "disgust" => "That does sound unpleasant. How are you handling it?",
            "trust" => "Thank you for sharing that with me. It means a lot.",
            "anticipation" => "How exciting! What are you looking forward to most?",
            _ if text.trim_end().ends_with('?') => {
                "That's a good question. I'd like to hear what you think about it first."
            }
            _ => "I see. Tell me more about that.",
        };
        reply.to_string()
    }

    /// First sentence of every user turn in the transcript.
    fn summarize(transcript: &str) -> String {
        let points: Vec<&str> = transcript
            .lines()
            .filter_map(|line| line.strip_prefix("User: "))
            .map(|turn| turn.split(['.', '!', '?']).next().unwrap_or(turn).trim())
            .filter(|s| !s.is_empty())
            .collect();
        if points.is_empty() {
            "We had a short conversation.".to_string()
        } else {
            format!("We talked about: {}.", points.join("; "))
        }
    }
}

#[async_trait]
impl LlmClient for OfflineResponder {
    fn model(&self) -> &str {
        OFFLINE_MODEL
    }

    async fn generate_response(&self, messages: &[Message]) -> LlmResult<String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| LlmError::InvalidRequest("no user message".into()))?;

        let wants_summary = messages
            .first()
            .is_some_and(|m| m.role == Role::System && m.content.starts_with(SUMMARY_PROMPT));
        if wants_summary {
            return Ok(Self::summarize(&last_user.content));
        }
        Ok(self.reply_for(&last_user.content))
    }
}
