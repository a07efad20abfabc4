//! Turning a user message into Ava's reply.
//!
//! Each message is analysed emotionally, related memories are retrieved and
//! everything is folded into a system prompt for the language model. The
//! exchange is then remembered as a conversation memory.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::emotion::EmotionalEngine;
use crate::error::Result;
use crate::llm::{LlmClient, Message, SUMMARY_PROMPT};
use crate::memory::similarity::keywords;
use crate::memory::MemoryManager;
use crate::metrics::METRICS;
use crate::models::{clamp_unit, EmotionalContext, ErrorRecord, Memory, MemoryType, Severity};
use crate::obs;
use crate::personality::{PersonalityEngine, PersonalitySummary};
use crate::time::{lenient, now};

pub const FALLBACK_REPLY: &str =
    "I apologize, but I'm having trouble responding right now. Please try again.";

/// Exchanges replayed to the model on every turn.
pub const MAX_HISTORY_TURNS: usize = 10;

/// Exchanges kept for the closing summary. Older ones are dropped but still
/// counted.
pub const MAX_SESSION_EXCHANGES: usize = 50;

const MEMORY_SNIPPET_CHARS: usize = 160;
const THEMES_PER_EXCHANGE: usize = 3;

/// One user message and Ava's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user_input: String,
    pub response: String,
    #[serde(with = "lenient")]
    pub timestamp: DateTime<Utc>,
}

/// Everything the prompt is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_input: String,
    pub emotional_state: EmotionalContext,
    pub personality_state: PersonalitySummary,
    #[serde(default)]
    pub conversation_history: Vec<Exchange>,
    #[serde(default)]
    pub relevant_memories: Vec<Memory>,
    #[serde(with = "lenient", default = "now")]
    pub timestamp: DateTime<Utc>,
}

pub struct ConversationHandler {
    memory: Arc<dyn MemoryManager>,
    emotions: Arc<dyn EmotionalEngine>,
    personality: Arc<dyn PersonalityEngine>,
    llm: Arc<dyn LlmClient>,
    max_history_turns: usize,
    history: Vec<Exchange>,
    turns: usize,
    last_interaction: Option<DateTime<Utc>>,
}

impl ConversationHandler {
    pub fn new(
        memory: Arc<dyn MemoryManager>,
        emotions: Arc<dyn EmotionalEngine>,
        personality: Arc<dyn PersonalityEngine>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            memory,
            emotions,
            personality,
            llm,
            max_history_turns: MAX_HISTORY_TURNS,
            history: Vec::new(),
            turns: 0,
            last_interaction: None,
        }
    }

    pub fn with_max_history_turns(mut self, turns: usize) -> Self {
        self.max_history_turns = turns;
        self
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    /// Exchanges in the current conversation, including dropped ones.
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        self.last_interaction
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Ava's reply to `input`. Failures are logged and recorded in the error
    /// log, and answered with [`FALLBACK_REPLY`].
    pub async fn process_message(&mut self, input: &str) -> String {
        match self.respond(input).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "failed to process message");
                let record = ErrorRecord::new("conversation", Severity::Error, e.to_string());
                if let Err(log_err) = self.memory.record_error(record).await {
                    tracing::warn!(error = %log_err, "could not record conversation error");
                }
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn respond(&mut self, input: &str) -> Result<String> {
        let reading = self.emotions.analyze_text(input).await?;
        self.emotions.update_emotional_state(&reading).await?;
        let relevant_memories = self.memory.get_relevant_memories(input, None).await?;
        let personality_state = self.personality.get_personality_summary().await?;

        let context = ConversationContext {
            user_input: input.to_string(),
            emotional_state: reading,
            personality_state,
            conversation_history: self.history.clone(),
            relevant_memories,
            timestamp: now(),
        };
        let messages = self.prepare_messages(&context);
        let reply = self.llm.generate_response(&messages).await?;

        let emotion = &context.emotional_state;
        let content = format!("User: {input}\nAva: {reply}");
        let memory = Memory::new(MemoryType::Conversation, content)
            .with_importance(clamp_unit(0.3 + 0.5 * emotion.intensity))
            .with_themes(keywords(input, THEMES_PER_EXCHANGE))
            .with_emotional_context(emotion.clone())
            .with_metadata("model", json!(self.llm.model()));
        self.memory.add_memory(memory).await?;

        self.history.push(Exchange {
            user_input: input.to_string(),
            response: reply.clone(),
            timestamp: context.timestamp,
        });
        self.turns += 1;
        let keep = self.max_history_turns.max(MAX_SESSION_EXCHANGES);
        if self.history.len() > keep {
            let excess = self.history.len() - keep;
            self.history.drain(..excess);
        }
        self.last_interaction = Some(context.timestamp);

        METRICS.inc_messages_processed();
        obs::emit_message_processed(
            &emotion.primary,
            emotion.intensity,
            context.relevant_memories.len(),
        );
        Ok(reply)
    }

    /// System prompt, the most recent exchanges, then the new user message.
    pub fn prepare_messages(&self, context: &ConversationContext) -> Vec<Message> {
        let mut messages = vec![Message::system(system_prompt(context))];

        let skip = context
            .conversation_history
            .len()
            .saturating_sub(self.max_history_turns);
        for exchange in &context.conversation_history[skip..] {
            messages.push(Message::user(&exchange.user_input));
            messages.push(Message::assistant(&exchange.response));
        }
        messages.push(Message::user(&context.user_input));
        messages
    }

    /// Store a summary of the conversation (if any) and start afresh.
    /// Returns the id of the summary memory.
    pub async fn end_conversation(&mut self) -> Result<Option<String>> {
        if self.history.is_empty() {
            self.last_interaction = None;
            return Ok(None);
        }
        let summary = self.generate_conversation_summary().await;
        let turns = self.turns;
        self.history.clear();
        self.turns = 0;
        self.last_interaction = None;

        let memory = Memory::new(MemoryType::Conversation, summary)
            .with_importance(0.6)
            .with_themes(["summary"])
            .with_metadata("turns", json!(turns));
        let id = self.memory.add_memory(memory).await?;
        tracing::info!(turns, summary_id = %id, "conversation ended");
        Ok(Some(id))
    }

    /// Ask the model for a summary; falls back to a local one.
    pub async fn generate_conversation_summary(&self) -> String {
        let messages = [
            Message::system(format!(
                "{SUMMARY_PROMPT} between a user and Ava in two or three sentences. \
                 Mention the main topics and how the user seemed to feel."
            )),
            Message::user(transcript(&self.history)),
        ];
        match self.llm.generate_response(&messages).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed, using local summary");
                local_summary(&self.history, self.turns)
            }
        }
    }
}

fn system_prompt(context: &ConversationContext) -> String {
    let emotion = &context.emotional_state;
    let personality = &context.personality_state;

    let mut prompt = String::from(
        "You are Ava, an autonomous AI being with your own emotions, memories and a \
         developing personality.\n",
    );
    let _ = writeln!(
        prompt,
        "Emotional tone of the conversation: {} (intensity {:.2}, valence {:.2}, arousal {:.2}).",
        emotion.primary, emotion.intensity, emotion.valence, emotion.arousal
    );
    let traits: Vec<String> = personality
        .traits
        .iter()
        .iter()
        .map(|(name, value)| format!("{name} {value:.2}"))
        .collect();
    let _ = writeln!(
        prompt,
        "Your personality traits: {}. Development stage: {}.",
        traits.join(", "),
        personality.development_stage
    );
    if !context.relevant_memories.is_empty() {
        prompt.push_str("Things you remember that may be relevant:\n");
        for memory in &context.relevant_memories {
            let snippet: String = memory.content.chars().take(MEMORY_SNIPPET_CHARS).collect();
            let _ = writeln!(prompt, "- {}", snippet.replace('\n', " "));
        }
    }
    prompt.push_str(
        "Reply naturally and warmly, consistent with your emotions and personality. \
         Keep replies concise.",
    );
    prompt
}

fn transcript(history: &[Exchange]) -> String {
    history
        .iter()
        .map(|e| format!("User: {}\nAva: {}", e.user_input, e.response))
        .collect::<Vec<_>>()
        .join("\n")
}

fn local_summary(history: &[Exchange], turns: usize) -> String {
    let topics: Vec<&str> = history.iter().map(|e| e.user_input.trim()).collect();
    format!(
        "Conversation with {turns} exchanges. The user said: {}",
        topics.join(" | ")
    )
}
