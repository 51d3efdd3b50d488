// src/types/message.rs

use serde::{Deserialize, Serialize};

use super::{AgentId, MessageId, ReactionId, Timestamp};

/// Coarse mood of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Bucket a score in [-1, 1]. The dead band keeps small jitter neutral.
    pub fn from_score(score: f64) -> Self {
        if score > 0.15 {
            SentimentLabel::Positive
        } else if score < -0.15 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn to_score(self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Negative => -1.0,
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "bullish"),
            SentimentLabel::Neutral => write!(f, "neutral"),
            SentimentLabel::Negative => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Sender {
    Agent(AgentId),
    System,
}

/// Stored chat message. Never mutated after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    pub sentiment: SentimentLabel,
    pub visibility: Visibility,
    pub timestamp: Timestamp,
}

/// Input to `MessagingEngine::store_message`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Sender,
    pub content: String,
    /// Skip classification and use this label.
    pub sentiment_hint: Option<SentimentLabel>,
    pub visibility: Visibility,
}

impl NewMessage {
    pub fn from_agent(agent_id: AgentId, content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Agent(agent_id),
            content: content.into(),
            sentiment_hint: None,
            visibility: Visibility::Public,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::System,
            content: content.into(),
            sentiment_hint: None,
            visibility: Visibility::Public,
        }
    }

    pub fn with_sentiment(mut self, label: SentimentLabel) -> Self {
        self.sentiment_hint = Some(label);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Dislike,
    Laugh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: ReactionId,
    pub message_id: MessageId,
    pub agent_id: AgentId,
    pub reaction: ReactionType,
    pub timestamp: Timestamp,
}
