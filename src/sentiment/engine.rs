// src/sentiment/engine.rs

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::classifier::classify_label;
use super::{SentimentAggregate, SentimentBreakdown};
use crate::agents::personality::PersonalityType;
use crate::config::ExternalCallPolicy;
use crate::error::{Result, SimError};
use crate::external::call_with_policy;
use crate::external::store::Store;
use crate::external::text::{GenerationOptions, TextGenerator};
use crate::types::{
    AgentId, Message, MessageId, NewMessage, Reaction, ReactionId, ReactionType, SentimentLabel,
};

/// Messages kept in memory for agents to read and react to.
pub const RECENT_MESSAGE_CAPACITY: usize = 200;

/// Canned lines used when the generator is slow or down: bullish, neutral, bearish.
static FALLBACK_MESSAGES: Lazy<HashMap<PersonalityType, [&'static str; 3]>> = Lazy::new(|| {
    HashMap::from([
        (
            PersonalityType::Cautious,
            [
                "Slowly adding a little. Still keeping most in SOL",
                "Not doing anything until the picture is clearer",
                "Trimming my bag. Too much risk right now",
            ],
        ),
        (
            PersonalityType::Balanced,
            [
                "Fundamentals look fine, buying a bit more",
                "Holding steady, nothing new to report",
                "Taking some profit off the table",
            ],
        ),
        (
            PersonalityType::Aggressive,
            [
                "Sending it. Full bag, moon or bust",
                "Waiting for the next big move",
                "Dumping everything, this is going lower",
            ],
        ),
        (
            PersonalityType::TrendFollower,
            [
                "Trend is up. Riding it",
                "No trend yet. Sitting out",
                "Trend broke down. Out",
            ],
        ),
        (
            PersonalityType::Contrarian,
            [
                "Everyone is scared, so I am buying",
                "Crowd cannot decide. Neither can I",
                "Everyone is euphoric, so I am selling",
            ],
        ),
    ])
});

pub fn fallback_message(personality: PersonalityType, mood: SentimentLabel) -> &'static str {
    let idx = match mood {
        SentimentLabel::Positive => 0,
        SentimentLabel::Neutral => 1,
        SentimentLabel::Negative => 2,
    };
    FALLBACK_MESSAGES
        .get(&personality)
        .map(|lines| lines[idx])
        .unwrap_or("...")
}

fn persona(personality: PersonalityType) -> &'static str {
    match personality {
        PersonalityType::Cautious => "a careful retail trader who hates losing money",
        PersonalityType::Balanced => "a level-headed trader who weighs both sides",
        PersonalityType::Aggressive => "a loud degen trader chasing big wins",
        PersonalityType::TrendFollower => "a momentum trader who follows the chart",
        PersonalityType::Contrarian => "a contrarian who bets against the crowd",
    }
}

/// Chat storage, generation and the rolling crowd mood.
pub struct MessagingEngine {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn Store>,
    policy: ExternalCallPolicy,
    cashtag: String,
    aggregate: SentimentAggregate,
    recent: RwLock<VecDeque<Message>>,
    next_message_id: AtomicU64,
    next_reaction_id: AtomicU64,
}

impl MessagingEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn Store>,
        policy: ExternalCallPolicy,
        half_life_messages: f64,
        cashtag: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            store,
            policy,
            cashtag: cashtag.into(),
            aggregate: SentimentAggregate::new(half_life_messages),
            recent: RwLock::new(VecDeque::with_capacity(RECENT_MESSAGE_CAPACITY)),
            next_message_id: AtomicU64::new(1),
            next_reaction_id: AtomicU64::new(1),
        }
    }

    /// Chat text for an agent. Falls back to a canned line on any failure.
    pub async fn generate_message(
        &self,
        agent_id: AgentId,
        personality: PersonalityType,
        market_sentiment: SentimentBreakdown,
        mood: SentimentLabel,
        price: f64,
    ) -> String {
        let system = format!(
            "You are {}, posting short messages in a {} trading chat.",
            persona(personality),
            self.cashtag
        );
        let user = format!(
            "Price is {price:.8} SOL. Chat is {:.0}% bullish, {:.0}% bearish. You feel {mood}. Write one message.",
            market_sentiment.bullish * 100.0,
            market_sentiment.bearish * 100.0,
        );
        let options = GenerationOptions {
            mood: Some(mood),
            cashtag: self.cashtag.clone(),
            ..Default::default()
        };

        let generated = call_with_policy(&self.policy, "text generation", || {
            self.generator.generate(&system, &user, &options)
        })
        .await;

        match generated {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!(agent_id, "generator returned nothing, using fallback");
                fallback_message(personality, mood).to_string()
            }
            Err(e) => {
                warn!(agent_id, generator = self.generator.name(), error = %e, "using fallback message");
                fallback_message(personality, mood).to_string()
            }
        }
    }

    /// Classify, keep, persist and fold into the aggregate.
    /// A persistence failure is logged; the message still counts.
    pub async fn store_message(&self, new: NewMessage) -> Result<MessageId> {
        let content = new.content.trim().to_string();
        if content.is_empty() {
            return Err(SimError::InvalidConfiguration("message content is empty".into()));
        }
        let sentiment = new
            .sentiment_hint
            .unwrap_or_else(|| classify_label(&content));
        let message = Message {
            id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
            sender: new.sender,
            content,
            sentiment,
            visibility: new.visibility,
            timestamp: Utc::now(),
        };

        {
            let mut recent = self.recent.write();
            recent.push_back(message.clone());
            while recent.len() > RECENT_MESSAGE_CAPACITY {
                recent.pop_front();
            }
        }
        self.aggregate.record(sentiment);

        if let Err(e) = call_with_policy(&self.policy, "save message", || {
            self.store.save_message(&message)
        })
        .await
        {
            warn!(message_id = message.id, error = %e, "message not persisted");
        }
        debug!(message_id = message.id, %sentiment, "message stored");
        Ok(message.id)
    }

    pub async fn post_system_message(&self, content: impl Into<String>) -> Result<MessageId> {
        self.store_message(NewMessage::system(content)).await
    }

    /// Reactions never move the aggregate.
    pub async fn react_to_message(
        &self,
        message_id: MessageId,
        agent_id: AgentId,
        reaction: ReactionType,
    ) -> Result<ReactionId> {
        if message_id == 0 || message_id >= self.next_message_id.load(Ordering::SeqCst) {
            return Err(SimError::NotFound(format!("message {message_id}")));
        }
        let record = Reaction {
            id: self.next_reaction_id.fetch_add(1, Ordering::SeqCst),
            message_id,
            agent_id,
            reaction,
            timestamp: Utc::now(),
        };
        if let Err(e) = call_with_policy(&self.policy, "save reaction", || {
            self.store.save_reaction(&record)
        })
        .await
        {
            warn!(reaction_id = record.id, error = %e, "reaction not persisted");
        }
        Ok(record.id)
    }

    /// Up to `n` newest messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        let recent = self.recent.read();
        let skip = recent.len().saturating_sub(n);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn overall_sentiment(&self) -> SentimentBreakdown {
        self.aggregate.snapshot()
    }

    pub fn score(&self) -> f64 {
        self.aggregate.snapshot().score()
    }

    pub fn messages_seen(&self) -> u64 {
        self.aggregate.observed()
    }

    pub fn reset_sentiment(&self) {
        self.aggregate.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::store::{InMemoryStore, PageRequest};
    use crate::external::text::TemplateGenerator;
    use crate::types::Sender;
    use std::time::Duration;

    fn engine_with(
        generator: Arc<TemplateGenerator>,
        store: Arc<InMemoryStore>,
    ) -> MessagingEngine {
        let policy = ExternalCallPolicy {
            timeout_ms: 100,
            retries: 1,
            backoff_ms: 10,
        };
        MessagingEngine::new(generator, store, policy, 5.0, "$SIM")
    }

    fn engine() -> MessagingEngine {
        engine_with(Arc::new(TemplateGenerator::new()), Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn stored_messages_are_classified_and_persisted() {
        // Arrange
        let store = Arc::new(InMemoryStore::new());
        let engine = engine_with(Arc::new(TemplateGenerator::new()), store.clone());

        // Act
        let id = engine
            .store_message(NewMessage::from_agent(4, "buy the dip, $SIM to the moon"))
            .await
            .unwrap();

        // Assert
        let recent = engine.recent_messages(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, id);
        assert_eq!(recent[0].sentiment, SentimentLabel::Positive);
        assert_eq!(recent[0].sender, Sender::Agent(4));
        assert!(engine.score() > 0.0);
        let page = store.list_messages(PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn hint_overrides_classifier() {
        let engine = engine();
        engine
            .store_message(NewMessage::system("to the moon").with_sentiment(SentimentLabel::Negative))
            .await
            .unwrap();
        assert_eq!(engine.recent_messages(1)[0].sentiment, SentimentLabel::Negative);
        assert!(engine.score() < 0.0);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let engine = engine();
        assert!(engine.store_message(NewMessage::system("   ")).await.is_err());
        assert_eq!(engine.messages_seen(), 0);
    }

    #[tokio::test]
    async fn reactions_need_a_real_message_and_leave_sentiment_alone() {
        let engine = engine();
        let id = engine.post_system_message("market open").await.unwrap();
        let before = engine.overall_sentiment();

        let r1 = engine.react_to_message(id, 2, ReactionType::Like).await.unwrap();
        let r2 = engine.react_to_message(id, 3, ReactionType::Laugh).await.unwrap();

        assert_ne!(r1, r2);
        assert_eq!(engine.overall_sentiment(), before);
        assert!(matches!(
            engine.react_to_message(id + 100, 2, ReactionType::Dislike).await,
            Err(SimError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn persistence_outage_does_not_lose_the_message() {
        let store = Arc::new(InMemoryStore::new());
        store.set_offline(true);
        let engine = engine_with(Arc::new(TemplateGenerator::new()), store);
        let id = engine.post_system_message("still here").await.unwrap();
        assert_eq!(engine.recent_messages(5)[0].id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generator_falls_back_to_canned_text() {
        let generator = Arc::new(TemplateGenerator::new());
        generator.set_latency(Duration::from_secs(10));
        let engine = engine_with(generator, Arc::new(InMemoryStore::new()));

        let text = engine
            .generate_message(
                1,
                PersonalityType::Contrarian,
                SentimentBreakdown::default(),
                SentimentLabel::Negative,
                0.001,
            )
            .await;

        assert_eq!(
            text,
            fallback_message(PersonalityType::Contrarian, SentimentLabel::Negative)
        );
    }

    #[tokio::test]
    async fn healthy_generator_is_used() {
        let engine = engine();
        let text = engine
            .generate_message(
                1,
                PersonalityType::Aggressive,
                SentimentBreakdown::default(),
                SentimentLabel::Positive,
                0.001,
            )
            .await;
        assert!(text.contains("$SIM"));
    }

    #[test]
    fn every_personality_has_fallbacks() {
        for p in PersonalityType::ALL {
            assert_ne!(fallback_message(p, SentimentLabel::Neutral), "...");
        }
    }

    #[tokio::test]
    async fn recent_ring_is_bounded() {
        let engine = engine();
        for i in 0..(RECENT_MESSAGE_CAPACITY + 10) {
            engine
                .post_system_message(format!("update {i}"))
                .await
                .unwrap();
        }
        let all = engine.recent_messages(usize::MAX);
        assert_eq!(all.len(), RECENT_MESSAGE_CAPACITY);
        assert_eq!(all.last().unwrap().content, format!("update {}", RECENT_MESSAGE_CAPACITY + 9));
    }
}
