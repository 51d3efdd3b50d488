// src/external/text.rs

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Result, SimError};
use crate::types::SentimentLabel;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_chars: usize,
    pub temperature: f64,
    /// Template backends key off this; model backends may ignore it.
    pub mood: Option<SentimentLabel>,
    /// Replaces `{tag}` in templates, e.g. `$SIM`.
    pub cashtag: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_chars: 280,
            temperature: 0.8,
            mood: None,
            cashtag: "$SIM".into(),
        }
    }
}

/// Chat text source. Implementations may be remote and slow.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

const BULLISH_TEMPLATES: &[&str] = &[
    "{tag} looking strong, adding more here",
    "Chart is breaking out. {tag} to the moon",
    "Loaded up on {tag}, this rally has legs",
    "Green candles everywhere. Buying every dip on {tag}",
];

const BEARISH_TEMPLATES: &[&str] = &[
    "{tag} looks weak, taking profit and stepping aside",
    "Volume is thin. Careful with {tag}",
    "Sold my {tag}, this smells like a dump",
    "Lower highs on {tag}. Not touching it until it bottoms",
];

const NEUTRAL_TEMPLATES: &[&str] = &[
    "Watching {tag} from the sidelines for now",
    "{tag} chopping sideways, waiting for a clear move",
    "Anyone have a read on {tag} today?",
    "Holding my {tag} position, no changes",
];

/// Offline generator that fills canned templates.
///
/// `set_latency` and `set_failing` let tests exercise the fallback path.
#[derive(Default)]
pub struct TemplateGenerator {
    counter: AtomicU64,
    latency_ms: AtomicU64,
    failing: AtomicBool,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SimError::External("template generator unavailable".into()));
        }

        let templates = match options.mood {
            Some(SentimentLabel::Positive) => BULLISH_TEMPLATES,
            Some(SentimentLabel::Negative) => BEARISH_TEMPLATES,
            _ => NEUTRAL_TEMPLATES,
        };
        let n = self.counter.fetch_add(1, Ordering::Relaxed) as usize + user_prompt.len();
        let text = templates[n % templates.len()].replace("{tag}", &options.cashtag);
        Ok(text.chars().take(options.max_chars).collect())
    }

    fn name(&self) -> &str {
        "template"
    }
}
