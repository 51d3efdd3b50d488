// src/types/mod.rs

pub mod message;
pub mod trade;
pub mod wallet;

use chrono::{DateTime, Utc};

pub type AgentId = u64;
pub type MessageId = u64;
pub type ReactionId = u64;
pub type TxId = u64;
pub type RunId = u64;

/// Wall-clock time used on every stored record.
pub type Timestamp = DateTime<Utc>;

pub use message::{Message, NewMessage, Reaction, ReactionType, Sender, SentimentLabel, Visibility};
pub use trade::{Direction, SwapReceipt, Transaction, TxStatus};
pub use wallet::Wallet;
