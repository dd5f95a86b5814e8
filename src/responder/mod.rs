//! Keyword-triggered automated replies.
//!
//! Rules are checked in order against the lower-cased visitor text and the
//! first match wins:
//!
//! | Rule       | Trigger (substring)      | Default delay |
//! |------------|--------------------------|---------------|
//! | `greeting` | `hello`, `hi`            | 1000 ms       |
//! | `support`  | `help`, `support`        | 1000 ms       |
//! | `fallback` | none, with probability p | 1500 ms       |

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ChatConfig;
use crate::relay::{ChatMessage, MessageKind};

const GREETING_KEYWORDS: &[&str] = &["hello", "hi"];
const SUPPORT_KEYWORDS: &[&str] = &["help", "support"];

const GREETING_REPLY: &str = "Hello! Welcome to our store. How can we help you today?";
const SUPPORT_REPLY: &str =
    "Our support team has been notified and will be with you shortly. You can also leave your email and we will get back to you.";
const FALLBACK_REPLY: &str = "Thanks for your message! An operator will reply as soon as possible.";

/// Which rule produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRule {
    Greeting,
    Support,
    Fallback,
}

impl ReplyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Support => "support",
            Self::Fallback => "fallback",
        }
    }
}

/// An automated reply and how long to wait before posting it
#[derive(Debug, Clone)]
pub struct ScheduledReply {
    pub rule: ReplyRule,
    pub message: ChatMessage,
    pub delay: Duration,
}

pub struct Responder {
    bot_name: String,
    greeting_delay: Duration,
    support_delay: Duration,
    fallback_delay: Duration,
    fallback_probability: f64,
    rng: Mutex<StdRng>,
}

impl Responder {
    /// Create a responder seeded from the operating system
    pub fn new(config: &ChatConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a responder with a fixed seed, for reproducible fallback decisions
    pub fn with_seed(config: &ChatConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: &ChatConfig, rng: StdRng) -> Self {
        Self {
            bot_name: config.bot_name.clone(),
            greeting_delay: Duration::from_millis(config.greeting_delay_ms),
            support_delay: Duration::from_millis(config.support_delay_ms),
            fallback_delay: Duration::from_millis(config.fallback_delay_ms),
            fallback_probability: sanitize_probability(config.fallback_probability),
            rng: Mutex::new(rng),
        }
    }

    /// Decide whether a visitor message gets an automated reply
    pub fn maybe_respond(&self, visitor_text: &str) -> Option<ScheduledReply> {
        let text = visitor_text.to_lowercase();

        let (rule, reply, delay) = if contains_any(&text, GREETING_KEYWORDS) {
            (ReplyRule::Greeting, GREETING_REPLY, self.greeting_delay)
        } else if contains_any(&text, SUPPORT_KEYWORDS) {
            (ReplyRule::Support, SUPPORT_REPLY, self.support_delay)
        } else if self.roll_fallback() {
            (ReplyRule::Fallback, FALLBACK_REPLY, self.fallback_delay)
        } else {
            return None;
        };

        Some(ScheduledReply {
            rule,
            message: ChatMessage::new(MessageKind::Bot, self.bot_name.as_str(), reply),
            delay,
        })
    }

    fn roll_fallback(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_bool(self.fallback_probability)
    }
}

/// `random_bool` panics outside 0.0..=1.0; NaN and infinities disable the fallback
fn sanitize_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}
