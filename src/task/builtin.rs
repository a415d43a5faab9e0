//! Builtin

use crate::task::handler::TaskHandler;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

const POSITIVE_WORDS: &[&str] = &[
    "great", "love", "amazing", "excellent", "helpful", "perfect", "quick", "thanks", "good",
    "exceeded", "happy", "fast",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "damaged", "hasn't", "not", "never", "crashing", "charged", "dissatisfied", "broken",
    "slow", "terrible", "can't", "worst", "angry",
];

/// Lexicon-based sentiment scorer for `sentiment_analysis` tasks.
///
/// Expects `{text: string}` and answers `{sentiment, confidence}`.
#[derive(Debug, Clone, Default)]
pub struct SentimentHandler;

impl SentimentHandler {
    /// Create a new sentiment handler
    pub fn new() -> Self {
        Self
    }

    fn score(text: &str) -> (i64, usize) {
        let mut score = 0i64;
        let mut hits = 0usize;
        for word in text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            if POSITIVE_WORDS.contains(&word.as_str()) {
                score += 1;
                hits += 1;
            } else if NEGATIVE_WORDS.contains(&word.as_str()) {
                score -= 1;
                hits += 1;
            }
        }
        (score, hits)
    }
}

#[async_trait]
impl TaskHandler for SentimentHandler {
    async fn handle(&self, data: &Value) -> crate::Result<Value> {
        let text = data.get("text").and_then(Value::as_str).unwrap_or_default();
        let (score, hits) = Self::score(text);

        let sentiment = match score {
            s if s > 0 => "positive",
            s if s < 0 => "negative",
            _ => "neutral",
        };
        let confidence = if hits == 0 {
            0.5
        } else {
            (0.5 + 0.5 * score.unsigned_abs() as f64 / hits as f64).min(0.99)
        };

        debug!("Scored text ({} chars) as {}", text.len(), sentiment);
        Ok(json!({ "sentiment": sentiment, "confidence": confidence }))
    }
}

/// Rule-based router for `routing` tasks.
///
/// Reads `channel` (voice/chat/email), `priority` (high/medium/low), `type`
/// (complaint/inquiry/support/feedback), `customer_history_length` and
/// `agent_availability`.
#[derive(Debug, Clone, Default)]
pub struct RoutingHandler;

impl RoutingHandler {
    /// Create a new routing handler
    pub fn new() -> Self {
        Self
    }

    fn priority_weight(priority: &str) -> u8 {
        match priority {
            "high" => 3,
            "medium" => 2,
            _ => 1,
        }
    }

    fn response_time(priority: &str) -> Option<&'static str> {
        match priority {
            "high" => Some("15 minutes"),
            "medium" => Some("1 hour"),
            "low" => Some("24 hours"),
            _ => None,
        }
    }

    fn assign(query_type: &str, priority: u8, history: u64, availability: f64) -> (&'static str, f64) {
        match query_type {
            "complaint" if priority >= 3 => ("priority_support", 0.9),
            "complaint" => ("customer_service", 0.75),
            "support" if history > 10 => ("priority_support", 0.7),
            "support" => ("technical_support", 0.8),
            "inquiry" if availability < 0.2 => ("automated_response", 0.65),
            "inquiry" => ("customer_service", 0.7),
            "feedback" => ("automated_response", 0.85),
            _ => ("general_support", 0.5),
        }
    }
}

#[async_trait]
impl TaskHandler for RoutingHandler {
    async fn handle(&self, data: &Value) -> crate::Result<Value> {
        let priority = data.get("priority").and_then(Value::as_str).unwrap_or("low");
        let query_type = data.get("type").and_then(Value::as_str).unwrap_or("inquiry");
        let history = data
            .get("customer_history_length")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let availability = data
            .get("agent_availability")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        let (assigned_to, confidence) = Self::assign(
            query_type,
            Self::priority_weight(priority),
            history,
            availability,
        );

        Ok(json!({
            "assigned_to": assigned_to,
            "priority": priority,
            "estimated_response_time": Self::response_time(priority),
            "channel": data.get("channel").cloned().unwrap_or(Value::Null),
            "routing_confidence": confidence,
        }))
    }
}
