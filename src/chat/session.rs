use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::client::models::MatchedChunk;

/// One answered question and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub sources: Vec<MatchedChunk>,
    pub timestamp: DateTime<Local>,
}

/// Questions are answered independently, so the history is only kept for
/// `/history` and `/sources`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    pub history: Vec<Exchange>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question: &str, answer: &str, sources: Vec<MatchedChunk>) {
        self.history.push(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
            sources,
            timestamp: Local::now(),
        });
    }

    pub fn last(&self) -> Option<&Exchange> {
        self.history.last()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_exchanges_in_order() {
        let mut session = ChatSession::new();
        assert!(session.last().is_none());

        session.record("oil?", "10W-40", Vec::new());
        session.record("tyres?", "2.5 bar", vec![MatchedChunk::default()]);
        assert_eq!(session.history.len(), 2);

        let last = session.last().unwrap();
        assert_eq!(last.question, "tyres?");
        assert_eq!(last.sources.len(), 1);

        session.clear();
        assert!(session.history.is_empty());
    }
}
