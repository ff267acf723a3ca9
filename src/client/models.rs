use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// --- Tracking tables ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lead {
    pub id: Option<String>,
    pub anonymous_id: Option<String>,
    pub email: Option<String>,
    pub lead_score: Option<f64>,
    pub stage: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    #[serde(alias = "session_referrer")]
    pub referrer: Option<String>,
    #[serde(alias = "session_duration_ms")]
    pub duration_ms: Option<f64>,
}

impl Lead {
    pub fn anonymous_key(&self) -> Option<&str> {
        non_blank(self.anonymous_id.as_deref())
    }

    /// Trimmed, lowercased email if one was captured.
    pub fn email_key(&self) -> Option<String> {
        non_blank(self.email.as_deref()).map(str::to_lowercase)
    }

    pub fn score(&self) -> f64 {
        self.lead_score.unwrap_or(0.0)
    }

    pub fn label(&self) -> &str {
        non_blank(self.email.as_deref())
            .or_else(|| self.anonymous_key())
            .unwrap_or("Converted lead")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub anonymous_id: Option<String>,
    pub email: Option<String>,
    pub event_type: Option<String>,
    pub points: Option<i64>,
    pub metadata: Option<Value>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn kind(&self) -> Option<&str> {
        non_blank(self.event_type.as_deref())
    }

    /// Identity used to de-duplicate rows fetched through several filters.
    pub fn dedup_key(&self) -> (Option<&str>, Option<&str>, Option<&str>, Option<i64>, Option<DateTime<Utc>>) {
        (
            self.anonymous_id.as_deref(),
            self.email.as_deref(),
            self.event_type.as_deref(),
            self.points,
            self.created_at,
        )
    }
}

/// Row of `v_lead_profiles`; only the aggregated actions are read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeadProfile {
    pub top_events: Option<Value>,
}

// --- Knowledge base ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Pdf,
    Faq,
    Support,
    Product,
    Admin,
    #[default]
    #[serde(other)]
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Other => "other",
            Self::Web => "web",
            Self::Pdf => "pdf",
            Self::Faq => "faq",
            Self::Support => "support",
            Self::Product => "product",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewKbDocument {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub source_type: SourceType,
    pub enabled: bool,
}

impl NewKbDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: None,
            source_type: SourceType::Other,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Chunk id and text, as read when filling missing embeddings.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingChunk {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewKbChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: Value,
    pub embedding: Option<Vec<f32>>,
}

/// Row returned by the `match_kb_chunks` similarity function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchedChunk {
    pub id: Option<String>,
    pub document_id: Option<String>,
    pub content: String,
    pub metadata: Option<Value>,
    pub similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct IdRow {
    pub id: String,
}

fn enabled_by_default() -> bool {
    true
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 and bare `YYYY-MM-DD HH:MM:SS` values; anything else
/// becomes `None` instead of failing the whole row.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres text output: "2024-05-01 12:30:00.123+00"
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
