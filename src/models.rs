//! Core data models shared by the store, the router and the backend client.
//!
//! Timestamps reach the coordinator either as epoch milliseconds (from the
//! extraction context) or as ISO-8601 strings (from previously persisted
//! history). Both are normalized to `DateTime<Utc>` on deserialization and
//! always written back as RFC 3339 with millisecond precision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured page visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawHistoryItem")]
pub struct HistoryItem {
    pub url: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl HistoryItem {
    pub fn new(
        url: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            timestamp,
            content: content.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Copy of this item with `content` cut to at most `cap` characters.
    pub fn capped(&self, cap: usize) -> Self {
        let content = match self.content.char_indices().nth(cap) {
            Some((byte_idx, _)) => self.content[..byte_idx].to_string(),
            None => self.content.clone(),
        };
        Self {
            content,
            ..self.clone()
        }
    }

    /// Title when present and non-blank, URL otherwise.
    pub fn label(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.url,
        }
    }
}

/// Accepted input shapes for a history item.
///
/// `Legacy` is the nested `{ timestamp, data: { userId, scrapedTextData, url } }`
/// record older installs persisted locally.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHistoryItem {
    Flat {
        url: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
        content: String,
        #[serde(default)]
        title: Option<String>,
    },
    Legacy {
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
        data: LegacyData,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyData {
    scraped_text_data: String,
    url: String,
}

impl From<RawHistoryItem> for HistoryItem {
    fn from(raw: RawHistoryItem) -> Self {
        match raw {
            RawHistoryItem::Flat {
                url,
                timestamp,
                content,
                title,
            } => Self {
                url,
                timestamp,
                content,
                title,
            },
            RawHistoryItem::Legacy { timestamp, data } => Self {
                url: data.url,
                timestamp,
                content: data.scraped_text_data,
                title: None,
            },
        }
    }
}

/// Process-wide policy record. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub max_history_items: usize,
    pub enable_auto_capture: bool,
    pub use_server_storage: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_history_items: 100,
            enable_auto_capture: true,
            use_server_storage: true,
            server_url: None,
        }
    }
}

/// Serde helpers for timestamps that arrive as epoch millis or as strings.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Millis(ms) => from_millis(ms).map_err(de::Error::custom),
            Raw::Float(ms) => from_millis(ms as i64).map_err(de::Error::custom),
            Raw::Text(s) => parse(&s).map_err(de::Error::custom),
        }
    }

    pub fn from_millis(ms: i64) -> Result<DateTime<Utc>, String> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| format!("timestamp out of range: {}", ms))
    }

    /// Parses RFC 3339, or a bare integer string holding epoch millis.
    pub fn parse(s: &str) -> Result<DateTime<Utc>, String> {
        let s = s.trim();
        if let Ok(ms) = s.parse::<i64>() {
            return from_millis(ms);
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
    }
}
