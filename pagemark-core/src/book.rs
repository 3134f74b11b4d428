//! Book, progress and activity records.
//!
//! Field names on the wire follow the sync API: `document`, `device_id`,
//! `start_time` and so on. [`BookState`] uses the shape returned by
//! `GET /reader/progress/{id}` so a remote response deserializes directly.

use serde::{Deserialize, Deserializer, Serialize};

/// Where a book's canonical copy lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookType {
    /// Served by the sync API; progress is flushed remotely.
    #[default]
    Remote,
    /// Stored only in the local key-value store.
    Local,
}

/// State of the book open in a reader session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookState {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(rename = "type", default)]
    pub book_type: BookType,
    /// Total word count of the book, 0 when not yet counted.
    #[serde(rename = "words", default, deserialize_with = "null_as_default")]
    pub total_words: u64,
    #[serde(rename = "currentWord", default)]
    pub current_word_offset: u64,
    /// Percentage complete in `[0, 100]` with two decimals.
    #[serde(default)]
    pub percentage: f64,
    /// Portable reading position, empty when unknown.
    #[serde(rename = "progress", default)]
    pub position: String,
    #[serde(rename = "deviceID", default)]
    pub device_id: String,
    #[serde(rename = "deviceName", default)]
    pub device_name: String,
}

/// The server sends `null` for columns it has no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl BookState {
    pub fn is_local(&self) -> bool {
        self.book_type == BookType::Local
    }
}

/// Body of `PUT .../syncs/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document: String,
    pub device_id: String,
    pub device: String,
    /// Fraction of the book read, `[0, 1]`, five decimals.
    pub percentage: f64,
    pub progress: String,
}

/// A normalized sample of reading speed for one page view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub document: String,
    /// Seconds spent on the page (rounded).
    pub duration: i64,
    /// Epoch seconds when the page was rendered (rounded).
    pub start_time: i64,
    pub page: i64,
    pub pages: i64,
}

/// Body of `POST .../activity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub device_id: String,
    pub device: String,
    pub activity: Vec<ActivityRecord>,
}

/// A sync device as listed by `GET /reader/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub device_name: String,
}

/// Display statistics for the current page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookStats {
    pub section_page: u32,
    pub section_total_pages: u32,
    pub chapter_name: String,
    pub percentage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_state_from_remote_progress() {
        let json = r#"{
            "id": "0123456789abcdef0123456789abcdef",
            "title": "Frankenstein",
            "author": "Mary Shelley",
            "words": 78100,
            "progress": "/body/DocFragment[3]/body/p[4]/text().12",
            "percentage": 12.5
        }"#;
        let state: BookState = serde_json::from_str(json).unwrap();
        assert_eq!(state.book_type, BookType::Remote);
        assert_eq!(state.total_words, 78100);
        assert_eq!(state.position, "/body/DocFragment[3]/body/p[4]/text().12");
        assert_eq!(state.current_word_offset, 0);
        assert!(!state.is_local());
    }

    #[test]
    fn test_book_state_with_null_columns() {
        let json = r#"{
            "id": "0123456789abcdef0123456789abcdef",
            "title": null,
            "author": null,
            "words": null,
            "progress": "",
            "percentage": 0
        }"#;
        let state: BookState = serde_json::from_str(json).unwrap();
        assert_eq!(state.id, "0123456789abcdef0123456789abcdef");
        assert_eq!(state.title, "");
        assert_eq!(state.author, "");
        assert_eq!(state.total_words, 0);
        assert_eq!(state.percentage, 0.0);
    }

    #[test]
    fn test_book_type_wire_names() {
        assert_eq!(serde_json::to_string(&BookType::Local).unwrap(), "\"LOCAL\"");
        assert_eq!(serde_json::to_string(&BookType::Remote).unwrap(), "\"REMOTE\"");
    }

    #[test]
    fn test_activity_event_wire_shape() {
        let event = ActivityEvent {
            device_id: "DEV".to_string(),
            device: "Linux - Firefox".to_string(),
            activity: vec![ActivityRecord {
                document: "doc".to_string(),
                duration: 30,
                start_time: 1_700_000_000,
                page: 4,
                pages: 250,
            }],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["device_id"], "DEV");
        assert_eq!(value["activity"][0]["start_time"], 1_700_000_000);
        assert_eq!(value["activity"][0]["pages"], 250);
    }
}
