//! Typed decoding of the model's JSON answers.
//!
//! Both stages answer with a JSON array, sometimes wrapped in a markdown code
//! fence. Decoding is all-or-nothing: one bad item rejects the whole answer.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::clock::parse_offset_mmss;

pub const DEFAULT_CATEGORY: &str = "其他";
pub const DEFAULT_TITLE: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("expected a top-level JSON array, found {0}")]
    NotAnArray(&'static str),
    #[error("array item does not match the expected shape: {0}")]
    Item(#[source] serde_json::Error),
}

/// Remove one surrounding ```` ``` ```` fence (with an optional language tag on
/// the opening line). Text without exactly that shape is returned trimmed but
/// otherwise untouched.
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some((tag, body)) = rest.split_once('\n') else {
        return text;
    };
    if tag.contains('`') {
        return text;
    }
    let Some(inner) = body.trim_end().strip_suffix("```") else {
        return text;
    };
    if inner.contains("```") {
        return text;
    }
    inner.trim()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode_array<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<Vec<T>, ResponseError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).map_err(ResponseError::Syntax)?;
    if !value.is_array() {
        return Err(ResponseError::NotAnArray(kind_of(&value)));
    }
    serde_json::from_value(value).map_err(ResponseError::Item)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RawObservation {
    start_timestamp: String,
    end_timestamp: String,
    description: String,
}

/// A Stage 1 item resolved to absolute time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObservation {
    pub start_ts: i64,
    pub end_ts: i64,
    pub description: String,
}

/// Decode Stage 1 output; `MM:SS` offsets are added to `batch_start_ts`.
pub fn parse_observations(
    raw: &str,
    batch_start_ts: i64,
) -> Result<Vec<ParsedObservation>, ResponseError> {
    let items: Vec<RawObservation> = decode_array(raw)?;
    Ok(items
        .into_iter()
        .map(|item| ParsedObservation {
            start_ts: batch_start_ts + parse_offset_mmss(&item.start_timestamp),
            end_ts: batch_start_ts + parse_offset_mmss(&item.end_timestamp),
            description: item.description,
        })
        .collect())
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// `null` decodes like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn category_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_category))
}

fn title_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_title))
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Distraction {
    #[serde(deserialize_with = "null_as_default")]
    pub start_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub end_time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
}

/// A Stage 2 card as the model wrote it. Times are still `h:mm AM/PM` text.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCard {
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_category", deserialize_with = "category_or_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subcategory: String,
    #[serde(default = "default_title", deserialize_with = "title_or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detailed_summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub distractions: Vec<Distraction>,
}

impl ParsedCard {
    /// Detailed summary, or the short one when the model left it empty.
    pub fn description(&self) -> &str {
        if self.detailed_summary.is_empty() {
            &self.summary
        } else {
            &self.detailed_summary
        }
    }
}

pub fn parse_cards(raw: &str) -> Result<Vec<ParsedCard>, ResponseError> {
    decode_array(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_is_stripped_with_or_without_tag() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  ```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fence("[]"), "[]");
    }

    #[test]
    fn malformed_fences_pass_through() {
        assert_eq!(strip_code_fence("```json [1]```"), "```json [1]```");
        assert_eq!(strip_code_fence("```json\n[1]"), "```json\n[1]");
        let two_blocks = "```json\n[1]\n```\n```json\n[2]\n```";
        assert_eq!(strip_code_fence(two_blocks), two_blocks);
    }

    #[test]
    fn observations_resolve_offsets_against_batch_start() {
        let raw = r#"```json
[
  {"startTimestamp": "00:00", "endTimestamp": "06:45", "description": "Planning a trip"},
  {"startTimestamp": "06:45", "endTimestamp": "bogus", "description": "Spanish lesson"}
]
```"#;
        let parsed = parse_observations(raw, 10_000).unwrap();
        assert_eq!(
            parsed,
            vec![
                ParsedObservation {
                    start_ts: 10_000,
                    end_ts: 10_405,
                    description: "Planning a trip".into(),
                },
                ParsedObservation {
                    start_ts: 10_405,
                    end_ts: 10_000,
                    description: "Spanish lesson".into(),
                },
            ]
        );
    }

    #[test]
    fn one_bad_observation_rejects_the_whole_answer() {
        let raw = r#"[
  {"startTimestamp": "00:00", "endTimestamp": "01:00", "description": "ok"},
  {"startTimestamp": "01:00", "endTimestamp": "02:00"}
]"#;
        assert!(matches!(
            parse_observations(raw, 0),
            Err(ResponseError::Item(_))
        ));
    }

    #[test]
    fn wrong_shapes_are_typed_errors() {
        assert!(matches!(
            parse_observations("not json", 0),
            Err(ResponseError::Syntax(_))
        ));
        assert!(matches!(
            parse_cards(r#"{"startTime": "1:00 PM"}"#),
            Err(ResponseError::NotAnArray("an object"))
        ));
        assert_eq!(parse_cards("[]").unwrap(), Vec::new());
    }

    #[test]
    fn cards_fill_in_explicit_defaults() {
        let cards = parse_cards(r#"[{"startTime": "1:12 PM", "endTime": "1:30 PM", "summary": "Fixed login"}]"#)
            .unwrap();
        let card = &cards[0];
        assert_eq!(card.category, DEFAULT_CATEGORY);
        assert_eq!(card.title, DEFAULT_TITLE);
        assert_eq!(card.subcategory, "");
        assert!(card.distractions.is_empty());
        assert_eq!(card.description(), "Fixed login");
    }

    #[test]
    fn cards_keep_model_fields() {
        let raw = r#"[{
  "startTime": "1:12 PM",
  "endTime": "1:30 PM",
  "category": "工作",
  "subcategory": "编程",
  "title": "实现用户认证功能",
  "summary": "short",
  "detailedSummary": "long",
  "distractions": [{"startTime": "1:15 PM", "endTime": "1:18 PM", "title": "查看消息"}]
}]"#;
        let card = parse_cards(raw).unwrap().remove(0);
        assert_eq!(card.category, "工作");
        assert_eq!(card.description(), "long");
        assert_eq!(card.distractions[0].title, "查看消息");
        assert_eq!(card.distractions[0].summary, "");
    }

    #[test]
    fn null_optional_fields_decode_as_defaults() {
        let raw = r#"[{
  "startTime": "1:12 PM",
  "endTime": "1:30 PM",
  "category": null,
  "subcategory": null,
  "title": null,
  "summary": "Fixed login",
  "detailedSummary": null,
  "distractions": null
}]"#;
        let card = parse_cards(raw).unwrap().remove(0);
        assert_eq!(card.category, DEFAULT_CATEGORY);
        assert_eq!(card.title, DEFAULT_TITLE);
        assert_eq!(card.subcategory, "");
        assert!(card.distractions.is_empty());
        assert_eq!(card.description(), "Fixed login");

        let raw = r#"[{"startTime": "1:12 PM", "endTime": "1:30 PM",
  "distractions": [{"startTime": "1:15 PM", "endTime": null, "title": "查看消息", "summary": null}]}]"#;
        let distraction = parse_cards(raw).unwrap().remove(0).distractions.remove(0);
        assert_eq!(distraction.end_time, "");
        assert_eq!(distraction.summary, "");
        assert_eq!(distraction.title, "查看消息");
    }

    #[test]
    fn null_times_still_reject_the_card() {
        assert!(parse_cards(r#"[{"startTime": null, "endTime": "1:30 PM"}]"#).is_err());
    }

    #[test]
    fn card_without_times_is_rejected() {
        assert!(parse_cards(r#"[{"title": "No times"}]"#).is_err());
    }
}
