//! Topic namespace parsing and formatting
//!
//! Two namespaces exist on the message bus:
//! - `{prefix}/{INDEX}` — spot value of a tracked index
//! - `{prefix}/{INDEX}/{EXPIRY}/{STRIKE}/{ce|pe}` — one option contract
//!
//! Topic strings are the sole deduplication key for subscriptions and
//! the unique key of the durable `topics` relation, so formatting must
//! be deterministic: the same leg always yields the same string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default first segment of every topic.
pub const DEFAULT_TOPIC_PREFIX: &str = "index";

/// Call/put side of an option contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Wire label used in topics and the token-resolution API.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "ce",
            OptionType::Put => "pe",
        }
    }

    /// Parse a wire label (`ce`/`pe`, case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ce" => Some(OptionType::Call),
            "pe" => Some(OptionType::Put),
            _ => None,
        }
    }

    /// Both sides, in the order expansion walks them.
    pub const BOTH: [OptionType; 2] = [OptionType::Call, OptionType::Put];
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed topic string.
#[derive(Debug, Clone, PartialEq)]
pub enum Topic {
    /// Spot topic for a tracked index: `{prefix}/{INDEX}`.
    Index { index_name: String },
    /// One option contract leg:
    /// `{prefix}/{INDEX}/{EXPIRY}/{STRIKE}/{ce|pe}`.
    OptionContract {
        index_name: String,
        expiry: String,
        strike: f64,
        option_type: OptionType,
    },
    /// Anything outside the two known namespaces. Still persistable —
    /// the store keys rows by the raw topic string.
    Unknown,
}

impl Topic {
    /// Classify a raw topic string by segment count and shape.
    ///
    /// Malformed strike or option-type segments demote the topic to
    /// `Unknown` rather than failing; a malformed topic must never
    /// interrupt ingestion.
    pub fn parse(raw: &str) -> Topic {
        let parts: Vec<&str> = raw.split('/').collect();
        match parts.as_slice() {
            [_prefix, index_name] if !index_name.is_empty() => Topic::Index {
                index_name: (*index_name).to_string(),
            },
            [_prefix, index_name, expiry, strike, option_type] => {
                match (strike.parse::<f64>(), OptionType::parse(option_type)) {
                    (Ok(strike), Some(option_type)) if strike.is_finite() => {
                        Topic::OptionContract {
                            index_name: (*index_name).to_string(),
                            expiry: (*expiry).to_string(),
                            strike,
                            option_type,
                        }
                    }
                    _ => Topic::Unknown,
                }
            }
            _ => Topic::Unknown,
        }
    }

    /// Format an index topic: `{prefix}/{INDEX}`.
    pub fn index(prefix: &str, index_name: &str) -> String {
        format!("{}/{}", prefix, index_name)
    }

    /// Format an option-contract topic:
    /// `{prefix}/{INDEX}/{EXPIRY}/{STRIKE}/{ce|pe}`.
    pub fn option_contract(
        prefix: &str,
        index_name: &str,
        expiry: &str,
        strike: i64,
        option_type: OptionType,
    ) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            prefix,
            index_name,
            expiry,
            strike,
            option_type.as_str()
        )
    }
}

/// Durable identity attributes of a topic, as stored in the `topics`
/// relation. The store allocates the integer identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMeta {
    /// Raw topic string (unique key).
    pub name: String,
    /// Index this topic belongs to, when known.
    pub index_name: Option<String>,
    /// `index` for spot topics, `ce`/`pe` for option legs.
    pub contract_type: Option<String>,
    /// Strike price for option legs.
    pub strike: Option<f64>,
    /// Expiry date label for option legs.
    pub expiry: Option<String>,
}

impl TopicMeta {
    /// Metadata for a topic outside the known namespaces.
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index_name: None,
            contract_type: None,
            strike: None,
            expiry: None,
        }
    }

    /// Derive metadata from a raw topic string.
    pub fn from_topic(raw: &str) -> Self {
        match Topic::parse(raw) {
            Topic::Index { index_name } => Self {
                name: raw.to_string(),
                index_name: Some(index_name),
                contract_type: Some("index".to_string()),
                strike: None,
                expiry: None,
            },
            Topic::OptionContract {
                index_name,
                expiry,
                strike,
                option_type,
            } => Self {
                name: raw.to_string(),
                index_name: Some(index_name),
                contract_type: Some(option_type.as_str().to_string()),
                strike: Some(strike),
                expiry: Some(expiry),
            },
            Topic::Unknown => Self::bare(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_topic() {
        assert_eq!(
            Topic::parse("index/NIFTY"),
            Topic::Index {
                index_name: "NIFTY".to_string()
            }
        );
    }

    #[test]
    fn test_parse_option_topic() {
        assert_eq!(
            Topic::parse("index/NIFTY/22-05-2025/20000/ce"),
            Topic::OptionContract {
                index_name: "NIFTY".to_string(),
                expiry: "22-05-2025".to_string(),
                strike: 20000.0,
                option_type: OptionType::Call,
            }
        );
    }

    #[test]
    fn test_parse_option_topic_uppercase_side() {
        match Topic::parse("index/BANKNIFTY/29-05-2025/45000/PE") {
            Topic::OptionContract { option_type, .. } => {
                assert_eq!(option_type, OptionType::Put);
            }
            other => panic!("Expected OptionContract, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_strike_is_unknown() {
        assert_eq!(Topic::parse("index/NIFTY/22-05-2025/atm/ce"), Topic::Unknown);
    }

    #[test]
    fn test_parse_bad_side_is_unknown() {
        assert_eq!(
            Topic::parse("index/NIFTY/22-05-2025/20000/xx"),
            Topic::Unknown
        );
    }

    #[test]
    fn test_parse_wrong_segment_count_is_unknown() {
        assert_eq!(Topic::parse("index"), Topic::Unknown);
        assert_eq!(Topic::parse("index/NIFTY/extra"), Topic::Unknown);
        assert_eq!(Topic::parse("a/b/c/d/e/f"), Topic::Unknown);
    }

    #[test]
    fn test_format_roundtrip() {
        let raw = Topic::option_contract("index", "NIFTY", "22-05-2025", 20000, OptionType::Put);
        assert_eq!(raw, "index/NIFTY/22-05-2025/20000/pe");
        match Topic::parse(&raw) {
            Topic::OptionContract {
                index_name,
                strike,
                option_type,
                ..
            } => {
                assert_eq!(index_name, "NIFTY");
                assert_eq!(strike, 20000.0);
                assert_eq!(option_type, OptionType::Put);
            }
            other => panic!("Expected OptionContract, got {:?}", other),
        }
    }

    #[test]
    fn test_meta_from_index_topic() {
        let meta = TopicMeta::from_topic("index/FINNIFTY");
        assert_eq!(meta.index_name.as_deref(), Some("FINNIFTY"));
        assert_eq!(meta.contract_type.as_deref(), Some("index"));
        assert!(meta.strike.is_none());
    }

    #[test]
    fn test_meta_from_option_topic() {
        let meta = TopicMeta::from_topic("index/NIFTY/22-05-2025/19950/pe");
        assert_eq!(meta.contract_type.as_deref(), Some("pe"));
        assert_eq!(meta.strike, Some(19950.0));
        assert_eq!(meta.expiry.as_deref(), Some("22-05-2025"));
    }

    #[test]
    fn test_meta_from_unknown_topic() {
        let meta = TopicMeta::from_topic("weird");
        assert_eq!(meta, TopicMeta::bare("weird"));
    }

    #[test]
    fn test_option_type_labels() {
        assert_eq!(OptionType::Call.as_str(), "ce");
        assert_eq!(OptionType::Put.to_string(), "pe");
        assert_eq!(OptionType::parse("CE"), Some(OptionType::Call));
        assert_eq!(OptionType::parse("nope"), None);
    }
}
