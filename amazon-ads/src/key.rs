//! Entity identifiers.
//!
//! Sponsored Ads identifiers are integers, DSP identifiers are strings, and a
//! handful of resources are keyed by more than one field. An [`EntityKey`]
//! captures all of that and renders to one canonical string used as the
//! cache identity.

use crate::Record;
use crate::resource::Resource;
use serde_json::Value;
use std::fmt;

/// Identifier fields whose values are integers in the Sponsored Ads APIs.
pub const INTEGER_ID_FIELDS: &[&str] = &[
    "campaignId",
    "adGroupId",
    "keywordId",
    "targetId",
    "adId",
    "portfolioId",
];

/// Separator between the parts of a compound identifier in a URL segment.
pub const COMPOUND_SEPARATOR: char = ':';

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum KeyError {
    #[error("record has no `{0}` field")]
    Missing(&'static str),
    #[error("`{field}` must be an integer, got {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("identifier has {actual} part(s), {expected} expected")]
    PartCount { expected: usize, actual: usize },
    #[error("empty identifier for `{0}`")]
    Empty(&'static str),
    #[error("`{field}` cannot be {value:?}")]
    DotSegment { field: &'static str, value: String },
}

pub fn is_integer_field(field: &str) -> bool {
    INTEGER_ID_FIELDS.contains(&field)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Str(String),
}

impl KeyValue {
    /// Parses a raw identifier according to the type of `field`.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, KeyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(KeyError::Empty(field));
        }

        // Would address the collection or its parent on the vendor API.
        if raw == "." || raw == ".." {
            return Err(KeyError::DotSegment {
                field,
                value: raw.to_string(),
            });
        }

        if is_integer_field(field) {
            raw.parse::<i64>()
                .map(KeyValue::Int)
                .map_err(|_| KeyError::InvalidInteger {
                    field,
                    value: raw.to_string(),
                })
        } else {
            Ok(KeyValue::Str(raw.to_string()))
        }
    }

    /// Reads an identifier out of a JSON value. Integers may arrive either as
    /// numbers or as numeric strings.
    pub fn from_json(field: &'static str, value: &Value) -> Result<Self, KeyError> {
        match value {
            Value::Number(n) if is_integer_field(field) => {
                n.as_i64().map(KeyValue::Int).ok_or(KeyError::InvalidInteger {
                    field,
                    value: n.to_string(),
                })
            }
            Value::Number(n) => Ok(KeyValue::Str(n.to_string())),
            Value::String(s) => KeyValue::parse(field, s),
            Value::Null => Err(KeyError::Missing(field)),
            other => Err(KeyError::InvalidInteger {
                field,
                value: other.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Int(i) => Value::from(*i),
            KeyValue::Str(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{i}"),
            KeyValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    parts: Vec<(&'static str, KeyValue)>,
}

impl EntityKey {
    pub fn from_record(resource: Resource, record: &Record) -> Result<Self, KeyError> {
        let parts = resource
            .key_fields()
            .iter()
            .map(|&field| {
                let value = record.get(field).ok_or(KeyError::Missing(field))?;
                Ok((field, KeyValue::from_json(field, value)?))
            })
            .collect::<Result<Vec<_>, KeyError>>()?;

        Ok(EntityKey { parts })
    }

    /// Parses an identifier taken from a URL. Compound identifiers list their
    /// parts in key order, separated by [`COMPOUND_SEPARATOR`].
    pub fn parse(resource: Resource, raw: &str) -> Result<Self, KeyError> {
        let fields = resource.key_fields();
        let raw_parts: Vec<&str> = raw.split(COMPOUND_SEPARATOR).collect();

        if raw_parts.len() != fields.len() {
            return Err(KeyError::PartCount {
                expected: fields.len(),
                actual: raw_parts.len(),
            });
        }

        let parts = fields
            .iter()
            .zip(raw_parts)
            .map(|(&field, raw)| Ok((field, KeyValue::parse(field, raw)?)))
            .collect::<Result<Vec<_>, KeyError>>()?;

        Ok(EntityKey { parts })
    }

    pub fn parts(&self) -> &[(&'static str, KeyValue)] {
        &self.parts
    }

    /// Rewrites the key fields of `record` to their canonical JSON types.
    pub fn normalize(&self, record: &mut Record) {
        for (field, value) in &self.parts {
            record.insert((*field).to_string(), value.to_json());
        }
    }

    /// Path segments used to address the entity on the vendor API.
    pub fn path_segments(&self) -> impl Iterator<Item = String> + '_ {
        self.parts.iter().map(|(_, value)| value.to_string())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_integer_key_from_number_or_string() {
        let from_number =
            EntityKey::from_record(Resource::SpCampaigns, &record(json!({"campaignId": 123})))
                .unwrap();
        let from_string =
            EntityKey::from_record(Resource::SpCampaigns, &record(json!({"campaignId": "123"})))
                .unwrap();

        assert_eq!(from_number, from_string);
        assert_eq!(from_number.to_string(), "campaignId=123");
    }

    #[test]
    fn test_string_key_keeps_type() {
        let key = EntityKey::from_record(Resource::DspOrders, &record(json!({"orderId": "0042"})))
            .unwrap();
        assert_eq!(key.parts(), &[("orderId", KeyValue::Str("0042".into()))]);
    }

    #[test]
    fn test_missing_and_invalid() {
        assert_eq!(
            EntityKey::from_record(Resource::SpKeywords, &record(json!({"name": "x"}))),
            Err(KeyError::Missing("keywordId"))
        );
        assert_eq!(
            EntityKey::parse(Resource::SpKeywords, "abc"),
            Err(KeyError::InvalidInteger {
                field: "keywordId",
                value: "abc".into()
            })
        );
        assert_eq!(
            EntityKey::parse(Resource::SpKeywords, " "),
            Err(KeyError::Empty("keywordId"))
        );
        assert_eq!(
            EntityKey::parse(Resource::DspOrders, ".."),
            Err(KeyError::DotSegment {
                field: "orderId",
                value: "..".into()
            })
        );
    }

    #[test]
    fn test_compound_key() {
        let key = EntityKey::parse(Resource::DspLineItemCreatives, "li-1:cr-9").unwrap();
        assert_eq!(key.to_string(), "lineItemId=li-1;creativeId=cr-9");
        assert_eq!(key.path_segments().collect::<Vec<_>>(), vec!["li-1", "cr-9"]);

        assert_eq!(
            EntityKey::parse(Resource::DspLineItemCreatives, "li-1"),
            Err(KeyError::PartCount {
                expected: 2,
                actual: 1
            })
        );

        let from_record = EntityKey::from_record(
            Resource::DspLineItemCreatives,
            &record(json!({"lineItemId": "li-1", "creativeId": "cr-9", "weight": 3})),
        )
        .unwrap();
        assert_eq!(key, from_record);
    }

    #[test]
    fn test_normalize_rewrites_key_types() {
        let mut rec = record(json!({"campaignId": "77", "name": "Summer"}));
        let key = EntityKey::from_record(Resource::SpCampaigns, &rec).unwrap();
        key.normalize(&mut rec);
        assert_eq!(rec["campaignId"], json!(77));
        assert_eq!(rec["name"], json!("Summer"));
    }
}
