//! Typed document filters.
//!
//! A [`Filter`] is built once by the query rewriter and then either rendered
//! to a MongoDB filter document or evaluated directly against records by the
//! in-memory store. Both paths must agree, so comparisons follow MongoDB's
//! rules for the value types the cache stores: numbers compare numerically,
//! strings lexically, and a missing field only satisfies `Exists(false)` or
//! equality with `null`.

use amazon_ads::Record;
use mongodb::bson::{self, Bson, Document, doc};
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
    Regex {
        pattern: String,
        case_insensitive: bool,
    },
    Gte(Value),
    Lte(Value),
    Exists(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field(String, Condition),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn field(name: impl Into<String>, condition: Condition) -> Self {
        Filter::Field(name.into(), condition)
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field(name, Condition::Eq(value.into()))
    }

    /// Combines two filters, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    pub fn to_document(&self) -> Result<Document, bson::ser::Error> {
        match self {
            Filter::Field(name, condition) => {
                let mut document = Document::new();
                document.insert(name.clone(), condition_to_bson(condition)?);
                Ok(document)
            }
            Filter::And(filters) => Ok(doc! { "$and": filters_to_bson(filters)? }),
            Filter::Or(filters) => Ok(doc! { "$or": filters_to_bson(filters)? }),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Field(name, condition) => condition_matches(condition, record.get(name)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

fn filters_to_bson(filters: &[Filter]) -> Result<Vec<Bson>, bson::ser::Error> {
    filters
        .iter()
        .map(|f| f.to_document().map(Bson::Document))
        .collect()
}

fn condition_to_bson(condition: &Condition) -> Result<Bson, bson::ser::Error> {
    Ok(match condition {
        Condition::Eq(value) => bson::to_bson(value)?,
        Condition::In(values) => Bson::Document(doc! { "$in": bson::to_bson(values)? }),
        Condition::Regex {
            pattern,
            case_insensitive,
        } => {
            let options = if *case_insensitive { "i" } else { "" };
            Bson::Document(doc! { "$regex": pattern.as_str(), "$options": options })
        }
        Condition::Gte(value) => Bson::Document(doc! { "$gte": bson::to_bson(value)? }),
        Condition::Lte(value) => Bson::Document(doc! { "$lte": bson::to_bson(value)? }),
        Condition::Exists(exists) => Bson::Document(doc! { "$exists": *exists }),
    })
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn equals(field: &Value, expected: &Value) -> bool {
    // Querying a scalar against an array field matches any element.
    if let Value::Array(items) = field
        && !expected.is_array()
    {
        return items.iter().any(|item| equals(item, expected));
    }
    compare(field, expected) == Some(Ordering::Equal) || field == expected
}

fn condition_matches(condition: &Condition, field: Option<&Value>) -> bool {
    let Some(value) = field else {
        return matches!(
            condition,
            Condition::Exists(false) | Condition::Eq(Value::Null)
        ) || matches!(condition, Condition::In(values) if values.contains(&Value::Null));
    };

    match condition {
        Condition::Eq(expected) => equals(value, expected),
        Condition::In(candidates) => candidates.iter().any(|c| equals(value, c)),
        Condition::Regex {
            pattern,
            case_insensitive,
        } => {
            let Value::String(text) = value else {
                return false;
            };
            RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map(|re| re.is_match(text))
                .unwrap_or(false)
        }
        Condition::Gte(bound) => matches!(
            compare(value, bound),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Condition::Lte(bound) => matches!(
            compare(value, bound),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Condition::Exists(exists) => *exists,
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
    fn test_to_document() {
        let filter = Filter::eq("_path", "sp/campaigns")
            .and(Filter::field(
                "campaignId",
                Condition::In(vec![json!(1), json!(2)]),
            ))
            .and(Filter::Or(vec![
                Filter::field("endDate", Condition::Gte(json!("20240101"))),
                Filter::eq("endDate", Value::Null),
            ]))
            .and(Filter::field(
                "name",
                Condition::Regex {
                    pattern: "shoe".into(),
                    case_insensitive: true,
                },
            ));

        assert_eq!(
            filter.to_document().unwrap(),
            doc! {
                "$and": [
                    { "_path": "sp/campaigns" },
                    { "campaignId": { "$in": [1_i64, 2_i64] } },
                    { "$or": [
                        { "endDate": { "$gte": "20240101" } },
                        { "endDate": Bson::Null },
                    ] },
                    { "name": { "$regex": "shoe", "$options": "i" } },
                ]
            }
        );
    }

    #[test]
    fn test_matches_numbers_and_strings() {
        let campaign = record(json!({
            "campaignId": 42,
            "name": "Summer Shoes",
            "startDate": "20240301",
            "budget": 12.5,
        }));

        assert!(Filter::eq("campaignId", 42).matches(&campaign));
        assert!(Filter::eq("campaignId", 42.0).matches(&campaign));
        assert!(!Filter::eq("campaignId", "42").matches(&campaign));
        assert!(
            Filter::field("budget", Condition::Gte(json!(10))).matches(&campaign)
        );
        assert!(
            Filter::field("startDate", Condition::Lte(json!("20240301"))).matches(&campaign)
        );
        assert!(
            !Filter::field("startDate", Condition::Lte(json!("20240228"))).matches(&campaign)
        );
        assert!(
            Filter::field(
                "name",
                Condition::Regex {
                    pattern: "shoe".into(),
                    case_insensitive: true
                }
            )
            .matches(&campaign)
        );
    }

    #[test]
    fn test_missing_fields() {
        let campaign = record(json!({"campaignId": 1, "endDate": null}));

        assert!(Filter::eq("endDate", Value::Null).matches(&campaign));
        assert!(Filter::eq("portfolioId", Value::Null).matches(&campaign));
        assert!(Filter::field("portfolioId", Condition::Exists(false)).matches(&campaign));
        assert!(!Filter::field("portfolioId", Condition::Gte(json!(0))).matches(&campaign));
        assert!(
            !Filter::field("portfolioId", Condition::In(vec![json!(1)])).matches(&campaign)
        );
    }

    #[test]
    fn test_and_or() {
        let campaign = record(json!({"state": "enabled", "campaignId": 3}));
        let filter = Filter::Or(vec![
            Filter::eq("state", "paused"),
            Filter::eq("campaignId", 3),
        ])
        .and(Filter::eq("state", "enabled"));

        assert!(filter.matches(&campaign));
        assert!(!Filter::And(vec![Filter::eq("state", "paused")]).matches(&campaign));
    }
}
