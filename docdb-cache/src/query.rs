//! Translates vendor list parameters into cache filters.

use crate::filter::{Condition, Filter};
use amazon_ads::{Api, QueryParams, Resource, key};
use chrono::NaiveDate;
use serde_json::Value;

/// Parameters that switch a request to the vendor path. They are never
/// forwarded to the vendor.
pub const LIVE_DIRECTIVES: &[&str] = &["live", "refresh"];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("`{param}` expects integer ids, got {value:?}")]
    InvalidInteger { param: &'static str, value: String },

    #[error("`{param}` expects a date as YYYYMMDD or YYYY-MM-DD, got {value:?}")]
    InvalidDate { param: &'static str, value: String },

    #[error("`{param}` is out of range, got {value:?}")]
    InvalidPage { param: &'static str, value: String },

    #[error("startDate {start} is after endDate {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

impl From<QueryError> for amazon_ads::AdsError {
    fn from(e: QueryError) -> Self {
        amazon_ads::AdsError::InvalidQuery(e.to_string())
    }
}

enum Rule {
    /// Comma separated ids matched with `$in`.
    Ids,
    /// Comma separated values matched with `$in`.
    List,
    Equal,
    /// Case-insensitive substring match.
    Contains,
    /// Entity state; lower-case on Sponsored Ads, upper-case `status` on DSP.
    State,
}

const PARAMS: &[(&str, &str, Rule)] = &[
    ("campaignIdFilter", "campaignId", Rule::Ids),
    ("adGroupIdFilter", "adGroupId", Rule::Ids),
    ("keywordIdFilter", "keywordId", Rule::Ids),
    ("targetIdFilter", "targetId", Rule::Ids),
    ("adIdFilter", "adId", Rule::Ids),
    ("portfolioIdFilter", "portfolioId", Rule::Ids),
    ("orderIdFilter", "orderId", Rule::Ids),
    ("lineItemIdFilter", "lineItemId", Rule::Ids),
    ("creativeIdFilter", "creativeId", Rule::Ids),
    ("advertiserId", "advertiserId", Rule::Equal),
    ("stateFilter", "state", Rule::State),
    ("name", "name", Rule::Contains),
    ("keywordText", "keywordText", Rule::Contains),
    ("matchTypeFilter", "matchType", Rule::List),
    ("campaignType", "campaignType", Rule::Equal),
    ("targetingType", "targetingType", Rule::Equal),
];

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Reads `startDate` and `endDate` from the query parameters.
    pub fn from_params(params: &QueryParams) -> Result<Self, QueryError> {
        let start = params
            .get("startDate")
            .map(|v| parse_date("startDate", v))
            .transpose()?;
        let end = params
            .get("endDate")
            .map(|v| parse_date("endDate", v))
            .transpose()?;

        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(QueryError::InvertedRange { start, end });
        }

        Ok(DateRange { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Overlap filter: the entity starts no later than the range ends, and
    /// ends no earlier than the range starts or has no end date.
    fn to_filter(self, api: Api) -> Option<Filter> {
        let (start_field, end_field) = match api {
            Api::SponsoredAds => ("startDate", "endDate"),
            Api::Dsp => ("startDateTime", "endDateTime"),
        };
        let render = |date: NaiveDate, end_of_day: bool| match api {
            Api::SponsoredAds => date.format("%Y%m%d").to_string(),
            Api::Dsp if end_of_day => format!("{}T23:59:59Z", date.format("%Y-%m-%d")),
            Api::Dsp => format!("{}T00:00:00Z", date.format("%Y-%m-%d")),
        };

        let mut clauses = Vec::new();
        if let Some(end) = self.end {
            clauses.push(Filter::field(
                start_field,
                Condition::Lte(Value::String(render(end, true))),
            ));
        }
        if let Some(start) = self.start {
            clauses.push(Filter::Or(vec![
                Filter::field(
                    end_field,
                    Condition::Gte(Value::String(render(start, false))),
                ),
                Filter::eq(end_field, Value::Null),
            ]));
        }

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Filter::And(clauses)),
        }
    }
}

pub fn parse_date(param: &'static str, raw: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| QueryError::InvalidDate {
            param,
            value: raw.to_string(),
        })
}

const PAGE_PARAMS: &[&str] = &["startIndex", "count"];
const DATE_PARAMS: &[&str] = &["startDate", "endDate"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    /// Never zero.
    pub limit: Option<u64>,
}

impl Page {
    /// Applies the page to records already held in memory.
    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        items.into_iter().skip(skip).take(limit).collect()
    }
}

#[derive(Debug, PartialEq)]
pub struct RewrittenQuery {
    /// `None` when no recognized filter parameter was present.
    pub filter: Option<Filter>,
    pub page: Page,
}

impl RewrittenQuery {
    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }
}

pub fn is_live(params: &QueryParams) -> bool {
    LIVE_DIRECTIVES
        .iter()
        .any(|d| params.get(*d).is_some_and(|v| v == "true" || v == "1"))
}

/// Copy of `params` without the cache directives.
pub fn vendor_params(params: &QueryParams) -> QueryParams {
    params
        .iter()
        .filter(|(k, _)| !LIVE_DIRECTIVES.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parameters for fetching a whole listing from the vendor: everything the
/// rewriter does not evaluate itself. Filters and paging are applied to the
/// stored listing instead.
pub fn listing_params(params: &QueryParams) -> QueryParams {
    params
        .iter()
        .filter(|(k, _)| {
            let k = k.as_str();
            !LIVE_DIRECTIVES.contains(&k)
                && !PAGE_PARAMS.contains(&k)
                && !DATE_PARAMS.contains(&k)
                && !PARAMS.iter().any(|(param, _, _)| *param == k)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub struct QueryRewriter;

impl QueryRewriter {
    pub fn rewrite(resource: Resource, params: &QueryParams) -> Result<RewrittenQuery, QueryError> {
        let api = resource.api();
        let mut clauses = Vec::new();

        for &(param, field, ref rule) in PARAMS {
            let Some(raw) = params.get(param) else {
                continue;
            };

            let clause = match rule {
                Rule::Ids => {
                    let values = split_list(raw)
                        .map(|id| id_value(param, field, id))
                        .collect::<Result<Vec<_>, _>>()?;
                    Filter::field(field, Condition::In(values))
                }
                Rule::List => Filter::field(
                    field,
                    Condition::In(split_list(raw).map(Value::from).collect()),
                ),
                Rule::Equal => Filter::eq(field, raw.as_str()),
                Rule::Contains => Filter::field(
                    field,
                    Condition::Regex {
                        pattern: regex::escape(raw),
                        case_insensitive: true,
                    },
                ),
                Rule::State => {
                    let (field, values): (&str, Vec<Value>) = match api {
                        Api::SponsoredAds => (
                            "state",
                            split_list(raw).map(|s| s.to_lowercase().into()).collect(),
                        ),
                        Api::Dsp => (
                            "status",
                            split_list(raw).map(|s| s.to_uppercase().into()).collect(),
                        ),
                    };
                    Filter::field(field, Condition::In(values))
                }
            };
            clauses.push(clause);
        }

        if let Some(range) = DateRange::from_params(params)?.to_filter(api) {
            clauses.push(range);
        }

        let page = Page {
            skip: parse_page(params, "startIndex", 0)?.unwrap_or(0),
            limit: parse_page(params, "count", 1)?,
        };

        let filter = match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Filter::And(clauses)),
        };

        Ok(RewrittenQuery { filter, page })
    }
}

fn id_value(param: &'static str, field: &str, raw: &str) -> Result<Value, QueryError> {
    if !key::is_integer_field(field) {
        return Ok(Value::String(raw.to_string()));
    }
    raw.parse::<i64>()
        .map(Value::from)
        .map_err(|_| QueryError::InvalidInteger {
            param,
            value: raw.to_string(),
        })
}

/// Values must lie in `min..=i64::MAX`, the range the database accepts.
fn parse_page(
    params: &QueryParams,
    param: &'static str,
    min: u64,
) -> Result<Option<u64>, QueryError> {
    params
        .get(param)
        .map(|raw| {
            raw.parse::<u64>()
                .ok()
                .filter(|v| (min..=i64::MAX as u64).contains(v))
                .ok_or_else(|| QueryError::InvalidPage {
                    param,
                    value: raw.clone(),
                })
        })
        .transpose()
}
