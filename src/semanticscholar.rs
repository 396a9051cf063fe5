//! Semantic Scholar bulk search client pieces.
//!
//! Builds the bulk search query and decodes its payload. The HTTP call itself
//! goes through [`crate::fetch`] so it gets retries.
//!
//! API Details:
//! - Bulk endpoint: GET /graph/v1/paper/search/bulk
//! - `publicationDateOrYear` accepts `YYYY-MM:YYYY-MM:` ranges
//! - `openAccessPdf` is a bare flag restricting results to open access papers
//! - Rate limit: 1 req/s (unauthenticated), higher with API key

use crate::config::RunConfig;
use crate::error::{OptionExt, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Fields requested for every paper
pub const SEARCH_FIELDS: &str =
    "title,abstract,publicationDate,openAccessPdf,citationCount,referenceCount,externalIds,url,authors";

/// Newest papers first
pub const SEARCH_SORT: &str = "publicationDate:desc";

/// Query parameters for one bulk search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub fields: String,
    pub sort: String,
    pub publication_date_or_year: String,
    pub limit: usize,
    pub open_access_only: bool,
}

impl SearchParams {
    pub fn from_config(config: &RunConfig, today: NaiveDate) -> Self {
        Self {
            query: config.search_keyword.clone(),
            fields: SEARCH_FIELDS.to_string(),
            sort: SEARCH_SORT.to_string(),
            publication_date_or_year: publication_window(today, config.published_past_months),
            limit: config.limit_per_run,
            open_access_only: config.open_access_only,
        }
    }

    /// Percent-encoded query string, `openAccessPdf` appended without a value.
    pub fn query_string(&self) -> String {
        let limit = self.limit.to_string();
        let pairs = [
            ("query", self.query.as_str()),
            ("fields", self.fields.as_str()),
            ("sort", self.sort.as_str()),
            ("publicationDateOrYear", self.publication_date_or_year.as_str()),
            ("limit", limit.as_str()),
        ];

        let mut qs = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        if self.open_access_only {
            qs.push_str("&openAccessPdf");
        }
        qs
    }

    pub fn url(&self, api_url: &str) -> String {
        format!("{}?{}", api_url, self.query_string())
    }
}

/// `YYYY-MM:YYYY-MM:` from `months_back` months before `today` through the
/// current month. The trailing colon leaves the end open. The start never
/// goes before year 0.
pub fn publication_window(today: NaiveDate, months_back: u32) -> String {
    let current = today.year() * 12 + today.month0() as i32;
    let months_back = i32::try_from(months_back).unwrap_or(i32::MAX);
    let start = current.saturating_sub(months_back).max(0);
    let (start_year, start_month) = (start.div_euclid(12), start.rem_euclid(12) + 1);

    format!(
        "{:04}-{:02}:{:04}-{:02}:",
        start_year,
        start_month,
        today.year(),
        today.month()
    )
}

/// Decoded bulk search payload.
///
/// Items stay as raw JSON so one malformed paper cannot fail the whole page.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub total: Option<u64>,
    pub data: Vec<Value>,
}

/// Parse a bulk search body. Fails on invalid JSON or a missing `data` array.
pub fn parse_search_response(body: &str) -> Result<SearchPage> {
    let mut payload: Value = serde_json::from_str(body)?;
    let total = payload.get("total").and_then(Value::as_u64);

    let data = match payload.get_mut("data").map(Value::take) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
    .ok_or_parse("Unexpected response shape (no data array)")?;

    Ok(SearchPage { total, data })
}

/// A paper as returned by the search API. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SSPaper {
    #[serde(rename = "paperId", default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "publicationDate", default)]
    pub publication_date: Option<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(rename = "openAccessPdf", default, deserialize_with = "lenient_open_access_pdf")]
    pub oa_pdf: Option<SSOpenAccessPdf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_authors")]
    pub authors: Vec<SSAuthor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SSOpenAccessPdf {
    pub url: String,
}

/// An author with a usable, non-empty name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SSAuthor {
    pub name: String,
}

/// `openAccessPdf.url` when it is a string; any other shape means no PDF.
fn lenient_open_access_pdf<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SSOpenAccessPdf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .get("url")
        .and_then(Value::as_str)
        .map(|url| SSOpenAccessPdf { url: url.to_string() }))
}

/// Authors with a usable name. A non-array is no authors; entries that are not
/// objects or whose `name` is neither a string nor a number are skipped.
fn lenient_authors<'de, D>(deserializer: D) -> std::result::Result<Vec<SSAuthor>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    Ok(entries
        .iter()
        .filter_map(|entry| match entry.get("name")? {
            Value::String(name) => Some(name.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .map(|name| SSAuthor { name })
        .collect())
}

impl SSPaper {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Open access PDF when it has a non-empty URL, else the canonical URL.
    pub fn link(&self) -> String {
        self.oa_pdf
            .as_ref()
            .map(|p| p.url.as_str())
            .filter(|u| !u.is_empty())
            .or(self.url.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Author names joined with `", "`.
    pub fn author_names(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
