//! Row filters and terminal operations for one PostgREST table.

use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::rest::{SupabaseClient, check_status};
use crate::error::StoreError;

static CONTENT_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+-\d+|\*)/(\d+|\*)\s*$").expect("valid regex"));

pub struct Query<'a> {
    client: &'a SupabaseClient,
    table: String,
    select: String,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(client: &'a SupabaseClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            select: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = columns.split(',').map(str::trim).collect::<Vec<_>>().join(",");
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("{op}.{value}")));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(column, "not.is", "null")
    }

    /// `column IN (values)`. Values are double-quoted so commas and
    /// parentheses inside them survive.
    pub fn in_<S: AsRef<str>>(self, column: &str, values: &[S]) -> Self {
        let list = values
            .iter()
            .map(|v| format!("\"{}\"", v.as_ref().replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({list})"))
    }

    pub fn order(mut self, column: &str, desc: bool) -> Self {
        let dir = if desc { "desc" } else { "asc" };
        self.order.push(format!("{column}.{dir}"));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Inclusive row range, `from..=to`.
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.offset = Some(from);
        self.limit = Some(to.saturating_sub(from) + 1);
        self
    }

    pub fn url(&self) -> Result<Url, StoreError> {
        let mut url = self.client.endpoint(&self.table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &self.select);
            for (column, filter) in &self.filters {
                pairs.append_pair(column, filter);
            }
            if !self.order.is_empty() {
                pairs.append_pair("order", &self.order.join(","));
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = self.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        Ok(url)
    }

    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        let url = self.url()?;
        debug!("GET {}", url);

        let res = self.client.http().get(url).send().await?;
        let res = check_status(res).await?;
        let bytes = res.bytes().await?;
        self.decode(&bytes)
    }

    /// Exact number of rows matching the filters, without fetching them.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let url = self.url()?;
        debug!("HEAD {} (count=exact)", url);

        let res = self
            .client
            .http()
            .head(url)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let res = check_status(res).await?;

        res.headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| StoreError::MissingCount(self.table.clone()))
    }

    /// Reads every matching row, `page_size` rows per request, stopping at the
    /// first short page.
    pub async fn fetch_all<T: DeserializeOwned>(mut self, page_size: usize) -> Result<Vec<T>, StoreError> {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            self = self.range(offset, offset + page_size - 1);
            let page: Vec<T> = self.execute().await?;
            let fetched = page.len();
            rows.extend(page);

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }

        debug!("Fetched {} rows from {}", rows.len(), self.table);
        Ok(rows)
    }

    pub async fn insert<R, T>(&self, rows: &R) -> Result<Vec<T>, StoreError>
    where
        R: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url()?;
        debug!("POST {}", url);

        let res = self
            .client
            .http()
            .post(url)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let res = check_status(res).await?;
        let bytes = res.bytes().await?;
        self.decode(&bytes)
    }

    pub async fn update<P: Serialize + ?Sized>(&self, patch: &P) -> Result<(), StoreError> {
        self.require_filter("update")?;
        let url = self.url()?;
        debug!("PATCH {}", url);

        let res = self
            .client
            .http()
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), StoreError> {
        self.require_filter("delete")?;
        let url = self.url()?;
        debug!("DELETE {}", url);

        let res = self.client.http().delete(url).send().await?;
        check_status(res).await?;
        Ok(())
    }

    fn require_filter(&self, op: &str) -> Result<(), StoreError> {
        if self.filters.is_empty() {
            return Err(StoreError::Invalid(format!(
                "refusing to {op} every row of {}",
                self.table
            )));
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Vec<T>, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
            table: self.table.clone(),
            source,
        })
    }
}

/// Total from a `Content-Range` header such as `0-24/573` or `*/0`.
pub fn parse_content_range(header: &str) -> Option<u64> {
    let caps = CONTENT_RANGE.captures(header)?;
    caps.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubServer;
    use std::time::Duration;

    fn client() -> SupabaseClient {
        SupabaseClient::new("https://acme.supabase.co", "key", Duration::from_secs(5)).unwrap()
    }

    fn pairs(query: &Query<'_>) -> Vec<(String, String)> {
        query
            .url()
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn builds_filters_order_and_limit() {
        let client = client();
        let query = client
            .table("leads")
            .select("email, lead_score, last_seen")
            .gte("lead_score", 150)
            .not_null("email")
            .neq("email", "")
            .order("lead_score", true)
            .limit(200);

        assert_eq!(
            pairs(&query),
            vec![
                ("select".into(), "email,lead_score,last_seen".into()),
                ("lead_score".into(), "gte.150".into()),
                ("email".into(), "not.is.null".into()),
                ("email".into(), "neq.".into()),
                ("order".into(), "lead_score.desc".into()),
                ("limit".into(), "200".into()),
            ]
        );
        assert_eq!(query.url().unwrap().path(), "/rest/v1/leads");
    }

    #[test]
    fn range_is_inclusive() {
        let client = client();
        let query = client.table("leads").range(250, 499);
        let p = pairs(&query);
        assert!(p.contains(&("limit".into(), "250".into())));
        assert!(p.contains(&("offset".into(), "250".into())));
    }

    #[test]
    fn in_filter_quotes_values() {
        let client = client();
        let query = client.table("events").in_("email", &["a@x.com", "odd,\"name\""]);
        let p = pairs(&query);
        assert_eq!(p[1], ("email".into(), r#"in.("a@x.com","odd,\"name\"")"#.into()));
    }

    #[test]
    fn parses_content_range_totals() {
        assert_eq!(parse_content_range("0-24/573"), Some(573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[tokio::test]
    async fn unfiltered_delete_is_refused() {
        let client = client();
        let err = client.table("kb_documents").delete().await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn fetch_all_pages_until_a_short_page() {
        let server = StubServer::start(|req| {
            let rows = if req.target.ends_with("offset=0") {
                r#"[{"n":1},{"n":2}]"#
            } else if req.target.ends_with("offset=2") {
                r#"[{"n":3},{"n":4}]"#
            } else if req.target.ends_with("offset=4") {
                r#"[{"n":5}]"#
            } else {
                r#"[{"n":99}]"#
            };
            (200, rows.to_string())
        })
        .await;
        let client = server.client();

        let rows: Vec<serde_json::Value> = client.table("leads").order("anonymous_id", false).fetch_all(2).await.unwrap();
        let numbers: Vec<i64> = rows.iter().filter_map(|r| r["n"].as_i64()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

        let targets: Vec<String> = server.requests().into_iter().map(|r| r.target).collect();
        assert_eq!(targets.len(), 3);
        for (target, offset) in targets.iter().zip([0, 2, 4]) {
            assert!(target.contains("limit=2"), "{target}");
            assert!(target.ends_with(&format!("offset={offset}")), "{target}");
        }
    }

    #[tokio::test]
    async fn fetch_all_stops_on_empty_first_page() {
        let server = StubServer::start(|_| (200, "[]".to_string())).await;
        let client = server.client();

        let rows: Vec<serde_json::Value> = client.table("leads").fetch_all(250).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(server.requests().len(), 1);
    }
}
