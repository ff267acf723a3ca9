use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::query::Query;
use crate::error::StoreError;

/// PostgREST client for the hosted Supabase project.
///
/// One instance is built at startup and handed to every component that reads
/// or writes rows.
pub struct SupabaseClient {
    client: Client,
    rest_url: Url,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = format!("{}/", base_url.trim().trim_end_matches('/'));
        let rest_url = Url::parse(&base)
            .and_then(|url| url.join("rest/v1/"))
            .map_err(|e| StoreError::Url(format!("{base_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut key_value = HeaderValue::from_str(api_key)
            .map_err(|_| StoreError::Invalid("API key contains invalid header characters".into()))?;
        key_value.set_sensitive(true);
        headers.insert("apikey", key_value);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| StoreError::Invalid("API key contains invalid header characters".into()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, rest_url })
    }

    pub fn table(&self, name: &str) -> Query<'_> {
        Query::new(self, name)
    }

    /// Calls a Postgres function exposed under `/rpc/{function}`.
    pub async fn rpc<P, T>(&self, function: &str, params: &P) -> Result<Vec<T>, StoreError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(&format!("rpc/{function}"))?;
        debug!("POST {}", url);

        let res = self.client.post(url).json(params).send().await?;
        let res = check_status(res).await?;
        let bytes = res.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            table: format!("rpc/{function}"),
            source,
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.rest_url
            .join(path)
            .map_err(|e| StoreError::Url(format!("{path}: {e}")))
    }

    pub fn rest_url(&self) -> &Url {
        &self.rest_url
    }
}

pub(crate) async fn check_status(res: Response) -> Result<Response, StoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_url_is_rooted_at_rest_v1() {
        for base in ["https://acme.supabase.co", "https://acme.supabase.co/", " https://acme.supabase.co// "] {
            let client = SupabaseClient::new(base, "key", Duration::from_secs(5)).unwrap();
            assert_eq!(client.rest_url().as_str(), "https://acme.supabase.co/rest/v1/");
        }
    }

    #[test]
    fn rpc_and_table_paths_join_under_rest_root() {
        let client = SupabaseClient::new("https://acme.supabase.co", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("rpc/match_kb_chunks").unwrap().as_str(),
            "https://acme.supabase.co/rest/v1/rpc/match_kb_chunks"
        );
        assert_eq!(
            client.endpoint("kb_chunks").unwrap().as_str(),
            "https://acme.supabase.co/rest/v1/kb_chunks"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = SupabaseClient::new("not a url", "key", Duration::from_secs(5)).err();
        assert!(matches!(err, Some(StoreError::Url(_))));
    }
}
