//! HTTP transport for both backends.
//!
//! One [`HttpClient`] serves REST `GET`s and GraphQL `POST`s against the same
//! host with the same credentials. Successful response bodies are kept in a
//! short-lived [`moka`] cache keyed by the full request, which is the only
//! caching anywhere in the stack.

use super::{KeyedFetch, Operation, StructuredQuery};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Finds a token when none was configured: asks the `gh` CLI.
///
/// Environment variables are already folded into `config` by
/// [`RemoteConfig::apply_env`].
pub async fn resolve_token(config: &RemoteConfig) -> RemoteResult<String> {
    if let Some(token) = config.token.as_ref().filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }

    debug!("no token configured, asking the gh CLI");
    let output = tokio::process::Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .map_err(|e| RemoteError::Auth(format!("no token configured and `gh` is unavailable: {e}")))?;

    if !output.status.success() {
        return Err(RemoteError::Auth(format!(
            "no token configured and `gh auth token` failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(RemoteError::Auth(
            "no token configured and `gh auth token` printed nothing".to_string(),
        ));
    }
    Ok(token)
}

/// reqwest-backed [`KeyedFetch`] and [`StructuredQuery`].
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    api_url: Url,
    graphql_url: Url,
    cache: Option<Cache<String, Value>>,
}

impl HttpClient {
    /// Builds a client that authenticates every request with `token`.
    pub fn new(config: &RemoteConfig, token: &str) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RemoteError::Auth("token contains invalid header characters".to_string()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()?;

        let cache = (!config.cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(config.cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            graphql_url: config.graphql_url.clone(),
            cache,
        })
    }

    async fn cached(&self, key: &str) -> Option<Value> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(key).await;
        if hit.is_some() {
            trace!(key, "response cache hit");
        }
        hit
    }

    async fn remember(&self, key: String, value: &Value) {
        if let Some(cache) = &self.cache {
            cache.insert(key, value.clone()).await;
        }
    }
}

impl KeyedFetch for HttpClient {
    async fn get(&self, resource_path: &str, params: &[(&str, String)]) -> RemoteResult<Value> {
        let url = rest_url(&self.api_url, resource_path, params)?;
        let key = url.to_string();
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        debug!(url = %url, "GET");
        let response = check_status(self.client.get(url).send().await?).await?;
        let value: Value = response.json().await?;
        self.remember(key, &value).await;
        Ok(value)
    }
}

impl StructuredQuery for HttpClient {
    async fn query(&self, operation: &Operation, variables: Value) -> RemoteResult<Value> {
        let key = format!("graphql:{}:{variables}", operation.name);
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        debug!(operation = operation.name, %variables, "POST graphql");
        let body = json!({
            "query": operation.document,
            "operationName": operation.name,
            "variables": variables,
        });
        let response = self
            .client
            .post(self.graphql_url.clone())
            .json(&body)
            .send()
            .await?;
        let envelope: Value = check_status(response).await?.json().await?;
        let data = graphql_data(envelope)?;
        self.remember(key, &data).await;
        Ok(data)
    }
}

/// Appends `resource_path` segment by segment to `base`, escaping each one.
fn rest_url(base: &Url, resource_path: &str, params: &[(&str, String)]) -> RemoteResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RemoteError::Malformed(format!("API URL {base} cannot be a base")))?
        .pop_if_empty()
        .extend(resource_path.split('/').filter(|s| !s.is_empty()));
    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &headers, &body))
}

/// Maps a failed response to a [`RemoteError`].
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> RemoteError {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let exhausted = header(RATE_LIMIT_REMAINING).is_some_and(|v| v.trim() == "0");

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN
            if exhausted || status == StatusCode::TOO_MANY_REQUESTS =>
        {
            let reset = header(RATE_LIMIT_RESET)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
            warn!(?reset, "rate limit exhausted");
            RemoteError::RateLimited { reset }
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        _ => RemoteError::Http {
            status: status.as_u16(),
            message: error_message(body),
        },
    }
}

/// The `message` member of a JSON error body, or the raw body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.trim().to_string(), |e| e.message)
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorJson {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Extracts `data` from a GraphQL response envelope.
fn graphql_data(mut envelope: Value) -> RemoteResult<Value> {
    if let Some(errors) = envelope.get("errors").filter(|e| !e.is_null()) {
        let errors: Vec<GraphQlErrorJson> = serde_json::from_value(errors.clone())?;
        if errors.iter().any(|e| e.kind.as_deref() == Some("NOT_FOUND")) {
            return Err(RemoteError::NotFound);
        }
        if !errors.is_empty() {
            return Err(RemoteError::GraphQl(
                errors.into_iter().map(|e| e.message).collect(),
            ));
        }
    }
    match envelope.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(RemoteError::Malformed("GraphQL response has no data".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api() -> Url {
        Url::parse("https://api.github.com/").unwrap()
    }

    #[test]
    fn test_rest_url_escapes_segments() {
        let url = rest_url(
            &api(),
            "repos/bob/repo1/contents/dir with space/a#b.md",
            &[("ref", "main".to_string())],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/bob/repo1/contents/dir%20with%20space/a%23b.md?ref=main"
        );
    }

    #[test]
    fn test_rest_url_under_enterprise_prefix() {
        let base = Url::parse("https://ghe.example.com/api/v3/").unwrap();
        let url = rest_url(&base, "users/alice", &[]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/users/alice");
    }

    #[test]
    fn test_status_mapping() {
        let empty = HeaderMap::new();
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, &empty, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, &empty, ""),
            RemoteError::NotFound
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, &empty, ""),
            RemoteError::RateLimited { reset: None }
        ));

        // A 403 without an exhausted limit is a plain permission failure.
        let err = status_error(
            StatusCode::FORBIDDEN,
            &empty,
            r#"{"message": "Resource not accessible by integration"}"#,
        );
        assert!(
            matches!(err, RemoteError::Http { status: 403, ref message } if message == "Resource not accessible by integration")
        );
    }

    #[test]
    fn test_rate_limit_reset_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        headers.insert(RATE_LIMIT_RESET, HeaderValue::from_static("1700000000"));

        let RemoteError::RateLimited { reset } = status_error(StatusCode::FORBIDDEN, &headers, "")
        else {
            panic!("expected rate limit");
        };
        assert_eq!(reset.map(|r| r.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_graphql_envelope() {
        assert_eq!(
            graphql_data(json!({"data": {"viewer": {"login": "alice"}}})).unwrap(),
            json!({"viewer": {"login": "alice"}})
        );

        let not_found = json!({
            "data": {"repository": null},
            "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to a Repository"}]
        });
        assert!(matches!(graphql_data(not_found), Err(RemoteError::NotFound)));

        let failed = json!({"errors": [{"message": "a"}, {"message": "b"}]});
        assert!(matches!(graphql_data(failed), Err(RemoteError::GraphQl(m)) if m == ["a", "b"]));

        assert!(matches!(
            graphql_data(json!({"data": null})),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn test_cache_disabled_with_zero_ttl() {
        let config = RemoteConfig {
            cache_ttl: Duration::ZERO,
            ..RemoteConfig::default()
        };
        let client = HttpClient::new(&config, "t").unwrap();
        assert!(client.cache.is_none());

        let client = HttpClient::new(&RemoteConfig::default(), "t").unwrap();
        assert!(client.cache.is_some());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = HttpClient::new(&RemoteConfig::default(), "bad\ntoken");
        assert!(matches!(result, Err(RemoteError::Auth(_))));
    }

    #[tokio::test]
    async fn test_configured_token_wins() {
        let config = RemoteConfig {
            token: Some("  abc  ".to_string()),
            ..RemoteConfig::default()
        };
        assert_eq!(resolve_token(&config).await.unwrap(), "abc");
    }
}
