//! Transports that execute a batch of statements against the remote store.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::SyncConfig;
use crate::error::RemoteError;
use crate::remote::wire::{
    PipelineRequest, PipelineResponse, ResultSet, Statement, StreamResponse, StreamResult,
};

const PIPELINE_PATH: &str = "/v2/pipeline";
const MAX_LOG_BODY_CHARS: usize = 500;

/// Executes statements in order within one request and returns one
/// [`ResultSet`] per statement.
///
/// Any rejected statement fails the whole call.
#[async_trait]
pub trait PipelineTransport: Send + Sync {
    async fn execute(&self, statements: Vec<Statement>) -> Result<Vec<ResultSet>, RemoteError>;
}

/// Pipeline transport over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, RemoteError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| RemoteError::unavailable("no sync endpoint configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: pipeline_url(endpoint),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> Result<HeaderMap, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.auth_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RemoteError::unavailable("Invalid auth token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }
}

/// Accepts either the database base URL or the full pipeline URL.
pub(crate) fn pipeline_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with(PIPELINE_PATH) {
        base.to_string()
    } else {
        format!("{base}{PIPELINE_PATH}")
    }
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}

/// Pairs every execute request with its result, skipping the trailing close.
pub(crate) fn collect_results(
    response: PipelineResponse,
    expected: usize,
) -> Result<Vec<ResultSet>, RemoteError> {
    let mut sets = Vec::with_capacity(expected);
    for result in response.results {
        match result {
            StreamResult::Ok {
                response: StreamResponse::Execute { result },
            } => sets.push(ResultSet::try_from(result)?),
            StreamResult::Ok {
                response: StreamResponse::Close,
            } => {}
            StreamResult::Error { error } => return Err(RemoteError::statement(error.message)),
        }
    }
    if sets.len() != expected {
        return Err(RemoteError::statement(format!(
            "expected {expected} results, got {}",
            sets.len()
        )));
    }
    Ok(sets)
}

#[async_trait]
impl PipelineTransport for HttpTransport {
    async fn execute(&self, statements: Vec<Statement>) -> Result<Vec<ResultSet>, RemoteError> {
        let request = PipelineRequest::execute_and_close(&statements);
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!("Pipeline error ({status}): {}", preview(&body));
            return Err(RemoteError::api(status.as_u16(), preview(&body)));
        }

        let parsed: PipelineResponse = serde_json::from_str(&body)?;
        collect_results(parsed, statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pipeline_url_is_appended_once() {
        assert_eq!(
            pipeline_url("https://db.example.io/"),
            "https://db.example.io/v2/pipeline"
        );
        assert_eq!(
            pipeline_url("https://db.example.io/v2/pipeline"),
            "https://db.example.io/v2/pipeline"
        );
    }

    #[test]
    fn transport_requires_an_endpoint() {
        let err = HttpTransport::new(&SyncConfig::default()).unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[test]
    fn statement_error_fails_the_batch() {
        let body: PipelineResponse = serde_json::from_value(json!({"results": [
            {"type": "ok", "response": {"type": "execute", "result": {"cols": [], "rows": []}}},
            {"type": "error", "error": {"message": "constraint failed"}},
            {"type": "ok", "response": {"type": "close"}}
        ]}))
        .unwrap();
        let err = collect_results(body, 2).unwrap_err();
        assert!(err.to_string().contains("constraint failed"));
    }

    mod over_http {
        use super::*;
        use crate::mock_http::{refused_url, MockReply, MockServer};

        const ONE_ROW: &str = r#"{"results":[
            {"type":"ok","response":{"type":"execute","result":{"cols":[{"name":"n"}],"rows":[[{"type":"integer","value":"3"}]]}}},
            {"type":"ok","response":{"type":"close"}}]}"#;

        fn transport(endpoint: &str) -> HttpTransport {
            HttpTransport::new(&SyncConfig {
                endpoint: Some(endpoint.to_string()),
                auth_token: Some("secret-token".into()),
                request_timeout_secs: 1,
                ..SyncConfig::default()
            })
            .unwrap()
        }

        #[tokio::test]
        async fn posts_the_pipeline_with_bearer_auth() {
            let server = MockServer::start(vec![MockReply::json(200, ONE_ROW)]).await;
            let sets = transport(&server.base_url)
                .execute(vec![Statement::new("SELECT 3 AS n")])
                .await
                .unwrap();
            assert_eq!(sets[0].rows[0].get_i64("n"), Some(3));

            let captured = server.captured();
            assert_eq!(captured.len(), 1);
            assert_eq!(captured[0].request_line, "POST /v2/pipeline HTTP/1.1");
            assert_eq!(
                captured[0].headers.get("authorization").map(String::as_str),
                Some("Bearer secret-token")
            );
            let body: serde_json::Value = serde_json::from_str(&captured[0].body).unwrap();
            assert_eq!(body["requests"][0]["type"], "execute");
            assert_eq!(body["requests"][0]["stmt"]["sql"], "SELECT 3 AS n");
            assert_eq!(body["requests"][1]["type"], "close");
        }

        #[tokio::test]
        async fn error_status_maps_to_api_error_with_a_short_preview() {
            let long_body = "x".repeat(MAX_LOG_BODY_CHARS * 4);
            let server = MockServer::start(vec![MockReply::json(500, long_body)]).await;
            let err = transport(&server.base_url)
                .execute(vec![Statement::new("SELECT 1")])
                .await
                .unwrap_err();

            assert_eq!(err.status_code(), Some(500));
            let RemoteError::Api { message, .. } = err else {
                panic!("expected an API error");
            };
            assert_eq!(message.chars().count(), MAX_LOG_BODY_CHARS + 3);
            assert!(message.ends_with("..."));
        }

        #[tokio::test]
        async fn refused_connection_is_an_http_error() {
            let err = transport(&refused_url().await)
                .execute(vec![Statement::new("SELECT 1")])
                .await
                .unwrap_err();
            assert!(matches!(err, RemoteError::Http(_)));
            assert_eq!(err.status_code(), None);
        }

        #[tokio::test]
        async fn slow_endpoint_times_out() {
            let server = MockServer::start(vec![MockReply::json(200, ONE_ROW).delayed(2_500)]).await;
            let err = transport(&server.base_url)
                .execute(vec![Statement::new("SELECT 3 AS n")])
                .await
                .unwrap_err();
            match err {
                RemoteError::Http(e) => assert!(e.is_timeout()),
                other => panic!("expected a timeout, got {other}"),
            }
        }
    }

    #[test]
    fn close_result_is_skipped() {
        let body: PipelineResponse = serde_json::from_value(json!({"results": [
            {"type": "ok", "response": {"type": "execute", "result": {"cols": [{"name": "n"}], "rows": [[{"type": "integer", "value": "3"}]]}}},
            {"type": "ok", "response": {"type": "close"}}
        ]}))
        .unwrap();
        let sets = collect_results(body, 1).unwrap();
        assert_eq!(sets[0].rows[0].get_i64("n"), Some(3));
    }
}
