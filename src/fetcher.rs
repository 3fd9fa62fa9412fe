use crate::config::{Endpoint, QueryConfig};
use crate::error::TailError;
use crate::log_entry::LogEntry;
use crate::types::{LogsEnvelope, SortOrder};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One snapshot of the remote log, oldest entry first.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch(&self, query: &QueryConfig) -> Result<Vec<LogEntry>, TailError>;
}

pub struct HttpLogSource {
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl HttpLogSource {
    pub fn new(endpoint: Endpoint) -> Result<Self, TailError> {
        Self::with_timeout(endpoint, REQUEST_TIMEOUT)
    }

    /// Every request, body included, must finish within `timeout`.
    pub fn with_timeout(endpoint: Endpoint, timeout: Duration) -> Result<Self, TailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn fetch(&self, query: &QueryConfig) -> Result<Vec<LogEntry>, TailError> {
        let params = query_params(query);
        debug!("GET {} {:?}", self.endpoint.url, params);

        let mut request = self.client.get(&self.endpoint.url).query(&params);
        if let Some(ref token) = self.endpoint.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TailError::Status(status));
        }

        let body = response.text().await?;
        parse_batch(&body, query)
    }
}

pub fn query_params(query: &QueryConfig) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(5);

    if let Some(ref service) = query.service {
        params.push(("service", service.clone()));
    }
    params.push(("level", query.level_set()));
    params.push(("sort", query.sort_order.to_string()));
    if let Some(ref from) = query.from_time {
        params.push(("from", from.clone()));
    }
    if let Some(ref to) = query.to_time {
        params.push(("to", to.clone()));
    }

    params
}

/// Decode a `{"logs": [...]}` body into entries in ascending time order.
///
/// With `sort=desc` the server lists newest first, so the list is reversed.
pub fn parse_batch(body: &str, query: &QueryConfig) -> Result<Vec<LogEntry>, TailError> {
    let document: Value = serde_json::from_str(body)?;
    let envelope = LogsEnvelope::from_document(document)?;

    let service = query.service.as_deref();
    let entries = envelope
        .logs
        .iter()
        .map(|record| LogEntry::from_record(record, service));

    Ok(match query.sort_order {
        SortOrder::Desc => entries.rev().collect(),
        SortOrder::Asc => entries.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::LevelFilter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer exactly one request with `status` and `body`, returning the raw
    /// request head.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/logs", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });

        (url, handle)
    }

    fn source(url: String, token: Option<&str>) -> HttpLogSource {
        HttpLogSource::new(Endpoint {
            url,
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    const NEWEST_FIRST: &str = r#"{"logs": [
        {"date": "T3", "level": "info", "message": "c"},
        {"date": "T2", "level": "error", "message": "b"},
        {"date": "T1", "level": "info", "message": "a"}
    ]}"#;

    #[tokio::test]
    async fn fetch_sends_filters_and_reverses_newest_first() {
        let (url, server) = serve_once("200 OK", NEWEST_FIRST).await;
        let query = QueryConfig {
            level: LevelFilter::parse("warning").unwrap(),
            service: Some("Views Backend".to_string()),
            from_time: Some("2024-04-01".to_string()),
            ..QueryConfig::default()
        };

        let entries = source(url, Some("s3cret")).fetch(&query).await.unwrap();
        let request = server.await.unwrap();

        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert_eq!(entries[0].service_hint.as_deref(), Some("Views Backend"));

        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /logs?"), "{}", request_line);
        assert!(request_line.contains("service=Views+Backend"));
        assert!(request_line.contains("level=info%2Cwarning"));
        assert!(request_line.contains("sort=desc"));
        assert!(request_line.contains("from=2024-04-01"));
        assert!(!request_line.contains("to="));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer s3cret"));
    }

    #[tokio::test]
    async fn fetch_without_token_omits_authorization() {
        let (url, server) = serve_once("200 OK", r#"{"logs": []}"#).await;

        let entries = source(url, None)
            .fetch(&QueryConfig::default())
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(entries.is_empty());
        assert!(!request.to_ascii_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let (url, server) = serve_once("503 Service Unavailable", "{}").await;

        let err = source(url, None)
            .fetch(&QueryConfig::default())
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            TailError::Status(status) => assert_eq!(status.as_u16(), 503),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let (url, server) = serve_once("200 OK", "<html>oops</html>").await;

        let err = source(url, None)
            .fetch(&QueryConfig::default())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, TailError::MalformedJson(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/logs", listener.local_addr().unwrap());
        drop(listener);

        let err = source(url, None)
            .fetch(&QueryConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TailError::Transport(_)));
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/logs", listener.local_addr().unwrap());

        // Accept the connection and hold it open without replying.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let source = HttpLogSource::with_timeout(
            Endpoint {
                url,
                token: None,
            },
            Duration::from_millis(200),
        )
        .unwrap();
        let err = source.fetch(&QueryConfig::default()).await.unwrap_err();
        server.abort();

        match err {
            TailError::Transport(ref e) => assert!(e.is_timeout(), "{}", e),
            ref other => panic!("unexpected error: {}", other),
        }
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_logs_key_is_protocol_error() {
        let err = parse_batch(r#"{"entries": []}"#, &QueryConfig::default()).unwrap_err();
        assert!(matches!(err, TailError::Protocol(_)));

        let err = parse_batch(r#"{"logs": "nope"}"#, &QueryConfig::default()).unwrap_err();
        assert!(matches!(err, TailError::Protocol(_)));

        let err = parse_batch("[1, 2]", &QueryConfig::default()).unwrap_err();
        assert!(matches!(err, TailError::Protocol(_)));
    }

    #[test]
    fn ascending_batches_keep_server_order() {
        let query = QueryConfig {
            sort_order: SortOrder::Asc,
            ..QueryConfig::default()
        };
        let body = r#"{"logs": [{"date": "T1", "message": "a"}, {"date": "T2", "message": "b"}]}"#;

        let entries = parse_batch(body, &query).unwrap();
        assert_eq!(entries[0].timestamp, "T1");
        assert_eq!(entries[1].timestamp, "T2");
    }

    #[test]
    fn query_params_follow_config() {
        let query = QueryConfig {
            level: LevelFilter::parse("error_only").unwrap(),
            to_time: Some("2024-05-01".to_string()),
            sort_order: SortOrder::Asc,
            ..QueryConfig::default()
        };

        assert_eq!(
            query_params(&query),
            vec![
                ("level", "error".to_string()),
                ("sort", "asc".to_string()),
                ("to", "2024-05-01".to_string()),
            ]
        );
    }
}
