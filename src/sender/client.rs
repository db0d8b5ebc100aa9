use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ClientError {
    fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::RequestTimeout(err.to_string())
        } else if err.is_connect() {
            ClientError::ConnectionFailed(err.to_string())
        } else {
            ClientError::NetworkError(err)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the ClickHouse HTTP interface.
    pub api_host: String,
    /// Target table.
    pub dataset: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub user_agent: String,
    pub compress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: "http://localhost:8123/".to_string(),
            dataset: "logs".to_string(),
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            max_connections: 10,
            user_agent: format!("clicktail/{}", env!("CARGO_PKG_VERSION")),
            compress: false,
        }
    }
}

/// Status and body of an insert request that reached the server.
#[derive(Debug, Clone)]
pub struct InsertResponse {
    pub status: StatusCode,
    pub body: String,
}

/// ClickHouse HTTP interface client.
#[derive(Debug, Clone)]
pub struct ClickHouseClient {
    client: Client,
    config: ClientConfig,
    base_url: Url,
    insert_url: Url,
}

impl ClickHouseClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut base_url: Url = config
            .api_host
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid api_host URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut insert_url = base_url.clone();
        insert_url.query_pairs_mut().append_pair(
            "query",
            &format!("INSERT INTO {} FORMAT JSONEachRow", config.dataset),
        );

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            base_url,
            insert_url,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn insert_url(&self) -> &Url {
        &self.insert_url
    }

    /// `GET /ping`; the backend must answer with a success status.
    pub async fn verify(&self) -> Result<(), ClientError> {
        let ping_url = self
            .base_url
            .join("ping")
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid ping URL: {e}")))?;

        let response = self
            .client
            .get(ping_url)
            .send()
            .await
            .map_err(ClientError::from_send)?;

        if response.status().is_success() {
            tracing::debug!(api_host = %self.base_url, "ClickHouse reachable");
            Ok(())
        } else {
            Err(ClientError::HttpError {
                status: response.status().as_u16(),
                message: format!("Ping failed: {}", response.status()),
            })
        }
    }

    /// POST one `JSONEachRow` body. Any HTTP status is returned as a
    /// response; only transport failures are errors.
    pub async fn insert(&self, body: Vec<u8>, compressed: bool) -> Result<InsertResponse, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
        if compressed {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let response = self
            .client
            .post(self.insert_url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(ClientError::from_send)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(InsertResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_url_carries_query() {
        let client = ClickHouseClient::new(ClientConfig {
            api_host: "http://ch.internal:8123/".to_string(),
            dataset: "web.access".to_string(),
            ..Default::default()
        })
        .unwrap();

        let pairs: Vec<(String, String)> = client
            .insert_url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![(
                "query".to_string(),
                "INSERT INTO web.access FORMAT JSONEachRow".to_string()
            )]
        );
    }

    #[test]
    fn test_invalid_api_host() {
        let err = ClickHouseClient::new(ClientConfig {
            api_host: "not a url".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfiguration(_)));
    }
}
