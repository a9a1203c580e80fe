//! Query execution over HTTP
//!
//! The provider talks to its endpoint through the [`SparqlExecutor`] trait,
//! so transports are injectable: tests use in-memory executors, production
//! uses [`HttpExecutor`].
//!
//! Graph-shaped (CONSTRUCT) results arrive as serialized RDF; turning that
//! text into triples is the job of a pluggable [`GraphParser`] — this layer
//! does not parse RDF serializations itself.

use crate::response::{SelectResponse, Triple};
use async_trait::async_trait;
use ontogram_core::{DataError, Result};
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How the query string travels to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMethod {
    /// URL-encoded `query=` GET parameter
    #[default]
    Get,
    /// Query text as the POST body
    Post,
}

/// Executes SPARQL queries against one endpoint.
#[async_trait]
pub trait SparqlExecutor: Send + Sync {
    /// Run a SELECT query, returning tabular bindings.
    async fn select(&self, query: &str) -> Result<SelectResponse>;

    /// Run a CONSTRUCT query, returning graph triples.
    async fn construct(&self, query: &str) -> Result<Vec<Triple>>;
}

/// Turns a serialized RDF response body into triples.
///
/// Implementations wrap whatever RDF parser the application already uses;
/// none is bundled here.
pub trait GraphParser: Send + Sync {
    /// Parse `body` (with the given media type) into triples.
    fn parse(&self, body: &str, content_type: &str) -> Result<Vec<Triple>>;
}

const SELECT_ACCEPT: &str = "application/sparql-results+json";
const CONSTRUCT_ACCEPT: &str = "application/n-triples";

/// HTTP transport for a SPARQL endpoint.
///
/// Non-2xx responses surface as [`DataError::Http`] carrying the status and
/// response body; network failures as [`DataError::Execute`].
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    endpoint_url: String,
    method: QueryMethod,
    graph_parser: Option<Arc<dyn GraphParser>>,
}

impl fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("endpoint_url", &self.endpoint_url)
            .field("method", &self.method)
            .field("has_graph_parser", &self.graph_parser.is_some())
            .finish()
    }
}

impl HttpExecutor {
    /// Create an executor for `endpoint_url` with a 30 second request
    /// timeout.
    pub fn new(endpoint_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Execute(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint_url: endpoint_url.into(),
            method: QueryMethod::default(),
            graph_parser: None,
        })
    }

    /// Select GET or POST transport.
    pub fn with_method(mut self, method: QueryMethod) -> Self {
        self.method = method;
        self
    }

    /// Attach the parser used for CONSTRUCT response bodies.
    pub fn with_graph_parser(mut self, parser: Arc<dyn GraphParser>) -> Self {
        self.graph_parser = Some(parser);
        self
    }

    async fn execute(&self, query: &str, accept: &str) -> Result<String> {
        debug!(endpoint = %self.endpoint_url, accept, "executing SPARQL query");
        let request = match self.method {
            QueryMethod::Get => self
                .client
                .get(&self.endpoint_url)
                .query(&[("query", query)]),
            QueryMethod::Post => self
                .client
                .post(&self.endpoint_url)
                .header("Content-Type", "application/sparql-query")
                .body(query.to_string()),
        };
        let response = request
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| DataError::Execute(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("unknown status");
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Http {
                status: status.as_u16(),
                message: if body.is_empty() {
                    message.to_string()
                } else {
                    format!("{message}: {body}")
                },
            });
        }

        response
            .text()
            .await
            .map_err(|e| DataError::Execute(format!("failed to read response body: {e}")))
    }
}

#[async_trait]
impl SparqlExecutor for HttpExecutor {
    async fn select(&self, query: &str) -> Result<SelectResponse> {
        let body = self.execute(query, SELECT_ACCEPT).await?;
        serde_json::from_str(&body)
            .map_err(|e| DataError::Malformed(format!("SPARQL JSON parse failed: {e}")))
    }

    async fn construct(&self, query: &str) -> Result<Vec<Triple>> {
        let parser = self.graph_parser.as_ref().ok_or(DataError::NoGraphParser)?;
        let body = self.execute(query, CONSTRUCT_ACCEPT).await?;
        parser.parse(&body, CONSTRUCT_ACCEPT)
    }
}
