//! A thin wrapper around the injected HTTP client. Retry, proxy, caching and
//! custom authentication policies belong to the middleware stack the caller
//! provides; this layer adds the pieces every caller needs: `file://` URLs served
//! as local reads, basic auth taken from URL userinfo, and content-type handling.

use std::str::FromStr;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use mime::Mime;
use miette::Diagnostic;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use url::Url;

/// Errors from the HTTP layer.
#[derive(Debug, Error, Diagnostic)]
pub enum HttpError {
    /// The middleware stack or the transport failed.
    #[error(transparent)]
    Middleware(#[from] reqwest_middleware::Error),

    /// The transport failed while reading the body.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A `file://` URL could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The server answered with an unexpected status.
    #[error("unexpected status {status} for {url}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The requested URL.
        url: Url,
    },
}

/// The session handle used for every network interaction. Cloning is cheap; the
/// underlying client is shared.
#[derive(Debug, Clone)]
pub struct Http {
    client: ClientWithMiddleware,
}

impl Http {
    /// Wraps the injected client.
    pub fn new(client: ClientWithMiddleware) -> Self {
        Http { client }
    }

    /// Performs a GET request. `file://` URLs are read from the local filesystem;
    /// URL userinfo is turned into basic auth. The status is reported as-is so
    /// callers can treat e.g. 404 as "not published here".
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<HttpResponse, HttpError> {
        if url.scheme() == "file" {
            return self.get_file(url).await;
        }

        tracing::debug!(url = %url, "executing request");

        let mut request_url = url;
        let credentials = if request_url.username().is_empty() {
            None
        } else {
            let credentials = (
                request_url.username().to_string(),
                request_url.password().map(ToString::to_string),
            );
            let _ = request_url.set_username("");
            let _ = request_url.set_password(None);
            Some(credentials)
        };

        let mut builder = self.client.get(request_url).headers(headers);
        if let Some((username, password)) = credentials {
            builder = builder.basic_auth(username, password);
        }

        let response = builder.send().await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Mime::from_str(value).ok());

        Ok(HttpResponse {
            final_url: response.url().clone(),
            status: response.status(),
            content_type,
            body: Body::Remote(response),
        })
    }

    async fn get_file(&self, url: Url) -> Result<HttpResponse, HttpError> {
        let path = url.to_file_path().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a local path: {url}"),
            )
        })?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HttpResponse {
                    final_url: url,
                    status: StatusCode::NOT_FOUND,
                    content_type: None,
                    body: Body::Local(Bytes::new()),
                })
            }
            Err(err) => return Err(err.into()),
        };

        Ok(HttpResponse {
            final_url: url,
            status: StatusCode::OK,
            content_type: None,
            body: Body::Local(bytes.into()),
        })
    }
}

enum Body {
    Remote(reqwest::Response),
    Local(Bytes),
}

/// A response, either streamed from the network or read from disk.
pub struct HttpResponse {
    /// The URL after redirects.
    pub final_url: Url,
    /// The response status.
    pub status: StatusCode,
    /// The parsed `Content-Type` header, when present.
    pub content_type: Option<Mime>,
    body: Body,
}

impl HttpResponse {
    /// Fails on client and server error statuses.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(HttpError::Status {
                status: self.status,
                url: self.final_url,
            });
        }
        Ok(self)
    }

    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        match self.body {
            Body::Remote(response) => Ok(response.bytes().await?),
            Body::Local(bytes) => Ok(bytes),
        }
    }

    /// Pulls the next chunk of the body, `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        match &mut self.body {
            Body::Remote(response) => Ok(response.chunk().await?),
            Body::Local(bytes) => {
                if bytes.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(std::mem::take(bytes)))
                }
            }
        }
    }
}
