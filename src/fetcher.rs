use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http_client::http_client;
use crate::storage::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct HttpTransport {
    client: &'static reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut req = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Some(Method::Post),
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn put(body: Value) -> Self {
        Self {
            method: Some(Method::Put),
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Some(Method::Delete),
            ..Self::default()
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub struct Fetcher {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: SessionStore,
}

impl Fetcher {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>, session: SessionStore) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(path, RequestOptions::get())
    }

    /// Sends one request and unwraps the envelope. Never retries.
    pub fn fetch<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T, ApiError> {
        let method = options.method.unwrap_or(Method::Get);
        let url = self.url_for(path, &options.query)?;

        let mut headers = options.headers;
        if let Some(token) = self.session.token() {
            headers.push((AUTHORIZATION.as_str().to_string(), format!("Bearer {token}")));
        }
        let body = match options.body {
            Some(body) => {
                headers.push((CONTENT_TYPE.as_str().to_string(), "application/json".to_string()));
                Some(serde_json::to_string(&body)?)
            }
            None => None,
        };

        debug!(method = method.as_str(), %url, "api request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .inspect_err(|err| warn!(path, "transport failure: {err}"))?;

        unwrap_envelope(path, response)
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<String, ApiError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let parsed = if query.is_empty() {
            Url::parse(&joined)
        } else {
            Url::parse_with_params(&joined, query)
        };
        parsed
            .map(String::from)
            .map_err(|err| ApiError::validation("url", format!("{joined}: {err}")))
    }
}

fn unwrap_envelope<T: DeserializeOwned>(path: &str, response: HttpResponse) -> Result<T, ApiError> {
    let status = response.status;
    let envelope = match serde_json::from_str::<Envelope<Value>>(&response.body) {
        Ok(envelope) => envelope,
        Err(err) if (200..300).contains(&status) => return Err(ApiError::from(err)),
        Err(_) => {
            return Err(ApiError::Application {
                status,
                message: format!("http {status}"),
            });
        }
    };

    if !envelope.success {
        warn!(path, status, message = %envelope.message, "api reported failure");
        return Err(ApiError::Application {
            status,
            message: envelope.message,
        });
    }

    let data = envelope.data.unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(ApiError::from)
}

pub(crate) fn encode_query(params: &[(String, String)]) -> Option<String> {
    let url = Url::parse_with_params("http://localhost/", params).ok()?;
    url.query().map(str::to_string)
}
