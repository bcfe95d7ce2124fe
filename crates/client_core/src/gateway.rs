use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use shared::{
    error::DeviceFault,
    protocol::{interpret_response, HttpMethod},
};
use tracing::debug;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub method: HttpMethod,
    pub path: &'static str,
    /// Bound device address, sent as the `ip` query parameter.
    pub device_address: Option<String>,
    pub body: Option<Value>,
}

impl GatewayRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            device_address: None,
            body: None,
        }
    }

    pub fn post(path: &'static str) -> Self {
        Self {
            method: HttpMethod::Post,
            path,
            device_address: None,
            body: None,
        }
    }

    pub fn for_device(mut self, address: impl Into<String>) -> Self {
        self.device_address = Some(address.into());
        self
    }

    pub fn with_body<T: Serialize>(mut self, body: &T) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(body)
            .map_err(|err| GatewayError::Protocol(format!("unencodable request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }
}

#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Performs one exchange. Never retries.
    async fn send(&self, request: GatewayRequest) -> Result<Value, GatewayError>;
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
}

impl HttpGateway {
    /// `base_url` is the proxy's API root, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn rejection_message(body: &[u8], status: reqwest::StatusCode) -> String {
    let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|value| {
        ["detail", "message"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    from_json
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string()
        })
}

#[async_trait]
impl CommandGateway for HttpGateway {
    async fn send(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&url),
            HttpMethod::Post => self.http.post(&url),
        };
        if let Some(address) = &request.device_address {
            builder = builder.query(&[("ip", address.as_str())]);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = ?request.method, path = request.path, "gateway: sending request");
        let response = builder
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        if !status.is_success() {
            let message = rejection_message(&body, status);
            debug!(path = request.path, status = status.as_u16(), "gateway: request rejected");
            return Err(DeviceFault::new(Some(i64::from(status.as_u16())), message).into());
        }

        let payload: Value = serde_json::from_slice(&body)
            .map_err(|err| GatewayError::Protocol(format!("invalid JSON from {}: {err}", request.path)))?;
        if !payload.is_object() {
            return Err(GatewayError::Protocol(format!(
                "expected a JSON object from {}",
                request.path
            )));
        }

        interpret_response(&payload)?;
        Ok(payload)
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
