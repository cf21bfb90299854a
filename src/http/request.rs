use reqwest::header::{HeaderMap as Headers, HeaderName, HeaderValue};

use crate::http::types::Method;
use crate::{AuthMatrixError, Result};

/// 一次待发送的请求。URL 原样保留，不做任何规范化
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
        }
    }

    fn insert_header(&mut self, key: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            AuthMatrixError::TransportError(format!("invalid header name '{}': {}", key, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            AuthMatrixError::TransportError(format!("invalid value for header '{}': {}", key, e))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self> {
        self.insert_header(key, value)?;
        Ok(self)
    }

    /// 设置或覆盖 Authorization
    pub fn with_auth_bearer(mut self, token: &str) -> Result<Self> {
        self.insert_header("Authorization", &format!("Bearer {}", token))?;
        Ok(self)
    }
}
