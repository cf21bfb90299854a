use std::time::{Duration, Instant};

use tracing::debug;

use crate::Result;
use crate::http::request::Request;
use crate::http::response::Response;

/// 参考超时时间
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT, None)
    }

    pub fn with_timeout(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        Ok(Self {
            inner: builder.build()?,
        })
    }

    /// 发送一次请求，不做重试。耗时包含读取响应体
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let url = reqwest::Url::parse(&request.url)?;
        debug!(method = request.method.as_str(), %url, "sending request");

        let start = Instant::now();
        let response = self
            .inner
            .request(request.method.into(), url)
            .headers(request.headers)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        let duration = start.elapsed();

        Ok(Response::new(status, headers, body, duration))
    }
}
