use reqwest::header::HeaderMap as Headers;
use std::time::Duration;

pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
    pub duration: Duration,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: String, duration: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            duration,
        }
    }

    /// 整数毫秒的耗时
    pub fn latency_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
