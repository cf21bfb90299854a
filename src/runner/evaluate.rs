use crate::http::Response;
use crate::runner::types::ResultCell;
use crate::spec::Expectation;

/// 对照期望检查响应：状态码规则以及所有 contains / not_contains 子串规则
pub fn evaluate(expectation: &Expectation, response: &Response) -> ResultCell {
    ResultCell::completed(
        response.status,
        response.latency_ms(),
        check(expectation, response.status, &response.body),
    )
}

/// 返回未满足的规则，空表示通过
pub fn check(expectation: &Expectation, status: u16, body: &str) -> Vec<String> {
    let mut failures = Vec::new();

    if !expectation.status.matches(status) {
        failures.push(format!(
            "expected status {}, got {}",
            expectation.status, status
        ));
    }

    for needle in &expectation.contains {
        if !body.contains(needle.as_str()) {
            failures.push(format!("body does not contain '{}'", needle));
        }
    }

    for needle in &expectation.not_contains {
        if body.contains(needle.as_str()) {
            failures.push(format!("body unexpectedly contains '{}'", needle));
        }
    }

    failures
}
