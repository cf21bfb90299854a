use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::http::types::Method;
use crate::spec::ordered_map::OrderedMap;
use crate::{AuthMatrixError, Result};

/// AuthMatrix 文档第一行的标记
pub const AUTHMATRIX_MARKER: &str = "#!AUTHMATRIX";

/// 导入时总会存在的无认证角色
pub const GUEST_ROLE: &str = "guest";

/// 角色的认证方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    None,
    Bearer {
        #[serde(default)]
        token: String,
    },
}

impl Auth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer {
            token: token.into(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Auth::None => None,
            Auth::Bearer { token } => Some(token),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Bearer { .. } => "bearer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub auth: Auth,
}

impl Role {
    pub fn new(auth: Auth) -> Self {
        Self { auth }
    }

    pub fn anonymous() -> Self {
        Self { auth: Auth::None }
    }
}

/// 期望的状态码：单个值，或者一组候选值（命中任意一个即通过）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusRule {
    Single(u16),
    AnyOf(BTreeSet<u16>),
}

impl StatusRule {
    pub fn any_of(codes: impl IntoIterator<Item = u16>) -> Self {
        StatusRule::AnyOf(codes.into_iter().collect())
    }

    /// 唯一的匹配规则实现：任意一个候选状态满足条件即为真。
    /// 执行时的判定和按角色导出时的 2xx 过滤都走这里。
    pub fn any(&self, predicate: impl Fn(u16) -> bool) -> bool {
        match self {
            StatusRule::Single(code) => predicate(*code),
            StatusRule::AnyOf(codes) => codes.iter().any(|c| predicate(*c)),
        }
    }

    pub fn matches(&self, observed: u16) -> bool {
        self.any(|expected| expected == observed)
    }

    pub fn expects_success(&self) -> bool {
        self.any(|code| (200..300).contains(&code))
    }
}

impl From<u16> for StatusRule {
    fn from(code: u16) -> Self {
        StatusRule::Single(code)
    }
}

impl std::fmt::Display for StatusRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusRule::Single(code) => write!(f, "{}", code),
            StatusRule::AnyOf(codes) => {
                let list: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", list.join(", "))
            }
        }
    }
}

/// 单个 (endpoint, role) 单元格的验收条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub status: StatusRule,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_contains: Vec<String>,
}

impl Expectation {
    pub fn status(status: impl Into<StatusRule>) -> Self {
        Self {
            status: status.into(),
            contains: Vec::new(),
            not_contains: Vec::new(),
        }
    }

    pub fn with_contains(mut self, needle: impl Into<String>) -> Self {
        self.contains.push(needle.into());
        self
    }

    pub fn with_not_contains(mut self, needle: impl Into<String>) -> Self {
        self.not_contains.push(needle.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_method")]
    pub method: String,

    pub path: String,

    /// 没有条目的角色表示“未测试”，不是失败
    #[serde(rename = "expect", default, deserialize_with = "deserialize_expectations")]
    pub expectations: OrderedMap<Expectation>,
}

/// 文档里的期望条目。`{}` 和 `null` 都等同于没写
#[derive(Deserialize)]
struct RawExpectation {
    #[serde(default)]
    status: Option<StatusRule>,

    #[serde(default)]
    contains: Vec<String>,

    #[serde(default)]
    not_contains: Vec<String>,
}

fn deserialize_expectations<'de, D>(deserializer: D) -> std::result::Result<OrderedMap<Expectation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = OrderedMap::<Option<RawExpectation>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(role, entry)| {
            let entry = entry?;
            let status = entry.status?;
            Some((
                role,
                Expectation {
                    status,
                    contains: entry.contains,
                    not_contains: entry.not_contains,
                },
            ))
        })
        .collect())
}

fn default_method() -> String {
    "GET".to_string()
}

impl Endpoint {
    pub fn new(name: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let mut name = name.into();
        if name.is_empty() {
            name = path.clone();
        }
        Self {
            name,
            method: method.into().trim().to_uppercase(),
            path,
            expectations: OrderedMap::new(),
        }
    }

    pub fn with_expectation(mut self, role: impl Into<String>, expectation: Expectation) -> Self {
        self.expectations.insert(role, expectation);
        self
    }

    pub fn expectation(&self, role: &str) -> Option<&Expectation> {
        self.expectations.get(role)
    }

    fn normalize(&mut self) {
        self.path = normalize_path(&self.path);
        self.method = self.method.trim().to_uppercase();
        if self.method.is_empty() {
            self.method = default_method();
        }
        if self.name.is_empty() {
            self.name = self.path.clone();
        }
    }
}

/// 补齐开头的 "/"
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// 测试矩阵的规范内存表示
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecModel {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub default_headers: OrderedMap<String>,

    pub roles: OrderedMap<Role>,

    pub endpoints: Vec<Endpoint>,
}

impl SpecModel {
    /// 完全空的模型
    pub fn new() -> Self {
        Self::default()
    }

    /// 带有 guest 角色和 `Accept: application/json` 的初始模型
    pub fn with_defaults() -> Self {
        let mut spec = Self::new();
        spec.default_headers
            .insert("Accept", "application/json".to_string());
        spec.roles.insert(GUEST_ROLE, Role::anonymous());
        spec
    }

    /// 解析不带标记行的 AuthMatrix JSON
    pub fn from_json(text: &str) -> Result<Self> {
        let mut spec: SpecModel = serde_json::from_str(text)
            .map_err(|e| AuthMatrixError::format(format!("invalid AuthMatrix JSON: {}", e)))?;

        for endpoint in &mut spec.endpoints {
            endpoint.normalize();
        }

        if let Some((endpoint, role)) = spec.dangling_expectation() {
            return Err(AuthMatrixError::format(format!(
                "endpoint '{}' has an expectation for unknown role '{}'",
                endpoint, role
            )));
        }

        Ok(spec)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn role_ids(&self) -> impl Iterator<Item = &str> {
        self.roles.keys()
    }

    /// 删除角色，同时清理所有 endpoint 上对它的期望
    pub fn remove_role(&mut self, role: &str) -> Option<Role> {
        let removed = self.roles.remove(role)?;
        for endpoint in &mut self.endpoints {
            endpoint.expectations.remove(role);
        }
        Some(removed)
    }

    fn dangling_expectation(&self) -> Option<(&str, &str)> {
        self.endpoints.iter().find_map(|endpoint| {
            endpoint
                .expectations
                .keys()
                .find(|role| !self.roles.contains_key(role))
                .map(|role| (endpoint.name.as_str(), role))
        })
    }

    /// 交给执行引擎之前的完整性检查
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some((endpoint, role)) = self.dangling_expectation() {
            return Err(format!(
                "endpoint '{}' references unknown role '{}'",
                endpoint, role
            ));
        }
        for (id, _) in self.roles.iter() {
            if id.trim().is_empty() {
                return Err("role id must not be empty".to_string());
            }
        }
        for endpoint in &self.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(format!(
                    "endpoint '{}' path '{}' does not start with '/'",
                    endpoint.name, endpoint.path
                ));
            }
            if Method::parse(&endpoint.method).is_err() {
                return Err(format!(
                    "endpoint '{}' has invalid method '{}'",
                    endpoint.name, endpoint.method
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rule_single() {
        let rule = StatusRule::Single(200);
        assert!(rule.matches(200));
        assert!(!rule.matches(201));
        assert!(rule.expects_success());
    }

    #[test]
    fn test_status_rule_any_of() {
        let rule = StatusRule::any_of([200, 201]);
        assert!(rule.matches(201));
        assert!(!rule.matches(204));

        assert!(StatusRule::any_of([403, 204]).expects_success());
        assert!(!StatusRule::any_of([199, 300, 403]).expects_success());
        assert!(!StatusRule::any_of(Vec::<u16>::new()).matches(200));
    }

    #[test]
    fn test_status_rule_json_shapes() {
        let single: StatusRule = serde_json::from_str("403").unwrap();
        assert_eq!(single, StatusRule::Single(403));

        let many: StatusRule = serde_json::from_str("[201, 200]").unwrap();
        assert_eq!(many, StatusRule::any_of([200, 201]));
        assert_eq!(many.to_string(), "[200, 201]");
    }

    #[test]
    fn test_auth_json() {
        let auth: Auth = serde_json::from_str(r#"{"type": "bearer", "token": "tok"}"#).unwrap();
        assert_eq!(auth, Auth::bearer("tok"));

        let none: Auth = serde_json::from_str(r#"{"type": "none"}"#).unwrap();
        assert_eq!(none, Auth::None);
        assert_eq!(serde_json::to_string(&none).unwrap(), r#"{"type":"none"}"#);
    }

    #[test]
    fn test_from_json_normalizes_endpoints() {
        let json = r#"{
            "roles": {"guest": {"auth": {"type": "none"}}},
            "endpoints": [{"method": "get", "path": "users"}]
        }"#;
        let spec = SpecModel::from_json(json).unwrap();
        assert_eq!(spec.base_url, "");
        assert_eq!(spec.endpoints[0].path, "/users");
        assert_eq!(spec.endpoints[0].method, "GET");
        assert_eq!(spec.endpoints[0].name, "/users");
    }

    #[test]
    fn test_from_json_missing_required_keys() {
        let err = SpecModel::from_json(r#"{"base_url": "http://x"}"#).unwrap_err();
        assert!(matches!(err, AuthMatrixError::FormatError(_)));
    }

    #[test]
    fn test_from_json_rejects_dangling_expectation() {
        let json = r#"{
            "roles": {"guest": {"auth": {"type": "none"}}},
            "endpoints": [{"name": "x", "method": "GET", "path": "/x",
                           "expect": {"ghost": {"status": 200}}}]
        }"#;
        let err = SpecModel::from_json(json).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_from_json_empty_expectation_is_untested() {
        let json = r#"{
            "roles": {"guest": {"auth": {"type": "none"}}, "admin": {"auth": {"type": "bearer", "token": "t"}}},
            "endpoints": [{"name": "x", "method": "GET", "path": "/x",
                           "expect": {"guest": {}, "admin": {"status": 200, "contains": ["ok"]}}}]
        }"#;
        let spec = SpecModel::from_json(json).unwrap();
        let endpoint = &spec.endpoints[0];
        assert!(endpoint.expectation("guest").is_none());
        assert_eq!(
            endpoint.expectation("admin"),
            Some(&Expectation::status(200).with_contains("ok"))
        );

        let json = r#"{
            "roles": {"guest": {"auth": {"type": "none"}}},
            "endpoints": [{"path": "/x", "expect": {"guest": null}}]
        }"#;
        assert!(SpecModel::from_json(json).unwrap().endpoints[0].expectations.is_empty());

        let json = r#"{
            "roles": {"guest": {"auth": {"type": "none"}}},
            "endpoints": [{"path": "/x", "expect": {"guest": {"status": "ok"}}}]
        }"#;
        assert!(SpecModel::from_json(json).is_err());
    }

    #[test]
    fn test_remove_role_cascades() {
        let mut spec = SpecModel::with_defaults();
        spec.roles.insert("admin", Role::new(Auth::bearer("t")));
        spec.endpoints.push(
            Endpoint::new("a", "GET", "/a")
                .with_expectation("guest", Expectation::status(403))
                .with_expectation("admin", Expectation::status(200)),
        );

        assert!(spec.remove_role("admin").is_some());
        assert!(spec.endpoints[0].expectation("admin").is_none());
        assert!(spec.endpoints[0].expectation("guest").is_some());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_method_tokens() {
        let mut spec = SpecModel::with_defaults();
        spec.endpoints.push(Endpoint::new("dav", "PROPFIND", "/files"));
        spec.endpoints.push(Endpoint::new("purge", "purge", "/cache"));
        assert!(spec.validate().is_ok());

        spec.endpoints.push(Endpoint::new("odd", "GET ME", "/coffee"));
        let err = spec.validate().unwrap_err();
        assert!(err.contains("invalid method 'GET ME'"));
    }
}
