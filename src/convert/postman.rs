use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Position;

use crate::spec::{Auth, Endpoint, OrderedMap, Role, SpecModel};

pub const POSTMAN_SCHEMA: &str =
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// 通用导出的集合名称
pub const EXPORT_COLLECTION_NAME: &str = "AuthMatrix Export";

/// 单角色 Postman 集合导入时生成的角色名
pub const IMPORTED_BEARER_ROLE: &str = "admin";

// ---------------------------------------------------------------------------
// 输出结构（导出时使用）。输入一律按 serde_json::Value 遍历，保证对任意输入都不会失败。
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanCollection {
    pub info: PostmanInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<PostmanAuth>,

    pub item: Vec<PostmanItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanInfo {
    pub name: String,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanAuth {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub bearer: Vec<PostmanAuthParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanAuthParam {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanItem {
    pub name: String,
    pub request: PostmanRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanRequest {
    pub method: String,
    pub url: PostmanUrl,
    pub header: Vec<PostmanHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanUrl {
    pub raw: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    pub host: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostmanHeader {
    pub key: String,
    pub value: String,
}

impl PostmanCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: PostmanInfo {
                name: name.into(),
                schema: POSTMAN_SCHEMA.to_string(),
            },
            auth: None,
            item: Vec::new(),
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.auth = Some(PostmanAuth {
            auth_type: "bearer".to_string(),
            bearer: vec![PostmanAuthParam {
                key: "token".to_string(),
                value: token.to_string(),
                param_type: "string".to_string(),
            }],
        });
        self
    }

    pub fn to_value(&self) -> Value {
        // 纯字符串/数组结构，序列化不会失败
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// 输入解析
// ---------------------------------------------------------------------------

/// 从集合中提取出的单个请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEndpoint {
    pub name: String,
    pub method: String,
    pub path: String,
}

/// 是否为 Postman 集合：同时具有 `info` 和 `item`
pub fn is_postman_collection(value: &Value) -> bool {
    value.get("info").is_some() && value.get("item").is_some()
}

/// 深度优先收集所有叶子请求（带 `request` 的条目），文件夹递归展开
fn collect_leaves<'a>(items: &'a Value, leaves: &mut Vec<&'a Value>) {
    let Some(items) = items.as_array() else {
        return;
    };
    for item in items {
        if item.get("request").is_some() {
            leaves.push(item);
        } else if let Some(children) = item.get("item") {
            collect_leaves(children, leaves);
        }
    }
}

fn leaves(collection: &Value) -> Vec<&Value> {
    let mut leaves = Vec::new();
    if let Some(items) = collection.get("item") {
        collect_leaves(items, &mut leaves);
    }
    leaves
}

/// 叶子的 url 字段；`request` 本身是字符串时把它当成 URL
fn leaf_url(leaf: &Value) -> Option<&Value> {
    let request = leaf.get("request")?;
    if request.is_string() {
        return Some(request);
    }
    request.get("url")
}

fn leaf_method(leaf: &Value) -> String {
    leaf.get("request")
        .and_then(|r| r.get("method"))
        .and_then(Value::as_str)
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// URL 的 scheme://host[:port] 部分，无法解析时返回 None
fn url_base(url: &Value) -> Option<String> {
    match url {
        Value::String(raw) => {
            let parsed = url::Url::parse(raw.trim()).ok()?;
            parsed.host_str()?;
            Some(parsed[..Position::BeforePath].to_string())
        }
        Value::Object(_) => {
            let host: Vec<String> = match url.get("host")? {
                Value::Array(parts) => parts.iter().filter_map(scalar_to_string).collect(),
                other => scalar_to_string(other).into_iter().collect(),
            };
            if host.is_empty() {
                return None;
            }
            let protocol = url
                .get("protocol")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .unwrap_or("https");
            let port = url
                .get("port")
                .and_then(scalar_to_string)
                .filter(|p| !p.is_empty());
            let host = host.join(".");
            Some(match port {
                Some(port) => format!("{}://{}:{}", protocol, host, port),
                None => format!("{}://{}", protocol, host),
            })
        }
        _ => None,
    }
}

/// 原始 URL 字符串的路径部分，保留 `{{var}}` 之类的模板文本，不做百分号编码。
///
/// - `https://host/a` 去掉 scheme 和 authority
/// - `{{baseUrl}}/a` 去掉开头的变量段
/// - 其余按相对路径处理
fn path_from_raw(raw: &str) -> String {
    let raw = raw.trim();
    let rest = match raw.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !scheme.contains('/') => {
            rest.find(['/', '?', '#']).map_or("", |at| &rest[at..])
        }
        _ if raw.starts_with("{{") => match raw.find("}}") {
            Some(end) => &raw[end + 2..],
            None => raw,
        },
        _ => raw,
    };
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a Value>) -> String {
    let parts: Vec<String> = segments
        .filter_map(scalar_to_string)
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", parts.join("/"))
}

/// URL 的路径部分；任何解析失败都得到 "/"
fn url_path(url: &Value) -> String {
    match url {
        Value::String(raw) => path_from_raw(raw),
        Value::Object(_) => match url.get("path") {
            Some(Value::Array(segments)) => join_segments(segments.iter()),
            Some(Value::String(path)) => {
                let segments: Vec<Value> = path
                    .split('/')
                    .map(|s| Value::String(s.to_string()))
                    .collect();
                join_segments(segments.iter())
            }
            _ => url
                .get("raw")
                .and_then(Value::as_str)
                .map(path_from_raw)
                .unwrap_or_else(|| "/".to_string()),
        },
        _ => "/".to_string(),
    }
}

/// 叶子是否带有 URL：非空字符串，或者带 host 的对象
fn carries_url(url: &Value) -> bool {
    match url {
        Value::String(raw) => !raw.trim().is_empty(),
        Value::Object(_) => match url.get("host") {
            Some(Value::Array(parts)) => !parts.is_empty(),
            Some(Value::String(host)) => !host.is_empty(),
            _ => false,
        },
        _ => false,
    }
}

/// 深度优先取第一个带 URL 的叶子。那个 URL 解析不出 host（例如 `{{baseUrl}}/a`）时
/// 返回空字符串，不再往后找
pub fn extract_base_url(collection: &Value) -> String {
    leaves(collection)
        .into_iter()
        .filter_map(leaf_url)
        .find(|url| carries_url(url))
        .and_then(url_base)
        .unwrap_or_default()
}

/// 按深度优先顺序提取所有请求
pub fn extract_endpoints(collection: &Value) -> Vec<ExtractedEndpoint> {
    leaves(collection)
        .into_iter()
        .map(|leaf| {
            let method = leaf_method(leaf);
            let path = leaf_url(leaf)
                .map(url_path)
                .unwrap_or_else(|| "/".to_string());
            let name = leaf
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} {}", method, path));
            ExtractedEndpoint { name, method, path }
        })
        .collect()
}

/// 集合级 bearer token。只识别 bearer，其余认证类型返回 None
pub fn collection_bearer_token(collection: &Value) -> Option<String> {
    let auth = collection.get("auth")?;
    let auth_type = auth.get("type").and_then(Value::as_str).unwrap_or_default();
    if auth_type != "bearer" {
        if !auth_type.is_empty() {
            warn!(auth_type, "unsupported Postman auth type, treating as no auth");
        }
        return None;
    }

    match auth.get("bearer")? {
        Value::Array(params) => params
            .iter()
            .find(|p| p.get("key").and_then(Value::as_str) == Some("token"))
            .map(|p| {
                p.get("value")
                    .and_then(scalar_to_string)
                    .unwrap_or_default()
            }),
        // v2.0 的写法: {"bearer": {"token": "..."}}
        Value::Object(params) => params.get("token").and_then(scalar_to_string),
        _ => None,
    }
}

/// 集合级认证对应的角色认证方式
pub fn collection_auth(collection: &Value) -> Auth {
    match collection_bearer_token(collection) {
        Some(token) => Auth::bearer(token),
        None => Auth::None,
    }
}

/// 单个 Postman 集合转换为 SpecModel
///
/// 总会有 guest 角色；集合级 bearer 认证额外生成一个名为 `admin` 的角色。
/// 新 endpoint 都没有期望，需要之后配置。
pub fn postman_to_spec(collection: &Value) -> SpecModel {
    let mut spec = SpecModel::with_defaults();
    spec.base_url = extract_base_url(collection);

    if let Some(token) = collection_bearer_token(collection) {
        spec.roles
            .insert(IMPORTED_BEARER_ROLE, Role::new(Auth::bearer(token)));
    }

    spec.endpoints = extract_endpoints(collection)
        .into_iter()
        .map(|e| Endpoint::new(e.name, e.method, e.path))
        .collect();

    debug!(
        base_url = %spec.base_url,
        endpoints = spec.endpoints.len(),
        roles = spec.roles.len(),
        "converted Postman collection"
    );
    spec
}

// ---------------------------------------------------------------------------
// 导出
// ---------------------------------------------------------------------------

fn export_url(base_url: &str, path: &str) -> PostmanUrl {
    let raw = format!("{}{}", base_url, path);
    let path_segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    match url::Url::parse(base_url) {
        Ok(parsed) if parsed.host_str().is_some() => PostmanUrl {
            raw,
            protocol: Some(parsed.scheme().to_string()),
            host: parsed
                .host_str()
                .unwrap_or_default()
                .split('.')
                .map(str::to_string)
                .collect(),
            port: parsed.port().map(|p| p.to_string()),
            path: path_segments,
        },
        _ => {
            let stripped = base_url
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            let host = stripped.split('/').next().unwrap_or_default();
            PostmanUrl {
                raw,
                protocol: None,
                host: host
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                port: None,
                path: path_segments,
            }
        }
    }
}

fn export_item(spec: &SpecModel, endpoint: &Endpoint) -> PostmanItem {
    let header = spec
        .default_headers
        .iter()
        .filter(|(key, _)| !key.eq_ignore_ascii_case("authorization"))
        .map(|(key, value)| PostmanHeader {
            key: key.to_string(),
            value: value.clone(),
        })
        .collect();

    PostmanItem {
        name: endpoint.name.clone(),
        request: PostmanRequest {
            method: endpoint.method.clone(),
            url: export_url(&spec.base_url, &endpoint.path),
            header,
        },
    }
}

/// 导出为单个 Postman 集合。不包含任何认证信息
pub fn spec_to_postman(spec: &SpecModel) -> PostmanCollection {
    let mut collection = PostmanCollection::new(EXPORT_COLLECTION_NAME);
    collection.item = spec
        .endpoints
        .iter()
        .map(|endpoint| export_item(spec, endpoint))
        .collect();
    collection
}

fn role_collection_name(role: &str) -> String {
    let mut chars = role.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    };
    format!("{} Collection", capitalized)
}

/// 每个角色一个集合，只包含该角色期望 2xx 的 endpoint
///
/// 没有任何 2xx 期望的角色不会出现在结果中。
pub fn spec_to_postman_per_role(spec: &SpecModel) -> OrderedMap<PostmanCollection> {
    let mut collections = OrderedMap::new();

    for (role_id, role) in spec.roles.iter() {
        let items: Vec<PostmanItem> = spec
            .endpoints
            .iter()
            .filter(|endpoint| {
                endpoint
                    .expectation(role_id)
                    .is_some_and(|e| e.status.expects_success())
            })
            .map(|endpoint| export_item(spec, endpoint))
            .collect();

        if items.is_empty() {
            debug!(role = role_id, "no 2xx expectations, skipping role collection");
            continue;
        }

        let mut collection = PostmanCollection::new(role_collection_name(role_id));
        if let Some(token) = role.auth.token() {
            collection = collection.with_bearer(token);
        }
        collection.item = items;
        collections.insert(role_id, collection);
    }

    collections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Expectation, StatusRule};
    use serde_json::json;

    #[test]
    fn test_base_url_from_string_url() {
        let collection = json!({
            "info": {"name": "c"},
            "item": [{"name": "a", "request": {"method": "GET", "url": "https://api.example.com:8443/v1/users?x=1"}}]
        });
        assert_eq!(extract_base_url(&collection), "https://api.example.com:8443");
    }

    #[test]
    fn test_base_url_from_structured_url_in_folder() {
        let collection = json!({
            "info": {"name": "c"},
            "item": [
                {"name": "folder", "item": [
                    {"name": "a", "request": {"method": "GET", "url": {
                        "protocol": "http", "host": ["localhost"], "port": "8000", "path": ["a"]
                    }}}
                ]},
                {"name": "b", "request": {"method": "GET", "url": "https://other.example.com/b"}}
            ]
        });
        assert_eq!(extract_base_url(&collection), "http://localhost:8000");
    }

    #[test]
    fn test_base_url_defaults_protocol() {
        let collection = json!({
            "info": {"name": "c"},
            "item": [
                {"name": "no url", "request": {"method": "GET"}},
                {"name": "ok", "request": {"url": {"host": ["api", "example", "com"], "path": []}}}
            ]
        });
        assert_eq!(extract_base_url(&collection), "https://api.example.com");
    }

    #[test]
    fn test_base_url_stops_at_first_url_leaf() {
        let collection = json!({
            "info": {"name": "c"},
            "item": [
                {"name": "templated", "request": {"url": "{{baseUrl}}/users"}},
                {"name": "ok", "request": {"url": "https://api.example.com/orders"}}
            ]
        });
        assert_eq!(extract_base_url(&collection), "");
    }

    #[test]
    fn test_templated_paths_keep_their_shape() {
        assert_eq!(path_from_raw("{{baseUrl}}/users"), "/users");
        assert_eq!(path_from_raw("{{baseUrl}}"), "/");
        assert_eq!(path_from_raw("https://x.com/users/{{id}}?expand=1"), "/users/{{id}}");
        assert_eq!(path_from_raw("https://x.com?next=/a"), "/");
        assert_eq!(path_from_raw("users/me#top"), "/users/me");
        assert_eq!(path_from_raw("/orders"), "/orders");
    }

    #[test]
    fn test_extract_endpoints_paths() {
        let collection = json!({
            "info": {"name": "c"},
            "item": [
                {"name": "List", "request": {"method": "get", "url": "https://x.com/api/users?page=1"}},
                {"request": {"method": "POST", "url": {"host": ["x", "com"], "path": ["api", "", "login"]}}},
                {"name": "Root", "request": {"url": {"host": ["x", "com"]}}},
                {"name": "Broken", "request": {"url": "not a url"}},
                {"name": "Raw only", "request": {"method": "DELETE", "url": {"raw": "https://x.com/items/7"}}},
                {"name": "Bare", "request": "https://x.com/bare"},
                {"name": "Weird", "request": {"url": 42}}
            ]
        });
        let endpoints = extract_endpoints(&collection);
        let triples: Vec<_> = endpoints
            .iter()
            .map(|e| (e.name.as_str(), e.method.as_str(), e.path.as_str()))
            .collect();
        assert_eq!(
            triples,
            vec![
                ("List", "GET", "/api/users"),
                ("POST /api/login", "POST", "/api/login"),
                ("Root", "GET", "/"),
                ("Broken", "GET", "/not a url"),
                ("Raw only", "DELETE", "/items/7"),
                ("Bare", "GET", "/bare"),
                ("Weird", "GET", "/"),
            ]
        );
    }

    #[test]
    fn test_adversarial_input_never_panics() {
        let inputs = vec![
            json!(null),
            json!([]),
            json!({"item": "nope"}),
            json!({"info": 1, "item": [1, "x", null, {"item": {"deep": true}}]}),
            json!({"item": [{"request": {"url": {"host": [{"a": 1}], "path": [null, {"b": 2}]}}}]}),
        ];
        for input in inputs {
            let spec = postman_to_spec(&input);
            assert!(spec.roles.contains_key("guest"));
        }
    }

    #[test]
    fn test_postman_to_spec_bearer_role() {
        let collection = json!({
            "info": {"name": "c"},
            "auth": {"type": "bearer", "bearer": [{"key": "token", "value": "secret", "type": "string"}]},
            "item": [{"name": "a", "request": {"method": "GET", "url": "https://api.example.com/a"}}]
        });
        let spec = postman_to_spec(&collection);
        let ids: Vec<_> = spec.role_ids().collect();
        assert_eq!(ids, vec!["guest", "admin"]);
        assert_eq!(spec.roles.get("admin").unwrap().auth, Auth::bearer("secret"));
        assert!(spec.endpoints[0].expectations.is_empty());
    }

    #[test]
    fn test_postman_to_spec_other_auth_degrades() {
        let collection = json!({
            "info": {"name": "c"},
            "auth": {"type": "basic", "basic": [{"key": "username", "value": "u"}]},
            "item": []
        });
        let spec = postman_to_spec(&collection);
        assert_eq!(spec.roles.len(), 1);
    }

    fn sample_spec() -> SpecModel {
        let mut spec = SpecModel::with_defaults();
        spec.base_url = "https://api.example.com".to_string();
        spec.default_headers
            .insert("Authorization", "Bearer leaked".to_string());
        spec.roles.insert("user", Role::new(Auth::bearer("user-token")));
        spec.roles.insert("auditor", Role::new(Auth::None));
        spec.endpoints = vec![
            Endpoint::new("Profile", "GET", "/v1/profile")
                .with_expectation("guest", Expectation::status(403))
                .with_expectation("user", Expectation::status(200)),
            Endpoint::new("Create", "POST", "/v1/items")
                .with_expectation("user", Expectation::status(StatusRule::any_of([201, 409]))),
            Endpoint::new("Root", "GET", "/")
                .with_expectation("guest", Expectation::status(200)),
        ];
        spec
    }

    #[test]
    fn test_spec_to_postman_omits_auth() {
        let collection = spec_to_postman(&sample_spec());
        assert!(collection.auth.is_none());
        assert_eq!(collection.info.name, EXPORT_COLLECTION_NAME);
        assert_eq!(collection.item.len(), 3);

        let first = &collection.item[0].request;
        assert_eq!(first.url.raw, "https://api.example.com/v1/profile");
        assert_eq!(first.url.host, vec!["api", "example", "com"]);
        assert_eq!(first.url.path, vec!["v1", "profile"]);
        assert!(first.header.iter().all(|h| h.key != "Authorization"));
        assert_eq!(collection.item[2].request.url.path, Vec::<String>::new());

        let value = collection.to_value();
        assert!(value.get("auth").is_none());
    }

    #[test]
    fn test_spec_to_postman_per_role_filters_success() {
        let collections = spec_to_postman_per_role(&sample_spec());
        let ids: Vec<_> = collections.keys().collect();
        assert_eq!(ids, vec!["guest", "user"]);

        let guest = collections.get("guest").unwrap();
        assert!(guest.auth.is_none());
        assert_eq!(guest.info.name, "Guest Collection");
        let names: Vec<_> = guest.item.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Root"]);

        let user = collections.get("user").unwrap();
        let auth = user.auth.as_ref().unwrap();
        assert_eq!(auth.auth_type, "bearer");
        assert_eq!(auth.bearer[0].value, "user-token");
        let names: Vec<_> = user.item.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Profile", "Create"]);
    }

    #[test]
    fn test_export_url_with_port_round_trips_base() {
        let url = export_url("http://localhost:8080", "/a/b");
        assert_eq!(url.protocol.as_deref(), Some("http"));
        assert_eq!(url.port.as_deref(), Some("8080"));
        assert_eq!(url_base(&serde_json::to_value(&url).unwrap()).unwrap(), "http://localhost:8080");
    }
}
