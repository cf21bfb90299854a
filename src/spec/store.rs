use tracing::debug;

use crate::convert;
use crate::spec::model::{Auth, Endpoint, Expectation, GUEST_ROLE, Role, SpecModel};
use crate::{AuthMatrixError, Result};

/// 批量解析时识别的 HTTP 动词
const BULK_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

const PUBLIC_PREFIXES: [&str; 5] = ["/", "/health", "/status", "/info", "/version"];
const ADMIN_MARKERS: [&str; 1] = ["/admin"];
const USER_MARKERS: [&str; 3] = ["/user", "/profile", "/settings"];

/// 一行 endpoint 定义：(name, method, path)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRow {
    pub name: String,
    pub method: String,
    pub path: String,
}

impl EndpointRow {
    pub fn new(name: &str, method: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

/// SpecStore 每次成功修改之后发出的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecEvent {
    Loaded,
    BaseUrlChanged,
    HeadersChanged,
    EndpointsChanged,
    RoleAdded(String),
    RoleRemoved(String),
    ExpectationChanged { endpoint: usize, role: String },
    ExpectationsReset,
}

type Listener = Box<dyn Fn(&SpecEvent) + Send + Sync>;

/// 持有 SpecModel 的可变入口
///
/// 所有修改先校验再落地，失败时模型保持不变。执行引擎只会拿到
/// `snapshot()` 返回的拷贝，运行期间的编辑不会影响正在进行的测试。
pub struct SpecStore {
    spec: SpecModel,
    listeners: Vec<Listener>,
}

impl Default for SpecStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecStore {
    pub fn new() -> Self {
        Self::from_spec(SpecModel::with_defaults())
    }

    pub fn from_spec(spec: SpecModel) -> Self {
        Self {
            spec,
            listeners: Vec::new(),
        }
    }

    /// 注册修改监听器
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&SpecEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&self, event: SpecEvent) {
        debug!(?event, "spec changed");
        for listener in &self.listeners {
            listener(&event);
        }
    }

    pub fn spec(&self) -> &SpecModel {
        &self.spec
    }

    /// 给执行引擎用的不可变快照
    pub fn snapshot(&self) -> SpecModel {
        self.spec.clone()
    }

    pub fn load_from_content(&mut self, content: &str) -> Result<()> {
        let spec = convert::parse(content)?;
        self.replace(spec);
        Ok(())
    }

    pub fn replace(&mut self, spec: SpecModel) {
        self.spec = spec;
        self.emit(SpecEvent::Loaded);
    }

    pub fn set_base_url(&mut self, url: &str) {
        self.spec.base_url = url.trim().to_string();
        self.emit(SpecEvent::BaseUrlChanged);
    }

    /// 空 key 会被忽略
    pub fn set_header(&mut self, key: &str, value: &str) {
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        self.spec.default_headers.insert(key, value.to_string());
        self.emit(SpecEvent::HeadersChanged);
    }

    pub fn remove_header(&mut self, key: &str) {
        self.spec.default_headers.remove(key);
        self.emit(SpecEvent::HeadersChanged);
    }

    /// 解析批量输入的 endpoint 文本
    ///
    /// 每行支持以下形式，空行和 `#` 开头的行会被跳过:
    /// - `/users`
    /// - `GET /users`
    /// - `POST /login Login`
    /// - `/users List users`
    pub fn parse_endpoints_text(text: &str) -> Vec<EndpointRow> {
        let mut rows = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            let mut method = "GET".to_string();
            let path;
            let mut name;

            if parts.len() == 1 {
                path = parts[0].to_string();
                name = parts[0].to_string();
            } else if BULK_METHODS.contains(&parts[0].to_uppercase().as_str()) {
                method = parts[0].to_uppercase();
                path = parts[1].to_string();
                name = parts[2..].join(" ");
            } else {
                path = parts[0].to_string();
                name = parts[1..].join(" ");
            }

            let path = if path.starts_with('/') {
                path
            } else {
                format!("/{}", path)
            };
            if name.is_empty() {
                name = path.clone();
            }
            rows.push(EndpointRow { name, method, path });
        }

        rows
    }

    /// 整体替换 endpoint 列表，原有期望全部清空
    pub fn set_endpoints(&mut self, rows: Vec<EndpointRow>) {
        self.spec.endpoints = rows
            .into_iter()
            .map(|row| Endpoint::new(row.name, row.method, row.path))
            .collect();
        self.emit(SpecEvent::EndpointsChanged);
    }

    pub fn add_endpoint(&mut self, name: &str, method: &str, path: &str) -> usize {
        self.spec.endpoints.push(Endpoint::new(name, method, path));
        self.emit(SpecEvent::EndpointsChanged);
        self.spec.endpoints.len() - 1
    }

    /// 修改名称、方法和路径，保留已有期望
    pub fn update_endpoint(&mut self, index: usize, name: &str, method: &str, path: &str) -> Result<()> {
        self.check_index(index)?;
        let fresh = Endpoint::new(name, method, path);
        let endpoint = &mut self.spec.endpoints[index];
        endpoint.name = fresh.name;
        endpoint.method = fresh.method;
        endpoint.path = fresh.path;
        self.emit(SpecEvent::EndpointsChanged);
        Ok(())
    }

    pub fn delete_endpoint(&mut self, index: usize) -> Result<Endpoint> {
        self.check_index(index)?;
        let removed = self.spec.endpoints.remove(index);
        self.emit(SpecEvent::EndpointsChanged);
        Ok(removed)
    }

    /// 新增或覆盖角色，已有角色保持原来的列位置
    pub fn add_role(&mut self, id: &str, auth: Auth) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AuthMatrixError::validation("Role/Name is required"));
        }
        self.spec.roles.insert(id, Role::new(auth));
        self.emit(SpecEvent::RoleAdded(id.to_string()));
        Ok(())
    }

    /// 删除角色并清理所有对它的期望；角色不存在时什么也不做
    pub fn remove_role(&mut self, id: &str) -> bool {
        if self.spec.remove_role(id).is_none() {
            return false;
        }
        self.emit(SpecEvent::RoleRemoved(id.to_string()));
        true
    }

    pub fn set_expectation(&mut self, index: usize, role: &str, expectation: Expectation) -> Result<()> {
        self.check_index(index)?;
        if !self.spec.roles.contains_key(role) {
            return Err(AuthMatrixError::validation(format!(
                "Role '{}' does not exist",
                role
            )));
        }
        self.spec.endpoints[index]
            .expectations
            .insert(role, expectation);
        self.emit(SpecEvent::ExpectationChanged {
            endpoint: index,
            role: role.to_string(),
        });
        Ok(())
    }

    pub fn remove_expectation(&mut self, index: usize, role: &str) -> Result<()> {
        self.check_index(index)?;
        self.spec.endpoints[index].expectations.remove(role);
        self.emit(SpecEvent::ExpectationChanged {
            endpoint: index,
            role: role.to_string(),
        });
        Ok(())
    }

    pub fn has_configured_expectations(&self) -> bool {
        self.spec
            .endpoints
            .iter()
            .any(|endpoint| !endpoint.expectations.is_empty())
    }

    /// 按路径模式为所有 (endpoint, role) 填充默认期望
    ///
    /// - 公共路径 (`/`, `/health`, `/status`, `/info`, `/version` 前缀): 所有角色 200
    /// - 包含 `/admin`: 仅 admin 200，其余 403
    /// - 包含 `/user`, `/profile`, `/settings`: guest 403，其余 200
    /// - 其他: 仅 admin 200，其余 403
    ///
    /// 注意 `/` 是所有路径的前缀，所以实际效果是全部 200。
    pub fn auto_configure(&mut self) {
        let roles: Vec<String> = self.spec.role_ids().map(str::to_string).collect();

        for endpoint in &mut self.spec.endpoints {
            let path = endpoint.path.to_lowercase();
            let is_public = PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p));
            let is_admin = ADMIN_MARKERS.iter().any(|p| path.contains(p));
            let is_user = USER_MARKERS.iter().any(|p| path.contains(p));

            for role in &roles {
                let status = if is_public {
                    200
                } else if is_admin {
                    if role == "admin" { 200 } else { 403 }
                } else if is_user {
                    if role == GUEST_ROLE { 403 } else { 200 }
                } else if role == "admin" {
                    200
                } else {
                    403
                };
                endpoint
                    .expectations
                    .insert(role.as_str(), Expectation::status(status));
            }
        }

        self.emit(SpecEvent::ExpectationsReset);
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.spec.endpoints.len() {
            Ok(())
        } else {
            Err(AuthMatrixError::validation(format!(
                "Invalid endpoint index {} (have {})",
                index,
                self.spec.endpoints.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn store_with_endpoints() -> SpecStore {
        let mut store = SpecStore::new();
        store.add_role("admin", Auth::bearer("admin-token")).unwrap();
        store.add_endpoint("Users", "GET", "/users");
        store.add_endpoint("Admin", "DELETE", "/admin/users/1");
        store
    }

    #[test]
    fn test_new_store_has_guest_and_accept() {
        let store = SpecStore::new();
        assert!(store.spec().roles.contains_key("guest"));
        assert_eq!(
            store.spec().default_headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_parse_endpoints_text() {
        let text = "
# comment line
/users
GET /users/me
post /login Login Page
orders List orders
";
        let rows = SpecStore::parse_endpoints_text(text);
        assert_eq!(
            rows,
            vec![
                EndpointRow::new("/users", "GET", "/users"),
                EndpointRow::new("/users/me", "GET", "/users/me"),
                EndpointRow::new("Login Page", "POST", "/login"),
                EndpointRow::new("List orders", "GET", "/orders"),
            ]
        );
    }

    #[test]
    fn test_set_expectation_validation() {
        let mut store = store_with_endpoints();

        let err = store
            .set_expectation(0, "ghost", Expectation::status(200))
            .unwrap_err();
        assert!(matches!(err, AuthMatrixError::ValidationError(_)));

        let err = store
            .set_expectation(9, "admin", Expectation::status(200))
            .unwrap_err();
        assert!(matches!(err, AuthMatrixError::ValidationError(_)));

        assert!(!store.has_configured_expectations());

        store
            .set_expectation(0, "admin", Expectation::status(200))
            .unwrap();
        assert!(store.has_configured_expectations());
    }

    #[test]
    fn test_remove_role_cascades_and_notifies() {
        let mut store = store_with_endpoints();
        store
            .set_expectation(0, "admin", Expectation::status(200))
            .unwrap();
        store
            .set_expectation(0, "guest", Expectation::status(403))
            .unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        assert!(store.remove_role("admin"));
        assert!(!store.remove_role("admin"));

        let endpoint = &store.spec().endpoints[0];
        assert!(endpoint.expectation("admin").is_none());
        assert!(endpoint.expectation("guest").is_some());
        assert_eq!(
            *events.lock().unwrap(),
            vec![SpecEvent::RoleRemoved("admin".to_string())]
        );
    }

    #[test]
    fn test_add_role_upsert_keeps_position() {
        let mut store = store_with_endpoints();
        store.add_role("guest", Auth::bearer("x")).unwrap();
        let ids: Vec<_> = store.spec().role_ids().collect();
        assert_eq!(ids, vec!["guest", "admin"]);
        assert!(store.add_role("   ", Auth::None).is_err());
    }

    #[test]
    fn test_update_endpoint_keeps_expectations() {
        let mut store = store_with_endpoints();
        store
            .set_expectation(0, "guest", Expectation::status(403))
            .unwrap();
        store.update_endpoint(0, "Me", "get", "me").unwrap();

        let endpoint = &store.spec().endpoints[0];
        assert_eq!(endpoint.path, "/me");
        assert_eq!(endpoint.method, "GET");
        assert!(endpoint.expectation("guest").is_some());
        assert!(store.update_endpoint(5, "x", "GET", "/x").is_err());
    }

    #[test]
    fn test_delete_endpoint_out_of_range() {
        let mut store = store_with_endpoints();
        assert!(store.delete_endpoint(2).is_err());
        assert_eq!(store.spec().endpoints.len(), 2);
        assert_eq!(store.delete_endpoint(0).unwrap().name, "Users");
        assert_eq!(store.spec().endpoints.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = store_with_endpoints();
        let snapshot = store.snapshot();
        store.set_base_url("  https://changed.example.com ");
        assert_eq!(snapshot.base_url, "");
        assert_eq!(store.spec().base_url, "https://changed.example.com");
    }

    #[test]
    fn test_auto_configure_fills_every_cell() {
        let mut store = store_with_endpoints();
        store.auto_configure();
        for endpoint in &store.spec().endpoints {
            assert_eq!(endpoint.expectations.len(), 2);
        }
    }
}
