use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, info};

use crate::convert::postman::{collection_auth, extract_base_url, extract_endpoints};
use crate::spec::{Endpoint, Expectation, GUEST_ROLE, Role, SpecModel};

/// 有权限时期望的状态码
pub const ALLOWED_STATUS: u16 = 200;

/// 无权限时期望的状态码
pub const DENIED_STATUS: u16 = 403;

/// 一个角色及其导出的 Postman 集合
#[derive(Debug, Clone)]
pub struct RoleCollection {
    pub role: String,
    pub collection: Value,
}

impl RoleCollection {
    pub fn new(role: impl Into<String>, collection: Value) -> Self {
        Self {
            role: role.into(),
            collection,
        }
    }
}

/// (method, path)
pub type EndpointKey = (String, String);

/// 按 (method, path) 分组后的 endpoint
struct Group {
    key: EndpointKey,
    name: String,
    roles: BTreeSet<String>,
}

/// 按首次出现的顺序分组；显示名取第一次出现的那个
fn group_endpoints(inputs: &[RoleCollection]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<EndpointKey, usize> = HashMap::new();

    for input in inputs {
        for endpoint in extract_endpoints(&input.collection) {
            let key = (endpoint.method, endpoint.path);
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(Group {
                    key,
                    name: endpoint.name,
                    roles: BTreeSet::new(),
                });
                groups.len() - 1
            });
            groups[slot].roles.insert(input.role.clone());
        }
    }

    groups
}

/// 合并多个单角色集合，推断每个角色对每个 endpoint 的访问权限
///
/// 规则：某个角色自己的集合声明了 (method, path)，就期望 200，否则期望 403。
/// guest 角色总会存在；base_url 取自第一个集合。
pub fn merge_multi(inputs: &[RoleCollection]) -> SpecModel {
    let mut spec = SpecModel::with_defaults();

    if let Some(first) = inputs.first() {
        spec.base_url = extract_base_url(&first.collection);
    }

    for input in inputs {
        spec.roles
            .insert(input.role.as_str(), Role::new(collection_auth(&input.collection)));
    }

    let role_ids: Vec<String> = spec.role_ids().map(str::to_string).collect();

    spec.endpoints = group_endpoints(inputs)
        .into_iter()
        .map(|group| {
            let (method, path) = group.key;
            let mut endpoint = Endpoint::new(group.name, method, path);
            for role in &role_ids {
                let status = if group.roles.contains(role) {
                    ALLOWED_STATUS
                } else {
                    DENIED_STATUS
                };
                endpoint
                    .expectations
                    .insert(role.as_str(), Expectation::status(status));
            }
            endpoint
        })
        .collect();

    info!(
        collections = inputs.len(),
        roles = spec.roles.len(),
        endpoints = spec.endpoints.len(),
        "merged role collections"
    );
    spec
}

/// 具有相同可访问角色集合的一组 endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGroup {
    pub roles: BTreeSet<String>,
    pub endpoints: Vec<EndpointKey>,
}

/// 合并前的访问模式分析，按角色集合归类
pub fn analyze_access(inputs: &[RoleCollection]) -> Vec<AccessGroup> {
    let mut patterns: Vec<AccessGroup> = Vec::new();

    for group in group_endpoints(inputs) {
        match patterns.iter_mut().find(|p| p.roles == group.roles) {
            Some(pattern) => pattern.endpoints.push(group.key),
            None => patterns.push(AccessGroup {
                roles: group.roles,
                endpoints: vec![group.key],
            }),
        }
    }

    debug!(patterns = patterns.len(), "analyzed access patterns");
    patterns
}

/// 根据集合名称猜测角色名
pub fn suggest_role_name(collection_name: &str) -> String {
    let lower = collection_name.to_lowercase();
    if lower.contains("admin") {
        "admin".to_string()
    } else if lower.contains("user") {
        "user".to_string()
    } else if lower.contains(GUEST_ROLE) || lower.contains("public") {
        GUEST_ROLE.to_string()
    } else if lower.contains("moderator") || lower.contains("mod") {
        "moderator".to_string()
    } else {
        collection_name
            .split_whitespace()
            .next()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "role".to_string())
    }
}
