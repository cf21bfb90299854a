pub mod merge;
pub mod postman;

use serde_json::Value;
use tracing::debug;

use crate::spec::{AUTHMATRIX_MARKER, SpecModel};
use crate::{AuthMatrixError, Result};

// Re-export commonly used types
pub use merge::{AccessGroup, RoleCollection, analyze_access, merge_multi, suggest_role_name};
pub use postman::{
    PostmanCollection, extract_base_url, extract_endpoints, postman_to_spec, spec_to_postman,
    spec_to_postman_per_role,
};

/// 输入文档的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// 第一行是 `#!AUTHMATRIX` 标记
    AuthMatrix,
    /// 同时有 `info` 和 `item` 的 Postman 集合
    Postman,
    /// 没有标记行的 AuthMatrix JSON
    BareAuthMatrix,
}

fn has_marker(text: &str) -> bool {
    text.lines().next().map(str::trim) == Some(AUTHMATRIX_MARKER)
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| AuthMatrixError::format(format!("invalid JSON: {}", e)))
}

/// 判断文档格式。没有标记行时需要解析 JSON，JSON 无效会返回 FormatError
pub fn detect_format(text: &str) -> Result<DocumentFormat> {
    if has_marker(text) {
        return Ok(DocumentFormat::AuthMatrix);
    }
    let value = parse_json(text)?;
    if postman::is_postman_collection(&value) {
        Ok(DocumentFormat::Postman)
    } else {
        Ok(DocumentFormat::BareAuthMatrix)
    }
}

/// 解析任意支持的文档为 SpecModel
pub fn parse(text: &str) -> Result<SpecModel> {
    if has_marker(text) {
        let body = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        debug!("parsing AuthMatrix document");
        return SpecModel::from_json(body);
    }

    let value = parse_json(text)?;
    if postman::is_postman_collection(&value) {
        debug!("parsing Postman collection");
        Ok(postman_to_spec(&value))
    } else {
        debug!("parsing AuthMatrix JSON without marker");
        SpecModel::from_json(text)
    }
}

/// 解析单个 Postman 集合文本，供多集合合并使用
pub fn parse_collection(text: &str) -> Result<Value> {
    let value = parse_json(text)?;
    if !postman::is_postman_collection(&value) {
        return Err(AuthMatrixError::format(
            "not a Postman collection: missing 'info' or 'item'",
        ));
    }
    Ok(value)
}
