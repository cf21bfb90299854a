use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::convert::{spec_to_postman, spec_to_postman_per_role};
use crate::spec::{AUTHMATRIX_MARKER, OrderedMap, SpecModel};
use crate::{AuthMatrixError, Result};

/// 导出的目标格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    AuthMatrix,
    Postman,
}

/// 把 SpecModel 渲染为文档字符串
pub struct Exporter;

impl Exporter {
    /// 带 `#!AUTHMATRIX` 标记行的文档，写出时标记是必需的
    pub fn to_authmatrix(spec: &SpecModel) -> Result<String> {
        Ok(format!("{}\n{}", AUTHMATRIX_MARKER, spec.to_json_pretty()?))
    }

    /// 单个 Postman 集合，不包含认证
    pub fn to_postman(spec: &SpecModel) -> Result<String> {
        Ok(serde_json::to_string_pretty(&spec_to_postman(spec))?)
    }

    pub fn render(spec: &SpecModel, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::AuthMatrix => Self::to_authmatrix(spec),
            ExportFormat::Postman => Self::to_postman(spec),
        }
    }

    /// 每个角色一个 Postman 集合，key 为角色 id
    pub fn to_postman_per_role(spec: &SpecModel) -> Result<OrderedMap<String>> {
        let mut documents = OrderedMap::new();
        for (role, collection) in spec_to_postman_per_role(spec).iter() {
            documents.insert(role, serde_json::to_string_pretty(collection)?);
        }
        Ok(documents)
    }

    pub fn write_to<W: Write>(sink: &mut W, document: &str) -> Result<()> {
        sink.write_all(document.as_bytes())?;
        if !document.ends_with('\n') {
            sink.write_all(b"\n")?;
        }
        sink.flush()?;
        Ok(())
    }

    /// 写出 `<role>.postman_collection.json` 文件，返回写入的路径
    pub fn write_per_role(spec: &SpecModel, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for (role, document) in Self::to_postman_per_role(spec)?.iter() {
            if role.contains(['/', '\\']) || role == ".." {
                return Err(AuthMatrixError::validation(format!(
                    "role id '{}' cannot be used as a file name",
                    role
                )));
            }
            let path = dir.join(format!("{}.postman_collection.json", role));
            let mut file = fs::File::create(&path)?;
            Self::write_to(&mut file, document)?;
            written.push(path);
        }

        info!(count = written.len(), dir = %dir.display(), "wrote role collections");
        Ok(written)
    }
}
