use std::collections::HashMap;

use serde::Serialize;

use crate::spec::OrderedMap;

/// 单元格结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellStatus {
    Pass,
    Fail,
    Skip,
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Pass => "PASS",
            CellStatus::Fail => "FAIL",
            CellStatus::Skip => "SKIP",
        }
    }
}

/// 单个 (endpoint, role) 的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultCell {
    pub status: CellStatus,

    /// 实际的 HTTP 状态码（拿到响应时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<u16>,

    /// 传输错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 只有完成的请求才有耗时
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    /// 未满足的规则说明
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl ResultCell {
    pub fn skipped() -> Self {
        Self {
            status: CellStatus::Skip,
            http: None,
            error: None,
            latency_ms: None,
            failures: Vec::new(),
        }
    }

    pub fn completed(http: u16, latency_ms: u64, failures: Vec<String>) -> Self {
        let status = if failures.is_empty() {
            CellStatus::Pass
        } else {
            CellStatus::Fail
        };
        Self {
            status,
            http: Some(http),
            error: None,
            latency_ms: Some(latency_ms),
            failures,
        }
    }

    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            status: CellStatus::Fail,
            http: None,
            error: Some(error.into()),
            latency_ms: None,
            failures: Vec::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == CellStatus::Pass
    }
}

/// 结果矩阵的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub endpoint: String,
    pub cells: OrderedMap<ResultCell>,
}

/// endpoint -> role -> cell，按收到的顺序逐步填充
///
/// 行按 endpoint 下标区分，重名的 endpoint 不会互相覆盖。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultMatrix {
    rows: Vec<(usize, ResultRow)>,

    /// endpoint 下标 -> rows 中的位置
    #[serde(skip)]
    index: HashMap<usize, usize>,
}

impl ResultMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, endpoint_index: usize, endpoint: &str, role: &str, cell: ResultCell) {
        let rows = &mut self.rows;
        let position = *self.index.entry(endpoint_index).or_insert_with(|| {
            rows.push((
                endpoint_index,
                ResultRow {
                    endpoint: endpoint.to_string(),
                    cells: OrderedMap::new(),
                },
            ));
            rows.len() - 1
        });
        self.rows[position].1.cells.insert(role, cell);
    }

    /// 按 endpoint 名称查找，重名时取第一行
    pub fn get(&self, endpoint: &str, role: &str) -> Option<&ResultCell> {
        self.rows
            .iter()
            .find(|(_, row)| row.endpoint == endpoint)
            .and_then(|(_, row)| row.cells.get(role))
    }

    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().map(|(_, row)| row)
    }

    pub fn cells(&self) -> impl Iterator<Item = &ResultCell> {
        self.rows().flat_map(|row| row.cells.values())
    }

    pub fn len(&self) -> usize {
        self.cells().count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_cells(self.cells())
    }
}

/// 执行摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_cells<'a>(cells: impl Iterator<Item = &'a ResultCell>) -> Self {
        let mut summary = RunSummary::default();
        for cell in cells {
            summary.total += 1;
            match cell.status {
                CellStatus::Pass => summary.passed += 1,
                CellStatus::Fail => summary.failed += 1,
                CellStatus::Skip => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
