use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

use crate::http::types::reason_phrase;
use crate::runner::engine::RunOutcome;
use crate::runner::types::{CellStatus, ResultCell, ResultMatrix, RunSummary};
use crate::spec::SpecModel;

/// 终端输出：逐个单元格的进度行、结果矩阵表格和摘要
pub struct MatrixReporter {
    verbose: bool,
}

impl MatrixReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印运行开始
    pub fn print_header(&self, source: &str, spec: &SpecModel) {
        println!(
            "\nRunning {} endpoints x {} roles from {} against {}...\n",
            spec.endpoints.len(),
            spec.roles.len(),
            source.bold(),
            spec.base_url.cyan()
        );
    }

    /// 打印单个单元格结果
    pub fn print_cell(&self, endpoint: &str, role: &str, cell: &ResultCell) {
        match cell.status {
            CellStatus::Skip => {
                if self.verbose {
                    println!(" {} {} [{}] {}", "⊘".dimmed(), endpoint, role.cyan(), "(skipped)".dimmed());
                }
                return;
            }
            CellStatus::Pass => println!(
                " {} {} [{}] {}",
                "✓".green(),
                endpoint,
                role.cyan(),
                cell_detail(cell)
            ),
            CellStatus::Fail => println!(
                " {} {} [{}] {}",
                "✗".red(),
                endpoint,
                role.cyan(),
                cell_detail(cell)
            ),
        }

        if let Some(error) = &cell.error {
            println!("   {}: {}", "Error".red().bold(), error);
        }
        for failure in &cell.failures {
            println!("   {}", failure.red());
        }
    }

    /// 打印 endpoint x role 结果表
    pub fn print_matrix(&self, spec: &SpecModel, matrix: &ResultMatrix) {
        if matrix.is_empty() {
            return;
        }
        println!("\n{}", matrix_table(spec, matrix));
    }

    /// 打印摘要
    pub fn print_summary(&self, summary: &RunSummary, outcome: &RunOutcome) {
        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        println!(
            "  {}: {} passed, {} failed, {} skipped, {} total",
            "Cells".bold(),
            summary.passed.to_string().green(),
            summary.failed.to_string().red(),
            summary.skipped.to_string().dimmed(),
            summary.total
        );

        let outcome = match outcome {
            RunOutcome::Completed => "completed".green(),
            RunOutcome::Stopped => "stopped".yellow(),
            RunOutcome::Failed(message) => format!("failed: {}", message).red(),
            RunOutcome::Crashed => "engine exited unexpectedly".red(),
        };
        println!("  {}: {}", "Run".bold(), outcome);
        println!();
    }
}

impl Default for MatrixReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

/// "403 Forbidden (12ms)"，传输错误时为 "no response"
fn cell_detail(cell: &ResultCell) -> String {
    let Some(http) = cell.http else {
        return "no response".to_string();
    };
    let status = match reason_phrase(http) {
        "Unknown" => http.to_string(),
        phrase => format!("{} {}", http, phrase),
    };
    match cell.latency_ms {
        Some(latency) => format!("{} ({}ms)", status, latency),
        None => status,
    }
}

/// 表格里的单元格文本，例如 "PASS 403"
pub fn cell_label(cell: &ResultCell) -> String {
    match cell.http {
        Some(http) => format!("{} {}", cell.status.as_str(), http),
        None => cell.status.as_str().to_string(),
    }
}

/// 行为 endpoint，列为角色（按 spec 中的角色顺序）。没有结果的格子留空
pub fn matrix_table(spec: &SpecModel, matrix: &ResultMatrix) -> Table {
    let roles: Vec<&str> = spec.role_ids().collect();

    let mut header = vec!["Endpoint".to_string()];
    header.extend(roles.iter().map(|role| role.to_string()));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header);

    for row in matrix.rows() {
        let mut cells = vec![Cell::new(&row.endpoint)];
        for role in &roles {
            let cell = match row.cells.get(role) {
                Some(result) => {
                    let cell = Cell::new(cell_label(result));
                    match result.status {
                        CellStatus::Pass => cell.fg(Color::Green),
                        CellStatus::Fail => cell.fg(Color::Red),
                        CellStatus::Skip => cell.add_attribute(Attribute::Dim),
                    }
                }
                None => Cell::new(""),
            };
            cells.push(cell);
        }
        table.add_row(cells);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Auth, Role};

    #[test]
    fn test_cell_label() {
        assert_eq!(cell_label(&ResultCell::skipped()), "SKIP");
        assert_eq!(cell_label(&ResultCell::completed(403, 5, Vec::new())), "PASS 403");
        assert_eq!(cell_label(&ResultCell::transport_error("refused")), "FAIL");
    }

    #[test]
    fn test_cell_detail() {
        assert_eq!(cell_detail(&ResultCell::completed(403, 12, Vec::new())), "403 Forbidden (12ms)");
        assert_eq!(cell_detail(&ResultCell::completed(418, 3, Vec::new())), "418 (3ms)");
        assert_eq!(cell_detail(&ResultCell::transport_error("refused")), "no response");
    }

    #[test]
    fn test_matrix_table_layout() {
        let mut spec = SpecModel::with_defaults();
        spec.roles.insert("admin", Role::new(Auth::bearer("t")));

        let mut matrix = ResultMatrix::new();
        matrix.record(0, "Users", "guest", ResultCell::completed(403, 3, Vec::new()));
        matrix.record(0, "Users", "admin", ResultCell::completed(200, 4, Vec::new()));

        let rendered = matrix_table(&spec, &matrix).to_string();
        assert!(rendered.contains("Endpoint"));
        assert!(rendered.contains("guest"));
        assert!(rendered.contains("admin"));
        assert!(rendered.contains("PASS 403"));
        assert!(rendered.contains("PASS 200"));
    }
}
