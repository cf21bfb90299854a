pub mod engine;
pub mod evaluate;
pub mod reporter;
pub mod stream;
pub mod types;

pub use engine::{ExecutionEngine, RunHandle, RunOutcome, RunReport, build_request, request_url};
pub use evaluate::evaluate;
pub use reporter::MatrixReporter;
pub use stream::{Poll, ResultSender, ResultStream, RunMessage, StreamEvent};
pub use types::{CellStatus, ResultCell, ResultMatrix, ResultRow, RunSummary};
