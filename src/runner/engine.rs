use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{AuthMatrixError, Result};
use crate::config::EngineConfig;
use crate::http::{Client, Method, Request};
use crate::runner::evaluate::evaluate;
use crate::runner::stream::{self, Poll, ResultSender, ResultStream, RunMessage, StreamEvent};
use crate::runner::types::{ResultCell, ResultMatrix};
use crate::spec::{Auth, Endpoint, Role, SpecModel};

/// 一次运行的结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 收到 DONE
    Completed,
    /// 收到 STOPPED
    Stopped,
    /// ERROR 旁路通道上的致命错误
    Failed(String),
    /// 通道关闭却没有收到任何终止消息
    Crashed,
}

/// 引擎内部的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Done,
    Stopped,
    Aborted,
}

/// 执行引擎：按 endpoint 优先、role 其次的顺序逐个单元格串行执行
pub struct ExecutionEngine {
    client: Client,
}

impl ExecutionEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            client: Client::with_timeout(config.timeout(), config.user_agent.as_deref())?,
        })
    }

    /// 拷贝快照并在独立的 tokio 任务中运行，立即返回句柄
    pub fn start(self, spec: &SpecModel) -> RunHandle {
        let snapshot = spec.clone();
        let cancel = CancellationToken::new();
        let (tx, stream) = stream::channel(cancel.clone());

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        let task = tokio::spawn(
            async move {
                self.run(&snapshot, &tx, &cancel).await;
            }
            .instrument(span),
        );

        RunHandle { stream, task }
    }

    /// 在当前任务中执行整个矩阵，所有结果写入 `tx`
    pub async fn run(&self, spec: &SpecModel, tx: &ResultSender, cancel: &CancellationToken) {
        if let Err(reason) = spec.validate() {
            warn!(reason = %reason, "refusing to run malformed spec");
            tx.error(AuthMatrixError::EngineFatal(reason).to_string());
            return;
        }

        info!(
            endpoints = spec.endpoints.len(),
            roles = spec.roles.len(),
            base_url = %spec.base_url,
            "starting run"
        );

        match self.run_cells(spec, tx, cancel).await {
            Termination::Done => {
                info!("run finished");
                tx.done();
            }
            Termination::Stopped => {
                info!("run stopped by cancellation");
                tx.stopped();
            }
            Termination::Aborted => debug!("consumer went away, abandoning run"),
        }
    }

    async fn run_cells(&self, spec: &SpecModel, tx: &ResultSender, cancel: &CancellationToken) -> Termination {
        for (index, endpoint) in spec.endpoints.iter().enumerate() {
            for (role_id, role) in spec.roles.iter() {
                // 只在两个单元格之间检查取消，进行中的请求会正常完成或超时
                if cancel.is_cancelled() {
                    return Termination::Stopped;
                }
                let cell = self.execute_cell(spec, endpoint, role_id, role).await;
                if !tx.result(index, &endpoint.name, role_id, cell) {
                    return Termination::Aborted;
                }
            }
        }
        Termination::Done
    }

    async fn execute_cell(&self, spec: &SpecModel, endpoint: &Endpoint, role_id: &str, role: &Role) -> ResultCell {
        let Some(expectation) = endpoint.expectation(role_id) else {
            return ResultCell::skipped();
        };

        let request = match build_request(spec, endpoint, role) {
            Ok(request) => request,
            Err(e) => return ResultCell::transport_error(format!("Failed to build request: {}", e)),
        };

        match self.client.execute(request).await {
            Ok(response) => {
                let cell = evaluate(expectation, &response);
                debug!(
                    endpoint = %endpoint.name,
                    role = role_id,
                    http = response.status,
                    latency_ms = response.latency_ms(),
                    status = cell.status.as_str(),
                    "cell evaluated"
                );
                cell
            }
            Err(e) => {
                debug!(endpoint = %endpoint.name, role = role_id, error = %e, "request failed");
                ResultCell::transport_error(format!("Request failed: {}", e))
            }
        }
    }
}

/// base_url（去掉末尾的 "/"）直接拼接 endpoint 路径，不再做其他处理
pub fn request_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// 默认 headers 的拷贝，bearer 角色额外设置 Authorization
pub fn build_request(spec: &SpecModel, endpoint: &Endpoint, role: &Role) -> Result<Request> {
    let method = Method::parse(&endpoint.method)?;
    let mut request = Request::new(method, request_url(&spec.base_url, &endpoint.path));

    for (key, value) in spec.default_headers.iter() {
        request = request.with_header(key, value)?;
    }
    if let Auth::Bearer { token } = &role.auth {
        request = request.with_auth_bearer(token)?;
    }

    Ok(request)
}

/// 正在进行的运行。消费者通过它读取结果、发出取消，必要时强制终止
pub struct RunHandle {
    stream: ResultStream,
    task: JoinHandle<()>,
}

/// 运行结束后汇总的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub matrix: ResultMatrix,
    pub outcome: RunOutcome,
}

impl RunHandle {
    pub fn stream(&mut self) -> &mut ResultStream {
        &mut self.stream
    }

    pub fn cancel(&self) {
        self.stream.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 非阻塞地取出当前所有可用消息并写入 matrix，适合定时轮询的消费者。
    /// 运行结束时返回 Some(outcome)
    pub fn poll(&mut self, matrix: &mut ResultMatrix) -> Option<RunOutcome> {
        self.poll_with(matrix, |_, _, _| {})
    }

    /// 同 `poll`，每个新单元格额外调用 `on_cell(endpoint, role, cell)`
    pub fn poll_with<F>(&mut self, matrix: &mut ResultMatrix, mut on_cell: F) -> Option<RunOutcome>
    where
        F: FnMut(&str, &str, &ResultCell),
    {
        loop {
            match self.stream.try_next() {
                Poll::Ready(event) => {
                    if let Some(outcome) = apply(event, matrix, &mut on_cell) {
                        return Some(outcome);
                    }
                }
                Poll::Pending => return None,
                Poll::Closed => return Some(RunOutcome::Crashed),
            }
        }
    }

    /// 读取直到运行结束，每个单元格到达时调用 `on_cell(endpoint, role, cell)`
    pub async fn drain<F>(mut self, mut on_cell: F) -> RunReport
    where
        F: FnMut(&str, &str, &ResultCell),
    {
        let mut matrix = ResultMatrix::new();
        let outcome = loop {
            match self.stream.next().await {
                Some(event) => {
                    if let Some(outcome) = apply(event, &mut matrix, &mut on_cell) {
                        break outcome;
                    }
                }
                None => break RunOutcome::Crashed,
            }
        };

        // 终止消息之后任务很快就会退出；崩溃时 join 会返回 panic 错误
        if let Err(e) = self.task.await {
            warn!(error = %e, "engine task ended abnormally");
        }

        RunReport { matrix, outcome }
    }

    /// 发出取消，等待最多 `grace` 让引擎自行退出，超时则强制终止任务。
    /// 引擎按时退出返回 true
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "engine did not stop in time, aborting");
                self.task.abort();
                false
            }
        }
    }
}

fn apply<F>(event: StreamEvent, matrix: &mut ResultMatrix, on_cell: &mut F) -> Option<RunOutcome>
where
    F: FnMut(&str, &str, &ResultCell),
{
    match event {
        StreamEvent::Message(RunMessage::Result {
            endpoint_index,
            endpoint,
            role,
            cell,
        }) => {
            on_cell(&endpoint, &role, &cell);
            matrix.record(endpoint_index, &endpoint, &role, cell);
            None
        }
        StreamEvent::Message(RunMessage::Done) => Some(RunOutcome::Completed),
        StreamEvent::Message(RunMessage::Stopped) => Some(RunOutcome::Stopped),
        StreamEvent::Error(message) => Some(RunOutcome::Failed(message)),
    }
}
