use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::runner::types::ResultCell;

/// 引擎发往消费者的有序消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMessage {
    Result {
        endpoint_index: usize,
        endpoint: String,
        role: String,
        cell: ResultCell,
    },
    Done,
    Stopped,
}

impl RunMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunMessage::Done | RunMessage::Stopped)
    }
}

/// 消费者看到的事件：主通道消息，或 ERROR 旁路通道上的致命错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Message(RunMessage),
    Error(String),
}

/// 非阻塞轮询的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    Ready(StreamEvent),
    /// 暂时没有新消息
    Pending,
    /// 两个通道都已关闭，之后不会再有消息
    Closed,
}

/// 引擎一侧的发送端
#[derive(Debug, Clone)]
pub struct ResultSender {
    messages: UnboundedSender<RunMessage>,
    errors: UnboundedSender<String>,
}

impl ResultSender {
    /// 消费者已经离开时返回 false
    pub fn result(&self, endpoint_index: usize, endpoint: &str, role: &str, cell: ResultCell) -> bool {
        self.messages
            .send(RunMessage::Result {
                endpoint_index,
                endpoint: endpoint.to_string(),
                role: role.to_string(),
                cell,
            })
            .is_ok()
    }

    pub fn done(&self) -> bool {
        self.messages.send(RunMessage::Done).is_ok()
    }

    pub fn stopped(&self) -> bool {
        self.messages.send(RunMessage::Stopped).is_ok()
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.errors.send(message.into()).is_ok()
    }
}

/// 消费者一侧：按发送顺序读取消息，并持有取消信号
#[derive(Debug)]
pub struct ResultStream {
    messages: UnboundedReceiver<RunMessage>,
    errors: UnboundedReceiver<String>,
    cancel: CancellationToken,
    messages_closed: bool,
    errors_closed: bool,
}

/// 创建一对发送端 / 接收端
pub fn channel(cancel: CancellationToken) -> (ResultSender, ResultStream) {
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        ResultSender {
            messages: message_tx,
            errors: error_tx,
        },
        ResultStream {
            messages: message_rx,
            errors: error_rx,
            cancel,
            messages_closed: false,
            errors_closed: false,
        },
    )
}

impl ResultStream {
    /// 请求停止。可以重复调用
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 不阻塞地取下一条事件，ERROR 旁路优先
    pub fn try_next(&mut self) -> Poll {
        if !self.errors_closed {
            match self.errors.try_recv() {
                Ok(message) => return Poll::Ready(StreamEvent::Error(message)),
                Err(TryRecvError::Disconnected) => self.errors_closed = true,
                Err(TryRecvError::Empty) => {}
            }
        }

        if !self.messages_closed {
            match self.messages.try_recv() {
                Ok(message) => return Poll::Ready(StreamEvent::Message(message)),
                Err(TryRecvError::Disconnected) => self.messages_closed = true,
                Err(TryRecvError::Empty) => {}
            }
        }

        if self.errors_closed && self.messages_closed {
            Poll::Closed
        } else {
            Poll::Pending
        }
    }

    /// 等待下一条事件；两个通道都关闭后返回 None
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if self.errors_closed && self.messages_closed {
                return None;
            }
            tokio::select! {
                biased;
                error = self.errors.recv(), if !self.errors_closed => match error {
                    Some(message) => return Some(StreamEvent::Error(message)),
                    None => self.errors_closed = true,
                },
                message = self.messages.recv(), if !self.messages_closed => match message {
                    Some(message) => return Some(StreamEvent::Message(message)),
                    None => self.messages_closed = true,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (tx, mut stream) = channel(CancellationToken::new());
        tx.result(0, "a", "guest", ResultCell::skipped());
        tx.result(0, "a", "admin", ResultCell::skipped());
        tx.done();
        drop(tx);

        let mut roles = Vec::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Message(RunMessage::Result { role, .. }) => roles.push(role),
                StreamEvent::Message(message) => assert!(message.is_terminal()),
                StreamEvent::Error(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(roles, vec!["guest", "admin"]);
    }

    #[test]
    fn test_try_next_states() {
        let (tx, mut stream) = channel(CancellationToken::new());
        assert_eq!(stream.try_next(), Poll::Pending);

        tx.error("bad snapshot");
        tx.stopped();
        assert_eq!(
            stream.try_next(),
            Poll::Ready(StreamEvent::Error("bad snapshot".to_string()))
        );
        assert_eq!(
            stream.try_next(),
            Poll::Ready(StreamEvent::Message(RunMessage::Stopped))
        );

        drop(tx);
        assert_eq!(stream.try_next(), Poll::Closed);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        let (_tx, stream) = channel(token.clone());
        stream.cancel();
        stream.cancel();
        assert!(token.is_cancelled());
        assert!(stream.is_cancelled());
    }

    #[test]
    fn test_sender_reports_dropped_consumer() {
        let (tx, stream) = channel(CancellationToken::new());
        drop(stream);
        assert!(!tx.done());
        assert!(!tx.result(0, "a", "b", ResultCell::skipped()));
    }
}
