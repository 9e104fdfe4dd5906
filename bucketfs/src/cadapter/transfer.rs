//! Background bulk transfers (upload/download) with completion reporting.

use crate::error::StoreError;
use std::future::Future;
use tokio::task::{AbortHandle, JoinHandle};

/// Terminal state of a transfer.
#[derive(Debug)]
pub enum TransferState {
    Completed,
    Failed(StoreError),
    Canceled,
}

impl TransferState {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferState::Completed)
    }
}

/// A transfer running on the tokio runtime.
pub struct Transfer {
    key: String,
    task: JoinHandle<Result<(), StoreError>>,
}

impl Transfer {
    pub fn spawn<F>(key: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            task: tokio::spawn(fut),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> TransferState {
        match self.task.await {
            Ok(Ok(())) => TransferState::Completed,
            Ok(Err(e)) => TransferState::Failed(e),
            Err(e) if e.is_cancelled() => TransferState::Canceled,
            Err(e) => TransferState::Failed(StoreError::backend(e)),
        }
    }
}
