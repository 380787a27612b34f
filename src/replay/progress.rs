use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Filling,
    Submitting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub message: String,
    /// 0.0 to 1.0
    pub progress: f32,
}

impl ProgressUpdate {
    pub fn new(status: ProgressStatus, message: impl Into<String>, progress: f32) -> Self {
        Self {
            status,
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
        }
    }
}

/// Receives replay progress. Called inline, so keep it quick.
pub trait ProgressSink: Send + Sync {
    fn update(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn update(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Shared stop switch, checked between fields.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
