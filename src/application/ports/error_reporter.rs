use crate::shared::error::AppError;
use tracing::error;

/// Sink for run-level failures, in addition to the `fail` event.
pub trait ErrorReporter: Send + Sync {
    fn capture(&self, error: &AppError);
}

/// Default reporter: structured error log, nothing else.
#[derive(Debug, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn capture(&self, error: &AppError) {
        error!(error = %error, "backup engine error captured");
    }
}
