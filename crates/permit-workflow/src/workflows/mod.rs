pub mod error;
pub mod fees;
pub mod memory;
pub mod review;

pub use error::{
    ConflictError, RepositoryError, UpstreamError, ValidationError, WorkflowError,
};

use tracing::{debug, warn};

/// Log a failed operation at the level its category deserves and pass the result through.
///
/// Boundary rejections are expected traffic and stay at debug; upstream failures are faults.
pub(crate) fn observe<T>(
    operation: &'static str,
    subject: &str,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    if let Err(err) = &result {
        if err.is_retryable() {
            warn!(operation, subject, error = %err, "upstream failure; request may be retried");
        } else {
            debug!(operation, subject, kind = err.kind(), error = %err, "request rejected");
        }
    }
    result
}
