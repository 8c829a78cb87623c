use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use error_stack::Report;
use serde::Serialize;
use std::process::{ExitCode, Termination};
use tracing::{error, warn};

use kernel::KernelError;

#[derive(Debug)]
pub struct StackTrace(Report<KernelError>);

impl From<Report<KernelError>> for StackTrace {
    fn from(e: Report<KernelError>) -> Self {
        StackTrace(e)
    }
}

impl Termination for StackTrace {
    fn report(self) -> ExitCode {
        eprintln!("{:?}", self.0);
        ExitCode::FAILURE
    }
}

/// Every failure crosses the wire with a machine-readable kind and a
/// human-readable message; a bare status code tells a client nothing.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ErrorStatus(Report<KernelError>);

impl From<Report<KernelError>> for ErrorStatus {
    fn from(e: Report<KernelError>) -> Self {
        ErrorStatus(e)
    }
}

impl IntoResponse for ErrorStatus {
    fn into_response(self) -> axum::response::Response {
        let kind = *self.0.current_context();
        let status = match kind {
            KernelError::InvalidIdentifier
            | KernelError::InvalidRating
            | KernelError::CycleInactive
            | KernelError::InvalidStateTransition
            | KernelError::AmountMismatch
            | KernelError::VerificationFailed => StatusCode::BAD_REQUEST,
            KernelError::Unauthenticated => StatusCode::UNAUTHORIZED,
            KernelError::SelfRentalForbidden | KernelError::Forbidden => StatusCode::FORBIDDEN,
            KernelError::CycleNotFound
            | KernelError::RentalNotFound
            | KernelError::PaymentNotFound => StatusCode::NOT_FOUND,
            KernelError::CycleUnavailable
            | KernelError::RentalLimitExceeded
            | KernelError::TransientConflict => StatusCode::CONFLICT,
            KernelError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            KernelError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{:?}", self.0);
        } else {
            warn!("{:?}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: kind.kind(),
                message: kind.to_string(),
            }),
        )
            .into_response()
    }
}
