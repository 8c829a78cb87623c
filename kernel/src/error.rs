use std::fmt::Display;

use error_stack::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    InvalidIdentifier,
    CycleNotFound,
    CycleUnavailable,
    CycleInactive,
    SelfRentalForbidden,
    RentalLimitExceeded,
    RentalNotFound,
    PaymentNotFound,
    InvalidStateTransition,
    InvalidRating,
    Forbidden,
    Unauthenticated,
    AmountMismatch,
    VerificationFailed,
    TransientConflict,
    UpstreamTimeout,
    Internal,
}

impl KernelError {
    /// Machine-readable error kind reported to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::InvalidIdentifier => "INVALID_IDENTIFIER",
            KernelError::CycleNotFound => "CYCLE_NOT_FOUND",
            KernelError::CycleUnavailable => "CYCLE_UNAVAILABLE",
            KernelError::CycleInactive => "CYCLE_INACTIVE",
            KernelError::SelfRentalForbidden => "SELF_RENTAL_FORBIDDEN",
            KernelError::RentalLimitExceeded => "RENTAL_LIMIT_EXCEEDED",
            KernelError::RentalNotFound => "RENTAL_NOT_FOUND",
            KernelError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            KernelError::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            KernelError::InvalidRating => "INVALID_RATING",
            KernelError::Forbidden => "FORBIDDEN",
            KernelError::Unauthenticated => "UNAUTHENTICATED",
            KernelError::AmountMismatch => "AMOUNT_MISMATCH",
            KernelError::VerificationFailed => "VERIFICATION_FAILED",
            KernelError::TransientConflict => "TRANSIENT_CONFLICT",
            KernelError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            KernelError::Internal => "INTERNAL",
        }
    }

    /// Retryable errors are transient: the operation may succeed when
    /// reissued, and a local timeout is never proof of remote failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KernelError::TransientConflict | KernelError::UpstreamTimeout
        )
    }
}

impl Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::InvalidIdentifier => write!(f, "Identifier is not well-formed"),
            KernelError::CycleNotFound => write!(f, "Cycle not found"),
            KernelError::CycleUnavailable => write!(f, "Cycle is already rented"),
            KernelError::CycleInactive => write!(f, "Cycle is not published by its owner"),
            KernelError::SelfRentalForbidden => write!(f, "Owners cannot rent their own cycle"),
            KernelError::RentalLimitExceeded => write!(f, "Renter already has an active rental"),
            KernelError::RentalNotFound => write!(f, "Rental not found"),
            KernelError::PaymentNotFound => write!(f, "Payment not found"),
            KernelError::InvalidStateTransition => {
                write!(f, "Operation is not valid in the current state")
            }
            KernelError::InvalidRating => write!(f, "Rating must be between 1 and 5"),
            KernelError::Forbidden => write!(f, "Not authorized to perform this operation"),
            KernelError::Unauthenticated => write!(f, "Credential could not be verified"),
            KernelError::AmountMismatch => {
                write!(f, "Payment amount does not match the rental cost")
            }
            KernelError::VerificationFailed => write!(f, "Gateway transaction verification failed"),
            KernelError::TransientConflict => write!(f, "Concurrent update conflict"),
            KernelError::UpstreamTimeout => write!(f, "Upstream call timed out"),
            KernelError::Internal => write!(f, "Internal error"),
        }
    }
}

impl Context for KernelError {}
