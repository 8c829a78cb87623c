use serde::{Deserialize, Serialize};

use crate::KernelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    Active,
    Completed,
    Cancelled,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RentalStatus {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RentalStatus::Active),
            "completed" => Ok(RentalStatus::Completed),
            "cancelled" => Ok(RentalStatus::Cancelled),
            _ => Err(KernelError::Internal),
        }
    }
}

/// Settlement state as the ledger tracks it, separate from the payment
/// record's own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalPaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl RentalPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalPaymentStatus::Pending => "pending",
            RentalPaymentStatus::Paid => "paid",
            RentalPaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RentalPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RentalPaymentStatus {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RentalPaymentStatus::Pending),
            "paid" => Ok(RentalPaymentStatus::Paid),
            "failed" => Ok(RentalPaymentStatus::Failed),
            _ => Err(KernelError::Internal),
        }
    }
}
