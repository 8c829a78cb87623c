use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::KernelError;

/// Post-hoc renter rating, 1 to 5 stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Rating(i16);

impl Rating {
    pub fn new(value: i16) -> error_stack::Result<Self, KernelError> {
        if !(1..=5).contains(&value) {
            return Err(Report::new(KernelError::InvalidRating)
                .attach_printable(format!("got {value}")));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i16> for Rating {
    type Error = KernelError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Rating::new(value).map_err(|report| *report.current_context())
    }
}

impl From<Rating> for i16 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

#[cfg(test)]
mod test {
    use super::Rating;

    #[test]
    fn bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(1).is_ok());
        assert!(Rating::new(5).is_ok());
        assert!(Rating::new(6).is_err());
    }
}
