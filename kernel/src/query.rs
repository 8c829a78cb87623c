mod cycle;
mod payment;
mod rental;

pub use self::{cycle::*, payment::*, rental::*};
