mod cycle;
mod rental;
mod settlement;

pub use self::{cycle::*, rental::*, settlement::*};
