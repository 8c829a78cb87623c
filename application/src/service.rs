mod cycle;
mod rental;
mod settlement;
mod sweep;
mod sync;

pub use self::{cycle::*, rental::*, settlement::*, sweep::*, sync::*};
