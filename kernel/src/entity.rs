mod common;
mod cycle;
mod payment;
mod rental;
mod user;

pub use self::{common::*, cycle::*, payment::*, rental::*, user::*};
