mod geo;

pub use self::geo::*;
