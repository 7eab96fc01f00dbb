//! GeoHIS math utilities.

pub mod math;

pub use math::gamma::*;
pub use math::normal::*;
pub use math::quantile::*;
pub use math::stable::*;
