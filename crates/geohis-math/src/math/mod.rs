//! Core math modules.

pub mod gamma;
pub mod normal;
pub mod quantile;
pub mod stable;
