pub mod cpmm;
pub mod legacy;

pub use cpmm::*;
pub use legacy::*;
