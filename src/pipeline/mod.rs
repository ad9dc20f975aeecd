//! Pipeline module - sample planning and gap filling.

mod fill;
mod plan;

pub use fill::*;
pub use plan::*;
