//! Schema module - Record layouts, populations and configuration types.

mod config;
mod descriptor;
mod params;
mod population;

pub use config::*;
pub use descriptor::*;
pub use params::*;
pub use population::*;
