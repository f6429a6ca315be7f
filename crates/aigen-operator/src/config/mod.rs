pub mod cli;
pub mod controller;

pub use cli::*;
pub use controller::*;
