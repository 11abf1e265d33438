pub mod analysis;
pub mod config;
pub mod error;
pub mod feature;
pub mod gherkin;
pub mod io;
pub mod paths;
pub mod reconcile;

pub use error::{ForgeError, Result};
