//! Configuration loading and validation.

pub mod loader;
pub mod model;

pub use loader::{load, load_and_validate, Role};
pub use model::AppConfig;
