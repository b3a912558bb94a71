pub mod engine;
pub mod loader;
pub mod models;

pub use engine::PlateEngine;
pub use loader::{load_capture_script, parse_capture_script};
