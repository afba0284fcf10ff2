pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod model;
pub mod parser;
pub mod perf;
pub mod runner;
pub mod utils;
pub mod variable;
pub mod verify;

// Re-export commonly used types
pub use error::{RestAssayError, Result, TestFailure};
