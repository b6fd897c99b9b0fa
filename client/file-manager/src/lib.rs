pub mod in_memory;
pub mod traits;
pub mod types;

const LOG_TARGET: &str = "file-storage";
