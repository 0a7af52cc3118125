pub mod dirs;
pub mod id;
pub mod tokio;
