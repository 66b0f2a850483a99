pub mod coordinator;
pub mod file;
pub mod user;
