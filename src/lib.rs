pub mod batch;
pub mod build;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod git;
pub mod github;
pub mod import;
pub mod session;
pub mod worker;

pub use error::{MergerError, MergerResult};
