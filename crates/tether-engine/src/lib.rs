pub mod actions;
pub mod backend;
pub mod chat;
pub mod cli;
pub mod completion;
pub mod config;
pub mod executor;
pub mod formatter;
pub mod projects;
pub mod registry;
pub mod resolution;
pub mod validator;

pub use tether_common::error;
pub use tether_common::protocol;
