//! Command implementations

pub mod add;
pub mod bootstrap;
pub mod list;
pub mod ping;
pub mod remove;
pub mod show;
pub mod status;
pub mod version;
