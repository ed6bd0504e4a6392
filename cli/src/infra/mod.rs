//! Infrastructure layer — disk persistence and the SSH transport.

pub mod fs;
pub mod inventory;
pub mod known_hosts;
pub mod lock;
pub mod ssh;
