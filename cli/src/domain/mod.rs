//! Domain layer — typed errors and validation rules, free of I/O.

pub mod error;
pub mod validate;
