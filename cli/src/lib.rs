//! Flotilla: durable node inventory plus a hardened SSH control plane
//! for provisioning and monitoring the agent service across a fleet.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cli;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod executor;
pub mod infra;
pub mod output;
pub mod plan;
pub mod preflight;
pub mod trust;
