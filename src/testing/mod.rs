//! Test doubles shared by the runtime tests
//!
//! - [`MockLauncher`]: a scripted process boundary
//! - helpers for draining session events

pub mod mocks;

pub use mocks::{collect_until_terminal, MockLauncher};
