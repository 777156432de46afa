//! Test Helper Utilities
//!
//! Shared utilities for testing festreg-client

#![allow(dead_code, unused_imports)]

pub mod fake_backend;
pub mod fixtures;
pub mod mock_server;

// Re-export commonly used items
pub use fake_backend::{FailingStore, FakeBackend, SwitchableStore};
pub use fixtures::{
    accompanist, drain, fee_payment, manager, pdf_file, png_file, student, t0, Harness,
    PDF_BYTES, PNG_BYTES, TTL_SECONDS,
};
pub use mock_server::{closed_port_url, spawn_server, spawn_server_with};
