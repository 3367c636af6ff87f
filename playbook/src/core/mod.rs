//! Deterministic, pure logic shared by the playbook engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (playbook documents, resolved contexts, pod listings) and return
//! deterministic outputs suitable for tests.

pub mod container;
pub mod context;
pub mod phase;
pub mod poll;
pub mod resume;
pub mod types;
