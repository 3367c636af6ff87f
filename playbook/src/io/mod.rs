//! Filesystem, process and network edges.

pub mod cluster;
pub mod config;
pub mod playbook;
pub mod probe;
pub mod process;
