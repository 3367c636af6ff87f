//! Declarative playbook runner with container re-entry and Kubernetes jobs.
//!
//! A playbook is an ordered list of steps. Each step either runs on the host, or
//! is re-run inside a fresh container by invoking this program again with the
//! step's index, or submits a Kubernetes Job and waits for its pods.
//!
//! - **[`core`]**: Pure logic (context layering, container invocations, resume
//!   protocol, pod phase reduction, polling policy). No I/O.
//! - **[`io`]**: Side effects (config and playbook files, processes, container
//!   detection, the cluster API). Behind traits where tests need doubles.
//!
//! [`orchestrator`], [`bridge`], [`provision`] and [`watch`] combine the two;
//! [`play`] wires them up for the command line.

pub mod actions;
pub mod bridge;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod play;
pub mod provision;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod watch;
