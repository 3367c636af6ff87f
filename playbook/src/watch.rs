//! Waiting for a submitted job's pods to settle.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::phase::{TerminalPhases, job_pods};
use crate::core::poll::{CancelToken, PollPolicy, Sleeper, poll_until};
use crate::io::cluster::{ClusterApi, ResourceHandle, ResourceKind};

pub struct JobWatcher<'a> {
    api: &'a dyn ClusterApi,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
    terminal: TerminalPhases,
    cancel: CancelToken,
}

impl<'a> JobWatcher<'a> {
    pub fn new(
        api: &'a dyn ClusterApi,
        sleeper: &'a dyn Sleeper,
        policy: PollPolicy,
        terminal: TerminalPhases,
    ) -> Self {
        Self {
            api,
            sleeper,
            policy,
            terminal,
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally owned token so another thread can stop the wait.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Block until every pod of `job` is in a terminal phase.
    ///
    /// Returns the final `pod name -> phase` sample. A job with no pods yet is
    /// still pending.
    #[instrument(skip_all, fields(job = %job.name))]
    pub fn join(&self, job: &ResourceHandle) -> Result<BTreeMap<String, String>> {
        if job.kind != ResourceKind::Job {
            return Err(anyhow!("cannot join a {}", job.kind));
        }
        let namespace = job.namespace.as_deref().unwrap_or_else(|| self.api.namespace());
        let mut last: Option<BTreeMap<String, String>> = None;
        let settled = poll_until(&self.policy, &self.cancel, self.sleeper, |attempt| {
            let pods = self.api.list_pods(namespace)?;
            let phases = job_pods(&pods, &job.name);
            if last.as_ref() != Some(&phases) {
                info!(attempt, phases = ?phases, "job pods changed");
            } else {
                debug!(attempt, "job pods unchanged");
            }
            let done = self.terminal.settled(&phases);
            last = Some(phases.clone());
            Ok(done.then_some(phases))
        })?;
        Ok(settled)
    }
}
