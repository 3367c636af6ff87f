//! Pod phase reduction for job watching.

use std::collections::{BTreeMap, BTreeSet};

/// Label the Job controller stamps on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";

/// The slice of a pod the watcher cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PodSummary {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub phase: Option<String>,
}

/// Reduce `pods` to `name -> phase` for pods belonging to `job_name`.
///
/// Membership is a prefix match on the `job-name` label. Pods without a
/// reported phase map to the empty string, which is never terminal.
pub fn job_pods(pods: &[PodSummary], job_name: &str) -> BTreeMap<String, String> {
    pods.iter()
        .filter(|pod| {
            pod.labels
                .get(JOB_NAME_LABEL)
                .is_some_and(|label| label.starts_with(job_name))
        })
        .map(|pod| (pod.name.clone(), pod.phase.clone().unwrap_or_default()))
        .collect()
}

/// Phases after which a pod never changes on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalPhases(BTreeSet<String>);

impl Default for TerminalPhases {
    fn default() -> Self {
        Self::new(["Succeeded", "Failed", "Unknown"])
    }
}

impl TerminalPhases {
    pub fn new<I, S>(phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(phases.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, phase: &str) -> bool {
        self.0.contains(phase)
    }

    /// True when the set is non-empty and every phase is terminal.
    pub fn settled(&self, pods: &BTreeMap<String, String>) -> bool {
        !pods.is_empty() && pods.values().all(|phase| self.contains(phase))
    }
}
