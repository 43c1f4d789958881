use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::process::ExitStatus;
use crate::registry::ProcessSpec;
use crate::BackoffStrategy;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestartPolicy {
    #[serde(rename = "never")]
    Never,
    #[default]
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "always")]
    Always,
}

/// What the policy engine wants done after an exit or spawn failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Policy says the exit is final. Process ends up `Stopped`.
    Stop,
    /// Schedule a restart after the given backoff delay.
    Retry(Duration),
    /// A restart would be warranted but the restart budget is spent
    /// (or a spawn failure cannot be retried). Process ends up `Failed`.
    GiveUp,
}

/// Decide what to do after the child exited. `restart_count` is the
/// monotonic number of restarts already performed for this process.
pub fn decide_exit(spec: &ProcessSpec, exit: &ExitStatus, restart_count: u32) -> Decision {
    let wants_restart = match spec.restart_policy {
        RestartPolicy::Never => false,
        RestartPolicy::Always => true,
        RestartPolicy::OnFailure => !exit.success(),
    };

    if !wants_restart {
        return Decision::Stop;
    }
    retry_or_give_up(spec, restart_count)
}

/// Decide what to do after the spawn itself failed (missing or unrunnable
/// executable). Under `never` there is nothing to fall back to, so the
/// process is marked failed rather than stopped.
pub fn decide_spawn_failure(spec: &ProcessSpec, restart_count: u32) -> Decision {
    if spec.restart_policy == RestartPolicy::Never {
        return Decision::GiveUp;
    }
    retry_or_give_up(spec, restart_count)
}

fn retry_or_give_up(spec: &ProcessSpec, restart_count: u32) -> Decision {
    if let Some(max) = spec.max_restarts
        && restart_count >= max
    {
        return Decision::GiveUp;
    }
    let delay = BackoffStrategy::from_config(&spec.backoff).delay_for(restart_count);
    Decision::Retry(delay)
}
