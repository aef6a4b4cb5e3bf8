//! Version-bits deployment signalling.
//!
//! Soft-fork deployments advance through a BIP9-style threshold state
//! machine evaluated per signalling window: `DEFINED → STARTED →
//! LOCKED_IN → ACTIVE`, or `FAILED` once the timeout passes without
//! lock-in. Miners signal readiness by setting the deployment's bit in
//! the header version.

use crate::params::{Deployment, Params};

/// Lifecycle state of one deployment at a given tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

/// One historical header relevant to signalling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionSample {
    pub height: u32,
    pub time: i64,
    pub version: u32,
}

/// Bit mask a deployment signals with.
///
/// Bits above 28 are reserved for the version prefix and rejected.
pub fn deployment_mask(deployment: &Deployment) -> Option<u32> {
    (deployment.bit <= 28).then(|| 1u32 << deployment.bit)
}

/// Whether a header version signals for the deployment.
pub fn signals(version: u32, deployment: &Deployment) -> bool {
    deployment_mask(deployment)
        .map(|mask| version & mask != 0)
        .unwrap_or(false)
}

fn median_time(window: &[VersionSample]) -> i64 {
    if window.is_empty() {
        return 0;
    }
    let mut times: Vec<i64> = window.iter().map(|s| s.time).collect();
    times.sort_unstable();
    let mid = times.len() / 2;
    if times.len() % 2 == 1 {
        times[mid]
    } else {
        (times[mid - 1] + times[mid]) / 2
    }
}

/// Evaluate the deployment's state for the tip described by `history`.
///
/// `history` carries one sample per header; order does not matter. An
/// empty history is `Defined`.
pub fn threshold_state(
    params: &Params,
    deployment: &Deployment,
    history: &[VersionSample],
) -> ThresholdState {
    if history.is_empty() {
        return ThresholdState::Defined;
    }

    let mut sorted: Vec<VersionSample> = history.to_vec();
    sorted.sort_by_key(|s| s.height);

    let period = params.miner_confirmation_window.max(1);
    let threshold = params.rule_change_activation_threshold as usize;
    let current_period = (sorted.last().expect("non-empty").height + 1) / period;

    let mut state = ThresholdState::Defined;
    for p in 0..=current_period {
        let start = p * period;
        let end = (p + 1) * period - 1;
        let window: Vec<VersionSample> = sorted
            .iter()
            .filter(|s| s.height >= start && s.height <= end)
            .copied()
            .collect();
        let mtp = median_time(&window);

        state = match state {
            ThresholdState::Defined => {
                if deployment.timeout != -1 && mtp >= deployment.timeout {
                    ThresholdState::Failed
                } else if deployment.start_time != -1 && mtp >= deployment.start_time {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                if deployment.timeout != -1 && mtp >= deployment.timeout {
                    ThresholdState::Failed
                } else {
                    let signalling = window
                        .iter()
                        .filter(|s| signals(s.version, deployment))
                        .count();
                    if signalling >= threshold {
                        ThresholdState::LockedIn
                    } else {
                        ThresholdState::Started
                    }
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            terminal => terminal,
        };
    }

    state
}

/// Compute a block version signalling every deployment live at
/// `median_time_past`.
///
/// The base version keeps the top nibble pattern expected of modern
/// headers so legacy numeric versions can never collide.
pub fn compute_block_version(params: &Params, median_time_past: i64) -> u32 {
    let mut version: u32 = 0x2000_0000;

    for deployment in &params.deployments {
        let Some(mask) = deployment_mask(deployment) else {
            continue;
        };
        if deployment.start_time == -1 {
            continue;
        }
        if median_time_past < deployment.start_time {
            continue;
        }
        if deployment.timeout != -1 && median_time_past >= deployment.timeout {
            continue;
        }
        version |= mask;
    }

    version
}
