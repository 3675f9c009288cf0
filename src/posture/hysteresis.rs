//! Hysteresis over raw posture labels, written as a pure reducer.
//!
//! The caller threads a [`HysteresisState`] through [`step`]; nothing is
//! retained between calls, so each animal-day can run independently.

use crate::types::{PostureState, RawPosture};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pending {
    pub state: PostureState,
    /// Epoch second the proposal was first seen.
    pub since: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HysteresisState {
    pub stable: PostureState,
    pub pending: Option<Pending>,
    pub last_epoch: Option<i64>,
}

impl Default for HysteresisState {
    fn default() -> Self {
        Self {
            stable: PostureState::Unknown,
            pending: None,
            last_epoch: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HysteresisParams {
    /// A change must be proposed continuously for this long to be accepted.
    pub min_dwell_sec: i64,
    /// Silence longer than this resets to `Unknown`.
    pub reset_gap_sec: i64,
}

fn proposal(raw: RawPosture) -> Option<PostureState> {
    match raw {
        RawPosture::Standing => Some(PostureState::Standing),
        RawPosture::Lying => Some(PostureState::Lying),
        RawPosture::Transition => None,
    }
}

/// Advance the state machine by one raw label.
///
/// - from `Unknown` the first standing/lying label is adopted at once
/// - `Transition` neither confirms nor cancels a pending change
/// - a label agreeing with the stable state drops any pending change
/// - time going backwards or a gap over `reset_gap_sec` resets everything
pub fn step(state: HysteresisState, epoch: i64, raw: RawPosture, params: &HysteresisParams) -> HysteresisState {
    let mut next = match state.last_epoch {
        Some(last) if epoch < last || epoch - last > params.reset_gap_sec => HysteresisState::default(),
        _ => state,
    };
    next.last_epoch = Some(epoch);

    let Some(proposed) = proposal(raw) else {
        return next;
    };

    if next.stable == PostureState::Unknown {
        next.stable = proposed;
        next.pending = None;
        return next;
    }

    if proposed == next.stable {
        next.pending = None;
        return next;
    }

    match next.pending {
        Some(p) if p.state == proposed => {
            if epoch - p.since >= params.min_dwell_sec {
                next.stable = proposed;
                next.pending = None;
            }
        }
        _ => {
            next.pending = Some(Pending {
                state: proposed,
                since: epoch,
            });
        }
    }
    next
}
