//! The ban rule table.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::BanReason;

/// How long each kind of misbehavior keeps a player out.
///
/// All durations are in seconds. The defaults are 30 minutes across the
/// board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanPolicy {
    /// Ban after the ragequit grace period runs out.
    pub ragequit_secs: u64,
    /// Ban after teammates request a substitute.
    pub reported_secs: u64,
    /// Ban for a second self-requested substitution inside the window.
    pub repeat_substitution_secs: u64,
    /// How far back a previous self-substitution counts as a repeat.
    pub repeat_window_secs: u64,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            ragequit_secs: 30 * 60,
            reported_secs: 30 * 60,
            repeat_substitution_secs: 30 * 60,
            repeat_window_secs: 30 * 60,
        }
    }
}

impl BanPolicy {
    /// The ban length for `reason`. `None` for operator bans, which carry
    /// their own expiry.
    pub fn duration_for(&self, reason: &BanReason) -> Option<TimeDelta> {
        let secs = match reason {
            BanReason::Ragequit => self.ragequit_secs,
            BanReason::Reported => self.reported_secs,
            BanReason::RepeatSubstitution => self.repeat_substitution_secs,
            BanReason::Operator(_) => return None,
        };
        Some(seconds(secs))
    }

    pub fn repeat_window(&self) -> TimeDelta {
        seconds(self.repeat_window_secs)
    }
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
