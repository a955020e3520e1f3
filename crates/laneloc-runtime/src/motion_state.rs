//! Latest commanded velocity, with a staleness bound.

use chrono::{DateTime, Utc};
use laneloc_types::{LaneError, VelocityCommand};

/// Holds the most recent [`VelocityCommand`]. Last write wins.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    latest: Option<VelocityCommand>,
    stale_after_secs: f64,
}

impl MotionState {
    /// `stale_after_secs <= 0` disables the staleness check.
    pub fn new(stale_after_secs: f64) -> Self {
        Self {
            latest: None,
            stale_after_secs,
        }
    }

    pub fn set(&mut self, cmd: VelocityCommand) {
        self.latest = Some(cmd);
    }

    pub fn set_stale_after(&mut self, secs: f64) {
        self.stale_after_secs = secs;
    }

    pub fn latest(&self) -> Option<&VelocityCommand> {
        self.latest.as_ref()
    }

    /// `(v, omega)` to predict with at `now`.
    ///
    /// No command yet means standing still.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::StaleMotionState`] when the latest command is
    /// older than the configured bound.
    pub fn current(&self, now: DateTime<Utc>) -> Result<(f64, f64), LaneError> {
        let Some(cmd) = self.latest else {
            return Ok((0.0, 0.0));
        };
        if self.stale_after_secs > 0.0 {
            let age_secs = crate::secs(now - cmd.stamp);
            if age_secs > self.stale_after_secs {
                return Err(LaneError::StaleMotionState {
                    age_secs,
                    limit_secs: self.stale_after_secs,
                });
            }
        }
        Ok((cmd.v, cmd.omega))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn cmd(stamp: DateTime<Utc>, v: f64, omega: f64) -> VelocityCommand {
        VelocityCommand { stamp, v, omega }
    }

    #[test]
    fn no_command_means_standing_still() {
        assert_eq!(MotionState::new(1.0).current(t0()), Ok((0.0, 0.0)));
    }

    #[test]
    fn last_write_wins() {
        let mut m = MotionState::new(1.0);
        m.set(cmd(t0(), 0.1, 0.0));
        m.set(cmd(t0(), 0.4, -1.0));
        assert_eq!(m.current(t0()), Ok((0.4, -1.0)));
    }

    #[test]
    fn stale_command_is_reported() {
        let mut m = MotionState::new(1.0);
        m.set(cmd(t0(), 0.3, 0.2));
        assert!(m.current(t0() + TimeDelta::milliseconds(900)).is_ok());
        let err = m.current(t0() + TimeDelta::milliseconds(1500)).unwrap_err();
        assert_eq!(
            err,
            LaneError::StaleMotionState {
                age_secs: 1.5,
                limit_secs: 1.0
            }
        );
    }

    #[test]
    fn zero_bound_disables_staleness() {
        let mut m = MotionState::new(0.0);
        m.set(cmd(t0(), 0.3, 0.2));
        assert_eq!(m.current(t0() + TimeDelta::hours(1)), Ok((0.3, 0.2)));
    }

    #[test]
    fn future_stamped_command_is_fresh() {
        let mut m = MotionState::new(1.0);
        m.set(cmd(t0() + TimeDelta::seconds(5), 0.2, 0.0));
        assert_eq!(m.current(t0()), Ok((0.2, 0.0)));
    }
}
