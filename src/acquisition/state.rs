//! Acquisition lifecycle states and the clock collaborator

use std::fmt;

use chrono::NaiveDateTime;

/// Lifecycle of the periodic acquisition
///
/// ```text
/// Idle -> Running <-> Paused
///            |          |
///            +-> Stopped <+   (start() re-enters Running)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl AcquisitionState {
    pub fn can_start(&self) -> bool {
        matches!(self, AcquisitionState::Idle | AcquisitionState::Stopped)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, AcquisitionState::Running)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, AcquisitionState::Paused)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Running => "running",
            AcquisitionState::Paused => "paused",
            AcquisitionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Source of cycle timestamps
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(AcquisitionState::default(), AcquisitionState::Idle);
    }

    #[test]
    fn test_transition_guards() {
        use AcquisitionState::*;
        assert!(Idle.can_start() && Stopped.can_start());
        assert!(!Running.can_start() && !Paused.can_start());
        assert!(Running.can_pause() && !Paused.can_pause());
        assert!(Paused.can_resume() && !Running.can_resume() && !Idle.can_resume());
    }

    #[test]
    fn test_display() {
        assert_eq!(AcquisitionState::Paused.to_string(), "paused");
    }
}
