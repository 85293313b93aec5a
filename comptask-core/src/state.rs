use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Process state as reported to the supervisor and the status database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ProcessState {
    Invalid = 0,
    Okay = 1,
    Init = 2,
    Standby = 3,
    Warn = 4,
    Failed = 5,
    Safe = 6,
    Off = 7,
    Timeout = 8,
}

impl ProcessState {
    pub fn as_word(self) -> i32 {
        self as i32
    }

    pub fn from_word(word: i32) -> Option<Self> {
        Some(match word {
            0 => Self::Invalid,
            1 => Self::Okay,
            2 => Self::Init,
            3 => Self::Standby,
            4 => Self::Warn,
            5 => Self::Failed,
            6 => Self::Safe,
            7 => Self::Off,
            8 => Self::Timeout,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Okay => "OKAY",
            Self::Init => "INIT",
            Self::Standby => "STANDBY",
            Self::Warn => "WARN",
            Self::Failed => "FAILED",
            Self::Safe => "SAFE",
            Self::Off => "OFF",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Safe-state latch. Once `Safe`, only an explicit activate returns it to `Nominal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NominalState {
    #[default]
    Nominal,
    Safe,
}

pub fn resolved_state(actual: ProcessState, nominal: NominalState) -> ProcessState {
    match nominal {
        NominalState::Nominal => actual,
        NominalState::Safe => ProcessState::Safe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProcessState; 9] = [
        ProcessState::Invalid,
        ProcessState::Okay,
        ProcessState::Init,
        ProcessState::Standby,
        ProcessState::Warn,
        ProcessState::Failed,
        ProcessState::Safe,
        ProcessState::Off,
        ProcessState::Timeout,
    ];

    #[test]
    fn test_safe_latch_overrides_every_state() {
        for actual in ALL {
            assert_eq!(resolved_state(actual, NominalState::Safe), ProcessState::Safe);
            assert_eq!(resolved_state(actual, NominalState::Nominal), actual);
        }
    }

    #[test]
    fn test_word_mapping() {
        for state in ALL {
            assert_eq!(ProcessState::from_word(state.as_word()), Some(state));
        }
        assert_eq!(ProcessState::Warn.as_word(), 4);
        assert_eq!(ProcessState::from_word(9), None);
    }

    #[test]
    fn test_shared_state() {
        let shared = new_shared(vec![1u32]);
        shared.lock().push(2);
        assert_eq!(shared.lock().len(), 2);
    }
}
