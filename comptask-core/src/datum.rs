use serde::{Deserialize, Serialize};
use std::fmt;

/// Datum identifier within one process's parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatumId(pub u32);

impl DatumId {
    pub const PROC_STATE: DatumId = DatumId(1);
    pub const AUTH_STATE: DatumId = DatumId(2);
    pub const SYS_REQUEST: DatumId = DatumId(3);
    pub const APP_VERSION: DatumId = DatumId(4);
    /// First identifier available to process-specific datums.
    pub const FIRST_USER: DatumId = DatumId(5);

    pub fn is_user(self) -> bool {
        self >= Self::FIRST_USER
    }

    pub fn from_word(word: i32) -> Option<Self> {
        u32::try_from(word).ok().map(DatumId)
    }

    pub fn as_word(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for DatumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Units tag attached to every datum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Units {
    Invalid = 0,
    Unsupported = 1,
    NoUnits = 2,
    MilliCelsius = 6,
    MilliVolt = 7,
    ProcState = 23,
    TrueFalse = 24,
    MilliPercent = 27,
    AuthState = 38,
    Rpm = 42,
    MilliVersion = 52,
}

impl Units {
    pub fn as_word(self) -> i32 {
        self as i32
    }

    pub fn from_word(word: i32) -> Option<Self> {
        Some(match word {
            0 => Self::Invalid,
            1 => Self::Unsupported,
            2 => Self::NoUnits,
            6 => Self::MilliCelsius,
            7 => Self::MilliVolt,
            23 => Self::ProcState,
            24 => Self::TrueFalse,
            27 => Self::MilliPercent,
            38 => Self::AuthState,
            42 => Self::Rpm,
            52 => Self::MilliVersion,
            _ => return None,
        })
    }
}

/// Converts a `major.minor[.patch]` version string into milli-version units
/// (`1.5.0` is 1050, matching the two-digit minor convention).
pub fn version_milli(version: &str) -> i32 {
    let mut parts = version.split('.').map(|p| p.parse::<i32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major * 1000 + minor * 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_range() {
        assert!(!DatumId::APP_VERSION.is_user());
        assert!(DatumId::FIRST_USER.is_user());
        assert_eq!(DatumId::from_word(-1), None);
    }

    #[test]
    fn test_units_words() {
        assert_eq!(Units::TrueFalse.as_word(), 24);
        assert_eq!(Units::from_word(27), Some(Units::MilliPercent));
        assert_eq!(Units::from_word(3), None);
    }

    #[test]
    fn test_version_milli() {
        assert_eq!(version_milli("1.5.0"), 1050);
        assert_eq!(version_milli("1.2.3"), 1020);
        assert_eq!(version_milli("garbage"), 0);
    }
}
