//! 32-bit completion status codes exchanged in command replies.
//!
//! Each package owns the upper 16 bits; the lower 16 bits enumerate codes
//! within the package. `SYS_NOMINAL` belongs to the system package (1).

use crate::registry::RegistryError;
use std::fmt;

pub const fn status_start(package: u32) -> u32 {
    package << 16
}

/// Package code owning a block of status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Package(pub u32);

impl Package {
    pub const SYS: Package = Package(0x0001);
    pub const CMT: Package = Package(0x0008);
    pub const CCT: Package = Package(0x0050);
    pub const SDB: Package = Package(0x000d);
}

/// Codes every computer task defines inside its own package block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TaskError {
    General = 0,
    Setup,
    Heartbeats,
    CilRx,
    SdbSubmit,
    Command,
    CommandLen,
    CommandDatum,
    CommandUnits,
    CommandValue,
    NonImmediate,
    AppStart,
    AppKill,
    OsControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const NOMINAL: StatusCode = StatusCode(status_start(Package::SYS.0));

    pub fn task(package: Package, error: TaskError) -> Self {
        StatusCode(status_start(package.0) + error as u32)
    }

    pub fn from_registry_error(package: Package, err: &RegistryError) -> Self {
        let code = match err {
            RegistryError::DatumOutOfRange(_) => TaskError::CommandDatum,
            RegistryError::NonImmediateRejected => TaskError::NonImmediate,
            RegistryError::InvalidUnits { .. } => TaskError::CommandUnits,
            RegistryError::InvalidValue { .. } => TaskError::CommandValue,
            RegistryError::DuplicateDatum(_) => TaskError::General,
        };
        Self::task(package, code)
    }

    pub fn is_nominal(self) -> bool {
        self == Self::NOMINAL
    }

    pub fn as_word(self) -> i32 {
        self.0 as i32
    }

    pub fn from_word(word: i32) -> Self {
        StatusCode(word as u32)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DatumId;

    #[test]
    fn test_status_layout() {
        assert_eq!(StatusCode::NOMINAL.0, 0x0001_0000);
        assert_eq!(StatusCode::task(Package::CCT, TaskError::General).0, 0x0050_0000);
        assert_eq!(StatusCode::task(Package::CMT, TaskError::Heartbeats).0, 0x0008_0002);
        assert!(StatusCode::from_word(0x0001_0000).is_nominal());
    }

    #[test]
    fn test_registry_errors_have_distinct_codes() {
        let errors = [
            RegistryError::DatumOutOfRange(DatumId(99)),
            RegistryError::NonImmediateRejected,
            RegistryError::InvalidUnits { datum: DatumId(8), units: 6 },
            RegistryError::InvalidValue { datum: DatumId(8), value: 2 },
        ];
        let codes: Vec<_> = errors
            .iter()
            .map(|e| StatusCode::from_registry_error(Package::CCT, e))
            .collect();
        for (i, a) in codes.iter().enumerate() {
            assert!(!a.is_nominal());
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
