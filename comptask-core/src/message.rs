//! Messages exchanged between endpoints and the typed payloads they carry.
//!
//! Bodies are sequences of 32-bit words. Byte order is the transport
//! codec's concern, so everything here works on `i32` values.

use crate::clock::Timestamp;
use crate::datum::{DatumId, Units};
use crate::status::{status_start, Package, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric address of a process on the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageClass {
    Inv = 0,
    Cmd = 1,
    Rsp = 2,
    Ack = 3,
    Act = 4,
    Com = 5,
    Err = 6,
}

impl MessageClass {
    pub fn from_word(word: u32) -> Option<Self> {
        Some(match word {
            0 => Self::Inv,
            1 => Self::Cmd,
            2 => Self::Rsp,
            3 => Self::Ack,
            4 => Self::Act,
            5 => Self::Com,
            6 => Self::Err,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service(pub u32);

impl Service {
    pub const HEARTBEAT: Service = Service(255);
    pub const SHUTDOWN: Service = Service(254);
    pub const SAFESTATE: Service = Service(253);
    pub const ACTIVATE: Service = Service(252);
    pub const SET: Service = Service(251);
    pub const GET: Service = Service(249);
    pub const SUBMIT: Service = Service(status_start(Package::SDB.0) + 1);

    pub fn name(self) -> &'static str {
        match self {
            Self::HEARTBEAT => "heartbeat",
            Self::SHUTDOWN => "shutdown",
            Self::SAFESTATE => "safe-state",
            Self::ACTIVATE => "activate",
            Self::SET => "set",
            Self::GET => "get",
            Self::SUBMIT => "submit",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: EndpointId,
    pub dest: EndpointId,
    pub class: MessageClass,
    pub service: Service,
    pub seq_num: u32,
    pub body: Vec<i32>,
}

impl Message {
    pub fn new(source: EndpointId, dest: EndpointId, class: MessageClass, service: Service, seq_num: u32) -> Self {
        Self { source, dest, class, service, seq_num, body: Vec::new() }
    }

    pub fn with_body(mut self, body: Vec<i32>) -> Self {
        self.body = body;
        self
    }

    /// Reply to this message: addresses swapped, same service and sequence number.
    pub fn reply(&self, class: MessageClass, body: Vec<i32>) -> Message {
        Message {
            source: self.dest,
            dest: self.source,
            class,
            service: self.service,
            seq_num: self.seq_num,
            body,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload has {actual} words, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("submission declares {declared} entries but carries {actual}")]
    EntryCount { declared: usize, actual: usize },
}

/// Payload of the `set` and `get` services and of their replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCommand {
    pub data_id: i32,
    pub status: StatusCode,
    pub num_bytes: i32,
    pub param_high: i32,
    pub param_low: i32,
    pub timestamp: Timestamp,
    pub units: i32,
}

impl SetCommand {
    pub const WORDS: usize = 8;
    /// Size of the single value a set/get carries.
    pub const VALUE_BYTES: i32 = 4;

    /// An immediate set of `value` on `datum`.
    pub fn immediate(datum: DatumId, value: i32, units: Units) -> Self {
        Self {
            data_id: datum.as_word(),
            status: StatusCode::NOMINAL,
            num_bytes: Self::VALUE_BYTES,
            param_high: 0,
            param_low: value,
            timestamp: Timestamp::ZERO,
            units: units.as_word(),
        }
    }

    pub fn decode(words: &[i32]) -> Result<Self, PayloadError> {
        let w: &[i32; Self::WORDS] = words.try_into().map_err(|_| PayloadError::Length {
            expected: Self::WORDS,
            actual: words.len(),
        })?;
        Ok(Self {
            data_id: w[0],
            status: StatusCode::from_word(w[1]),
            num_bytes: w[2],
            param_high: w[3],
            param_low: w[4],
            // Raw pair: any non-zero word marks a scheduled set.
            timestamp: Timestamp { sec: w[5], nsec: w[6] },
            units: w[7],
        })
    }

    pub fn encode(&self) -> Vec<i32> {
        vec![
            self.data_id,
            self.status.as_word(),
            self.num_bytes,
            self.param_high,
            self.param_low,
            self.timestamp.sec,
            self.timestamp.nsec,
            self.units,
        ]
    }
}

/// One datum in a status database submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionEntry {
    pub source: EndpointId,
    pub datum: DatumId,
    pub units: Units,
    pub timestamp: Timestamp,
    pub value: i32,
}

impl SubmissionEntry {
    const WORDS: usize = 6;
}

pub fn encode_submission(entries: &[SubmissionEntry]) -> Vec<i32> {
    let mut body = Vec::with_capacity(1 + entries.len() * SubmissionEntry::WORDS);
    body.push(entries.len() as i32);
    for e in entries {
        body.extend_from_slice(&[
            e.source.0 as i32,
            e.datum.as_word(),
            e.units.as_word(),
            e.timestamp.sec,
            e.timestamp.nsec,
            e.value,
        ]);
    }
    body
}

pub fn decode_submission(body: &[i32]) -> Result<Vec<SubmissionEntry>, PayloadError> {
    let (&count, rest) = body
        .split_first()
        .ok_or(PayloadError::Length { expected: 1, actual: 0 })?;
    let declared = usize::try_from(count).unwrap_or(0);
    if rest.len() != declared * SubmissionEntry::WORDS {
        return Err(PayloadError::EntryCount {
            declared,
            actual: rest.len() / SubmissionEntry::WORDS,
        });
    }
    Ok(rest
        .chunks_exact(SubmissionEntry::WORDS)
        .map(|w| SubmissionEntry {
            source: EndpointId(w[0] as u32),
            datum: DatumId(w[1] as u32),
            units: Units::from_word(w[2]).unwrap_or(Units::Invalid),
            timestamp: Timestamp::new(w[3], w[4]),
            value: w[5],
        })
        .collect())
}
