//! Parameter registry: the datums a process reports and accepts.
//!
//! Query datums are refreshed by a producer closure on every heartbeat and
//! on every `get`. Demand datums are written by `set` commands and may
//! trigger an actuator. Every write raises the slot's `changed` flag,
//! which stays raised until the slot is taken into a submission batch.

use crate::clock::Timestamp;
use crate::datum::{DatumId, Units};
use crate::status::StatusCode;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("datum {0} is not addressable")]
    DatumOutOfRange(DatumId),
    #[error("only immediate commands are accepted")]
    NonImmediateRejected,
    #[error("units {units} not accepted for datum {datum}")]
    InvalidUnits { datum: DatumId, units: i32 },
    #[error("value {value} not accepted for datum {datum}")]
    InvalidValue { datum: DatumId, value: i32 },
    #[error("datum {0} registered twice")]
    DuplicateDatum(DatumId),
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("not supported on this host")]
    Unsupported,
    #[error("{0}")]
    Failed(String),
}

pub type Producer = Box<dyn FnMut() -> Result<i32, ProducerError>>;
pub type Actuator = Box<dyn FnMut(i32) -> Actuation>;
pub type Deferred = Box<dyn FnOnce() -> StatusCode>;

/// What an actuator did with a freshly written demand.
pub enum Actuation {
    /// Finished; the code becomes the command status.
    Complete(StatusCode),
    /// The reply must go out before the action runs (e.g. powering off).
    AfterReply(Deferred),
}

/// Result of a successful `set`.
pub enum SetOutcome {
    Done(StatusCode),
    Deferred(Deferred),
}

impl fmt::Debug for SetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(code) => f.debug_tuple("Done").field(code).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Values a demand datum accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptedValues {
    Boolean,
    Range { min: i32, max: i32 },
}

impl AcceptedValues {
    fn contains(&self, value: i32) -> bool {
        match self {
            Self::Boolean => value == 0 || value == 1,
            Self::Range { min, max } => (*min..=*max).contains(&value),
        }
    }
}

pub struct DemandSpec {
    pub units: Vec<Units>,
    pub values: AcceptedValues,
    pub actuator: Option<Actuator>,
    /// Value written back once the actuator has run (one-shot demands).
    pub reset_to: Option<i32>,
}

impl DemandSpec {
    /// A true/false demand that fires `actuator` and then clears itself.
    pub fn trigger(actuator: impl FnMut(i32) -> Actuation + 'static) -> Self {
        Self {
            units: vec![Units::TrueFalse, Units::NoUnits],
            values: AcceptedValues::Boolean,
            actuator: Some(Box::new(actuator)),
            reset_to: Some(0),
        }
    }
}

enum SlotKind {
    /// Written only by the process itself (state, version, ...).
    Passive,
    Query { producer: Producer, units: Units },
    Demand(DemandSpec),
}

pub struct ParameterSlot {
    pub id: DatumId,
    pub value: i32,
    pub units: Units,
    pub changed: bool,
    pub modified_at: Timestamp,
    kind: SlotKind,
}

impl ParameterSlot {
    fn new(id: DatumId, units: Units, kind: SlotKind) -> Self {
        Self { id, value: 0, units, changed: true, modified_at: Timestamp::ZERO, kind }
    }

    fn write(&mut self, value: i32, units: Units, now: Timestamp) {
        self.value = value;
        self.units = units;
        self.changed = true;
        self.modified_at = now;
    }

    pub fn is_query(&self) -> bool {
        matches!(self.kind, SlotKind::Query { .. })
    }

    pub fn is_demand(&self) -> bool {
        matches!(self.kind, SlotKind::Demand(_))
    }

    fn run_producer(&mut self, now: Timestamp) {
        let SlotKind::Query { producer, units } = &mut self.kind else {
            return;
        };
        let units = *units;
        match producer() {
            Ok(value) => self.write(value, units, now),
            Err(ProducerError::Unsupported) => self.write(0, Units::Unsupported, now),
            Err(e) => warn!("Unable to determine datum {}: {}", self.id, e),
        }
    }
}

impl fmt::Debug for ParameterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSlot")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("units", &self.units)
            .field("changed", &self.changed)
            .field("modified_at", &self.modified_at)
            .finish()
    }
}

#[derive(Debug)]
pub struct ParameterRegistry {
    slots: BTreeMap<DatumId, ParameterSlot>,
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterRegistry {
    /// Registry holding the common datums every process reports.
    pub fn new() -> Self {
        let mut slots = BTreeMap::new();
        for (id, units) in [
            (DatumId::PROC_STATE, Units::ProcState),
            (DatumId::AUTH_STATE, Units::AuthState),
            (DatumId::SYS_REQUEST, Units::NoUnits),
            (DatumId::APP_VERSION, Units::MilliVersion),
        ] {
            slots.insert(id, ParameterSlot::new(id, units, SlotKind::Passive));
        }
        Self { slots }
    }

    fn insert(&mut self, id: DatumId, units: Units, kind: SlotKind) -> Result<(), RegistryError> {
        if self.slots.contains_key(&id) {
            return Err(RegistryError::DuplicateDatum(id));
        }
        self.slots.insert(id, ParameterSlot::new(id, units, kind));
        Ok(())
    }

    pub fn register_query(
        &mut self,
        id: DatumId,
        units: Units,
        producer: impl FnMut() -> Result<i32, ProducerError> + 'static,
    ) -> Result<(), RegistryError> {
        self.insert(id, units, SlotKind::Query { producer: Box::new(producer), units })
    }

    pub fn register_demand(&mut self, id: DatumId, spec: DemandSpec) -> Result<(), RegistryError> {
        let units = spec.units.first().copied().unwrap_or(Units::NoUnits);
        self.insert(id, units, SlotKind::Demand(spec))
    }

    pub fn slot(&self, id: DatumId) -> Option<&ParameterSlot> {
        self.slots.get(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Direct write by the owning process, bypassing command validation.
    pub fn write(&mut self, id: DatumId, value: i32, units: Units, now: Timestamp) -> Result<(), RegistryError> {
        let slot = self.slots.get_mut(&id).ok_or(RegistryError::DatumOutOfRange(id))?;
        slot.write(value, units, now);
        Ok(())
    }

    /// Re-runs every query producer.
    pub fn refresh_all(&mut self, now: Timestamp) {
        for slot in self.slots.values_mut() {
            slot.run_producer(now);
        }
    }

    /// Current value of a query or demand datum. Query datums are sampled first.
    pub fn get(&mut self, id: DatumId, now: Timestamp) -> Result<i32, RegistryError> {
        let slot = self
            .slots
            .get_mut(&id)
            .filter(|s| s.is_query() || s.is_demand())
            .ok_or(RegistryError::DatumOutOfRange(id))?;
        slot.run_producer(now);
        Ok(slot.value)
    }

    /// Validates and applies an immediate write to a demand datum.
    pub fn set(
        &mut self,
        id: DatumId,
        value: i32,
        units: i32,
        timestamp: Timestamp,
        now: Timestamp,
    ) -> Result<SetOutcome, RegistryError> {
        if !timestamp.is_zero() {
            return Err(RegistryError::NonImmediateRejected);
        }
        let slot = self.slots.get_mut(&id).ok_or(RegistryError::DatumOutOfRange(id))?;
        let SlotKind::Demand(spec) = &mut slot.kind else {
            return Err(RegistryError::DatumOutOfRange(id));
        };
        if !Units::from_word(units).is_some_and(|u| spec.units.contains(&u)) {
            return Err(RegistryError::InvalidUnits { datum: id, units });
        }
        if !spec.values.contains(value) {
            return Err(RegistryError::InvalidValue { datum: id, value });
        }

        let actuation = spec.actuator.as_mut().map(|act| act(value));
        // Reported in the canonical units whatever the command used.
        let units = spec.units.first().copied().unwrap_or(Units::NoUnits);
        slot.write(value, units, now);
        debug!("Datum {} set to {}", id, value);

        match actuation {
            None => Ok(SetOutcome::Done(StatusCode::NOMINAL)),
            Some(Actuation::Complete(code)) => {
                self.settle(id, now);
                Ok(SetOutcome::Done(code))
            }
            Some(Actuation::AfterReply(deferred)) => Ok(SetOutcome::Deferred(deferred)),
        }
    }

    /// Applies a demand's reset value once its action has run.
    pub fn settle(&mut self, id: DatumId, now: Timestamp) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if let SlotKind::Demand(DemandSpec { reset_to: Some(reset), .. }) = &slot.kind {
            let (reset, units) = (*reset, slot.units);
            slot.write(reset, units, now);
        }
    }

    pub fn mark_all_changed(&mut self) {
        for slot in self.slots.values_mut() {
            slot.changed = true;
        }
    }

    /// Drains changed slots in identifier order, clearing their flags.
    pub fn take_changed(&mut self) -> Vec<(DatumId, i32, Units)> {
        self.slots
            .values_mut()
            .filter(|s| s.changed)
            .map(|s| {
                s.changed = false;
                (s.id, s.value, s.units)
            })
            .collect()
    }

    pub fn changed_count(&self) -> usize {
        self.slots.values().filter(|s| s.changed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    const QUERY: DatumId = DatumId(5);
    const DEMAND: DatumId = DatumId(6);

    fn now() -> Timestamp {
        Timestamp::new(1_000, 0)
    }

    fn registry_with(counter: Rc<Cell<i32>>, fired: Rc<Cell<u32>>) -> ParameterRegistry {
        let mut reg = ParameterRegistry::new();
        reg.register_query(QUERY, Units::TrueFalse, move || {
            counter.set(counter.get() + 1);
            Ok(counter.get())
        })
        .unwrap();
        reg.register_demand(
            DEMAND,
            DemandSpec::trigger(move |_| {
                fired.set(fired.get() + 1);
                Actuation::Complete(StatusCode::NOMINAL)
            }),
        )
        .unwrap();
        reg
    }

    #[test]
    fn test_get_runs_producer_each_time() {
        let calls = Rc::new(Cell::new(0));
        let mut reg = registry_with(calls.clone(), Rc::new(Cell::new(0)));
        assert_eq!(reg.get(QUERY, now()).unwrap(), 1);
        assert_eq!(reg.get(QUERY, now()).unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_get_rejects_common_and_unknown_ids() {
        let mut reg = registry_with(Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        assert_eq!(
            reg.get(DatumId::PROC_STATE, now()),
            Err(RegistryError::DatumOutOfRange(DatumId::PROC_STATE))
        );
        assert_eq!(reg.get(DatumId(40), now()), Err(RegistryError::DatumOutOfRange(DatumId(40))));
        assert_eq!(reg.get(DEMAND, now()).unwrap(), 0);
    }

    #[test]
    fn test_non_immediate_set_never_mutates() {
        let fired = Rc::new(Cell::new(0));
        let mut reg = registry_with(Rc::new(Cell::new(0)), fired.clone());
        reg.take_changed();
        for id in [DEMAND, QUERY, DatumId(77)] {
            let err = reg
                .set(id, 1, Units::TrueFalse.as_word(), Timestamp::new(1, 0), now())
                .unwrap_err();
            assert_eq!(err, RegistryError::NonImmediateRejected);
        }
        assert_eq!(fired.get(), 0);
        assert_eq!(reg.changed_count(), 0);
        assert_eq!(reg.slot(DEMAND).unwrap().value, 0);
    }

    #[test]
    fn test_set_rejects_bad_value_and_units() {
        let fired = Rc::new(Cell::new(0));
        let mut reg = registry_with(Rc::new(Cell::new(0)), fired.clone());
        reg.take_changed();

        let err = reg.set(DEMAND, 2, Units::TrueFalse.as_word(), Timestamp::ZERO, now()).unwrap_err();
        assert_eq!(err, RegistryError::InvalidValue { datum: DEMAND, value: 2 });

        let err = reg.set(DEMAND, 1, Units::MilliVolt.as_word(), Timestamp::ZERO, now()).unwrap_err();
        assert_eq!(err, RegistryError::InvalidUnits { datum: DEMAND, units: 7 });

        assert_eq!(reg.set(QUERY, 1, 24, Timestamp::ZERO, now()).unwrap_err(), RegistryError::DatumOutOfRange(QUERY));
        assert_eq!(fired.get(), 0);
        assert_eq!(reg.changed_count(), 0);
    }

    #[test]
    fn test_trigger_demand_fires_and_resets() {
        let fired = Rc::new(Cell::new(0));
        let mut reg = registry_with(Rc::new(Cell::new(0)), fired.clone());
        reg.take_changed();
        let outcome = reg.set(DEMAND, 1, Units::NoUnits.as_word(), Timestamp::ZERO, now()).unwrap();
        assert!(matches!(outcome, SetOutcome::Done(code) if code.is_nominal()));
        assert_eq!(fired.get(), 1);
        let slot = reg.slot(DEMAND).unwrap();
        assert_eq!(slot.value, 0);
        assert_eq!(slot.units, Units::TrueFalse);
        assert!(slot.changed);
        assert_eq!(slot.modified_at, now());
    }

    #[test]
    fn test_deferred_actuation_waits_for_settle() {
        let mut reg = ParameterRegistry::new();
        reg.register_demand(
            DEMAND,
            DemandSpec::trigger(|_| Actuation::AfterReply(Box::new(|| StatusCode::NOMINAL))),
        )
        .unwrap();
        let outcome = reg.set(DEMAND, 1, 24, Timestamp::ZERO, now()).unwrap();
        let SetOutcome::Deferred(action) = outcome else {
            panic!("expected deferred outcome");
        };
        assert_eq!(reg.slot(DEMAND).unwrap().value, 1);
        assert!(action().is_nominal());
        reg.settle(DEMAND, now());
        assert_eq!(reg.slot(DEMAND).unwrap().value, 0);
    }

    #[test]
    fn test_unsupported_producer_marks_units() {
        let mut reg = ParameterRegistry::new();
        reg.register_query(QUERY, Units::MilliCelsius, || Err(ProducerError::Unsupported)).unwrap();
        reg.refresh_all(now());
        let slot = reg.slot(QUERY).unwrap();
        assert_eq!(slot.units, Units::Unsupported);
        assert_eq!(slot.value, 0);
    }

    #[test]
    fn test_failed_producer_keeps_previous_value() {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let mut reg = ParameterRegistry::new();
        reg.register_query(QUERY, Units::MilliPercent, move || {
            c.set(c.get() + 1);
            if c.get() == 1 { Ok(50_000) } else { Err(ProducerError::Failed("statfs".into())) }
        })
        .unwrap();
        reg.refresh_all(now());
        reg.take_changed();
        reg.refresh_all(now());
        assert_eq!(reg.slot(QUERY).unwrap().value, 50_000);
        assert_eq!(reg.changed_count(), 0);
    }

    #[test]
    fn test_take_changed_in_id_order() {
        let mut reg = registry_with(Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        let ids: Vec<_> = reg.take_changed().into_iter().map(|(id, _, _)| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert!(reg.take_changed().is_empty());
        reg.mark_all_changed();
        assert_eq!(reg.changed_count(), 6);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut reg = ParameterRegistry::new();
        assert_eq!(
            reg.register_query(DatumId::PROC_STATE, Units::NoUnits, || Ok(0)),
            Err(RegistryError::DuplicateDatum(DatumId::PROC_STATE))
        );
    }
}
