/*!
Horloge manuelle pour les tests

Le temps n'avance que sur demande, ce qui rend la détection de perte de
heartbeat déterministe.
*/

use comptask_core::{new_shared, Clock, ClockError, Shared, Timestamp};
use std::time::Duration;

/// Horloge partagée: les clones voient le même instant
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Shared<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: new_shared(start) }
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.add(by);
    }

    pub fn current(&self) -> Timestamp {
        *self.now.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::new(1_000, 0))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp, ClockError> {
        Ok(self.current())
    }
}
