use crate::clock::Timestamp;
use crate::message::{encode_submission, EndpointId, Message, MessageClass, Service, SubmissionEntry};
use crate::registry::ParameterRegistry;
use crate::transport::{Transport, TransportError};
use tracing::debug;

/// Batches changed datums into submissions for the status database.
#[derive(Debug, Clone)]
pub struct StatusSubmitter {
    source: EndpointId,
    database: EndpointId,
    seq_num: u32,
}

impl StatusSubmitter {
    pub fn new(source: EndpointId, database: EndpointId) -> Self {
        Self { source, database, seq_num: 0 }
    }

    /// Builds the next submission, or `None` if nothing changed.
    pub fn collect(&mut self, registry: &mut ParameterRegistry, now: Timestamp) -> Option<(Message, usize)> {
        let entries: Vec<SubmissionEntry> = registry
            .take_changed()
            .into_iter()
            .map(|(datum, value, units)| SubmissionEntry {
                source: self.source,
                datum,
                units,
                timestamp: now,
                value,
            })
            .collect();
        if entries.is_empty() {
            return None;
        }
        self.seq_num = self.seq_num.wrapping_add(1);
        let message = Message::new(self.source, self.database, MessageClass::Cmd, Service::SUBMIT, self.seq_num)
            .with_body(encode_submission(&entries));
        Some((message, entries.len()))
    }

    pub async fn collect_and_submit<T: Transport>(
        &mut self,
        registry: &mut ParameterRegistry,
        transport: &mut T,
        now: Timestamp,
    ) -> Result<usize, TransportError> {
        let Some((message, count)) = self.collect(registry, now) else {
            return Ok(0);
        };
        transport.send(self.database, &message).await?;
        debug!("Submitted {} datum(s) to the status database (seq {})", count, self.seq_num);
        Ok(count)
    }

    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DatumId, Units};
    use crate::message::decode_submission;

    fn registry() -> ParameterRegistry {
        let mut reg = ParameterRegistry::new();
        reg.register_query(DatumId(5), Units::MilliPercent, || Ok(12_500)).unwrap();
        reg
    }

    #[test]
    fn test_second_collect_is_empty() {
        let mut reg = registry();
        let mut sub = StatusSubmitter::new(EndpointId(137), EndpointId(10));
        let now = Timestamp::new(50, 0);

        let (msg, count) = sub.collect(&mut reg, now).unwrap();
        assert_eq!(count, 5);
        assert_eq!(msg.dest, EndpointId(10));
        assert_eq!(msg.class, MessageClass::Cmd);
        assert_eq!(msg.service, Service::SUBMIT);
        assert_eq!(msg.seq_num, 1);
        assert_eq!(reg.changed_count(), 0);

        assert!(sub.collect(&mut reg, now).is_none());
        assert_eq!(sub.seq_num(), 1);
    }

    #[test]
    fn test_repeated_writes_submit_latest_value_once() {
        let mut reg = registry();
        let mut sub = StatusSubmitter::new(EndpointId(137), EndpointId(10));
        sub.collect(&mut reg, Timestamp::new(1, 0));

        reg.write(DatumId::SYS_REQUEST, 3, Units::NoUnits, Timestamp::new(2, 0)).unwrap();
        reg.write(DatumId::SYS_REQUEST, 4, Units::NoUnits, Timestamp::new(3, 0)).unwrap();

        let (msg, count) = sub.collect(&mut reg, Timestamp::new(4, 0)).unwrap();
        assert_eq!(count, 1);
        let entries = decode_submission(&msg.body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].datum, DatumId::SYS_REQUEST);
        assert_eq!(entries[0].value, 4);
        assert_eq!(entries[0].source, EndpointId(137));
        assert_eq!(entries[0].timestamp, Timestamp::new(4, 0));
        assert_eq!(msg.seq_num, 2);
    }
}
