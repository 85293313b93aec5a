//! CMT parameter table. Every datum is a query refreshed on each heartbeat;
//! the CMT accepts no demands.

use crate::config::CmtSection;
use crate::metrics::HostProbe;
use crate::monitor::{HealthFlags, MAX_DISKS};
use comptask_core::{DatumId, ParameterRegistry, ProducerError, RegistryError, Shared, Units};

pub const CPU_USED: DatumId = DatumId(5);
pub const DISK1_FREE: DatumId = DatumId(6);
pub const MEMORY_FREE: DatumId = DatumId(10);
pub const TEMPERATURE1: DatumId = DatumId(11);
pub const FAN1_RPM: DatumId = DatumId(14);
pub const VOLT_CORE: DatumId = DatumId(17);
pub const NTP_LOCKED: DatumId = DatumId(24);

const TEMPERATURES: usize = 3;
const FANS: usize = 3;
/// Core, reference, IO, +5V, +12V, -5V, -12V.
const VOLTAGES: usize = 7;

fn datum(first: DatumId, offset: usize) -> DatumId {
    DatumId(first.0 + offset as u32)
}

pub fn build_registry<P>(
    config: &CmtSection,
    probe: Shared<P>,
    flags: Shared<HealthFlags>,
) -> Result<ParameterRegistry, RegistryError>
where
    P: HostProbe + 'static,
{
    let mut registry = ParameterRegistry::new();

    let cpu = probe.clone();
    registry.register_query(CPU_USED, Units::MilliPercent, move || cpu.lock().cpu_used())?;

    for index in 0..MAX_DISKS {
        let id = datum(DISK1_FREE, index);
        match config.disks.get(index) {
            Some(disk) => {
                let (probe, flags) = (probe.clone(), flags.clone());
                let (path, warn_percent) = (disk.path.clone(), disk.warn_percent);
                registry.register_query(id, Units::MilliPercent, move || {
                    let free = probe.lock().disk_free(&path)?;
                    flags.lock().record_disk(index, free, warn_percent);
                    Ok(free)
                })?;
            }
            None => registry.register_query(id, Units::MilliPercent, || Err(ProducerError::Unsupported))?,
        }
    }

    let memory = probe.clone();
    registry.register_query(MEMORY_FREE, Units::MilliPercent, move || memory.lock().memory_free())?;

    for index in 0..TEMPERATURES {
        let sensor = probe.clone();
        registry.register_query(datum(TEMPERATURE1, index), Units::MilliCelsius, move || {
            sensor.lock().temperature(index)
        })?;
    }

    // No portable source for fan speeds or supply voltages.
    for index in 0..FANS {
        registry.register_query(datum(FAN1_RPM, index), Units::Rpm, || Err(ProducerError::Unsupported))?;
    }
    for index in 0..VOLTAGES {
        registry.register_query(datum(VOLT_CORE, index), Units::MilliVolt, || Err(ProducerError::Unsupported))?;
    }

    if config.ntp_check {
        registry.register_query(NTP_LOCKED, Units::TrueFalse, move || {
            let locked = probe.lock().ntp_locked()?;
            flags.lock().record_ntp(locked);
            Ok(i32::from(locked))
        })?;
    } else {
        registry.register_query(NTP_LOCKED, Units::TrueFalse, || Err(ProducerError::Unsupported))?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiskConfig;
    use crate::monitor::state_rule;
    use comptask_core::message::SetCommand;
    use comptask_core::{new_shared, CoreConfig, EndpointId, Package, ProcessIdentity, ProcessState, StatusCode, TaskError};
    use comptask_devkit::TestHarness;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct FakeProbe {
        cpu: i32,
        memory: i32,
        disks: HashMap<PathBuf, i32>,
        temperatures: Vec<i32>,
        ntp: Option<bool>,
    }

    impl HostProbe for FakeProbe {
        fn cpu_used(&mut self) -> Result<i32, ProducerError> {
            Ok(self.cpu)
        }

        fn memory_free(&mut self) -> Result<i32, ProducerError> {
            Ok(self.memory)
        }

        fn disk_free(&mut self, mount_point: &Path) -> Result<i32, ProducerError> {
            self.disks
                .get(mount_point)
                .copied()
                .ok_or_else(|| ProducerError::Failed("not mounted".to_string()))
        }

        fn temperature(&mut self, index: usize) -> Result<i32, ProducerError> {
            self.temperatures.get(index).copied().ok_or(ProducerError::Unsupported)
        }

        fn ntp_locked(&mut self) -> Result<bool, ProducerError> {
            self.ntp.ok_or_else(|| ProducerError::Failed("timedatectl missing".to_string()))
        }
    }

    const IDENTITY: ProcessIdentity = ProcessIdentity {
        package: Package::CMT,
        version_milli: 1_020,
    };

    fn section() -> CmtSection {
        CmtSection {
            disks: vec![
                DiskConfig { path: PathBuf::from("/"), warn_percent: 10 },
                DiskConfig { path: PathBuf::from("/data"), warn_percent: 25 },
            ],
            ntp_check: true,
        }
    }

    fn fake() -> FakeProbe {
        FakeProbe {
            cpu: 12_500,
            memory: 64_000,
            disks: HashMap::from([(PathBuf::from("/"), 50_000), (PathBuf::from("/data"), 80_000)]),
            temperatures: vec![41_000],
            ntp: Some(true),
        }
    }

    fn harness(probe: Shared<FakeProbe>, section: &CmtSection) -> TestHarness {
        let flags = new_shared(HealthFlags::default());
        let registry = build_registry(section, probe, flags.clone()).unwrap();
        TestHarness::with_config(CoreConfig::for_process("CM0"), IDENTITY, registry)
            .unwrap()
            .with_state_rule(Box::new(state_rule(flags)))
    }

    #[tokio::test]
    async fn test_initial_submission() {
        let mut harness = harness(new_shared(fake()), &section());
        harness.start().await.unwrap();

        let batch = harness.last_submission().unwrap();
        assert_eq!(batch.len(), 24);
        let entry = |id: DatumId| *batch.iter().find(|e| e.datum == id).unwrap();

        assert_eq!((entry(CPU_USED).value, entry(CPU_USED).units), (12_500, Units::MilliPercent));
        assert_eq!(entry(DISK1_FREE).value, 50_000);
        assert_eq!(entry(DatumId(7)).value, 80_000);
        assert_eq!(entry(DatumId(8)).units, Units::Unsupported);
        assert_eq!(entry(MEMORY_FREE).value, 64_000);
        assert_eq!((entry(TEMPERATURE1).value, entry(TEMPERATURE1).units), (41_000, Units::MilliCelsius));
        assert_eq!(entry(DatumId(12)).units, Units::Unsupported);
        assert_eq!(entry(FAN1_RPM).units, Units::Unsupported);
        assert_eq!(entry(DatumId(23)).units, Units::Unsupported);
        assert_eq!((entry(NTP_LOCKED).value, entry(NTP_LOCKED).units), (1, Units::TrueFalse));
        assert!(batch.iter().all(|e| e.source == EndpointId(137)));
        assert_eq!(entry(DatumId::APP_VERSION).value, 1_020);
    }

    #[tokio::test]
    async fn test_low_disk_raises_warn_and_recovers() {
        let probe = new_shared(fake());
        let mut harness = harness(probe.clone(), &section());
        harness.start().await.unwrap();

        harness.send_heartbeat().await;
        assert_eq!(harness.state(), ProcessState::Okay);

        probe.lock().disks.insert(PathBuf::from("/data"), 24_999);
        harness.send_heartbeat().await;
        assert_eq!(harness.state(), ProcessState::Warn);
        let state = harness
            .last_submission()
            .unwrap()
            .into_iter()
            .find(|e| e.datum == DatumId::PROC_STATE)
            .unwrap();
        assert_eq!(state.value, ProcessState::Warn.as_word());

        probe.lock().disks.insert(PathBuf::from("/data"), 30_000);
        harness.send_heartbeat().await;
        assert_eq!(harness.state(), ProcessState::Okay);
    }

    #[tokio::test]
    async fn test_ntp_unlock_warns() {
        let probe = new_shared(fake());
        let mut harness = harness(probe.clone(), &section());
        harness.start().await.unwrap();

        probe.lock().ntp = Some(false);
        harness.send_heartbeat().await;
        assert_eq!(harness.state(), ProcessState::Warn);
        assert_eq!(harness.value_of(NTP_LOCKED), Some(0));
    }

    #[tokio::test]
    async fn test_failed_reading_keeps_last_value() {
        let probe = new_shared(fake());
        let mut harness = harness(probe.clone(), &section());
        harness.start().await.unwrap();

        probe.lock().ntp = None;
        probe.lock().disks.clear();
        harness.send_heartbeat().await;
        assert_eq!(harness.value_of(NTP_LOCKED), Some(1));
        assert_eq!(harness.value_of(DISK1_FREE), Some(50_000));
    }

    #[tokio::test]
    async fn test_ntp_check_disabled() {
        let mut section = section();
        section.ntp_check = false;
        let mut harness = harness(new_shared(fake()), &section);
        harness.start().await.unwrap();

        let slot = harness.core.registry().slot(NTP_LOCKED).unwrap();
        assert_eq!((slot.value, slot.units), (0, Units::Unsupported));
    }

    #[tokio::test]
    async fn test_set_is_rejected() {
        let mut harness = harness(new_shared(fake()), &section());
        harness.start().await.unwrap();

        harness.send_set(EndpointId(1), CPU_USED, 1, Units::MilliPercent).await;
        let reply = harness.replies_to(EndpointId(1));
        let payload = SetCommand::decode(&reply[0].body).unwrap();
        assert_eq!(payload.status, StatusCode::task(Package::CMT, TaskError::CommandDatum));
    }

    #[tokio::test]
    async fn test_get_samples_fresh_value() {
        let probe = new_shared(fake());
        let mut harness = harness(probe.clone(), &section());
        harness.start().await.unwrap();

        probe.lock().cpu = 99_000;
        harness.send_get(EndpointId(125), CPU_USED).await;
        let reply = harness.replies_to(EndpointId(125));
        let payload = SetCommand::decode(&reply[0].body).unwrap();
        assert_eq!(payload.param_low, 99_000);
        assert_eq!(payload.status, StatusCode::NOMINAL);
    }
}
