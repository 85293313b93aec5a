//! The process core: one owned value holding all mutable process state,
//! driven by a single receive/dispatch/check loop.

use crate::clock::{Clock, ClockError, Timestamp};
use crate::config::ResolvedConfig;
use crate::datum::{DatumId, Units};
use crate::dispatcher::{DispatchError, Flow};
use crate::liveness::LivenessSupervisor;
use crate::registry::ParameterRegistry;
use crate::state::ProcessState;
use crate::status::Package;
use crate::submitter::StatusSubmitter;
use crate::transport::{Transport, TransportError};
use tracing::{debug, error, info, warn};

/// Adjusts the actual state after each heartbeat-driven sample.
pub type StateRule = Box<dyn FnMut(ProcessState) -> ProcessState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    /// Owner of the status codes this process replies with.
    pub package: Package,
    pub version_milli: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Supervisor asked us to stop; the acknowledgement has been flushed.
    Shutdown,
    /// Unrecoverable transport or clock failure.
    Failed,
}

pub struct ProcessCore<T, C> {
    pub(crate) config: ResolvedConfig,
    pub(crate) identity: ProcessIdentity,
    pub(crate) transport: T,
    pub(crate) clock: C,
    pub(crate) liveness: LivenessSupervisor,
    pub(crate) registry: ParameterRegistry,
    pub(crate) submitter: StatusSubmitter,
    state_rule: Option<StateRule>,
    last_count: u64,
}

impl<T: Transport, C: Clock> ProcessCore<T, C> {
    pub fn new(
        config: ResolvedConfig,
        identity: ProcessIdentity,
        registry: ParameterRegistry,
        transport: T,
        clock: C,
    ) -> Self {
        let submitter = StatusSubmitter::new(config.own, config.roles.database);
        let liveness = LivenessSupervisor::new(config.heartbeat_timeout);
        Self {
            config,
            identity,
            transport,
            clock,
            liveness,
            registry,
            submitter,
            state_rule: None,
            last_count: 0,
        }
    }

    pub fn with_state_rule(mut self, rule: impl FnMut(ProcessState) -> ProcessState + 'static) -> Self {
        self.state_rule = Some(Box::new(rule));
        self
    }

    pub(crate) fn now(&self) -> Result<Timestamp, ClockError> {
        self.clock.now()
    }

    /// Rewrites APP_VERSION so a restarted status database learns it again.
    pub(crate) fn record_version(&mut self, now: Timestamp) {
        if let Err(e) = self.registry.write(DatumId::APP_VERSION, self.identity.version_milli, Units::MilliVersion, now) {
            warn!("Unable to record application version: {}", e);
        }
    }

    /// Initial sample and full submission. Leaves the process OKAY.
    pub async fn start(&mut self) -> Result<(), DispatchError> {
        let now = self.now()?;
        self.liveness.set_actual(ProcessState::Init);
        self.registry.mark_all_changed();
        self.registry.refresh_all(now);
        self.record_version(now);
        self.liveness.set_actual(ProcessState::Okay);
        let submitted = self.submit_status().await?;
        info!(
            "{} ({}) started: {} datum(s) registered, {} submitted",
            self.config.name,
            self.config.own,
            self.registry.len(),
            submitted
        );
        Ok(())
    }

    /// Runs until shutdown or an unrecoverable failure.
    pub async fn run(&mut self) -> Exit {
        loop {
            if let Some(exit) = self.poll_once().await {
                return exit;
            }
        }
    }

    /// One loop iteration: submit if heartbeats arrived, receive and
    /// dispatch one message, then check for heartbeat loss.
    pub async fn poll_once(&mut self) -> Option<Exit> {
        match self.iterate().await {
            Ok(Flow::Continue) => None,
            Ok(Flow::Shutdown) => {
                if let Err(e) = self.transport.close().await {
                    warn!("Transport close failed: {}", e);
                }
                info!("{} shutting down", self.config.name);
                Some(Exit::Shutdown)
            }
            Err(e) if e.is_fatal() => {
                error!("Fatal error, entering FAILED state: {}", e);
                self.liveness.set_actual(ProcessState::Failed);
                Some(Exit::Failed)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn iterate(&mut self) -> Result<Flow, DispatchError> {
        let count = self.liveness.heartbeat_count();
        if count != self.last_count {
            self.last_count = count;
            self.apply_state_rule();
            self.submit_status().await?;
            debug!(
                "{} State={} Heartbeats={}",
                self.config.name,
                self.liveness.resolved_state(),
                count
            );
        }

        let flow = match self.transport.receive(self.config.receive_timeout).await {
            Ok(delivery) => self.dispatch(delivery).await,
            Err(TransportError::Timeout) => Ok(Flow::Continue),
            Err(e) => Err(e.into()),
        };

        let now = self.now()?;
        self.liveness.check_loss(now);
        flow
    }

    fn apply_state_rule(&mut self) {
        let Some(rule) = self.state_rule.as_mut() else {
            return;
        };
        let current = self.liveness.actual();
        let next = rule(current);
        if next != current {
            info!("State {} -> {}", current, next);
            self.liveness.set_actual(next);
        }
    }

    /// Refreshes the state datum and submits every changed datum.
    pub async fn submit_status(&mut self) -> Result<usize, DispatchError> {
        let now = self.now()?;
        let state = self.liveness.resolved_state().as_word();
        if self.registry.slot(DatumId::PROC_STATE).map(|s| s.value) != Some(state) {
            if let Err(e) = self.registry.write(DatumId::PROC_STATE, state, Units::ProcState, now) {
                warn!("Unable to record process state: {}", e);
            }
        }
        Ok(self
            .submitter
            .collect_and_submit(&mut self.registry, &mut self.transport, now)
            .await?)
    }

    pub fn liveness(&self) -> &LivenessSupervisor {
        &self.liveness
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.liveness.resolved_state()
    }
}
