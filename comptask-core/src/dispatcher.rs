//! Inbound message routing and reply construction.
//!
//! Routing is table driven: each service names the endpoints allowed to
//! send it, the classes it accepts and its handler. Anything that does not
//! match is reported as unexpected and dropped without a reply.

use crate::clock::{Clock, ClockError, Timestamp};
use crate::datum::{DatumId, Units};
use crate::message::{EndpointId, Message, MessageClass, Service, SetCommand};
use crate::process::ProcessCore;
use crate::registry::SetOutcome;
use crate::status::{StatusCode, TaskError};
use crate::transport::{Delivery, Transport, TransportError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unexpected {class:?} {service} message from endpoint {from}")]
    Unexpected {
        service: Service,
        class: MessageClass,
        from: EndpointId,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("clock unavailable: {0}")]
    Clock(#[from] ClockError),
}

impl DispatchError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Unexpected { .. } => false,
            Self::Transport(e) => e.is_fatal(),
            Self::Clock(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sources {
    Heartbeat,
    Supervisor,
    Controllers,
    Database,
    Any,
}

#[derive(Debug, Clone, Copy)]
enum Classes {
    Command,
    /// Ack or Err, as returned by the status database.
    Outcome,
}

impl Classes {
    fn accepts(self, class: MessageClass) -> bool {
        match self {
            Self::Command => class == MessageClass::Cmd,
            Self::Outcome => matches!(class, MessageClass::Ack | MessageClass::Err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Handler {
    Heartbeat,
    Shutdown,
    SafeState,
    Activate,
    Set,
    Get,
    SubmitOutcome,
}

struct Route {
    service: Service,
    sources: Sources,
    classes: Classes,
    handler: Handler,
}

static ROUTES: [Route; 7] = [
    Route { service: Service::HEARTBEAT, sources: Sources::Heartbeat, classes: Classes::Command, handler: Handler::Heartbeat },
    Route { service: Service::SHUTDOWN, sources: Sources::Supervisor, classes: Classes::Command, handler: Handler::Shutdown },
    Route { service: Service::SAFESTATE, sources: Sources::Supervisor, classes: Classes::Command, handler: Handler::SafeState },
    Route { service: Service::ACTIVATE, sources: Sources::Supervisor, classes: Classes::Command, handler: Handler::Activate },
    Route { service: Service::SET, sources: Sources::Controllers, classes: Classes::Command, handler: Handler::Set },
    Route { service: Service::GET, sources: Sources::Any, classes: Classes::Command, handler: Handler::Get },
    Route { service: Service::SUBMIT, sources: Sources::Database, classes: Classes::Outcome, handler: Handler::SubmitOutcome },
];

impl<T: Transport, C: Clock> ProcessCore<T, C> {
    pub async fn dispatch(&mut self, delivery: Delivery) -> Result<Flow, DispatchError> {
        let msg = delivery.message;
        let route = ROUTES
            .iter()
            .find(|r| r.service == msg.service)
            .filter(|r| self.source_allowed(r.sources, msg.source) && r.classes.accepts(msg.class));
        let Some(route) = route else {
            return Err(DispatchError::Unexpected {
                service: msg.service,
                class: msg.class,
                from: msg.source,
            });
        };
        if delivery.deliverer != msg.source {
            debug!("{} from {} relayed by {}", msg.service, msg.source, delivery.deliverer);
        }

        match route.handler {
            Handler::Heartbeat => self.on_heartbeat(&msg).await,
            Handler::Shutdown => self.on_shutdown(&msg).await,
            Handler::SafeState => self.on_safe_state(&msg).await,
            Handler::Activate => self.on_activate(&msg).await,
            Handler::Set => self.on_set(&msg).await,
            Handler::Get => self.on_get(&msg).await,
            Handler::SubmitOutcome => Ok(self.on_submit_outcome(&msg)),
        }
    }

    fn source_allowed(&self, sources: Sources, source: EndpointId) -> bool {
        let roles = &self.config.roles;
        match sources {
            Sources::Heartbeat => source == roles.heartbeat,
            Sources::Supervisor => source == roles.supervisor,
            Sources::Controllers => roles.controllers.contains(&source),
            Sources::Database => source == roles.database,
            Sources::Any => true,
        }
    }

    async fn reply(&mut self, request: &Message, class: MessageClass, body: Vec<i32>) -> Result<(), TransportError> {
        let reply = request.reply(class, body);
        self.transport.send(reply.dest, &reply).await
    }

    async fn on_heartbeat(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        let now = self.now()?;
        self.liveness.on_heartbeat_received(now);
        let state = self.liveness.resolved_state();
        self.reply(msg, MessageClass::Rsp, vec![state.as_word()]).await?;
        self.registry.refresh_all(now);
        self.record_version(now);
        Ok(Flow::Continue)
    }

    async fn on_shutdown(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        self.reply(msg, MessageClass::Ack, Vec::new()).await?;
        info!("Shutdown requested by endpoint {}", msg.source);
        Ok(Flow::Shutdown)
    }

    async fn on_safe_state(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        self.reply(msg, MessageClass::Act, Vec::new()).await?;
        self.liveness.force_safe();
        info!("Safe-state commanded by endpoint {}", msg.source);
        let state = self.liveness.resolved_state();
        self.reply(msg, MessageClass::Com, vec![state.as_word()]).await?;
        Ok(Flow::Continue)
    }

    async fn on_activate(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        self.reply(msg, MessageClass::Act, Vec::new()).await?;
        self.liveness.activate();
        let state = self.liveness.resolved_state();
        info!("Activated by endpoint {}, state now {}", msg.source, state);
        self.reply(msg, MessageClass::Com, vec![state.as_word()]).await?;
        Ok(Flow::Continue)
    }

    async fn on_set(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        let cmd = match SetCommand::decode(&msg.body) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Set from endpoint {} rejected: {}", msg.source, e);
                let data_id = msg.body.first().copied().unwrap_or_default();
                return self.send_set_reply(msg, data_id, self.task_status(TaskError::CommandLen)).await;
            }
        };
        if !cmd.status.is_nominal() || cmd.num_bytes != SetCommand::VALUE_BYTES {
            warn!(
                "Set from endpoint {} rejected: status {} num_bytes {}",
                msg.source, cmd.status, cmd.num_bytes
            );
            return self.send_set_reply(msg, cmd.data_id, self.task_status(TaskError::Command)).await;
        }

        let now = self.now()?;
        let datum = DatumId::from_word(cmd.data_id).unwrap_or(DatumId(u32::MAX));
        match self.registry.set(datum, cmd.param_low, cmd.units, cmd.timestamp, now) {
            Ok(SetOutcome::Done(status)) => {
                info!("Datum {} set to {} by endpoint {}", datum, cmd.param_low, msg.source);
                self.send_set_reply(msg, cmd.data_id, status).await?;
            }
            Ok(SetOutcome::Deferred(action)) => {
                info!("Datum {} set to {} by endpoint {}, acting after reply", datum, cmd.param_low, msg.source);
                self.send_set_reply(msg, cmd.data_id, StatusCode::NOMINAL).await?;
                let status = action();
                if !status.is_nominal() {
                    warn!("Deferred action for datum {} completed with {}", datum, status);
                }
                self.registry.settle(datum, now);
            }
            Err(e) => {
                warn!("Set from endpoint {} rejected: {}", msg.source, e);
                let status = StatusCode::from_registry_error(self.identity.package, &e);
                return self.send_set_reply(msg, cmd.data_id, status).await;
            }
        }
        self.submit_status().await?;
        Ok(Flow::Continue)
    }

    async fn on_get(&mut self, msg: &Message) -> Result<Flow, DispatchError> {
        let (data_id, status) = match SetCommand::decode(&msg.body) {
            Ok(cmd) => {
                let now = self.now()?;
                let datum = DatumId::from_word(cmd.data_id).unwrap_or(DatumId(u32::MAX));
                match self.registry.get(datum, now) {
                    Ok(_) => (cmd.data_id, StatusCode::NOMINAL),
                    Err(e) => {
                        warn!("Get from endpoint {} rejected: {}", msg.source, e);
                        (cmd.data_id, StatusCode::from_registry_error(self.identity.package, &e))
                    }
                }
            }
            Err(e) => {
                warn!("Get from endpoint {} rejected: {}", msg.source, e);
                let data_id = msg.body.first().copied().unwrap_or_default();
                (data_id, self.task_status(TaskError::CommandLen))
            }
        };
        self.send_set_reply(msg, data_id, status).await
    }

    fn on_submit_outcome(&mut self, msg: &Message) -> Flow {
        if msg.class == MessageClass::Err {
            match msg.body.first() {
                Some(&code) => error!(
                    "Status database rejected submission {}: {}",
                    msg.seq_num,
                    StatusCode::from_word(code)
                ),
                None => error!("Status database rejected submission {} without a code", msg.seq_num),
            }
        }
        Flow::Continue
    }

    fn task_status(&self, error: TaskError) -> StatusCode {
        StatusCode::task(self.identity.package, error)
    }

    /// Replies to a set/get. The payload mirrors the command with the
    /// status filled in and, for process datums, the current value, units
    /// and modification time. Replies not addressed to the direct-control
    /// endpoint go through the relay.
    async fn send_set_reply(&mut self, request: &Message, data_id: i32, status: StatusCode) -> Result<Flow, DispatchError> {
        let mut payload = SetCommand {
            data_id,
            status,
            num_bytes: SetCommand::VALUE_BYTES,
            param_high: 0,
            param_low: 0,
            timestamp: Timestamp::ZERO,
            units: Units::Invalid.as_word(),
        };
        if let Some(slot) = DatumId::from_word(data_id)
            .filter(|id| id.is_user())
            .and_then(|id| self.registry.slot(id))
        {
            payload.param_low = slot.value;
            payload.units = slot.units.as_word();
            payload.timestamp = slot.modified_at;
        }

        let class = if status.is_nominal() { MessageClass::Rsp } else { MessageClass::Err };
        let reply = request.reply(class, payload.encode());
        let via = if reply.dest == self.config.roles.direct_control {
            reply.dest
        } else {
            self.config.roles.relay
        };
        self.transport.send(via, &reply).await?;
        Ok(Flow::Continue)
    }
}
