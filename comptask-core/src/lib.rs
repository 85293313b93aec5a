/*!
Comptask Core - heartbeat-supervised process framework

Shared by every computer task running on the control network:
- Process state model with a latched safe-state override
- Heartbeat liveness tracking with timeout-driven safe-state
- Table-driven dispatch of supervisor and control commands
- Parameter registry with changed-only batched status submission
- MQTT transport adapter with a binary frame codec
*/

pub mod clock;
pub mod config;
pub mod datum;
pub mod dispatcher;
pub mod liveness;
pub mod message;
pub mod process;
pub mod registry;
pub mod state;
pub mod status;
pub mod submitter;
pub mod transport;

pub use clock::{Clock, ClockError, SystemClock, Timestamp};
pub use config::{load_config, CoreConfig, ResolvedConfig, Roles};
pub use datum::{version_milli, DatumId, Units};
pub use dispatcher::{DispatchError, Flow};
pub use liveness::{HeartbeatTracker, LivenessSupervisor};
pub use message::{EndpointId, Message, MessageClass, Service, SetCommand, SubmissionEntry};
pub use process::{Exit, ProcessCore, ProcessIdentity};
pub use registry::{AcceptedValues, Actuation, DemandSpec, ParameterRegistry, ProducerError, RegistryError};
pub use state::{new_shared, resolved_state, NominalState, ProcessState, Shared};
pub use status::{Package, StatusCode, TaskError};
pub use transport::{Delivery, MqttTransport, Transport, TransportError};
