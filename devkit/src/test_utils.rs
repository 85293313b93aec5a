/*!
Test Harness pour tâches de calcul

Facilite l'écriture de tests avec:
- Un `ProcessCore` câblé sur le transport simulé et l'horloge manuelle
- L'envoi de commandes superviseur/contrôle en une ligne
- Des assertions sur les réponses et les soumissions à la base de statut
*/

use crate::clock::ManualClock;
use crate::message_builder::MessageBuilder;
use crate::mock_transport::{MockTransport, MockWire};
use anyhow::Result;
use comptask_core::message::decode_submission;
use comptask_core::process::StateRule;
use comptask_core::{
    CoreConfig, DatumId, EndpointId, Exit, Message, Package, ParameterRegistry, ProcessCore,
    ProcessIdentity, ProcessState, Roles, Service, SubmissionEntry, Units,
};
use std::time::Duration;

/// Identité par défaut des tâches testées
pub const TEST_IDENTITY: ProcessIdentity = ProcessIdentity {
    package: Package::CCT,
    version_milli: 1_050,
};

/// Harness de test complet pour une tâche
pub struct TestHarness {
    pub core: ProcessCore<MockTransport, ManualClock>,
    pub wire: MockWire,
    pub clock: ManualClock,
    pub builder: MessageBuilder,
    roles: Roles,
    seq_num: u32,
}

impl TestHarness {
    /// Harness avec la configuration par défaut (processus CC0)
    pub fn new(registry: ParameterRegistry) -> Result<Self> {
        Self::with_config(CoreConfig::default(), TEST_IDENTITY, registry)
    }

    pub fn with_config(config: CoreConfig, identity: ProcessIdentity, registry: ParameterRegistry) -> Result<Self> {
        let (transport, wire) = MockTransport::new();
        Self::with_transport(config, identity, registry, transport, wire)
    }

    /// Pour les tests qui ont besoin du fil avant de construire le registre
    pub fn with_transport(
        config: CoreConfig,
        identity: ProcessIdentity,
        registry: ParameterRegistry,
        transport: MockTransport,
        wire: MockWire,
    ) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let resolved = config.resolve()?;
        let roles = resolved.roles.clone();
        let builder = MessageBuilder::new(resolved.own);
        let clock = ManualClock::default();
        let core = ProcessCore::new(resolved, identity, registry, transport, clock.clone());
        Ok(Self { core, wire, clock, builder, roles, seq_num: 0 })
    }

    pub fn with_state_rule(mut self, rule: StateRule) -> Self {
        self.core = self.core.with_state_rule(rule);
        self
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn own(&self) -> EndpointId {
        self.core.config().own
    }

    fn next_seq(&mut self) -> u32 {
        self.seq_num += 1;
        self.seq_num
    }

    /// Démarre le processus (la soumission initiale reste sur le fil)
    pub async fn start(&mut self) -> Result<()> {
        self.core.start().await?;
        log::info!("[HARNESS] {} started in state {}", self.core.config().name, self.core.state());
        Ok(())
    }

    /// Une itération de la boucle principale
    pub async fn step(&mut self) -> Option<Exit> {
        self.core.poll_once().await
    }

    /// Livre un message puis exécute une itération
    pub async fn deliver(&mut self, message: Message) -> Option<Exit> {
        self.wire.simulate_incoming(message);
        self.step().await
    }

    /// Heartbeat du générateur, suivi de l'itération qui soumet le statut
    pub async fn send_heartbeat(&mut self) -> Option<Exit> {
        let seq = self.next_seq();
        let hb = self.builder.heartbeat(self.roles.heartbeat, seq);
        if let Some(exit) = self.deliver(hb).await {
            return Some(exit);
        }
        self.step().await
    }

    pub async fn send_command(&mut self, from: EndpointId, service: Service) -> Option<Exit> {
        let seq = self.next_seq();
        let msg = self.builder.command(from, service, seq);
        self.deliver(msg).await
    }

    pub async fn send_set(&mut self, from: EndpointId, datum: DatumId, value: i32, units: Units) -> Option<Exit> {
        let seq = self.next_seq();
        let msg = self.builder.set(from, seq, datum, value, units);
        self.deliver(msg).await
    }

    pub async fn send_get(&mut self, from: EndpointId, datum: DatumId) -> Option<Exit> {
        let seq = self.next_seq();
        let msg = self.builder.get(from, seq, datum);
        self.deliver(msg).await
    }

    /// Fait avancer l'horloge puis exécute une itération
    pub async fn advance(&mut self, by: Duration) -> Option<Exit> {
        self.clock.advance(by);
        self.step().await
    }

    /// Réponses (hors soumissions) adressées à `dest`
    pub fn replies_to(&self, dest: EndpointId) -> Vec<Message> {
        self.wire
            .sent_to(dest)
            .into_iter()
            .filter(|m| m.service != Service::SUBMIT)
            .collect()
    }

    /// Toutes les soumissions envoyées à la base de statut, décodées
    pub fn submissions(&self) -> Vec<Vec<SubmissionEntry>> {
        self.wire
            .sent_to(self.roles.database)
            .iter()
            .filter(|m| m.service == Service::SUBMIT)
            .filter_map(|m| decode_submission(&m.body).ok())
            .collect()
    }

    pub fn last_submission(&self) -> Option<Vec<SubmissionEntry>> {
        self.submissions().pop()
    }

    pub fn state(&self) -> ProcessState {
        self.core.state()
    }

    pub fn value_of(&self, datum: DatumId) -> Option<i32> {
        self.core.registry().slot(datum).map(|s| s.value)
    }

    pub fn reset(&mut self) {
        self.wire.clear();
    }
}
