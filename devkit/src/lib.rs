/*!
# Comptask DevKit - Simulations et utilitaires de test

Bibliothèque facilitant le test des tâches de calcul avec:
- Transport simulé pour tests sans broker
- Horloge manuelle pour la détection de perte de heartbeat
- Constructeurs de commandes superviseur/contrôle
- Harness pilotant un `ProcessCore` itération par itération
*/

pub mod clock;
pub mod message_builder;
pub mod mock_transport;
pub mod test_utils;

pub use clock::ManualClock;
pub use message_builder::MessageBuilder;
pub use mock_transport::{MockTransport, MockWire, SendFailure, SentMessage};
pub use test_utils::{TestHarness, TEST_IDENTITY};
