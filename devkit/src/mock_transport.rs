/*!
Transport simulé pour tester les tâches sans broker MQTT

Enregistre tous les messages envoyés et permet de simuler la réception.
Un `MockWire` partagé donne aux tests la main sur les deux côtés du fil
pendant que le `ProcessCore` possède le transport.
*/

use comptask_core::transport::{Delivery, Transport, TransportError};
use comptask_core::{new_shared, EndpointId, Message, Shared};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Endpoint the frame was handed to (the relay for relayed replies).
    pub via: EndpointId,
    pub message: Message,
}

/// Panne à injecter sur le prochain envoi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    NoMemory,
    SendFailed,
}

#[derive(Debug, Default)]
struct WireState {
    sent: Vec<SentMessage>,
    inbound: VecDeque<Delivery>,
    fail_next_send: Option<SendFailure>,
    receive_calls: usize,
    closed: bool,
}

/// Côté test du fil simulé
#[derive(Clone, Debug)]
pub struct MockWire {
    state: Shared<WireState>,
}

/// Transport simulé possédé par le `ProcessCore`
#[derive(Debug)]
pub struct MockTransport {
    state: Shared<WireState>,
}

impl MockTransport {
    pub fn new() -> (MockTransport, MockWire) {
        let state = new_shared(WireState::default());
        (MockTransport { state: state.clone() }, MockWire { state })
    }
}

impl Transport for MockTransport {
    async fn send(&mut self, dest: EndpointId, message: &Message) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if let Some(failure) = state.fail_next_send.take() {
            log::warn!("[MOCK] Injected failure {:?} sending to {}", failure, dest);
            return Err(match failure {
                SendFailure::NoMemory => TransportError::NoMemory,
                SendFailure::SendFailed => TransportError::SendFailed("injected".to_string()),
            });
        }
        log::debug!("[MOCK] {:?} {} to {} via {}", message.class, message.service, message.dest, dest);
        state.sent.push(SentMessage { via: dest, message: message.clone() });
        Ok(())
    }

    async fn receive(&mut self, _timeout: Duration) -> Result<Delivery, TransportError> {
        let next = {
            let mut state = self.state.lock();
            state.receive_calls += 1;
            state.inbound.pop_front()
        };
        match next {
            Some(delivery) => Ok(delivery),
            None => {
                // Rend la main sans attendre le délai réel: l'horloge des tests est manuelle.
                tokio::task::yield_now().await;
                Err(TransportError::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

impl MockWire {
    /// Simule la réception d'un message livré directement par sa source
    pub fn simulate_incoming(&self, message: Message) {
        let deliverer = message.source;
        self.simulate_relayed(deliverer, message);
    }

    /// Simule la réception d'un message livré par un relais
    pub fn simulate_relayed(&self, deliverer: EndpointId, message: Message) {
        log::debug!("[MOCK] Incoming {} from {} (deliverer {})", message.service, message.source, deliverer);
        self.state.lock().inbound.push_back(Delivery { deliverer, message });
    }

    pub fn fail_next_send(&self, failure: SendFailure) {
        self.state.lock().fail_next_send = Some(failure);
    }

    /// Tous les messages envoyés (pour assertions de tests)
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Messages adressés à `dest`, quel que soit le chemin emprunté
    pub fn sent_to(&self, dest: EndpointId) -> Vec<Message> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.message.dest == dest)
            .map(|s| s.message.clone())
            .collect()
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }

    pub fn receive_calls(&self) -> usize {
        self.state.lock().receive_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn clear(&self) {
        self.state.lock().sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comptask_core::{MessageClass, Service};

    fn heartbeat() -> Message {
        Message::new(EndpointId(2), EndpointId(147), MessageClass::Cmd, Service::HEARTBEAT, 1)
    }

    #[tokio::test]
    async fn test_mock_transport_records_and_delivers() {
        let (mut transport, wire) = MockTransport::new();

        transport.send(EndpointId(9), &heartbeat()).await.unwrap();
        let sent = wire.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].via, EndpointId(9));
        assert_eq!(wire.sent_to(EndpointId(147)).len(), 1);

        assert!(matches!(
            transport.receive(Duration::from_millis(100)).await,
            Err(TransportError::Timeout)
        ));
        wire.simulate_incoming(heartbeat());
        let delivery = transport.receive(Duration::from_millis(100)).await.unwrap();
        assert_eq!(delivery.deliverer, EndpointId(2));
        assert_eq!(wire.receive_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let (mut transport, wire) = MockTransport::new();
        wire.fail_next_send(SendFailure::NoMemory);
        assert!(matches!(
            transport.send(EndpointId(1), &heartbeat()).await,
            Err(TransportError::NoMemory)
        ));
        assert!(transport.send(EndpointId(1), &heartbeat()).await.is_ok());

        transport.close().await.unwrap();
        assert!(wire.is_closed());
        assert!(matches!(
            transport.send(EndpointId(1), &heartbeat()).await,
            Err(TransportError::Closed)
        ));
    }
}
