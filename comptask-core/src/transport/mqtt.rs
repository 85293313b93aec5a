//! MQTT-backed transport.
//!
//! Every endpoint listens on `<prefix>/<name>`. Sending publishes the encoded
//! frame on the destination's topic. The rumqttc event loop runs in its own
//! task and forwards decoded frames through a channel, so `receive` is just
//! a bounded wait on that channel.

use super::codec::{decode_frame, encode_frame};
use super::{Delivery, Transport, TransportError};
use crate::config::{CoreConfig, EndpointMap, ResolvedConfig};
use crate::message::{EndpointId, Message};
use rumqttc::{AsyncClient, ClientError, Event, Incoming, MqttOptions, Outgoing, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct MqttTransport {
    client: AsyncClient,
    inbound: mpsc::Receiver<Delivery>,
    endpoints: EndpointMap,
    own: EndpointId,
    topic_prefix: String,
    driver: Option<JoinHandle<()>>,
}

pub fn endpoint_topic(prefix: &str, name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), name)
}

impl MqttTransport {
    pub async fn connect(config: &CoreConfig, resolved: &ResolvedConfig) -> Result<Self, TransportError> {
        let client_id = config
            .mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| format!("comptask-{}-{}", resolved.name, uuid::Uuid::new_v4().simple()));

        let mut mqtt_options = MqttOptions::new(&client_id, &config.mqtt.broker_host, config.mqtt.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        let own_topic = endpoint_topic(&config.mqtt.topic_prefix, &resolved.name);
        client
            .subscribe(&own_topic, QoS::AtLeastOnce)
            .await
            .map_err(map_client_error)?;

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => match decode_frame(&publish.payload) {
                        Ok(delivery) => {
                            if tx.send(delivery).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping undecodable frame on {}: {}", publish.topic, e),
                    },
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => info!("Connected to MQTT broker"),
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT disconnect sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if tx.is_closed() {
                            break;
                        }
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!("Listening for messages on {} as {} ({})", own_topic, resolved.name, resolved.own);

        Ok(Self {
            client,
            inbound,
            endpoints: resolved.endpoints.clone(),
            own: resolved.own,
            topic_prefix: config.mqtt.topic_prefix.clone(),
            driver: Some(driver),
        })
    }
}

fn map_client_error(e: ClientError) -> TransportError {
    match e {
        ClientError::TryRequest(_) => TransportError::NoMemory,
        other => TransportError::SendFailed(other.to_string()),
    }
}

impl Transport for MqttTransport {
    async fn send(&mut self, dest: EndpointId, message: &Message) -> Result<(), TransportError> {
        let name = self.endpoints.name_of(dest).ok_or(TransportError::UnknownEndpoint(dest))?;
        let topic = endpoint_topic(&self.topic_prefix, name);
        let frame = encode_frame(self.own, message)?;
        // A full request queue means the event loop cannot keep up.
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, frame)
            .map_err(map_client_error)
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Delivery, TransportError> {
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some(delivery)) => Ok(delivery),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Requests are processed in order, so pending publishes go out before the disconnect.
        self.client.disconnect().await.map_err(map_client_error)?;
        if let Some(driver) = self.driver.take() {
            if tokio::time::timeout(CLOSE_GRACE, driver).await.is_err() {
                warn!("MQTT event loop did not stop within {:?}", CLOSE_GRACE);
            }
        }
        Ok(())
    }
}
