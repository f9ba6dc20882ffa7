use crate::error::TransportError;
use crate::transport::{FrameBuffers, FrameChannel, HandKey, PeerId};
use log::*;
use rumqtt::{MqttClient, MqttOptions, Notification, QoS, ReconnectOptions};

/// Frame channel over an MQTT broker.
///
/// Every hand publishes on its own topic with QoS 0, so the broker fans frames out to
/// all subscribed peers without acknowledgements.
pub struct MqttChannel {
    local: PeerId,
    prefix: String,
    client: MqttClient,
    notifications: rumqtt::Receiver<Notification>,
    buffers: FrameBuffers,
}

impl MqttChannel {
    pub fn connect(
        local: PeerId,
        host: &str,
        port: u16,
        prefix: &str,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let mqtt_options = MqttOptions::new(format!("hand_sync_{}", local), host, port)
            .set_reconnect_opts(ReconnectOptions::Always(5));
        let (mut client, notifications) =
            MqttClient::start(mqtt_options).map_err(|e| TransportError::Connect {
                host: host.to_owned(),
                port,
                reason: format!("{:?}", e),
            })?;
        info!("Connected to MQTT at {}:{}", host, port);

        let topic = format!("{}/+/+", prefix);
        client
            .subscribe(topic.clone(), QoS::AtMostOnce)
            .map_err(|e| TransportError::Subscribe {
                topic: topic.clone(),
                reason: format!("{:?}", e),
            })?;
        trace!("Subscribing to {}", topic);

        Ok(Self {
            local,
            prefix: prefix.to_owned(),
            client,
            notifications,
            buffers: FrameBuffers::new(capacity),
        })
    }
}

impl FrameChannel for MqttChannel {
    fn publish(&mut self, key: &HandKey, frame: &[u8]) -> Result<(), TransportError> {
        let topic = key.topic(&self.prefix);
        self.client
            .publish(topic.clone(), QoS::AtMostOnce, false, frame.to_vec())
            .map_err(|e| TransportError::Publish {
                topic,
                reason: format!("{:?}", e),
            })
    }

    fn poll(&mut self) {
        for notification in self.notifications.try_iter() {
            match notification {
                Notification::Publish(message) => {
                    match HandKey::from_topic(&self.prefix, &message.topic_name) {
                        Some(key) if key.peer != self.local => {
                            self.buffers.push(key, message.payload.to_vec());
                        }
                        Some(_) => {}
                        None => debug!("ignoring message on {}", message.topic_name),
                    }
                }
                other => trace!("MQTT notification {:?}", other),
            }
        }
    }

    fn pending(&self, key: &HandKey) -> usize {
        self.buffers.pending(key)
    }

    fn receive(&mut self, key: &HandKey) -> Option<Vec<u8>> {
        self.buffers.pop(key)
    }

    fn discard(&mut self, key: &HandKey) -> usize {
        self.buffers.clear(key)
    }

    fn forget(&mut self, key: &HandKey) {
        self.buffers.remove(key)
    }

    fn remote_keys(&self) -> Vec<HandKey> {
        self.buffers.keys()
    }
}
