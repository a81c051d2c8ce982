use crate::{Transport, TransportError, TransportReceipt};
use async_trait::async_trait;
use devsim_storage::ConnectionRecord;
use domain::{AuthConfig, ConnectionSettings, MqttSettings};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TOPIC: &str = "devices/data";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;
const SCHEME_PREFIXES: [&str; 6] = ["mqtt://", "mqtts://", "tcp://", "ssl://", "ws://", "wss://"];
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// MQTT 传输：每次投递建立独立连接，确认后断开。
#[derive(Debug, Default, Clone)]
pub struct MqttTransport;

impl MqttTransport {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, connection: &ConnectionRecord) -> Result<(AsyncClient, EventLoop, MqttSettings), TransportError> {
        let settings = match &connection.settings {
            ConnectionSettings::Mqtt(settings) => settings.clone(),
            ConnectionSettings::Https(_) => {
                return Err(TransportError::Config(format!(
                    "connection {} is not an MQTT connection",
                    connection.connection_id
                )));
            }
        };
        let host = sanitize_host(&connection.host);
        if host.is_empty() {
            return Err(TransportError::Config("mqtt host is empty".to_string()));
        }
        let port = connection.port.unwrap_or(if settings.tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        });
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| format!("devsim-{}", uuid::Uuid::new_v4().simple()));
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(u64::from(settings.keep_alive)));
        if let AuthConfig::UserPass { username, password } = &connection.auth {
            options.set_credentials(username, password);
        }
        if settings.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        let (client, eventloop) = AsyncClient::new(options, 10);
        Ok((client, eventloop, settings))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn send(
        &self,
        connection: &ConnectionRecord,
        payload: &Value,
    ) -> Result<TransportReceipt, TransportError> {
        let (client, mut eventloop, settings) = self.open(connection)?;
        let topic = topic_for(connection);
        let body = serde_json::to_vec(payload)
            .map_err(|err| TransportError::Config(err.to_string()))?;
        let qos = qos_from_u8(settings.qos);
        info!(
            target: "devsim.transport",
            connection_id = %connection.connection_id,
            topic = %topic,
            payload_size = body.len(),
            "mqtt_publish"
        );
        client
            .publish(topic.clone(), qos, settings.retain, body)
            .await
            .map_err(|err| TransportError::Mqtt(err.to_string()))?;

        loop {
            let event = eventloop
                .poll()
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            if publish_confirmed(&event, qos) {
                break;
            }
        }
        close(client, eventloop).await;
        Ok(TransportReceipt::new(format!("published to topic {topic}")))
    }

    async fn test(&self, connection: &ConnectionRecord) -> Result<String, TransportError> {
        let (client, mut eventloop, _) = self.open(connection)?;
        loop {
            let event = eventloop
                .poll()
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            if let Event::Incoming(Packet::ConnAck(_)) = event {
                break;
            }
        }
        close(client, eventloop).await;
        Ok("mqtt broker accepted the connection".to_string())
    }
}

/// QoS 0 以发出为准，QoS 1/2 等待 broker 确认。
fn publish_confirmed(event: &Event, qos: QoS) -> bool {
    match (event, qos) {
        (Event::Outgoing(Outgoing::Publish(_)), QoS::AtMostOnce) => true,
        (Event::Incoming(Packet::PubAck(_)), QoS::AtLeastOnce) => true,
        (Event::Incoming(Packet::PubComp(_)), QoS::ExactlyOnce) => true,
        _ => false,
    }
}

async fn close(client: AsyncClient, mut eventloop: EventLoop) {
    if client.disconnect().await.is_ok() {
        // 驱动一次事件循环把 DISCONNECT 发出去。
        let _ = tokio::time::timeout(DISCONNECT_GRACE, eventloop.poll()).await;
    }
    debug!(target: "devsim.transport", "mqtt_session_closed");
}

pub(crate) fn topic_for(connection: &ConnectionRecord) -> String {
    let topic = connection.endpoint.trim();
    if topic.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        topic.to_string()
    }
}

pub(crate) fn sanitize_host(host: &str) -> &str {
    let host = host.trim();
    SCHEME_PREFIXES
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix))
        .unwrap_or(host)
        .trim_end_matches('/')
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::HttpsSettings;

    fn connection(host: &str, endpoint: &str) -> ConnectionRecord {
        ConnectionRecord {
            connection_id: "c1".to_string(),
            name: "broker".to_string(),
            description: None,
            host: host.to_string(),
            port: None,
            endpoint: endpoint.to_string(),
            auth: AuthConfig::None,
            settings: ConnectionSettings::Mqtt(MqttSettings::default()),
            is_active: true,
            created_at_ms: 0,
        }
    }

    #[test]
    fn strips_scheme_from_host() {
        assert_eq!(sanitize_host("mqtt://broker.local"), "broker.local");
        assert_eq!(sanitize_host("ssl://broker.local/"), "broker.local");
        assert_eq!(sanitize_host("broker.local"), "broker.local");
    }

    #[test]
    fn empty_endpoint_uses_default_topic() {
        assert_eq!(topic_for(&connection("broker", " ")), "devices/data");
        assert_eq!(topic_for(&connection("broker", "plant/line1")), "plant/line1");
    }

    #[test]
    fn confirmation_depends_on_qos() {
        let acked = Event::Incoming(Packet::PubAck(rumqttc::PubAck::new(1)));
        assert!(publish_confirmed(&acked, QoS::AtLeastOnce));
        assert!(!publish_confirmed(&acked, QoS::ExactlyOnce));
        let sent = Event::Outgoing(Outgoing::Publish(1));
        assert!(publish_confirmed(&sent, QoS::AtMostOnce));
        assert!(!publish_confirmed(&sent, QoS::AtLeastOnce));
    }

    #[test]
    fn rejects_https_connection() {
        let mut record = connection("broker", "");
        record.settings = ConnectionSettings::Https(HttpsSettings::default());
        let err = MqttTransport::new().open(&record).err().expect("config error");
        assert!(matches!(err, TransportError::Config(_)));
    }
}
