//! MQTT v5.0 uplink over TLS 1.3
//!
//! Implements the scheduler's batch transmitter. Each call renders its
//! payload, then opens one session (DNS, TCP, TLS handshake, CONNECT),
//! publishes once and sends DISCONNECT. Nothing is sent for an empty batch.
//!
//! State events go out at QoS 1 and only count as sent once the broker's
//! PUBACK for that packet arrives; the caller clears its log on `Ok`.
//! Sample batches are a one-shot diagnostic and use QoS 0.

#![allow(unsafe_code)] // Required for TLS buffer access and unchecked topic names

use defmt::{debug, error, info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::{dns::DnsQueryType, IpEndpoint, Stack};
use embassy_time::{Duration, Timer};
use embedded_tls::{
    Aes128GcmSha256, CryptoProvider, NoVerify, TlsConfig, TlsConnection, TlsContext, TlsVerifier,
};
use hal_abstractions::{BatchMetadata, BatchTransmitter, Sample, StateEvent, TransmitError};
use heapless::String;
use rust_mqtt::{
    buffer::BumpBuffer,
    client::{
        event::Event,
        options::{ConnectOptions, DisconnectOptions, PublicationOptions, TopicReference},
        Client,
    },
    config::{KeepAlive, SessionExpiryInterval},
    types::{MqttString, QoS, TopicName},
    Bytes,
};
use tracker_core::config::{MAX_SAMPLES_PER_ACQUISITION, STATE_LOG_CAPACITY};
use tracker_core::wire;

use crate::device_id::{self, CLIENT_ID_MAX_LEN};
use crate::tls_buffers;

use super::config::MqttConfig;
use super::error::NetworkError;
use super::socket::AsyncTcpSocket;

/// MQTT packet buffer size: 2KB for packet assembly
const MQTT_BUFFER_SIZE: usize = 2048;

/// Maximum MQTT topic length
/// Format: "device/{client_id}/samples" where client_id is 32 chars
const MAX_TOPIC_LEN: usize = 64;

/// Close the TCP connection if the broker goes quiet this long
const SOCKET_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Worst-case JSON metadata around the sample data
const SAMPLE_ENVELOPE_LEN: usize = 128;

/// Largest rendered payload: a full acquisition batch
const PAYLOAD_CAPACITY: usize =
    wire::base64_len(MAX_SAMPLES_PER_ACQUISITION * 12) + SAMPLE_ENVELOPE_LEN;

/// A full state log must fit as well: `[255,4294967295,4294967295],` per entry
const _: () = assert!(STATE_LOG_CAPACITY * 28 + 16 <= PAYLOAD_CAPACITY);

const STATES_SUBTOPIC: &str = "states";
const SAMPLES_SUBTOPIC: &str = "samples";

/// Delivery guarantee per subtopic
///
/// Losing a state batch loses history, so it waits for PUBACK.
fn delivery_qos(subtopic: &str) -> QoS {
    if subtopic == STATES_SUBTOPIC {
        QoS::AtLeastOnce
    } else {
        QoS::AtMostOnce
    }
}

/// Simple crypto provider that wraps an RNG for TLS operations
struct SimpleCryptoProvider<'a, RNG> {
    rng: &'a mut RNG,
    verifier: NoVerify,
}

impl<'a, RNG> SimpleCryptoProvider<'a, RNG> {
    fn new(rng: &'a mut RNG) -> Self {
        Self {
            rng,
            verifier: NoVerify,
        }
    }
}

impl<RNG> CryptoProvider for SimpleCryptoProvider<'_, RNG>
where
    RNG: rand_core::CryptoRngCore,
{
    type CipherSuite = Aes128GcmSha256;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(
        &mut self,
    ) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, embedded_tls::TlsError> {
        Ok(&mut self.verifier)
    }
}

/// Batch transmitter publishing to `device/{client_id}/{states,samples}`
pub struct MqttUplink<RNG> {
    stack: Stack<'static>,
    rng: RNG,
    config: MqttConfig,
    client_id: String<CLIENT_ID_MAX_LEN>,
    payload: String<PAYLOAD_CAPACITY>,
}

impl<RNG> MqttUplink<RNG>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    pub fn new(stack: Stack<'static>, rng: RNG, config: MqttConfig) -> Result<Self, NetworkError> {
        let client_id = device_id::mqtt_client_id()?;
        info!("MQTT client ID: {}", client_id.as_str());
        Ok(Self {
            stack,
            rng,
            config,
            client_id,
            payload: String::new(),
        })
    }

    /// Publish the rendered payload, bounded by the session timeout
    async fn publish_payload(&mut self, subtopic: &str) -> Result<(), NetworkError> {
        let topic = format_mqtt_topic(self.client_id.as_str(), subtopic)?;
        let timeout = Timer::after(Duration::from_millis(self.config.session_timeout_ms));
        let session = publish_once(
            self.stack,
            &mut self.rng,
            &self.config,
            self.client_id.as_str(),
            subtopic,
            topic.as_str(),
            self.payload.as_bytes(),
        );
        match select(timeout, session).await {
            Either::First(_) => {
                error!("MQTT session timed out");
                Err(NetworkError::Timeout)
            }
            Either::Second(result) => result,
        }
    }
}

impl<RNG> BatchTransmitter for MqttUplink<RNG>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    async fn send_sample_batch(
        &mut self,
        samples: &[Sample],
        metadata: &BatchMetadata,
    ) -> Result<(), TransmitError> {
        if samples.is_empty() {
            return Ok(());
        }
        self.payload.clear();
        wire::write_sample_batch(&mut self.payload, samples, metadata)
            .map_err(|_| TransmitError::Encoding)?;
        info!(
            "Publishing {} samples ({} bytes)",
            samples.len(),
            self.payload.len()
        );
        self.publish_payload(SAMPLES_SUBTOPIC)
            .await
            .map_err(TransmitError::from)
    }

    async fn send_state_events(&mut self, events: &[StateEvent]) -> Result<(), TransmitError> {
        if events.is_empty() {
            return Ok(());
        }
        self.payload.clear();
        wire::write_state_events(&mut self.payload, events).map_err(|_| TransmitError::Encoding)?;
        info!(
            "Publishing {} state events ({} bytes)",
            events.len(),
            self.payload.len()
        );
        self.publish_payload(STATES_SUBTOPIC)
            .await
            .map_err(TransmitError::from)
    }
}

/// One complete session: resolve, connect, handshake, CONNECT, PUBLISH,
/// PUBACK when required, DISCONNECT
async fn publish_once<RNG>(
    stack: Stack<'static>,
    rng: &mut RNG,
    config: &MqttConfig,
    client_id: &str,
    subtopic: &str,
    topic: &str,
    payload: &[u8],
) -> Result<(), NetworkError>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    let server_ip = stack
        .dns_query(config.broker_host, DnsQueryType::A)
        .await
        .map_err(|e| {
            error!("DNS query failed: {:?}", Debug2Format(&e));
            NetworkError::DnsError
        })?
        .first()
        .copied()
        .ok_or(NetworkError::DnsError)?;
    let endpoint = IpEndpoint::new(server_ip, config.broker_port);

    // TCP socket buffers (main SRAM, not CCM)
    let mut rx_buffer = [0u8; 4096];
    let mut tx_buffer = [0u8; 4096];
    let mut socket = AsyncTcpSocket::new(
        stack,
        &mut rx_buffer,
        &mut tx_buffer,
        SOCKET_INACTIVITY_TIMEOUT,
    );
    socket.connect(endpoint).await?;
    debug!("TCP connected to {}", Debug2Format(&endpoint));

    // SAFETY: the uplink is the only TLS user and holds one session at a time.
    let (read_buf, write_buf) = unsafe { tls_buffers::tls_buffers() };

    let tls_config = TlsConfig::new().with_server_name(config.broker_host);
    let mut tls_connection =
        TlsConnection::<AsyncTcpSocket, Aes128GcmSha256>::new(socket, read_buf, write_buf);
    let provider = SimpleCryptoProvider::new(rng);
    tls_connection
        .open(TlsContext::new(&tls_config, provider))
        .await
        .map_err(|e| {
            error!("TLS handshake failed: {:?}", Debug2Format(&e));
            NetworkError::TlsHandshakeFailed
        })?;

    let mut mqtt_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut buffer = BumpBuffer::new(&mut mqtt_buffer);
    let mut mqtt_client = Client::<'_, _, _, 1, 1, 1, 0>::new(&mut buffer);

    let connect_opts = ConnectOptions {
        session_expiry_interval: SessionExpiryInterval::EndOnDisconnect,
        clean_start: config.clean_start,
        keep_alive: if config.keep_alive_secs == 0 {
            KeepAlive::Infinite
        } else {
            KeepAlive::Seconds(config.keep_alive_secs)
        },
        will: None,
        user_name: None,
        password: None,
    };
    let mqtt_client_id =
        MqttString::new(client_id.into()).map_err(|_| NetworkError::MqttEncoding)?;

    mqtt_client
        .connect(tls_connection, &connect_opts, Some(mqtt_client_id))
        .await
        .map_err(|e| {
            error!("MQTT connect failed: {:?}", Debug2Format(&e));
            NetworkError::MqttConnectionFailed
        })?;

    // SAFETY: format_mqtt_topic() rejects wildcard and null characters and
    // always produces `device/{id}/{subtopic}`.
    let topic_name = unsafe {
        TopicName::new_unchecked(
            MqttString::new(topic.into()).map_err(|_| NetworkError::MqttEncoding)?,
        )
    };
    let qos = delivery_qos(subtopic);
    let pub_options = PublicationOptions {
        retain: false,
        message_expiry_interval: None,
        topic: TopicReference::Name(topic_name),
        qos,
    };

    let packet_id = mqtt_client
        .publish(&pub_options, Bytes::from(payload))
        .await
        .map_err(|e| {
            error!("MQTT publish failed: {:?}", Debug2Format(&e));
            NetworkError::MqttPublishFailed
        })?;

    if matches!(qos, QoS::AtLeastOnce) {
        // Bounded by the caller's session timeout
        loop {
            match mqtt_client.poll().await {
                Ok(Event::PublishAcknowledged(ack)) if ack.packet_identifier == packet_id => {
                    debug!("PUBACK for packet {}", packet_id);
                    break;
                }
                Ok(Event::PublishRejected(_)) => {
                    error!("Broker rejected packet {}", packet_id);
                    return Err(NetworkError::MqttPublishFailed);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection lost before PUBACK: {:?}", Debug2Format(&e));
                    return Err(NetworkError::MqttConnectionFailed);
                }
            }
        }
    }

    info!("Published {} bytes to {}", payload.len(), topic);

    let disconnect_opts = DisconnectOptions {
        publish_will: false,
        session_expiry_interval: None,
    };
    if let Err(e) = mqtt_client.disconnect(&disconnect_opts).await {
        // Delivery already settled
        warn!("MQTT disconnect failed: {:?}", Debug2Format(&e));
    }
    Ok(())
}

/// Build `device/{client_id}/{subtopic}`
///
/// Rejects MQTT wildcard and null characters.
fn format_mqtt_topic(client_id: &str, subtopic: &str) -> Result<String<MAX_TOPIC_LEN>, NetworkError> {
    let invalid = |s: &str| s.contains('+') || s.contains('#') || s.contains('\0');
    if invalid(client_id) || invalid(subtopic) {
        error!("Topic part contains invalid MQTT characters");
        return Err(NetworkError::MqttEncoding);
    }

    let mut topic = String::<MAX_TOPIC_LEN>::new();
    for part in ["device/", client_id, "/", subtopic] {
        topic
            .push_str(part)
            .map_err(|_| NetworkError::MqttEncoding)?;
    }
    Ok(topic)
}
