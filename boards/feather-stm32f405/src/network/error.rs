//! Network client error types

use defmt::Format;
use hal_abstractions::{TimeError, TransmitError};

/// Network client operation errors
#[derive(Debug, Clone, Copy, Format)]
pub enum NetworkError {
    /// W5500 did not come up
    DeviceInit,
    /// DNS resolution failed
    DnsError,
    /// Socket bind/connect error
    SocketError,
    /// Request timeout
    Timeout,
    /// Invalid response from server
    InvalidResponse,
    /// Server error (e.g., invalid stratum for NTP)
    ServerError,
    /// All configured servers failed
    AllServersFailed,
    /// TLS handshake failed
    TlsHandshakeFailed,
    /// MQTT connection failed
    MqttConnectionFailed,
    /// MQTT publish failed
    MqttPublishFailed,
    /// Client ID, topic or payload did not fit or is not a valid MQTT string
    MqttEncoding,
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DeviceInit => write!(f, "Ethernet device init failed"),
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::SocketError => write!(f, "Socket error"),
            Self::Timeout => write!(f, "Request timeout"),
            Self::InvalidResponse => write!(f, "Invalid response"),
            Self::ServerError => write!(f, "Server error"),
            Self::AllServersFailed => write!(f, "All servers failed"),
            Self::TlsHandshakeFailed => write!(f, "TLS handshake failed"),
            Self::MqttConnectionFailed => write!(f, "MQTT connection failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::MqttEncoding => write!(f, "MQTT encoding error"),
        }
    }
}

impl core::error::Error for NetworkError {}

impl embedded_io_async::Error for NetworkError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::SocketError => embedded_io_async::ErrorKind::BrokenPipe,
            Self::Timeout => embedded_io_async::ErrorKind::TimedOut,
            Self::InvalidResponse => embedded_io_async::ErrorKind::InvalidData,
            _ => embedded_io_async::ErrorKind::Other,
        }
    }
}

impl From<NetworkError> for TimeError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Timeout => TimeError::Timeout,
            NetworkError::InvalidResponse | NetworkError::ServerError => TimeError::MissingTime,
            _ => TimeError::Unavailable,
        }
    }
}

impl From<NetworkError> for TransmitError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Timeout => TransmitError::Timeout,
            NetworkError::MqttPublishFailed => TransmitError::Rejected,
            NetworkError::MqttEncoding => TransmitError::Encoding,
            _ => TransmitError::Unavailable,
        }
    }
}
