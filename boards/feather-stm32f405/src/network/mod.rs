//! Network side of the tracker
//!
//! - **`config`**: SNTP, MQTT and stack configuration with defaults
//! - **`error`**: network error enum and its mapping onto the core's error types
//! - **`manager`**: DHCP bring-up
//! - **`mqtt`**: MQTT-over-TLS batch transmitter
//! - **`sntp`**: SNTP network time source
//! - **`socket`**: TCP socket adapter for embedded-tls
//!
//! The W5500 handles its own buffering, so `embassy-net-wiznet` feeds
//! `embassy-net` directly and both protocols use its socket APIs.

pub mod config;
pub mod error;
pub mod manager;
pub mod mqtt;
pub mod sntp;
pub mod socket;

pub use config::{MqttConfig, NetworkConfig, SntpConfig};
pub use error::NetworkError;
pub use mqtt::MqttUplink;
pub use sntp::SntpTimeSource;
