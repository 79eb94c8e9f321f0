//! Stable device identity from the STM32F405 96-bit unique ID
//!
//! The UID is factory-programmed, so the MQTT client ID and topics stay
//! the same across reboots and firmware updates.

use heapless::String;

use crate::network::NetworkError;

const CLIENT_ID_PREFIX: &str = "tracker-";

/// "tracker-" (8 chars) + 24 hex chars
pub const CLIENT_ID_MAX_LEN: usize = CLIENT_ID_PREFIX.len() + 24;

/// MQTT client ID in the form `tracker-{24 hex chars}`
pub fn mqtt_client_id() -> Result<String<CLIENT_ID_MAX_LEN>, NetworkError> {
    client_id_from_uid(embassy_stm32::uid::uid_hex())
}

fn client_id_from_uid(uid_hex: &str) -> Result<String<CLIENT_ID_MAX_LEN>, NetworkError> {
    let mut client_id = String::new();
    client_id
        .push_str(CLIENT_ID_PREFIX)
        .and_then(|()| client_id.push_str(uid_hex))
        .map_err(|()| NetworkError::MqttEncoding)?;
    Ok(client_id)
}
