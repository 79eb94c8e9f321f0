//! Network stack bring-up helpers

use defmt::info;
use embassy_net::Stack;

/// Block until DHCP has configured the stack, then log the lease
pub async fn wait_for_config(stack: Stack<'_>) {
    info!("Waiting for DHCP...");
    stack.wait_config_up().await;

    if let Some(config) = stack.config_v4() {
        let [a, b, c, d] = config.address.address().octets();
        info!("Network is UP, IP: {}.{}.{}.{}", a, b, c, d);
        if let Some(gateway) = config.gateway {
            let [a, b, c, d] = gateway.octets();
            info!("Gateway: {}.{}.{}.{}", a, b, c, d);
        }
    }
}
