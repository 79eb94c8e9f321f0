//! SNTP time source
//!
//! Queries the configured servers in order with retries, validates stratum
//! and applies an RTT/2 correction. The scheduler owns writing the result to
//! the RTC, so a failed query has no side effects.

use defmt::{error, info, warn, Debug2Format, Format};
use embassy_futures::select::{select, Either};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use hal_abstractions::{TimeError, TimeSource};
use rtic_monotonics::stm32::prelude::*;

use crate::Mono;

use super::config::SntpConfig;
use super::error::NetworkError;

/// NTP epoch offset (1900-01-01 to 1970-01-01 in seconds)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;

/// Network time with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct NtpTime {
    pub unix_secs: u64,
    pub micros: u32,
}

impl NtpTime {
    /// Convert from an NTP timestamp (seconds since 1900-01-01, 2^-32 fraction)
    pub fn from_ntp(ntp_secs: u64, ntp_frac: u32) -> Self {
        Self {
            unix_secs: ntp_secs.saturating_sub(NTP_UNIX_OFFSET),
            micros: ((ntp_frac as u64 * 1_000_000) >> 32) as u32,
        }
    }

    /// Shift forward by `micros`, carrying into seconds
    pub fn add_micros(mut self, micros: u64) -> Self {
        let total = self.micros as u64 + micros;
        self.unix_secs = self.unix_secs.saturating_add(total / 1_000_000);
        self.micros = (total % 1_000_000) as u32;
        self
    }
}

/// Parse a server reply, rejecting unsynchronized or distant servers
fn parse_response(response: &[u8; NTP_PACKET_LEN], max_stratum: u8) -> Result<NtpTime, NetworkError> {
    let stratum = response[1];
    if stratum == 0 || stratum > max_stratum {
        warn!("Invalid stratum {} (max {})", stratum, max_stratum);
        return Err(NetworkError::ServerError);
    }

    let secs = u32::from_be_bytes([response[40], response[41], response[42], response[43]]) as u64;
    let frac = u32::from_be_bytes([response[44], response[45], response[46], response[47]]);
    if secs == 0 {
        return Err(NetworkError::InvalidResponse);
    }
    Ok(NtpTime::from_ntp(secs, frac))
}

/// SNTP client usable as the scheduler's network time source
pub struct SntpTimeSource {
    stack: Stack<'static>,
    config: SntpConfig,
}

impl SntpTimeSource {
    pub fn new(stack: Stack<'static>, config: SntpConfig) -> Self {
        Self { stack, config }
    }

    /// Try every server with retries; first valid answer wins
    pub async fn sync(&self) -> Result<NtpTime, NetworkError> {
        if !self.stack.is_config_up() {
            warn!("SNTP skipped: network not configured");
            return Err(NetworkError::SocketError);
        }
        for server in self.config.servers {
            for attempt in 0..self.config.retry_count {
                info!("SNTP request to {} (attempt {})", server, attempt + 1);
                match self.request(server).await {
                    Ok(time) => {
                        info!("SNTP time: {}.{:06} UTC", time.unix_secs, time.micros);
                        return Ok(time);
                    }
                    Err(e) => {
                        warn!("SNTP request failed: {:?}", e);
                        Mono::delay(self.config.retry_backoff_ms.millis()).await;
                    }
                }
            }
        }
        error!("All SNTP servers failed");
        Err(NetworkError::AllServersFailed)
    }

    async fn request(&self, server: &str) -> Result<NtpTime, NetworkError> {
        let server_ip = self
            .stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(|_| NetworkError::DnsError)?
            .first()
            .copied()
            .ok_or(NetworkError::DnsError)?;
        let endpoint = IpEndpoint::new(server_ip, NTP_PORT);

        let mut rx_meta = [PacketMetadata::EMPTY; 2];
        let mut rx_buffer = [0u8; 64];
        let mut tx_meta = [PacketMetadata::EMPTY; 2];
        let mut tx_buffer = [0u8; 64];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|_| NetworkError::SocketError)?;

        // LI=0, VN=3, Mode=3 (client)
        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = 0x1B;
        let sent_at = Instant::now();
        socket
            .send_to(&request, endpoint)
            .await
            .map_err(|_| NetworkError::SocketError)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let timeout = Timer::after(Duration::from_millis(self.config.timeout_ms));
        let (len, from) = match select(timeout, socket.recv_from(&mut response)).await {
            Either::First(_) => return Err(NetworkError::Timeout),
            Either::Second(result) => result.map_err(|_| NetworkError::SocketError)?,
        };
        let rtt = Instant::now().duration_since(sent_at);

        if len < NTP_PACKET_LEN || from.endpoint.addr != server_ip {
            warn!("Unexpected reply from {}", Debug2Format(&from));
            return Err(NetworkError::InvalidResponse);
        }

        let time = parse_response(&response, self.config.max_stratum)?;
        Ok(time.add_micros(rtt.as_micros() / 2))
    }
}

impl TimeSource for SntpTimeSource {
    async fn fetch_network_time(&mut self) -> Result<u32, TimeError> {
        let time = self.sync().await.map_err(TimeError::from)?;
        u32::try_from(time.unix_secs).map_err(|_| TimeError::MissingTime)
    }
}
