//! Static TLS record buffers in main SRAM
//!
//! The uplink opens one TLS session per publish, so a single pair of
//! buffers is reused for every session. They live in main SRAM because
//! CCM RAM is too small for a full 16 KB record plus overhead.

#![allow(unsafe_code)] // static mut buffers

/// Largest TLS 1.3 plaintext record (16 KB) plus header, AEAD tag and slack
const TLS_READ_BUF_SIZE: usize = 18 * 1024;

/// Outgoing records are sized by us; a payload never exceeds one record
const TLS_WRITE_BUF_SIZE: usize = 16 * 1024;

static mut TLS_READ_BUF: [u8; TLS_READ_BUF_SIZE] = [0; TLS_READ_BUF_SIZE];
static mut TLS_WRITE_BUF: [u8; TLS_WRITE_BUF_SIZE] = [0; TLS_WRITE_BUF_SIZE];

/// Borrow the read and write buffers for one TLS session
///
/// # Safety
///
/// At most one TLS session may hold these references at a time, and they
/// must not be used after that session is dropped.
pub unsafe fn tls_buffers() -> (&'static mut [u8], &'static mut [u8]) {
    (
        &mut *core::ptr::addr_of_mut!(TLS_READ_BUF),
        &mut *core::ptr::addr_of_mut!(TLS_WRITE_BUF),
    )
}
