//! Wall-clock time on the internal RTC
//!
//! Network time comes from `network::sntp`; the scheduler writes it here.
//! Between syncs the RTC (LSE, ±20-50 ppm) carries the time.
//!
//! defmt log lines are stamped with Unix seconds from the RTC, shown as
//! ISO 8601. They read 0 until the first successful sync.

mod calendar;
mod rtc;

pub use rtc::{get_timestamp, initialize_rtc, BoardRtc};

defmt::timestamp!("{=u64:iso8601s}", u64::from(get_timestamp()));
