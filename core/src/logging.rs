//! Log macro selection
//!
//! Firmware builds log through `defmt`; host builds fall back to the `log`
//! facade so tests run without a defmt global logger.

#![allow(unused_imports)]

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(not(feature = "defmt"))]
pub(crate) use ::log::{debug, error, info, trace, warn};
