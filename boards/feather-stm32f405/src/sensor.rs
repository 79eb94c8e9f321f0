//! LSM6DSOX accelerometer and machine-learning core over async I2C
//!
//! One physical chip backs both the motion classifier and the raw
//! accelerometer. Each role gets its own handle on the shared I2C bus;
//! `configure` runs once on either handle at boot.

use defmt::{error, info, warn};
use embedded_hal_async::i2c::I2c;
use hal_abstractions::{Accelerometer, MotionClassifier, Sample, SensorError};

/// Classifier program as `(register, value)` writes
///
/// Export from the vendor's MLC tool and paste here. Empty means the
/// classifier never leaves state 0 and no motion interrupts fire.
pub const MLC_PROGRAM: &[(u8, u8)] = &[];

mod registers {
    /// SA0 low (Adafruit breakout default)
    pub const ADDRESS_LOW: u8 = 0x6A;
    /// SA0 high, with the breakout's DO/SA0 jumper bridged
    pub const ADDRESS_HIGH: u8 = 0x6B;

    pub const FUNC_CFG_ACCESS: u8 = 0x01;
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL1_XL: u8 = 0x10;
    pub const CTRL3_C: u8 = 0x12;
    pub const OUTX_L_A: u8 = 0x28;
    /// Embedded-function bank
    pub const MLC0_SRC: u8 = 0x70;

    pub const WHO_AM_I_VALUE: u8 = 0x6C;
    pub const EMB_FUNC_REG_ACCESS: u8 = 0x80;
    /// Block data update + register auto-increment
    pub const CTRL3_C_BDU_IF_INC: u8 = 0x44;
}

/// Accelerometer output data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OutputDataRate {
    Hz12_5,
    Hz26,
    Hz52,
    Hz104,
}

impl OutputDataRate {
    const fn odr_bits(self) -> u8 {
        match self {
            Self::Hz12_5 => 0b0001,
            Self::Hz26 => 0b0010,
            Self::Hz52 => 0b0011,
            Self::Hz104 => 0b0100,
        }
    }

    pub const fn hz(self) -> f32 {
        match self {
            Self::Hz12_5 => 12.5,
            Self::Hz26 => 26.0,
            Self::Hz52 => 52.0,
            Self::Hz104 => 104.0,
        }
    }
}

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum FullScale {
    G2,
    G4,
    G8,
    G16,
}

impl FullScale {
    const fn fs_bits(self) -> u8 {
        match self {
            Self::G2 => 0b00,
            Self::G16 => 0b01,
            Self::G4 => 0b10,
            Self::G8 => 0b11,
        }
    }

    /// Sensitivity in milli-g per LSB
    pub const fn mg_per_lsb(self) -> f32 {
        match self {
            Self::G2 => 0.061,
            Self::G4 => 0.122,
            Self::G8 => 0.244,
            Self::G16 => 0.488,
        }
    }
}

/// LSM6DSOX configuration
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct SensorConfig {
    /// Use SA0-high address 0x6B instead of 0x6A
    pub address_high: bool,
    pub odr: OutputDataRate,
    pub full_scale: FullScale,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            address_high: false,
            odr: OutputDataRate::Hz26,
            full_scale: FullScale::G2,
        }
    }
}

impl SensorConfig {
    const fn address(&self) -> u8 {
        if self.address_high {
            registers::ADDRESS_HIGH
        } else {
            registers::ADDRESS_LOW
        }
    }

    const fn ctrl1_xl(&self) -> u8 {
        (self.odr.odr_bits() << 4) | (self.full_scale.fs_bits() << 2)
    }
}

/// Convert a little-endian OUTX_L_A..OUTZ_H_A burst to milli-g
fn sample_from_raw(raw: &[u8; 6], mg_per_lsb: f32) -> Sample {
    let axis = |lo: u8, hi: u8| f32::from(i16::from_le_bytes([lo, hi])) * mg_per_lsb;
    Sample::new(
        axis(raw[0], raw[1]),
        axis(raw[2], raw[3]),
        axis(raw[4], raw[5]),
    )
}

/// One handle onto the LSM6DSOX
pub struct Lsm6dsox<I2C> {
    i2c: I2C,
    config: SensorConfig,
}

impl<I2C: I2c> Lsm6dsox<I2C> {
    pub fn new(i2c: I2C, config: SensorConfig) -> Self {
        Self { i2c, config }
    }

    /// Verify identity, set ODR/range, then load the classifier program
    ///
    /// `program` is a list of `(register, value)` writes as exported by the
    /// vendor's MLC configuration tool. The program is expected to route the
    /// MLC interrupt to INT1.
    pub async fn configure(&mut self, program: &[(u8, u8)]) -> Result<(), SensorError> {
        let who_am_i = self.read_register(registers::WHO_AM_I).await?;
        if who_am_i != registers::WHO_AM_I_VALUE {
            error!(
                "LSM6DSOX WHO_AM_I mismatch: expected {:#x}, got {:#x}",
                registers::WHO_AM_I_VALUE,
                who_am_i
            );
            return Err(SensorError::NotReady);
        }

        self.write_register(registers::CTRL3_C, registers::CTRL3_C_BDU_IF_INC)
            .await?;
        self.write_register(registers::CTRL1_XL, self.config.ctrl1_xl())
            .await?;

        if program.is_empty() {
            warn!("No MLC program loaded, classifier output stays 0");
        }
        for &(register, value) in program {
            self.write_register(register, value).await?;
        }

        // A program may leave the embedded-function bank selected
        self.write_register(registers::FUNC_CFG_ACCESS, 0x00).await?;

        info!(
            "LSM6DSOX configured: {} Hz, {} mg/LSB, {} MLC writes",
            self.config.odr.hz(),
            self.config.full_scale.mg_per_lsb(),
            program.len()
        );
        Ok(())
    }

    async fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.config.address(), &[register], &mut value)
            .await
            .map_err(|_| SensorError::Bus)?;
        Ok(value[0])
    }

    async fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.config.address(), &[register, value])
            .await
            .map_err(|_| SensorError::Bus)
    }

    async fn read_mlc_output(&mut self) -> Result<u8, SensorError> {
        self.write_register(registers::FUNC_CFG_ACCESS, registers::EMB_FUNC_REG_ACCESS)
            .await?;
        let result = self.read_register(registers::MLC0_SRC).await;
        // Always leave the embedded-function bank, even after a failed read
        let restore = self.write_register(registers::FUNC_CFG_ACCESS, 0x00).await;
        let state = result?;
        restore?;
        Ok(state)
    }
}

impl<I2C: I2c> MotionClassifier for Lsm6dsox<I2C> {
    async fn read_state(&mut self) -> Result<u8, SensorError> {
        self.read_mlc_output().await
    }
}

impl<I2C: I2c> Accelerometer for Lsm6dsox<I2C> {
    async fn read_sample(&mut self) -> Result<Sample, SensorError> {
        let mut raw = [0u8; 6];
        self.i2c
            .write_read(self.config.address(), &[registers::OUTX_L_A], &mut raw)
            .await
            .map_err(|_| SensorError::Bus)?;
        Ok(sample_from_raw(&raw, self.config.full_scale.mg_per_lsb()))
    }

    fn output_data_rate_hz(&self) -> f32 {
        self.config.odr.hz()
    }
}
