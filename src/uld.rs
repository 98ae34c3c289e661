//! VL53L1X Ultra Lite Driver register sequences.
//!
//! These are the vendor-defined operations a ranging session is built from:
//! boot state, sensor init, start/stop, data-ready, result fetch, interrupt
//! clear, timing budget, inter-measurement period and distance mode. Each one
//! is a short, fixed sequence of register transactions on a [`Device`].

#[cfg(not(feature = "async"))]
use embedded_hal::i2c::I2c;
#[cfg(feature = "async")]
use embedded_hal_async::i2c::I2c;

use crate::protocol::{Device, MAX_WRITE_LEN};
use crate::Error;

/// Default 7-bit I2C address of the VL53L1X.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Value of [`Register::IdentificationModelId`] on a VL53L1X.
pub const SENSOR_ID: u16 = 0xEACC;

/// Values written to registers 0x2D..=0x87 by [`Device::sensor_init`], in
/// [`MAX_WRITE_LEN`]-byte auto-incrementing writes.
pub const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, /* 0x2d : set bits 2 and 5 for fast mode plus (1 MHz I2C) */
    0x00, /* 0x2e : bit 0 set when I2C is pulled up to AVDD instead of 1.8V */
    0x00, /* 0x2f : bit 0 set when GPIO is pulled up to AVDD instead of 1.8V */
    0x01, /* 0x30 : bit 4 selects interrupt polarity, 0 = active high */
    0x02, /* 0x31 : bit 1 = interrupt state, see `check_for_data_ready` */
    0x00, /* 0x32 */
    0x02, /* 0x33 */
    0x08, /* 0x34 */
    0x00, /* 0x35 */
    0x08, /* 0x36 */
    0x10, /* 0x37 */
    0x01, /* 0x38 */
    0x01, /* 0x39 */
    0x00, /* 0x3a */
    0x00, /* 0x3b */
    0x00, /* 0x3c */
    0x00, /* 0x3d */
    0xff, /* 0x3e */
    0x00, /* 0x3f */
    0x0F, /* 0x40 */
    0x00, /* 0x41 */
    0x00, /* 0x42 */
    0x00, /* 0x43 */
    0x00, /* 0x44 */
    0x00, /* 0x45 */
    0x20, /* 0x46 : interrupt on new sample ready */
    0x0b, /* 0x47 */
    0x00, /* 0x48 */
    0x00, /* 0x49 */
    0x02, /* 0x4a */
    0x0a, /* 0x4b : phase cal timeout, 0x0a = long distance mode */
    0x21, /* 0x4c */
    0x00, /* 0x4d */
    0x00, /* 0x4e */
    0x05, /* 0x4f */
    0x00, /* 0x50 */
    0x00, /* 0x51 */
    0x00, /* 0x52 */
    0x00, /* 0x53 */
    0xc8, /* 0x54 */
    0x00, /* 0x55 */
    0x00, /* 0x56 */
    0x38, /* 0x57 */
    0xff, /* 0x58 */
    0x01, /* 0x59 */
    0x00, /* 0x5a */
    0x08, /* 0x5b */
    0x00, /* 0x5c */
    0x00, /* 0x5d */
    0x01, /* 0x5e : timeout macro period A, 100 ms in long mode */
    0xcc, /* 0x5f */
    0x0f, /* 0x60 */
    0x01, /* 0x61 : timeout macro period B */
    0xf1, /* 0x62 */
    0x0d, /* 0x63 */
    0x01, /* 0x64 : sigma threshold MSB (14.2 mm), default 90 mm */
    0x68, /* 0x65 : sigma threshold LSB */
    0x00, /* 0x66 : min count rate MSB (9.7 MCPS) */
    0x80, /* 0x67 : min count rate LSB */
    0x08, /* 0x68 */
    0xb8, /* 0x69 */
    0x00, /* 0x6a */
    0x00, /* 0x6b */
    0x00, /* 0x6c : inter-measurement period MSB, 32 bits */
    0x00, /* 0x6d */
    0x0f, /* 0x6e */
    0x89, /* 0x6f : inter-measurement period LSB */
    0x00, /* 0x70 */
    0x00, /* 0x71 */
    0x00, /* 0x72 : distance threshold high MSB */
    0x00, /* 0x73 : distance threshold high LSB */
    0x00, /* 0x74 : distance threshold low MSB */
    0x00, /* 0x75 : distance threshold low LSB */
    0x00, /* 0x76 */
    0x01, /* 0x77 */
    0x0f, /* 0x78 */
    0x0d, /* 0x79 */
    0x0e, /* 0x7a */
    0x0e, /* 0x7b */
    0x00, /* 0x7c */
    0x00, /* 0x7d */
    0x02, /* 0x7e */
    0xc7, /* 0x7f : ROI center */
    0xff, /* 0x80 : ROI size */
    0x9B, /* 0x81 */
    0x00, /* 0x82 */
    0x00, /* 0x83 */
    0x00, /* 0x84 */
    0x01, /* 0x85 */
    0x00, /* 0x86 : interrupt clear */
    0x00, /* 0x87 : ranging start */
];

// Raw result status (low 5 bits of 0x89) to range status code.
const RANGE_STATUS_MAP: [u8; 24] = [
    255, 255, 255, 5, 2, 4, 1, 7, 3, 0, 255, 255, 9, 13, 255, 255, 255, 255, 10, 6, 255, 255,
    11, 12,
];

/// Register addresses used by the driver.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// VHV configuration timeout macro loop bound register (0x0008)
    VhvConfigTimeoutMacropLoopBound = 0x0008,
    /// VHV temperature compensation start register (0x000B)
    VhvConfigInit = 0x000B,
    /// Start of the default configuration block (0x002D)
    DefaultConfigurationStart = 0x002D,
    /// GPIO HV mux control register, interrupt polarity (0x0030)
    GpioHvMuxCtrl = 0x0030,
    /// GPIO TIO HV status register, interrupt state (0x0031)
    GpioTioHvStatus = 0x0031,
    /// Phase calibration timeout macro period, encodes distance mode (0x004B)
    PhasecalConfigTimeoutMacrop = 0x004B,
    /// Range timeout macro period A, high byte (0x005E)
    RangeConfigTimeoutMacropAHi = 0x005E,
    /// VCSEL period A (0x0060)
    RangeConfigVcselPeriodA = 0x0060,
    /// Range timeout macro period B, high byte (0x0061)
    RangeConfigTimeoutMacropBHi = 0x0061,
    /// VCSEL period B (0x0063)
    RangeConfigVcselPeriodB = 0x0063,
    /// Valid phase high limit (0x0069)
    RangeConfigValidPhaseHigh = 0x0069,
    /// Inter-measurement period, in oscillator ticks (0x006C)
    SystemIntermeasurementPeriod = 0x006C,
    /// SD0 window of interest (0x0078)
    SdConfigWoiSd0 = 0x0078,
    /// SD0 initial phase (0x007A)
    SdConfigInitialPhaseSd0 = 0x007A,
    /// System interrupt clear register (0x0086)
    SystemInterruptClear = 0x0086,
    /// System mode start register (0x0087)
    SystemModeStart = 0x0087,
    /// Start of the 17-byte result block (0x0089)
    ResultRangeStatus = 0x0089,
    /// Oscillator calibration value (0x00DE)
    ResultOscCalibrateVal = 0x00DE,
    /// Firmware system status, non-zero once booted (0x00E5)
    FirmwareSystemStatus = 0x00E5,
    /// Identification model ID register (0x010F)
    IdentificationModelId = 0x010F,
}

impl From<Register> for u16 {
    fn from(r: Register) -> Self {
        r as u16
    }
}

/// Distance mode, trading maximum range for ambient light immunity.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistanceMode {
    /// Up to ~1.3 m, better in strong ambient light
    Short = 1,
    /// Up to ~4 m in the dark
    Long = 2,
}

impl From<DistanceMode> for u8 {
    fn from(mode: DistanceMode) -> Self {
        mode as u8
    }
}

/// Status of a completed measurement, as reported by the sensor.
///
/// The numeric values are part of the vendor register contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeStatus {
    /// Valid measurement
    NoError,
    /// Signal too noisy to be precise; a larger timing budget may help
    SigmaFailure,
    /// Target too far, too dark or too small
    SignalFailure,
    /// Valid, but outside the nominal ranging zone (usually near max range)
    SensorOutOfBounds,
    /// Bright target beyond the unambiguous range; the distance is aliased
    /// and is not corrected here
    Wraparound,
    /// Any other code the sensor reports
    Other(u8),
}

impl From<u8> for RangeStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => RangeStatus::NoError,
            1 => RangeStatus::SigmaFailure,
            2 => RangeStatus::SignalFailure,
            4 => RangeStatus::SensorOutOfBounds,
            7 => RangeStatus::Wraparound,
            other => RangeStatus::Other(other),
        }
    }
}

impl From<RangeStatus> for u8 {
    fn from(status: RangeStatus) -> Self {
        match status {
            RangeStatus::NoError => 0,
            RangeStatus::SigmaFailure => 1,
            RangeStatus::SignalFailure => 2,
            RangeStatus::SensorOutOfBounds => 4,
            RangeStatus::Wraparound => 7,
            RangeStatus::Other(value) => value,
        }
    }
}

/// One measurement read from the result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangeResult {
    /// Measurement status
    pub status: RangeStatus,
    /// Distance in millimeters
    pub distance_mm: u16,
    /// Ambient rate in kcps
    pub ambient_kcps: u16,
    /// Returned signal per SPAD in kcps
    pub signal_per_spad_kcps: u16,
    /// Number of SPADs enabled for this measurement
    pub spad_count: u16,
}

impl RangeResult {
    fn from_block(block: &[u8; 17]) -> Self {
        let raw = block[0] & 0x1F;
        let status = RANGE_STATUS_MAP
            .get(usize::from(raw))
            .copied()
            .unwrap_or(raw);
        Self {
            status: RangeStatus::from(status),
            distance_mm: u16::from_be_bytes([block[13], block[14]]),
            ambient_kcps: u16::from_be_bytes([block[7], block[8]]).wrapping_mul(8),
            signal_per_spad_kcps: u16::from_be_bytes([block[15], block[16]]).wrapping_mul(8),
            spad_count: u16::from(block[3]),
        }
    }
}

// (A, B) timeout macro periods for each supported budget.
fn timing_budget_encoding(mode: DistanceMode, budget_ms: u16) -> Option<(u16, u16)> {
    let encoding = match (mode, budget_ms) {
        (DistanceMode::Short, 15) => (0x001D, 0x0027),
        (DistanceMode::Short, 20) => (0x0051, 0x006E),
        (DistanceMode::Short, 33) => (0x00D6, 0x006E),
        (DistanceMode::Short, 50) => (0x01AE, 0x01E8),
        (DistanceMode::Short, 100) => (0x02E1, 0x0388),
        (DistanceMode::Short, 200) => (0x03E1, 0x0496),
        (DistanceMode::Short, 500) => (0x0591, 0x05C1),
        (DistanceMode::Long, 20) => (0x001E, 0x0022),
        (DistanceMode::Long, 33) => (0x0060, 0x006E),
        (DistanceMode::Long, 50) => (0x00AD, 0x00C6),
        (DistanceMode::Long, 100) => (0x01CC, 0x01EA),
        (DistanceMode::Long, 200) => (0x02D9, 0x02F8),
        (DistanceMode::Long, 500) => (0x048F, 0x04A4),
        _ => return None,
    };
    Some(encoding)
}

fn timing_budget_decoding(macrop_a: u16) -> Option<u16> {
    let budget_ms = match macrop_a {
        0x001D => 15,
        0x0051 | 0x001E => 20,
        0x00D6 | 0x0060 => 33,
        0x01AE | 0x00AD => 50,
        0x02E1 | 0x01CC => 100,
        0x03E1 | 0x02D9 => 200,
        0x0591 | 0x048F => 500,
        _ => return None,
    };
    Some(budget_ms)
}

struct DistanceModeSettings {
    phasecal_timeout: u8,
    vcsel_period_a: u8,
    vcsel_period_b: u8,
    valid_phase_high: u8,
    woi_sd0: u16,
    initial_phase_sd0: u16,
}

impl DistanceMode {
    fn settings(self) -> DistanceModeSettings {
        match self {
            DistanceMode::Short => DistanceModeSettings {
                phasecal_timeout: 0x14,
                vcsel_period_a: 0x07,
                vcsel_period_b: 0x05,
                valid_phase_high: 0x38,
                woi_sd0: 0x0705,
                initial_phase_sd0: 0x0606,
            },
            DistanceMode::Long => DistanceModeSettings {
                phasecal_timeout: 0x0A,
                vcsel_period_a: 0x0F,
                vcsel_period_b: 0x0D,
                valid_phase_high: 0xB8,
                woi_sd0: 0x0F0D,
                initial_phase_sd0: 0x0E0E,
            },
        }
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<B, E, const N: usize> Device<'_, '_, B, N>
where
    B: I2c<Error = E>,
    E: core::fmt::Debug,
{
    /// Returns `true` once the sensor firmware has booted.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn boot_state(&self) -> Result<bool, Error<E>> {
        let state = self.read_byte(Register::FirmwareSystemStatus).await?;
        Ok(state != 0)
    }

    /// Reads the model ID, [`SENSOR_ID`] on a VL53L1X.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn sensor_id(&self) -> Result<u16, Error<E>> {
        self.read_word(Register::IdentificationModelId).await
    }

    /// Loads the default configuration and runs the first (VHV) measurement.
    ///
    /// The sensor must already report booted. `poll_limit` bounds the number of
    /// data-ready polls spent waiting for the VHV measurement.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If the VHV measurement never completed
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn sensor_init(&self, poll_limit: u32) -> Result<(), Error<E>> {
        debug!("Loading default configuration");
        let mut register: u16 = Register::DefaultConfigurationStart.into();
        for chunk in DEFAULT_CONFIGURATION.chunks(MAX_WRITE_LEN) {
            self.write_multi(register, chunk).await?;
            #[allow(clippy::cast_possible_truncation)]
            let written = chunk.len() as u16;
            register += written;
        }

        self.start_ranging().await?;
        let mut ready = false;
        for _ in 0..poll_limit {
            if self.check_for_data_ready().await? {
                ready = true;
                break;
            }
        }
        if !ready {
            error!("VHV measurement not ready after {} polls", poll_limit);
            return Err(Error::Timeout);
        }
        self.clear_interrupt().await?;
        self.stop_ranging().await?;

        self.write_byte(Register::VhvConfigTimeoutMacropLoopBound, 0x09)
            .await?;
        self.write_byte(Register::VhvConfigInit, 0x00).await?;
        Ok(())
    }

    /// Starts continuous ranging.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn start_ranging(&self) -> Result<(), Error<E>> {
        self.write_byte(Register::SystemModeStart, 0x40).await
    }

    /// Stops ranging.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn stop_ranging(&self) -> Result<(), Error<E>> {
        self.write_byte(Register::SystemModeStart, 0x00).await
    }

    /// Clears the data-ready interrupt so the next measurement can be reported.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn clear_interrupt(&self) -> Result<(), Error<E>> {
        self.write_byte(Register::SystemInterruptClear, 0x01).await
    }

    /// Returns `true` when a new measurement is available.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn check_for_data_ready(&self) -> Result<bool, Error<E>> {
        // bit 4 clear means the interrupt line is active high
        let polarity = self.read_byte(Register::GpioHvMuxCtrl).await?;
        let active = u8::from(polarity & 0x10 == 0);

        let status = self.read_byte(Register::GpioTioHvStatus).await?;
        Ok(status & 0x01 == active)
    }

    /// Reads the full result block of the last measurement.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn result(&self) -> Result<RangeResult, Error<E>> {
        let mut block = [0u8; 17];
        self.read_multi(Register::ResultRangeStatus, &mut block)
            .await?;
        Ok(RangeResult::from_block(&block))
    }

    /// Reads the configured distance mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UnknownConfiguration)` - If the register holds no known mode
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn distance_mode(&self) -> Result<DistanceMode, Error<E>> {
        match self
            .read_byte(Register::PhasecalConfigTimeoutMacrop)
            .await?
        {
            0x14 => Ok(DistanceMode::Short),
            0x0A => Ok(DistanceMode::Long),
            other => {
                warn!("Unknown distance mode encoding {:#x}", other);
                Err(Error::UnknownConfiguration)
            }
        }
    }

    /// Switches distance mode and re-applies the current timing budget, whose
    /// register encoding depends on the mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UnknownConfiguration)` - If the current budget cannot be read back
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn set_distance_mode(&self, mode: DistanceMode) -> Result<(), Error<E>> {
        let budget_ms = self.timing_budget_ms().await?;
        let settings = mode.settings();

        self.write_byte(Register::PhasecalConfigTimeoutMacrop, settings.phasecal_timeout)
            .await?;
        self.write_byte(Register::RangeConfigVcselPeriodA, settings.vcsel_period_a)
            .await?;
        self.write_byte(Register::RangeConfigVcselPeriodB, settings.vcsel_period_b)
            .await?;
        self.write_byte(Register::RangeConfigValidPhaseHigh, settings.valid_phase_high)
            .await?;
        self.write_word(Register::SdConfigWoiSd0, settings.woi_sd0)
            .await?;
        self.write_word(Register::SdConfigInitialPhaseSd0, settings.initial_phase_sd0)
            .await?;

        self.set_timing_budget_ms(budget_ms).await
    }

    /// Reads the timing budget in milliseconds.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UnknownConfiguration)` - If the register holds no known budget
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn timing_budget_ms(&self) -> Result<u16, Error<E>> {
        let macrop_a = self
            .read_word(Register::RangeConfigTimeoutMacropAHi)
            .await?;
        timing_budget_decoding(macrop_a).ok_or(Error::UnknownConfiguration)
    }

    /// Sets the timing budget for the current distance mode.
    ///
    /// Supported budgets are 15 (short mode only), 20, 33, 50, 100, 200 and
    /// 500 ms.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If the budget is not supported in the current mode
    /// * `Err(Error::UnknownConfiguration)` - If the distance mode cannot be read back
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn set_timing_budget_ms(&self, budget_ms: u16) -> Result<(), Error<E>> {
        let mode = self.distance_mode().await?;
        let Some((macrop_a, macrop_b)) = timing_budget_encoding(mode, budget_ms) else {
            error!("Unsupported timing budget: {} ms", budget_ms);
            return Err(Error::InvalidArgument);
        };
        self.write_word(Register::RangeConfigTimeoutMacropAHi, macrop_a)
            .await?;
        self.write_word(Register::RangeConfigTimeoutMacropBHi, macrop_b)
            .await?;
        Ok(())
    }

    /// Reads the inter-measurement period in milliseconds.
    ///
    /// # Errors
    ///
    /// * `Err(Error::UnknownConfiguration)` - If the oscillator calibration reads as zero
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn inter_measurement_ms(&self) -> Result<u32, Error<E>> {
        let period = self
            .read_dword(Register::SystemIntermeasurementPeriod)
            .await?;
        let clock_pll = self.osc_calibration().await?;
        if clock_pll == 0 {
            return Err(Error::UnknownConfiguration);
        }
        let ms = u64::from(period) * 1000 / (u64::from(clock_pll) * 1065);
        Ok(u32::try_from(ms).unwrap_or(u32::MAX))
    }

    /// Sets the inter-measurement period in milliseconds.
    ///
    /// The period must not be shorter than the timing budget; this is not
    /// checked here.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn set_inter_measurement_ms(&self, period_ms: u32) -> Result<(), Error<E>> {
        let clock_pll = self.osc_calibration().await?;
        let ticks = u64::from(clock_pll) * u64::from(period_ms) * 1075 / 1000;
        self.write_dword(
            Register::SystemIntermeasurementPeriod,
            u32::try_from(ticks).unwrap_or(u32::MAX),
        )
        .await
    }

    async fn osc_calibration(&self) -> Result<u16, Error<E>> {
        let value = self.read_word(Register::ResultOscCalibrateVal).await?;
        Ok(value & 0x3FF)
    }
}

#[cfg(all(test, not(feature = "async")))]
mod tests {
    use core::cell::RefCell;

    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;
    use crate::DeviceRegistry;

    const ADDR: u8 = DEFAULT_ADDRESS;

    fn with_device<F>(expectations: &[I2cTransaction], f: F)
    where
        F: FnOnce(Device<'_, '_, I2cMock, 1>),
    {
        let bus = RefCell::new(I2cMock::new(expectations));
        {
            let registry = DeviceRegistry::<I2cMock, 1>::new();
            let handle = registry.register(&bus, ADDR).unwrap();
            f(registry.device(handle));
        }
        bus.into_inner().done();
    }

    fn read(reg: u16, data: &[u8]) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, reg.to_be_bytes().to_vec(), data.to_vec())
    }

    fn write(reg: u16, data: &[u8]) -> I2cTransaction {
        let mut bytes = reg.to_be_bytes().to_vec();
        bytes.extend_from_slice(data);
        I2cTransaction::write(ADDR, bytes)
    }

    #[test]
    fn range_status_codes_are_bit_exact() {
        for (code, status) in [
            (0, RangeStatus::NoError),
            (1, RangeStatus::SigmaFailure),
            (2, RangeStatus::SignalFailure),
            (4, RangeStatus::SensorOutOfBounds),
            (7, RangeStatus::Wraparound),
        ] {
            assert_eq!(RangeStatus::from(code), status);
            assert_eq!(u8::from(status), code);
        }
        assert_eq!(RangeStatus::from(13), RangeStatus::Other(13));
    }

    #[test]
    fn result_block_is_decoded() {
        let mut block = [0u8; 17];
        block[0] = 0x09; // raw 9 maps to "no error"
        block[3] = 0xC4;
        block[7..9].copy_from_slice(&0x0010u16.to_be_bytes());
        block[13..15].copy_from_slice(&1234u16.to_be_bytes());
        block[15..17].copy_from_slice(&0x0020u16.to_be_bytes());

        with_device(&[read(0x0089, &block)], |dev| {
            let result = dev.result().unwrap();
            assert_eq!(result.status, RangeStatus::NoError);
            assert_eq!(result.distance_mm, 1234);
            assert_eq!(result.spad_count, 0xC4);
            assert_eq!(result.ambient_kcps, 0x80);
            assert_eq!(result.signal_per_spad_kcps, 0x100);
        });
    }

    #[test]
    fn raw_wraparound_status_is_mapped() {
        let mut block = [0u8; 17];
        block[0] = 0x27; // upper bits are ignored, raw 7 maps to wraparound
        with_device(&[read(0x0089, &block)], |dev| {
            assert_eq!(dev.result().unwrap().status, RangeStatus::Wraparound);
        });
    }

    #[test]
    fn data_ready_follows_interrupt_polarity() {
        with_device(
            &[
                read(0x0030, &[0x01]),
                read(0x0031, &[0x03]),
                read(0x0030, &[0x11]),
                read(0x0031, &[0x03]),
                read(0x0030, &[0x11]),
                read(0x0031, &[0x02]),
            ],
            |dev| {
                assert!(dev.check_for_data_ready().unwrap());
                assert!(!dev.check_for_data_ready().unwrap());
                assert!(dev.check_for_data_ready().unwrap());
            },
        );
    }

    #[test]
    fn boot_state_is_non_zero_status() {
        with_device(&[read(0x00E5, &[0x00]), read(0x00E5, &[0x01])], |dev| {
            assert!(!dev.boot_state().unwrap());
            assert!(dev.boot_state().unwrap());
        });
    }

    #[test]
    fn timing_budget_uses_mode_specific_encoding() {
        with_device(
            &[
                read(0x004B, &[0x14]),
                write(0x005E, &[0x01, 0xAE]),
                write(0x0061, &[0x01, 0xE8]),
                read(0x004B, &[0x0A]),
                write(0x005E, &[0x01, 0xCC]),
                write(0x0061, &[0x01, 0xEA]),
                read(0x005E, &[0x01, 0xCC]),
            ],
            |dev| {
                dev.set_timing_budget_ms(50).unwrap();
                dev.set_timing_budget_ms(100).unwrap();
                assert_eq!(dev.timing_budget_ms().unwrap(), 100);
            },
        );
    }

    #[test]
    fn fifteen_ms_budget_is_short_mode_only() {
        with_device(&[read(0x004B, &[0x0A])], |dev| {
            assert!(matches!(
                dev.set_timing_budget_ms(15),
                Err(Error::InvalidArgument)
            ));
        });
    }

    #[test]
    fn distance_mode_switch_reapplies_budget() {
        with_device(
            &[
                read(0x005E, &[0x01, 0xCC]),
                write(0x004B, &[0x14]),
                write(0x0060, &[0x07]),
                write(0x0063, &[0x05]),
                write(0x0069, &[0x38]),
                write(0x0078, &[0x07, 0x05]),
                write(0x007A, &[0x06, 0x06]),
                read(0x004B, &[0x14]),
                write(0x005E, &[0x02, 0xE1]),
                write(0x0061, &[0x03, 0x88]),
            ],
            |dev| dev.set_distance_mode(DistanceMode::Short).unwrap(),
        );
    }

    #[test]
    fn inter_measurement_scales_by_oscillator_calibration() {
        // 1000 ticks/ms calibration, 200 ms -> 215000 ticks
        with_device(
            &[
                read(0x00DE, &[0xFF, 0xE8]),
                write(0x006C, &215_000u32.to_be_bytes()),
                read(0x006C, &213_000u32.to_be_bytes()),
                read(0x00DE, &[0x03, 0xE8]),
            ],
            |dev| {
                dev.set_inter_measurement_ms(200).unwrap();
                assert_eq!(dev.inter_measurement_ms().unwrap(), 200);
            },
        );
    }

    #[test]
    fn sensor_init_loads_configuration_and_runs_vhv() {
        let mut expectations = vec![
            write(0x002D, &DEFAULT_CONFIGURATION[..32]),
            write(0x004D, &DEFAULT_CONFIGURATION[32..64]),
            write(0x006D, &DEFAULT_CONFIGURATION[64..]),
        ];
        expectations.extend([
            write(0x0087, &[0x40]),
            read(0x0030, &[0x01]),
            read(0x0031, &[0x00]),
            read(0x0030, &[0x01]),
            read(0x0031, &[0x01]),
            write(0x0086, &[0x01]),
            write(0x0087, &[0x00]),
            write(0x0008, &[0x09]),
            write(0x000B, &[0x00]),
        ]);

        with_device(&expectations, |dev| dev.sensor_init(10).unwrap());
    }

    #[test]
    fn sensor_init_times_out_without_vhv_result() {
        let mut expectations = vec![
            write(0x002D, &DEFAULT_CONFIGURATION[..32]),
            write(0x004D, &DEFAULT_CONFIGURATION[32..64]),
            write(0x006D, &DEFAULT_CONFIGURATION[64..]),
        ];
        expectations.extend([
            write(0x0087, &[0x40]),
            read(0x0030, &[0x01]),
            read(0x0031, &[0x00]),
            read(0x0030, &[0x01]),
            read(0x0031, &[0x00]),
        ]);

        with_device(&expectations, |dev| {
            assert!(matches!(dev.sensor_init(2), Err(Error::Timeout)));
        });
    }
}
