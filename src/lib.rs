//! # VL53L1X Time-of-Flight Driver for Shared Buses
//!
//! This crate provides a `no_std` driver for ST-Microelectronics' VL53L1X
//! time-of-flight distance sensor, built for boards that put several sensors
//! on one or more I2C buses.
//!
//! Sensors are registered in a fixed-capacity [`DeviceRegistry`] that maps an
//! opaque [`DeviceHandle`] to a bus and a 7-bit address. A [`RangingSession`]
//! owns one handle, boots and initializes the sensor behind it, and performs
//! blocking single-shot measurements. Buses are shared through [`SharedBus`]:
//! a `RefCell` in blocking builds, an `embassy-sync` mutex with the `async`
//! feature.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use vl53l1x_mux::{
//!     DeviceRegistry, DistanceMode, RangingSession, SessionConfig, SharedBus, TimingConfig,
//!     DEFAULT_ADDRESS,
//! };
//!
//! let bus = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//! let registry: DeviceRegistry<'_, _, 4> = DeviceRegistry::new();
//!
//! let mut sensor =
//!     RangingSession::open(&registry, &bus, DEFAULT_ADDRESS, delay, SessionConfig::default())
//!         .unwrap();
//!
//! // Distance mode first: the timing budget encoding depends on it
//! sensor.set_distance_mode(DistanceMode::Long).unwrap();
//! sensor.set_timing(TimingConfig::new(100, 200)).unwrap();
//!
//! let result = sensor.measure_once().unwrap();
//! println!("Distance: {} mm ({:?})", result.distance_mm, result.status);
//! ```
//!
//! ## Features
//!
//! * `async` - Use `embedded-hal-async` traits instead of the blocking ones
//! * `log` - Log through the `log` crate
//! * `defmt` - Log through `defmt` and derive `defmt::Format` on public types
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod fmt; // <-- must be first module!

mod bus;
mod protocol;
mod registry;
mod session;
mod uld;

pub use bus::SharedBus;
pub use protocol::{Device, MAX_WRITE_LEN};
pub use registry::{DeviceHandle, DeviceRegistry};
pub use session::{RangingSession, SessionConfig, TimingConfig, BOOT_POLL_INTERVAL_MS};
pub use uld::{
    DistanceMode, RangeResult, RangeStatus, Register, DEFAULT_ADDRESS, DEFAULT_CONFIGURATION,
    SENSOR_ID,
};

/// Errors that can occur when talking to a sensor
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// I2C communication error from the underlying hardware
    I2cError(E),
    /// Every registry slot is in use
    RegistryFull,
    /// The handle is stale or was never issued (release builds only; debug
    /// builds panic instead)
    InvalidHandle,
    /// Inter-measurement period shorter than the timing budget
    InvalidTiming {
        /// Requested timing budget in milliseconds
        budget_ms: u16,
        /// Requested inter-measurement period in milliseconds
        period_ms: u32,
    },
    /// Sensor operation timed out
    Timeout,
    /// Invalid parameter value provided
    InvalidArgument,
    /// A configuration register holds a value the driver does not recognize
    UnknownConfiguration,
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<E: core::fmt::Debug> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}
