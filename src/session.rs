//! Blocking single-shot ranging on one registered sensor.
//!
//! A [`RangingSession`] owns a registry handle from the moment it is built
//! until it is dropped. Building it waits for the sensor to boot and runs the
//! vendor init sequence; after that each [`measure_once`] call performs a full
//! start, poll, read, clear, stop cycle.
//!
//! [`measure_once`]: RangingSession::measure_once

#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};
use embedded_hal::i2c::ErrorType;

use crate::bus::SharedBus;
use crate::protocol::Device;
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::uld::{DistanceMode, RangeResult, RangeStatus};
use crate::Error;

/// Sleep between two boot-state polls.
pub const BOOT_POLL_INTERVAL_MS: u32 = 1;

/// Polling limits for the blocking parts of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    /// Boot-state polls before giving up, [`BOOT_POLL_INTERVAL_MS`] apart
    pub boot_poll_limit: u32,
    /// Back-to-back data-ready polls before a measurement times out
    pub data_ready_poll_limit: u32,
}

impl Default for SessionConfig {
    /// About one second of boot wait, and enough data-ready polls to cover
    /// the longest timing budget on a 400 kHz bus.
    fn default() -> Self {
        Self {
            boot_poll_limit: 1000,
            data_ready_poll_limit: 100_000,
        }
    }
}

/// Timing budget and inter-measurement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Time allotted to one measurement, in milliseconds
    pub budget_ms: u16,
    /// Minimum time between the starts of two measurements, in milliseconds
    pub period_ms: u32,
}

impl TimingConfig {
    /// Creates a timing configuration. Validity is checked when it is applied.
    #[must_use]
    pub const fn new(budget_ms: u16, period_ms: u32) -> Self {
        Self {
            budget_ms,
            period_ms,
        }
    }

    /// Checks that the period is not shorter than the budget.
    ///
    /// A shorter period makes the sensor skip ranging starts and silently
    /// doubles the effective period.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidTiming)` - If `period_ms < budget_ms`
    pub fn validate<E: core::fmt::Debug>(&self) -> Result<(), Error<E>> {
        if self.period_ms < u32::from(self.budget_ms) {
            return Err(Error::InvalidTiming {
                budget_ms: self.budget_ms,
                period_ms: self.period_ms,
            });
        }
        Ok(())
    }
}

/// A booted and initialized sensor, ready to range.
///
/// Dropping the session unregisters its handle.
pub struct RangingSession<'r, 'b, B, const N: usize>
where
    B: ErrorType,
{
    device: Device<'r, 'b, B, N>,
    config: SessionConfig,
    last_result: Option<RangeResult>,
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<'r, 'b, B, E, const N: usize> RangingSession<'r, 'b, B, N>
where
    B: I2c<Error = E>,
    E: core::fmt::Debug,
{
    /// Waits for the sensor behind `handle` to boot and initializes it.
    ///
    /// The boot state is polled every [`BOOT_POLL_INTERVAL_MS`] until the
    /// sensor reports booted, then the vendor init sequence runs once. On
    /// success the session takes ownership of `handle`; on failure the handle
    /// stays registered and belongs to the caller.
    ///
    /// `delay` is only needed while booting; pass `&mut delay` to keep using
    /// it afterwards.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If the sensor did not boot, or its first
    ///   measurement did not complete, within `config`'s limits
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    /// * `Err(Error::InvalidHandle)` - If `handle` is not registered
    pub async fn new<D: DelayNs>(
        registry: &'r DeviceRegistry<'b, B, N>,
        handle: DeviceHandle,
        mut delay: D,
        config: SessionConfig,
    ) -> Result<Self, Error<E>> {
        let device = registry.device(handle);

        info!("Waiting for sensor to boot");
        Self::wait_for_boot(&device, &mut delay, config.boot_poll_limit).await?;

        info!("Initializing sensor");
        device.sensor_init(config.data_ready_poll_limit).await?;

        Ok(Self {
            device,
            config,
            last_result: None,
        })
    }

    /// Registers `address` on `bus` and builds a session for it.
    ///
    /// The registration is released again if boot or init fails.
    ///
    /// # Arguments
    ///
    /// * `registry` - Registry the session takes a slot in
    /// * `bus` - Bus the sensor is wired to
    /// * `address` - 7-bit I2C address of the sensor, [`DEFAULT_ADDRESS`](crate::DEFAULT_ADDRESS) out of reset
    /// * `delay` - Delay used between boot-state polls
    /// * `config` - Polling limits
    ///
    /// # Errors
    ///
    /// * `Err(Error::RegistryFull)` - If the registry has no free slot
    /// * Any error of [`new`](Self::new)
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l1x_mux::{DeviceRegistry, RangingSession, SessionConfig, SharedBus};
    ///
    /// let left = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
    /// let right = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
    /// let registry: DeviceRegistry<'_, _, 4> = DeviceRegistry::new();
    /// let mut delay = embedded_hal_mock::eh1::delay::NoopDelay;
    ///
    /// // Two sensors on one bus (one was re-addressed at boot), one on another
    /// let front = RangingSession::open(&registry, &left, 0x29, &mut delay, SessionConfig::default())
    ///     .unwrap();
    /// let rear = RangingSession::open(&registry, &left, 0x30, &mut delay, SessionConfig::default())
    ///     .unwrap();
    /// let side = RangingSession::open(&registry, &right, 0x29, &mut delay, SessionConfig::default())
    ///     .unwrap();
    /// assert_eq!(registry.len(), 3);
    /// ```
    pub async fn open<D: DelayNs>(
        registry: &'r DeviceRegistry<'b, B, N>,
        bus: &'b SharedBus<B>,
        address: u8,
        delay: D,
        config: SessionConfig,
    ) -> Result<Self, Error<E>> {
        let handle = registry.register(bus, address)?;
        match Self::new(registry, handle, delay, config).await {
            Ok(session) => Ok(session),
            Err(e) => {
                let _ = registry.unregister(handle);
                Err(e)
            }
        }
    }

    async fn wait_for_boot<D: DelayNs>(
        device: &Device<'r, 'b, B, N>,
        delay: &mut D,
        poll_limit: u32,
    ) -> Result<(), Error<E>> {
        let mut attempts = 0u32;
        loop {
            if device.boot_state().await? {
                debug!("Sensor booted after {} polls", attempts + 1);
                break Ok(());
            }

            attempts += 1;
            if attempts >= poll_limit {
                error!("Sensor not booted after {} polls", attempts);
                break Err(Error::Timeout);
            }

            delay.delay_ms(BOOT_POLL_INTERVAL_MS).await;
        }
    }

    /// Sets the distance mode.
    ///
    /// Set the mode before [`set_timing`](Self::set_timing): the timing budget
    /// encoding depends on the mode. The current budget is re-applied for the
    /// new mode.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    /// * `Err(Error::UnknownConfiguration)` - If the current budget cannot be read back
    pub async fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), Error<E>> {
        info!("Setting distance mode {}", u8::from(mode));
        self.device.set_distance_mode(mode).await
    }

    /// Applies a timing budget and inter-measurement period.
    ///
    /// The configuration is validated before the bus is touched. The budget is
    /// written first; if the period write then fails, the previous budget is
    /// restored on a best-effort basis.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidTiming)` - If the period is shorter than the budget
    /// * `Err(Error::InvalidArgument)` - If the budget is not supported in the current mode
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l1x_mux::{
    ///     DeviceRegistry, DistanceMode, Error, RangingSession, SessionConfig, SharedBus,
    ///     TimingConfig, DEFAULT_ADDRESS,
    /// };
    ///
    /// let bus = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
    /// let registry: DeviceRegistry<'_, _, 1> = DeviceRegistry::new();
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor =
    ///     RangingSession::open(&registry, &bus, DEFAULT_ADDRESS, delay, SessionConfig::default())
    ///         .unwrap();
    ///
    /// sensor.set_distance_mode(DistanceMode::Short).unwrap();
    /// sensor.set_timing(TimingConfig::new(33, 50)).unwrap();
    ///
    /// // A period shorter than the budget never reaches the sensor
    /// assert!(matches!(
    ///     sensor.set_timing(TimingConfig::new(100, 50)),
    ///     Err(Error::InvalidTiming { budget_ms: 100, period_ms: 50 })
    /// ));
    /// ```
    pub async fn set_timing(&mut self, timing: TimingConfig) -> Result<(), Error<E>> {
        if let Err(e) = timing.validate() {
            error!(
                "Rejected timing: period {} ms < budget {} ms",
                timing.period_ms, timing.budget_ms
            );
            return Err(e);
        }

        let previous_budget = self.device.timing_budget_ms().await.ok();
        self.device.set_timing_budget_ms(timing.budget_ms).await?;

        if let Err(e) = self.device.set_inter_measurement_ms(timing.period_ms).await {
            warn!("Failed to set inter-measurement period, restoring budget");
            if let Some(previous) = previous_budget.filter(|&b| b != timing.budget_ms) {
                if self.device.set_timing_budget_ms(previous).await.is_err() {
                    warn!("Failed to restore timing budget {} ms", previous);
                }
            }
            return Err(e);
        }

        info!(
            "Timing set: budget {} ms, period {} ms",
            timing.budget_ms, timing.period_ms
        );
        Ok(())
    }

    /// Performs one complete measurement and stores its result.
    ///
    /// Starts ranging, polls data-ready without delay, reads the result, then
    /// always clears the interrupt and stops ranging. If starting fails nothing
    /// else is attempted. Cleanup failures are logged and do not affect the
    /// returned value.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If no data was ready within the poll limit
    /// * `Err(Error::I2cError(E))` - If starting, polling or reading failed
    ///
    /// # Returns
    ///
    /// * `Ok(RangeResult)` - The measurement, also kept for [`last_result`](Self::last_result)
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l1x_mux::{
    ///     DeviceRegistry, RangeStatus, RangingSession, SessionConfig, SharedBus, DEFAULT_ADDRESS,
    /// };
    ///
    /// let bus = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
    /// let registry: DeviceRegistry<'_, _, 1> = DeviceRegistry::new();
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor =
    ///     RangingSession::open(&registry, &bus, DEFAULT_ADDRESS, delay, SessionConfig::default())
    ///         .unwrap();
    ///
    /// let result = sensor.measure_once().unwrap();
    /// match result.status {
    ///     RangeStatus::NoError => println!("Distance: {} mm", result.distance_mm),
    ///     other => println!("Unreliable measurement: {:?}", other),
    /// }
    /// assert_eq!(sensor.distance_mm(), Some(result.distance_mm));
    /// ```
    pub async fn measure_once(&mut self) -> Result<RangeResult, Error<E>> {
        self.device.start_ranging().await?;

        let outcome = self.wait_and_read().await;

        if self.device.clear_interrupt().await.is_err() {
            warn!("Failed to clear interrupt");
        }
        if self.device.stop_ranging().await.is_err() {
            warn!("Failed to stop ranging");
        }

        let result = outcome?;
        trace!(
            "Measured {} mm, status {}",
            result.distance_mm,
            u8::from(result.status)
        );
        self.last_result = Some(result);
        Ok(result)
    }

    async fn wait_and_read(&self) -> Result<RangeResult, Error<E>> {
        let mut polls = 0u32;
        while !self.device.check_for_data_ready().await? {
            polls += 1;
            if polls >= self.config.data_ready_poll_limit {
                error!("No data ready after {} polls", polls);
                return Err(Error::Timeout);
            }
        }
        self.device.result().await
    }

    /// Reads the timing budget currently applied, in milliseconds.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    /// * `Err(Error::UnknownConfiguration)` - If the register holds no known budget
    pub async fn timing_budget_ms(&mut self) -> Result<u16, Error<E>> {
        self.device.timing_budget_ms().await
    }

    /// Reads the inter-measurement period currently applied, in milliseconds.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn inter_measurement_ms(&mut self) -> Result<u32, Error<E>> {
        self.device.inter_measurement_ms().await
    }

    /// Reads the distance mode currently applied.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn distance_mode(&mut self) -> Result<DistanceMode, Error<E>> {
        self.device.distance_mode().await
    }

    /// Reads the sensor model ID.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn sensor_id(&mut self) -> Result<u16, Error<E>> {
        self.device.sensor_id().await
    }
}

impl<B, const N: usize> RangingSession<'_, '_, B, N>
where
    B: ErrorType,
{
    /// Result of the last successful [`measure_once`](Self::measure_once).
    pub fn last_result(&self) -> Option<RangeResult> {
        self.last_result
    }

    /// Status of the last successful measurement.
    pub fn status(&self) -> Option<RangeStatus> {
        self.last_result.map(|r| r.status)
    }

    /// Distance of the last successful measurement, in millimeters.
    pub fn distance_mm(&self) -> Option<u16> {
        self.last_result.map(|r| r.distance_mm)
    }

    /// Registry handle owned by this session, for direct register access
    /// through [`DeviceRegistry::device`].
    pub fn handle(&self) -> DeviceHandle {
        self.device.handle()
    }

    /// Polling limits in effect.
    pub fn config(&self) -> SessionConfig {
        self.config
    }
}

impl<B, const N: usize> Drop for RangingSession<'_, '_, B, N>
where
    B: ErrorType,
{
    fn drop(&mut self) {
        let handle = self.device.handle();
        if self.device.registry().unregister(handle).is_err() {
            warn!("Session handle {} already released", handle.index());
        }
    }
}
