//! Register-level transactions against a registered sensor.
//!
//! Every register index is 16 bits and goes on the wire big-endian, followed
//! (for writes) by the big-endian payload. Reads are a single `write_read`
//! so the bus is never released between the index and the data, and the bus
//! is held only for the duration of one transaction.

#[cfg(not(feature = "async"))]
use embedded_hal::i2c::I2c;
#[cfg(feature = "async")]
use embedded_hal_async::i2c::I2c;
use heapless::Vec;

use crate::bus;
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::Error;

/// Largest payload [`Device::write_multi`] accepts in one transaction.
pub const MAX_WRITE_LEN: usize = 32;

/// A registered sensor as seen by the register protocol.
///
/// This is a borrowed view: it holds no bus state of its own and resolves the
/// handle through the registry on every transaction.
pub struct Device<'r, 'b, B, const N: usize> {
    registry: &'r DeviceRegistry<'b, B, N>,
    handle: DeviceHandle,
}

impl<B, const N: usize> Clone for Device<'_, '_, B, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, const N: usize> Copy for Device<'_, '_, B, N> {}

impl<'r, 'b, B, const N: usize> Device<'r, 'b, B, N> {
    pub(crate) fn new(registry: &'r DeviceRegistry<'b, B, N>, handle: DeviceHandle) -> Self {
        Self { registry, handle }
    }

    /// Handle this view resolves through.
    #[must_use]
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Registry the handle belongs to.
    #[must_use]
    pub fn registry(&self) -> &'r DeviceRegistry<'b, B, N> {
        self.registry
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
    /// Reads `buf.len()` consecutive bytes starting at `register_address`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn read_multi<R>(&self, register_address: R, buf: &mut [u8]) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let binding = self.registry.resolve(self.handle)?;
        trace!("read {} bytes from {:#x}", buf.len(), reg);
        let mut bus = bus::acquire(binding.bus).await;
        bus.write_read(binding.address, &reg.to_be_bytes(), buf)
            .await?;
        Ok(())
    }

    /// Reads a single byte register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn read_byte<R>(&self, register_address: R) -> Result<u8, Error<E>>
    where
        R: Into<u16>,
    {
        let mut read_buffer = [0u8; 1];
        self.read_multi(register_address, &mut read_buffer).await?;
        Ok(read_buffer[0])
    }

    /// Reads a big-endian 16-bit register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use vl53l1x_mux::{DeviceRegistry, Register, SharedBus, DEFAULT_ADDRESS, SENSOR_ID};
    ///
    /// let bus = SharedBus::new(embedded_hal_mock::eh1::i2c::Mock::new(&[]));
    /// let registry: DeviceRegistry<'_, _, 1> = DeviceRegistry::new();
    /// let handle = registry.register(&bus, DEFAULT_ADDRESS).unwrap();
    ///
    /// let id = registry
    ///     .device(handle)
    ///     .read_word(Register::IdentificationModelId)
    ///     .unwrap();
    /// if id != SENSOR_ID {
    ///     println!("Unexpected sensor ID: 0x{:04X}", id);
    /// }
    /// ```
    pub async fn read_word<R>(&self, register_address: R) -> Result<u16, Error<E>>
    where
        R: Into<u16>,
    {
        let mut read_buffer = [0u8; 2];
        self.read_multi(register_address, &mut read_buffer).await?;
        Ok(u16::from_be_bytes(read_buffer))
    }

    /// Reads a big-endian 32-bit register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn read_dword<R>(&self, register_address: R) -> Result<u32, Error<E>>
    where
        R: Into<u16>,
    {
        let mut read_buffer = [0u8; 4];
        self.read_multi(register_address, &mut read_buffer).await?;
        Ok(u32::from_be_bytes(read_buffer))
    }

    /// Writes `data` to consecutive registers starting at `register_address`
    /// in one transaction, relying on the sensor's index auto-increment.
    /// `sensor_init` loads the default configuration this way.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `data` is longer than [`MAX_WRITE_LEN`]
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn write_multi<R>(&self, register_address: R, data: &[u8]) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut frame: Vec<u8, { MAX_WRITE_LEN + 2 }> = Vec::new();
        frame
            .extend_from_slice(&reg.to_be_bytes())
            .map_err(|_| Error::InvalidArgument)?;
        frame
            .extend_from_slice(data)
            .map_err(|_| Error::InvalidArgument)?;
        self.write_frame(&frame).await
    }

    /// Writes a single byte register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn write_byte<R>(&self, register_address: R, value: u8) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 3];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2] = value;
        self.write_frame(&buffer).await
    }

    /// Writes a big-endian 16-bit register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn write_word<R>(&self, register_address: R, value: u16) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 4];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..4].copy_from_slice(&value.to_be_bytes());
        self.write_frame(&buffer).await
    }

    /// Writes a big-endian 32-bit register.
    ///
    /// # Errors
    ///
    /// * `Err(Error::I2cError(E))` - If the bus transaction failed
    /// * `Err(Error::InvalidHandle)` - If the handle is no longer registered
    pub async fn write_dword<R>(&self, register_address: R, value: u32) -> Result<(), Error<E>>
    where
        R: Into<u16>,
    {
        let reg: u16 = register_address.into();
        let mut buffer = [0u8; 6];
        buffer[0..2].copy_from_slice(&reg.to_be_bytes());
        buffer[2..6].copy_from_slice(&value.to_be_bytes());
        self.write_frame(&buffer).await
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<(), Error<E>> {
        let binding = self.registry.resolve(self.handle)?;
        trace!("write {} bytes", frame.len());
        let mut bus = bus::acquire(binding.bus).await;
        bus.write(binding.address, frame).await?;
        Ok(())
    }
}
