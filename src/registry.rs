//! Fixed-capacity table that lets several sensors share physical I2C buses.
//!
//! A [`DeviceRegistry`] maps an opaque [`DeviceHandle`] to the bus and 7-bit
//! address a sensor is reachable on. Handles carry the generation of the slot
//! they were issued from, so a handle kept past its `unregister` can never
//! reach the device that later reuses the slot.

use core::cell::RefCell;

use embedded_hal::i2c::ErrorType;

use crate::bus::SharedBus;
use crate::protocol::Device;
use crate::Error;

/// Opaque reference to a registered sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceHandle {
    index: u16,
    generation: u16,
}

impl DeviceHandle {
    /// Slot index this handle was issued from.
    #[must_use]
    pub fn index(self) -> u16 {
        self.index
    }
}

/// The bus and address a handle resolves to.
pub(crate) struct Binding<'b, B> {
    pub(crate) bus: &'b SharedBus<B>,
    pub(crate) address: u8,
}

impl<B> Clone for Binding<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for Binding<'_, B> {}

struct Slot<'b, B> {
    binding: Option<Binding<'b, B>>,
    generation: u16,
}

impl<B> Clone for Slot<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for Slot<'_, B> {}

impl<B> Slot<'_, B> {
    const FREE: Self = Self {
        binding: None,
        generation: 0,
    };
}

/// Bounded handle table shared by every session on a set of buses.
///
/// `N` is the maximum number of simultaneously registered sensors. Registration
/// never grows the table; it fails with [`Error::RegistryFull`] instead.
///
/// The registry uses interior mutability and is not `Sync`. Sharing it between
/// threads needs a lock around it.
pub struct DeviceRegistry<'b, B, const N: usize> {
    slots: RefCell<[Slot<'b, B>; N]>,
}

impl<'b, B, const N: usize> Default for DeviceRegistry<'b, B, N>
where
    B: ErrorType,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'b, B, const N: usize> DeviceRegistry<'b, B, N>
where
    B: ErrorType,
{
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: RefCell::new([Slot::FREE; N]),
        }
    }

    /// Binds `address` on `bus` to the lowest free slot and returns its handle.
    ///
    /// # Errors
    ///
    /// * `Err(Error::RegistryFull)` - If all `N` slots are in use
    pub fn register(
        &self,
        bus: &'b SharedBus<B>,
        address: u8,
    ) -> Result<DeviceHandle, Error<B::Error>> {
        let mut slots = self.slots.borrow_mut();
        let Some((index, slot)) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.binding.is_none())
        else {
            warn!("Device registry full, cannot register {:#x}", address);
            return Err(Error::RegistryFull);
        };

        slot.binding = Some(Binding { bus, address });
        #[allow(clippy::cast_possible_truncation)]
        let handle = DeviceHandle {
            index: index as u16,
            generation: slot.generation,
        };
        debug!("Registered device {:#x} in slot {}", address, index);
        Ok(handle)
    }

    /// Releases the slot behind `handle`.
    ///
    /// Unregistering a handle that is not currently registered is a caller bug:
    /// debug builds panic, release builds leave every slot untouched.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidHandle)` - If `handle` is stale or was never issued
    pub fn unregister(&self, handle: DeviceHandle) -> Result<(), Error<B::Error>> {
        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots
            .get_mut(usize::from(handle.index))
            .filter(|slot| slot.generation == handle.generation && slot.binding.is_some())
        else {
            return Err(Self::contract_violation(handle));
        };

        slot.binding = None;
        slot.generation = slot.generation.wrapping_add(1);
        debug!("Unregistered slot {}", handle.index);
        Ok(())
    }

    /// Returns `true` while `handle` refers to a live registration.
    pub fn is_registered(&self, handle: DeviceHandle) -> bool {
        self.lookup(handle).is_some()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| slot.binding.is_some())
            .count()
    }

    /// Returns `true` if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of simultaneously registered devices.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Register-level view of the device behind `handle`.
    ///
    /// The handle is checked on every transaction, not here.
    pub fn device(&self, handle: DeviceHandle) -> Device<'_, 'b, B, N> {
        Device::new(self, handle)
    }

    pub(crate) fn resolve(
        &self,
        handle: DeviceHandle,
    ) -> Result<Binding<'b, B>, Error<B::Error>> {
        match self.lookup(handle) {
            Some(binding) => Ok(binding),
            None => Err(Self::contract_violation(handle)),
        }
    }

    fn lookup(&self, handle: DeviceHandle) -> Option<Binding<'b, B>> {
        let slots = self.slots.borrow();
        let slot = slots.get(usize::from(handle.index))?;
        if slot.generation == handle.generation {
            slot.binding
        } else {
            None
        }
    }

    // Using a stale handle is a caller bug: loud in debug, contained in release.
    #[track_caller]
    fn contract_violation(handle: DeviceHandle) -> Error<B::Error> {
        error!(
            "Invalid device handle (slot {}, generation {})",
            handle.index, handle.generation
        );
        if cfg!(debug_assertions) {
            panic!("invalid device handle {:?}", handle);
        }
        Error::InvalidHandle
    }
}
