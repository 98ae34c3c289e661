//! Shared I2C bus the registry hands out transactions on.
//!
//! Blocking builds share a bus through a `RefCell` and talk to it through
//! `embedded-hal-bus`'s [`RefCellDevice`]. Async builds keep the bus behind an
//! `embassy-sync` mutex, so a transaction started while another one is in
//! flight waits for the bus instead of failing.

#[cfg(feature = "async")]
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex, mutex::MutexGuard};
#[cfg(not(feature = "async"))]
use {core::cell::RefCell, embedded_hal_bus::i2c::RefCellDevice};

/// A bus several sensors can be registered on.
///
/// Create one with `SharedBus::new(i2c)` and pass `&bus` to
/// [`DeviceRegistry::register`](crate::DeviceRegistry::register).
#[cfg(not(feature = "async"))]
pub type SharedBus<B> = RefCell<B>;

/// A bus several sensors can be registered on.
///
/// Create one with `SharedBus::new(i2c)` and pass `&bus` to
/// [`DeviceRegistry::register`](crate::DeviceRegistry::register). The mutex is
/// not `Sync`, like the registry itself: every session using it must run on
/// one executor.
#[cfg(feature = "async")]
pub type SharedBus<B> = Mutex<NoopRawMutex, B>;

/// Exclusive access to the bus for one transaction.
#[cfg(not(feature = "async"))]
pub(crate) fn acquire<B>(bus: &SharedBus<B>) -> RefCellDevice<'_, B> {
    RefCellDevice::new(bus)
}

/// Exclusive access to the bus for one transaction, waiting while another
/// transaction holds it.
#[cfg(feature = "async")]
pub(crate) async fn acquire<B>(bus: &SharedBus<B>) -> MutexGuard<'_, NoopRawMutex, B> {
    bus.lock().await
}
