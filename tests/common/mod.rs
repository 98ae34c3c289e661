//! Transaction builders shared by the integration tests.
//!
//! Every builder returns the exact bus traffic one driver operation produces,
//! so a test reads as the sequence of operations it expects.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal_mock::eh1::i2c::Transaction as I2cTransaction;
use vl53l1x_mux::{DEFAULT_CONFIGURATION, MAX_WRITE_LEN};

/// Register read: index write followed by `data.len()` bytes.
pub fn read(address: u8, register: u16, data: &[u8]) -> I2cTransaction {
    I2cTransaction::write_read(address, register.to_be_bytes().to_vec(), data.to_vec())
}

/// Register write: index followed by the payload in one frame.
pub fn write(address: u8, register: u16, payload: &[u8]) -> I2cTransaction {
    let mut frame = register.to_be_bytes().to_vec();
    frame.extend_from_slice(payload);
    I2cTransaction::write(address, frame)
}

/// Boot-state polls: `not_booted` zero reads, then a booted one.
pub fn boot(address: u8, not_booted: usize) -> Vec<I2cTransaction> {
    let mut transactions = vec![read(address, 0x00E5, &[0x00]); not_booted];
    transactions.push(read(address, 0x00E5, &[0x03]));
    transactions
}

/// One data-ready poll with active-high interrupt polarity.
pub fn data_ready(address: u8, ready: bool) -> [I2cTransaction; 2] {
    [
        read(address, 0x0030, &[0x01]),
        read(address, 0x0031, &[u8::from(ready)]),
    ]
}

/// Default configuration load plus the VHV measurement, ready on first poll.
pub fn sensor_init(address: u8) -> Vec<I2cTransaction> {
    let mut transactions: Vec<I2cTransaction> = (0x002Du16..)
        .step_by(MAX_WRITE_LEN)
        .zip(DEFAULT_CONFIGURATION.chunks(MAX_WRITE_LEN))
        .map(|(register, chunk)| write(address, register, chunk))
        .collect();
    transactions.push(start_ranging(address));
    transactions.extend(data_ready(address, true));
    transactions.push(clear_interrupt(address));
    transactions.push(stop_ranging(address));
    transactions.push(write(address, 0x0008, &[0x09]));
    transactions.push(write(address, 0x000B, &[0x00]));
    transactions
}

/// Everything `RangingSession::open` puts on the bus for a sensor that boots
/// on the first poll.
pub fn open(address: u8) -> Vec<I2cTransaction> {
    let mut transactions = boot(address, 0);
    transactions.extend(sensor_init(address));
    transactions
}

pub fn start_ranging(address: u8) -> I2cTransaction {
    write(address, 0x0087, &[0x40])
}

pub fn stop_ranging(address: u8) -> I2cTransaction {
    write(address, 0x0087, &[0x00])
}

pub fn clear_interrupt(address: u8) -> I2cTransaction {
    write(address, 0x0086, &[0x01])
}

/// A 17-byte result block with the given raw status, distance, ambient and
/// signal registers and SPAD count.
pub fn result_block(
    raw_status: u8,
    distance_mm: u16,
    ambient: u16,
    signal: u16,
    spads: u8,
) -> Vec<u8> {
    let mut block = vec![0u8; 17];
    block[0] = raw_status;
    block[3] = spads;
    block[7..9].copy_from_slice(&ambient.to_be_bytes());
    block[13..15].copy_from_slice(&distance_mm.to_be_bytes());
    block[15..17].copy_from_slice(&signal.to_be_bytes());
    block
}

/// Delay that records every millisecond sleep instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    sleeps: Rc<RefCell<Vec<u32>>>,
}

impl RecordingDelay {
    pub fn sleeps(&self) -> Vec<u32> {
        self.sleeps.borrow().clone()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
    }
}
