#![cfg(feature = "async")]

use core::future::{self, Future};
use core::pin::pin;
use core::task::Poll;

use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
use embedded_hal_async::i2c::I2c;
use futures_test::future::FutureTestExt;
use futures_test::task::noop_context;
use vl53l1x_mux::{DeviceRegistry, SharedBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Start(u8),
    End(u8),
}

/// Bus whose transactions suspend once in the middle, like a DMA transfer.
/// Every read returns the target address.
#[derive(Default)]
struct YieldingBus {
    events: Vec<Event>,
}

impl ErrorType for YieldingBus {
    type Error = ErrorKind;
}

impl I2c for YieldingBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.events.push(Event::Start(address));
        future::ready(()).pending_once().await;
        for operation in operations {
            if let Operation::Read(buf) = operation {
                buf.fill(address);
            }
        }
        self.events.push(Event::End(address));
        Ok(())
    }
}

#[test]
fn interleaved_transactions_wait_for_the_bus() {
    let bus = SharedBus::new(YieldingBus::default());
    {
        let registry: DeviceRegistry<'_, YieldingBus, 2> = DeviceRegistry::new();
        let front = registry.device(registry.register(&bus, 0x29).unwrap());
        let rear = registry.device(registry.register(&bus, 0x30).unwrap());

        let mut cx = noop_context();
        let mut first = pin!(front.read_byte(0x00E5u16));
        let mut second = pin!(rear.read_byte(0x00E5u16));

        // first is suspended mid-transaction, second queues behind it
        assert!(first.as_mut().poll(&mut cx).is_pending());
        assert!(second.as_mut().poll(&mut cx).is_pending());

        assert!(matches!(first.as_mut().poll(&mut cx), Poll::Ready(Ok(0x29))));
        assert!(second.as_mut().poll(&mut cx).is_pending());
        assert!(matches!(second.as_mut().poll(&mut cx), Poll::Ready(Ok(0x30))));
    }

    assert_eq!(
        bus.into_inner().events,
        [
            Event::Start(0x29),
            Event::End(0x29),
            Event::Start(0x30),
            Event::End(0x30),
        ]
    );
}
