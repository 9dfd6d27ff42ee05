//! Show numbers typed on a serial terminal on a TM1637 display, using an RP2040 board like the Pi
//! Pico.
//!
//! UART0 (TX on GPIO 0, RX on GPIO 1) runs at 115200 8N1.  Type 4 digits; they are echoed back and
//! then shown on the display.  Anything that isn't a digit is ignored.  CLK is on GPIO 2, DIO on
//! GPIO 3.

#![no_std]
#![no_main]

use core::fmt::Write as _;
use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::{
    self, bind_interrupts,
    peripherals::UART0,
    uart::{self, Uart, UartRx, UartTx},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::Timer;
use heapless::String;
use tm1637::{DigitBuffer, Push};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    UART0_IRQ => uart::InterruptHandler<UART0>;
});

/// Digits typed so far, filled by the receive task and drained by the main loop
static INPUT: DigitBuffer = DigitBuffer::new();

/// Accepted characters waiting to be echoed back to the terminal
static ECHO: Channel<CriticalSectionRawMutex, u8, 8> = Channel::new();

const PROMPT: &[u8] = b"Give a 4-digit number: ";

/// Feed every received byte into [`INPUT`].  This is the only writer of the digit buffer.
#[embassy_executor::task]
async fn receive_task(mut rx: UartRx<'static, UART0, uart::Async>) {
    let mut byte = [0u8; 1];

    loop {
        if let Err(e) = rx.read(&mut byte).await {
            warn!("UART receive error: {}", e);
            continue;
        }

        match INPUT.push(byte[0]) {
            Push::Accepted | Push::Completed => {
                if ECHO.try_send(byte[0]).is_err() {
                    debug!("echo queue full; dropping echo of {=u8:x}", byte[0]);
                }
            }
            Push::Rejected => {
                trace!("ignoring {=u8:x}", byte[0]);
            }
        }
    }
}

async fn write(tx: &mut UartTx<'static, UART0, uart::Async>, bytes: &[u8]) {
    if let Err(e) = tx.write(bytes).await {
        warn!("UART transmit error: {}", e);
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    let uart = Uart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart::Config::default(),
    );
    let (mut tx, rx) = uart.split();

    // Instantiate the TM1637 interface using a bit-banging implementation of the bus, with the
    // `embassy-rp` HAL for the pins and the `embassy-time` timer for the delays.
    let mut display = tm1637::Tm1637::builder()
        .with_embassy_timer()
        .with_embassy_rp_pins(p.PIN_2, p.PIN_3)
        .build()
        .unwrap();

    unwrap!(spawner.spawn(receive_task(rx)));

    // Prompt once up front too, so it's obvious the board is listening
    write(&mut tx, PROMPT).await;

    loop {
        while let Ok(c) = ECHO.try_receive() {
            write(&mut tx, &[c]).await;
        }

        if let Some(number) = INPUT.take() {
            info!("displaying {=u16}", number);

            let mut message: String<32> = String::new();
            // 32 bytes is always enough for this message
            let _ = core::write!(message, "\r\nDisplaying {:04}...\r\n", number);
            write(&mut tx, message.as_bytes()).await;

            display.show(number).await.unwrap();

            write(&mut tx, PROMPT).await;
        }

        Timer::after_millis(10).await;
    }
}
