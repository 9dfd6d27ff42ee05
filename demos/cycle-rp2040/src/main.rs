//! Example of using a TM1637 display on an RP2040 board like the Pi Pico
//!
//! Alternates between "1234" and "8888" once a second.  CLK is on GPIO 2, DIO on GPIO 3; the
//! module's own pull-ups hold the lines high.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp;
use embassy_time::Timer;
use tm1637::{BusyWaitTimer, DisplayFrame};
use {defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    // Bit-bang the TM1637 bus on two direction-switched GPIOs, spinning for each delay unit so the
    // bus timing doesn't depend on the executor
    let mut display = tm1637::Tm1637::builder()
        .with_timer(BusyWaitTimer::new())
        .with_embassy_rp_pins(p.PIN_2, p.PIN_3)
        .build()
        .unwrap();

    info!("Cycling 1234 / 8888");

    loop {
        display
            .show_digits(DisplayFrame::new([1, 2, 3, 4]))
            .await
            .unwrap();
        Timer::after_secs(1).await;

        display
            .show_digits(DisplayFrame::new([8, 8, 8, 8]))
            .await
            .unwrap();
        Timer::after_secs(1).await;

        if display.missed_acks() > 0 {
            warn!(
                "display has missed {} acknowledges; is it connected?",
                display.missed_acks()
            );
        }
    }
}
