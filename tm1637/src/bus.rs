//! Module describing the [`BusDriver`] trait, the bit-banging implementation of the TM1637
//! two-wire protocol, and the [`Timer`] abstraction it uses for its delays.

// This module defines traits w/ async methods.  That triggers a warning due to the very...limited
// support for this in the current Rust version (1.76 as of this writing).  However this pertains
// only to the use of futures returned by async methods in multi-threaded executors.  As this crate
// is meant for use on embedded microcontrollers without any concept of threads, this does not
// concern us at all
#![allow(async_fn_in_trait)]

use crate::line::OpenDrainLine;

/// Delay unit used between bus transitions unless a timer is built with something else.
///
/// The TM1637 datasheet asks for far less than this, but the line rise time depends on the pull-up
/// resistors on the module and the capacitance of the wiring, so the conservative value that is
/// known to work on the common breakout boards is the default.
pub const DEFAULT_BIT_DELAY_US: u32 = 10;

/// Outcome of the acknowledge slot after a byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    /// The TM1637 pulled DIO low during the acknowledge clock
    Acknowledged,

    /// DIO stayed high.  Nothing else changes; the transfer carries on regardless.
    Missing,
}

impl Ack {
    /// Combine the outcome of two bytes in the same transaction.  Missing wins.
    pub fn and(self, other: Ack) -> Ack {
        match (self, other) {
            (Ack::Acknowledged, Ack::Acknowledged) => Ack::Acknowledged,
            _ => Ack::Missing,
        }
    }
}

/// This trait represents some implementation of the TM1637 bus interface at the byte level.
///
/// The TM1637 uses a two-wire bus that looks a lot like I2C, but with no device address and with
/// bytes sent LSB first, so an I2C peripheral can't be used.  This trait exposes the framed
/// transactions the display controller understands, leaving the bit-level details to the
/// implementation.
pub trait BusDriver {
    type Error;

    /// Send a single command, with no payload, framed by its own start and stop condition.
    async fn send_command(&mut self, b: u8) -> Result<Ack, Self::Error>;

    /// Send a command followed by a data payload, all within one start and stop condition.
    async fn send_command_write_data(&mut self, b: u8, data: &[u8]) -> Result<Ack, Self::Error>;
}

/// Abstraction on platform-specific timers to provide a generic way to pause the bus driver
/// execution in order to implement the TM1637 bus protocol correctly.
///
/// The timer situation on embedded Rust is still quite unstable, with competing timer
/// implementations, including `embasssy_time`, `embedded-time`, `fugit`, and probably others.  To
/// avoid picking a side, this very simple timer trait needs to be implemented in terms of whatever
/// your preferred timer implementation is.
pub trait Timer {
    /// Wait one delay unit, long enough for a released line to rise and for the TM1637 to meet its
    /// setup and hold times.
    async fn wait_bit_delay(&mut self);
}

/// [`Timer`] on top of any `embedded-hal-async` delay provider.
pub struct DelayNsTimer<D> {
    delay: D,
    bit_delay_us: u32,
}

impl<D: embedded_hal_async::delay::DelayNs> DelayNsTimer<D> {
    pub fn new(delay: D) -> Self {
        Self::with_bit_delay_us(delay, DEFAULT_BIT_DELAY_US)
    }

    pub fn with_bit_delay_us(delay: D, bit_delay_us: u32) -> Self {
        Self {
            delay,
            bit_delay_us,
        }
    }

    pub fn into_inner(self) -> D {
        self.delay
    }
}

impl<D: embedded_hal_async::delay::DelayNs> Timer for DelayNsTimer<D> {
    async fn wait_bit_delay(&mut self) {
        self.delay.delay_us(self.bit_delay_us).await
    }
}

#[cfg(feature = "embassy-time")]
mod embassy_time_timer {
    use embassy_time::{block_for, Duration, Timer as EmbassyTimer};

    const DEFAULT_BIT_DELAY: Duration = Duration::from_micros(super::DEFAULT_BIT_DELAY_US as u64);

    /// Yields to the executor for each delay unit.
    ///
    /// The wake-up latency of the executor gets added to each delay, so a bus transfer takes
    /// somewhat longer than the nominal bit time.  The TM1637 has no maximum clock period, so this
    /// is harmless.
    pub struct EmbassyTimeTimer {
        bit_delay: Duration,
    }

    impl EmbassyTimeTimer {
        pub fn new() -> Self {
            Self::with_bit_delay(DEFAULT_BIT_DELAY)
        }

        pub fn with_bit_delay(bit_delay: Duration) -> Self {
            Self { bit_delay }
        }
    }

    impl Default for EmbassyTimeTimer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl super::Timer for EmbassyTimeTimer {
        async fn wait_bit_delay(&mut self) {
            EmbassyTimer::after(self.bit_delay).await
        }
    }

    /// Spins on the time driver for each delay unit, blocking the whole core.
    ///
    /// This gives the tightest and most repeatable bus timing, at the cost of not letting other
    /// tasks run during a display update (about 2ms for a full update).
    pub struct BusyWaitTimer {
        bit_delay: Duration,
    }

    impl BusyWaitTimer {
        pub fn new() -> Self {
            Self::with_bit_delay(DEFAULT_BIT_DELAY)
        }

        pub fn with_bit_delay(bit_delay: Duration) -> Self {
            Self { bit_delay }
        }
    }

    impl Default for BusyWaitTimer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl super::Timer for BusyWaitTimer {
        async fn wait_bit_delay(&mut self) {
            block_for(self.bit_delay)
        }
    }
}

#[cfg(feature = "embassy-time")]
pub use embassy_time_timer::{BusyWaitTimer, EmbassyTimeTimer};

/// Implementation of [`BusDriver`] that bit-bangs the protocol on two [`OpenDrainLine`]s.
///
/// Works with any [`Timer`] implementation.  The delay unit of the timer sets the bus speed: each
/// bit takes two delay units (clock low, clock high).
pub struct BitBangingBusDriver<Clk, Dio, T> {
    clk: Clk,
    dio: Dio,
    timer: T,
}

impl<Clk, Dio, T> BitBangingBusDriver<Clk, Dio, T>
where
    Clk: OpenDrainLine,
    Dio: OpenDrainLine<Error = Clk::Error>,
    T: Timer,
{
    /// Take ownership of the lines and put the bus in its idle state, with both lines released.
    pub fn new(clk: Clk, dio: Dio, timer: T) -> Result<Self, Clk::Error> {
        let mut me = Self { clk, dio, timer };

        // DIO first, so that the clock coming up can't be mistaken for part of a STOP
        me.dio.release()?;
        me.clk.release()?;

        Ok(me)
    }

    /// Give the lines and the timer back
    pub fn into_parts(self) -> (Clk, Dio, T) {
        (self.clk, self.dio, self.timer)
    }

    /// Generate the START condition: DIO falls while CLK is high.
    ///
    /// Expects an idle bus.  Leaves both lines asserted low, ready for the first bit.
    pub async fn start(&mut self) -> Result<(), Clk::Error> {
        self.dio.release()?;
        self.clk.release()?;
        self.timer.wait_bit_delay().await;

        self.dio.assert_low()?;
        self.timer.wait_bit_delay().await;

        self.clk.assert_low()?;

        Ok(())
    }

    /// Generate the STOP condition: DIO rises while CLK is high.
    ///
    /// Leaves both lines released, so the bus is idle again.
    pub async fn stop(&mut self) -> Result<(), Clk::Error> {
        self.clk.assert_low()?;
        self.timer.wait_bit_delay().await;

        self.dio.assert_low()?;
        self.timer.wait_bit_delay().await;

        self.clk.release()?;
        self.timer.wait_bit_delay().await;

        self.dio.release()?;

        Ok(())
    }

    /// Shift the byte value out on DIO, LSB first, then clock the acknowledge slot.
    ///
    /// The TM1637 latches DIO on the rising edge of CLK, so DIO is only ever changed while CLK is
    /// low.  The acknowledge bit is sampled and returned, but a missing acknowledge doesn't alter
    /// what happens on the bus.
    pub async fn write_byte(&mut self, b: u8) -> Result<Ack, Clk::Error> {
        let mut b = b;

        for _bit in 0..8 {
            self.clk.assert_low()?;

            if b & 0x01 != 0 {
                self.dio.release()?;
            } else {
                self.dio.assert_low()?;
            }
            self.timer.wait_bit_delay().await;

            self.clk.release()?;
            self.timer.wait_bit_delay().await;

            b >>= 1;
        }

        // Acknowledge slot: let go of DIO so the TM1637 can pull it low while the clock is high
        self.clk.assert_low()?;
        self.dio.release()?;
        self.timer.wait_bit_delay().await;

        self.clk.release()?;
        self.timer.wait_bit_delay().await;

        let ack = if self.dio.is_low()? {
            Ack::Acknowledged
        } else {
            Ack::Missing
        };

        self.clk.assert_low()?;

        Ok(ack)
    }
}

impl<Clk, Dio, T> BusDriver for BitBangingBusDriver<Clk, Dio, T>
where
    Clk: OpenDrainLine,
    Dio: OpenDrainLine<Error = Clk::Error>,
    T: Timer,
{
    type Error = Clk::Error;

    async fn send_command(&mut self, b: u8) -> Result<Ack, Self::Error> {
        self.start().await?;
        let ack = self.write_byte(b).await?;
        self.stop().await?;

        Ok(ack)
    }

    async fn send_command_write_data(&mut self, b: u8, data: &[u8]) -> Result<Ack, Self::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug_assert!(!data.is_empty());

        self.start().await?;
        let mut ack = self.write_byte(b).await?;
        for b in data {
            #[cfg(feature = "defmt")]
            defmt::trace!("data byte = {=u8:x}", b);
            ack = ack.and(self.write_byte(*b).await?);
        }
        self.stop().await?;

        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::mock::{decode, new_log, Event, Frame, Log, MockLine, MockTimer, Which};
    use crate::line::LineState;
    use embassy_futures::block_on;

    type MockDriver = BitBangingBusDriver<MockLine, MockLine, MockTimer>;

    fn mock_driver(log: &Log) -> MockDriver {
        let driver = BitBangingBusDriver::new(
            MockLine::new(Which::Clk, log),
            MockLine::new(Which::Dio, log),
            MockTimer::new(log),
        )
        .unwrap();

        // Construction noise is not part of what the tests look at
        log.borrow_mut().clear();
        driver
    }

    /// The levels DIO was set to at each rising clock edge
    fn bits_latched(log: &[Event]) -> Vec<bool> {
        let mut clk = LineState::AssertedLow;
        let mut dio = LineState::AssertedLow;
        let mut bits = Vec::new();

        for event in log {
            match *event {
                Event::Line(Which::Clk, state) => {
                    if clk == LineState::AssertedLow && state == LineState::Released {
                        bits.push(dio == LineState::Released);
                    }
                    clk = state;
                }
                Event::Line(Which::Dio, state) => dio = state,
                _ => {}
            }
        }

        bits
    }

    #[test]
    fn new_leaves_bus_idle() {
        let log = new_log();
        let driver = BitBangingBusDriver::new(
            MockLine::new(Which::Clk, &log),
            MockLine::new(Which::Dio, &log),
            MockTimer::new(&log),
        )
        .unwrap();

        assert_eq!(
            &[
                Event::Line(Which::Dio, LineState::Released),
                Event::Line(Which::Clk, LineState::Released)
            ],
            &log.borrow()[..]
        );

        let (clk, dio, _timer) = driver.into_parts();
        assert_eq!(LineState::Released, clk.state());
        assert_eq!(LineState::Released, dio.state());
    }

    #[test]
    fn start_sequence() {
        let log = new_log();
        let mut driver = mock_driver(&log);

        block_on(driver.start()).unwrap();

        assert_eq!(
            &[
                Event::Line(Which::Dio, LineState::Released),
                Event::Line(Which::Clk, LineState::Released),
                Event::Delay,
                Event::Line(Which::Dio, LineState::AssertedLow),
                Event::Delay,
                Event::Line(Which::Clk, LineState::AssertedLow),
            ],
            &log.borrow()[..]
        );
    }

    #[test]
    fn stop_sequence() {
        let log = new_log();
        let mut driver = mock_driver(&log);

        block_on(driver.stop()).unwrap();

        assert_eq!(
            &[
                Event::Line(Which::Clk, LineState::AssertedLow),
                Event::Delay,
                Event::Line(Which::Dio, LineState::AssertedLow),
                Event::Delay,
                Event::Line(Which::Clk, LineState::Released),
                Event::Delay,
                Event::Line(Which::Dio, LineState::Released),
            ],
            &log.borrow()[..]
        );
    }

    #[test]
    fn start_then_stop_has_no_data() {
        let log = new_log();
        let mut driver = mock_driver(&log);

        block_on(async {
            driver.start().await.unwrap();
            driver.stop().await.unwrap();
        });

        assert_eq!(vec![Frame { bytes: vec![] }], decode(&log.borrow()));

        let (clk, dio, _timer) = driver.into_parts();
        assert_eq!(LineState::Released, clk.state());
        assert_eq!(LineState::Released, dio.state());
    }

    #[test]
    fn bytes_go_out_lsb_first() {
        let log = new_log();
        let mut driver = mock_driver(&log);
        block_on(driver.write_byte(0x01)).unwrap();

        let bits = bits_latched(&log.borrow());
        // 8 data bits plus the acknowledge clock
        assert_eq!(9, bits.len());
        assert!(bits[0], "first bit of 0x01 must be a 1");
        assert!(bits[1..8].iter().all(|bit| !bit));

        let log = new_log();
        let mut driver = mock_driver(&log);
        block_on(driver.write_byte(0x80)).unwrap();

        let bits = bits_latched(&log.borrow());
        assert!(!bits[0], "first bit of 0x80 must be a 0");
        assert!(bits[7], "eighth bit of 0x80 must be a 1");
        assert!(bits[..7].iter().all(|bit| !bit));
    }

    #[test]
    fn data_only_changes_while_clock_is_low() {
        let log = new_log();
        let mut driver = mock_driver(&log);
        block_on(driver.write_byte(0b1010_0110)).unwrap();

        let mut clk = LineState::AssertedLow;
        for event in log.borrow().iter() {
            match *event {
                Event::Line(Which::Clk, state) => clk = state,
                Event::Line(Which::Dio, _) => assert_eq!(LineState::AssertedLow, clk),
                _ => {}
            }
        }
    }

    #[test]
    fn write_byte_timing() {
        let log = new_log();
        let mut driver = mock_driver(&log);
        block_on(driver.write_byte(0x00)).unwrap();

        let log = log.borrow();

        // Two delay units per data bit plus two for the acknowledge slot
        assert_eq!(18, log.iter().filter(|e| **e == Event::Delay).count());

        // Acknowledge slot: clock low, release DIO, delay, clock high, delay, sample, clock low
        assert_eq!(
            &[
                Event::Line(Which::Clk, LineState::AssertedLow),
                Event::Line(Which::Dio, LineState::Released),
                Event::Delay,
                Event::Line(Which::Clk, LineState::Released),
                Event::Delay,
                Event::Sample(Which::Dio),
                Event::Line(Which::Clk, LineState::AssertedLow),
            ],
            &log[log.len() - 7..]
        );

        // Each data bit: clock low, DIO, delay, clock high, delay
        assert_eq!(
            &[
                Event::Line(Which::Clk, LineState::AssertedLow),
                Event::Line(Which::Dio, LineState::AssertedLow),
                Event::Delay,
                Event::Line(Which::Clk, LineState::Released),
                Event::Delay,
            ],
            &log[..5]
        );
    }

    #[test]
    fn acknowledge_is_reported_not_enforced() {
        let log = new_log();
        let mut driver = mock_driver(&log);

        // Nobody pulls DIO low: missing acknowledge, but the transfer still completes
        assert_eq!(Ack::Missing, block_on(driver.send_command(0x40)).unwrap());
        assert_eq!(vec![Frame { bytes: vec![0x40] }], decode(&log.borrow()));

        let (clk, mut dio, timer) = driver.into_parts();
        dio.slave_pulls_low = true;
        let mut driver = BitBangingBusDriver::new(clk, dio, timer).unwrap();
        assert_eq!(
            Ack::Acknowledged,
            block_on(driver.send_command_write_data(0xc0, &[1, 2, 3, 4])).unwrap()
        );
    }

    #[test]
    fn command_with_data_is_one_frame() {
        let log = new_log();
        let mut driver = mock_driver(&log);

        block_on(driver.send_command_write_data(0xc0, &[0x3f, 0x06, 0x5b, 0x4f])).unwrap();

        assert_eq!(
            vec![Frame {
                bytes: vec![0xc0, 0x3f, 0x06, 0x5b, 0x4f]
            }],
            decode(&log.borrow())
        );
    }

    #[test]
    fn delay_ns_timer_waits_one_unit() {
        struct CountingDelay(u64);

        impl embedded_hal_async::delay::DelayNs for CountingDelay {
            async fn delay_ns(&mut self, ns: u32) {
                self.0 += ns as u64;
            }
        }

        let mut timer = DelayNsTimer::new(CountingDelay(0));
        block_on(timer.wait_bit_delay());
        assert_eq!(DEFAULT_BIT_DELAY_US as u64 * 1_000, timer.into_inner().0);

        let mut timer = DelayNsTimer::with_bit_delay_us(CountingDelay(0), 3);
        block_on(async {
            timer.wait_bit_delay().await;
            timer.wait_bit_delay().await;
        });
        assert_eq!(6_000, timer.into_inner().0);
    }

    #[test]
    fn ack_combines() {
        assert_eq!(Ack::Acknowledged, Ack::Acknowledged.and(Ack::Acknowledged));
        assert_eq!(Ack::Missing, Ack::Acknowledged.and(Ack::Missing));
        assert_eq!(Ack::Missing, Ack::Missing.and(Ack::Acknowledged));
    }
}
