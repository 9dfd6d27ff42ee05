//! Open-drain signal lines for the TM1637 two-wire bus.
//!
//! Both CLK and DIO are open-drain: a device only ever pulls a line low, and an external pull-up
//! restores it to high when everyone lets go.  Driving a line high from the microcontroller would
//! fight the TM1637 when it pulls DIO low for the acknowledge bit, so the [`OpenDrainLine`] trait
//! simply has no way to express "drive high".  A line is either [`LineState::Released`] or
//! [`LineState::AssertedLow`], and nothing else.

use embedded_hal_1::digital::{InputPin, OutputPin};

/// The two states an open-drain line can be commanded into.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::VariantArray)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineState {
    /// Not driven; the pull-up holds the line high unless another device pulls it low.
    Released,

    /// Actively driven low.
    AssertedLow,
}

/// One of the two signal lines of the bus.
///
/// Implementations are expected to be cheap register writes.  Releasing a line does not make it
/// high instantly; the pull-up needs some rise time, which is why the bus protocol waits a delay
/// unit after most transitions.
pub trait OpenDrainLine {
    type Error;

    /// Stop driving the line and let the pull-up bring it high.
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Drive the line low.
    fn assert_low(&mut self) -> Result<(), Self::Error>;

    /// Sample the physical level of the line.
    ///
    /// On a released line this reads whatever the other side is doing, which is how the
    /// acknowledge bit from the TM1637 is observed.
    fn is_low(&mut self) -> Result<bool, Self::Error>;

    /// The state most recently commanded by [`Self::release`] or [`Self::assert_low`]
    fn state(&self) -> LineState;

    /// Command the line into `state`
    fn set_state(&mut self, state: LineState) -> Result<(), Self::Error> {
        match state {
            LineState::Released => self.release(),
            LineState::AssertedLow => self.assert_low(),
        }
    }
}

/// A line built on a pin whose hardware is already open-drain, for example
/// `embassy_rp::gpio::OutputOpenDrain`.
///
/// Setting such a pin "high" turns the output driver off, so it maps onto
/// [`OpenDrainLine::release`] without any risk of bus contention.
pub struct OpenDrainPin<P> {
    pin: P,
    state: LineState,
}

impl<P: OutputPin + InputPin> OpenDrainPin<P> {
    /// Wrap `pin`, leaving it released.
    pub fn new(pin: P) -> Result<Self, P::Error> {
        let mut me = Self {
            pin,
            state: LineState::Released,
        };
        me.release()?;

        Ok(me)
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin + InputPin> OpenDrainLine for OpenDrainPin<P> {
    type Error = P::Error;

    fn release(&mut self) -> Result<(), P::Error> {
        self.pin.set_high()?;
        self.state = LineState::Released;
        Ok(())
    }

    fn assert_low(&mut self) -> Result<(), P::Error> {
        self.pin.set_low()?;
        self.state = LineState::AssertedLow;
        Ok(())
    }

    fn is_low(&mut self) -> Result<bool, P::Error> {
        self.pin.is_low()
    }

    fn state(&self) -> LineState {
        self.state
    }
}

#[cfg(feature = "embassy-rp")]
mod embassy_rp_line {
    use super::{LineState, OpenDrainLine};
    use core::convert::Infallible;
    use embassy_rp::gpio;

    /// Open-drain emulation on a regular RP2040 GPIO by switching the pin direction.
    ///
    /// Released means the pin is an input (hi-Z) and the pull-up on the display module holds the
    /// line high.  Asserted means the pin is an output driving low.  The output latch is only ever
    /// written low, so even a direction glitch can't put a high level on the bus.
    pub struct FlexLine<'a, P: gpio::Pin> {
        pin: gpio::Flex<'a, P>,
        state: LineState,
    }

    impl<'a, P: gpio::Pin> FlexLine<'a, P> {
        /// Take ownership of `pin`.
        ///
        /// The line starts out asserted low, the same as a freshly configured output.  The bus
        /// driver releases it when it puts the bus into the idle state.
        pub fn new(pin: impl embassy_rp::Peripheral<P = P> + 'a) -> Self {
            let mut pin = gpio::Flex::new(pin);

            // Rely on the external pull-up only
            pin.set_pull(gpio::Pull::None);
            pin.set_low();
            pin.set_as_output();

            Self {
                pin,
                state: LineState::AssertedLow,
            }
        }
    }

    impl<'a, P: gpio::Pin> OpenDrainLine for FlexLine<'a, P> {
        type Error = Infallible;

        fn release(&mut self) -> Result<(), Infallible> {
            self.pin.set_as_input();
            self.state = LineState::Released;
            Ok(())
        }

        fn assert_low(&mut self) -> Result<(), Infallible> {
            // Latch the low level before turning the output driver on
            self.pin.set_low();
            self.pin.set_as_output();
            self.state = LineState::AssertedLow;
            Ok(())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(self.pin.is_low())
        }

        fn state(&self) -> LineState {
            self.state
        }
    }
}

#[cfg(feature = "embassy-rp")]
pub use embassy_rp_line::FlexLine;
