#![cfg_attr(not(test), no_std)]

mod bus;
mod font;
mod input;
mod line;

pub use bus::*;
pub use font::*;
pub use input::*;
pub use line::*;

/// Number of digit positions on the display module
pub const DIGITS: usize = 4;

/// Brightness used whenever the display is switched on.  The controller supports 0 (dimmest)
/// through 7 (brightest).
pub const BRIGHTNESS_MAX: u8 = 0x07;

/// Errors that can come out of the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// A digit outside of `0..=9` was asked for.  Nothing was sent to the display.
    InvalidDigit(u8),

    /// The underlying line implementation failed
    Line(E),
}

impl<E> From<InvalidDigit> for Error<E> {
    fn from(InvalidDigit(digit): InvalidDigit) -> Self {
        Error::InvalidDigit(digit)
    }
}

/// The 4 decimal digits to show, left-most (most significant) first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayFrame([u8; DIGITS]);

impl DisplayFrame {
    /// Use `digits` as given.  They are checked when the frame is shown.
    pub fn new(digits: [u8; DIGITS]) -> Self {
        Self(digits)
    }

    /// Split `number` into thousands, hundreds, tens and units.
    ///
    /// Only the four lowest decimal digits fit on the display; anything above 9999 is truncated
    /// by the arithmetic, so `12345` becomes `2 3 4 5`.
    pub fn from_number(number: u16) -> Self {
        Self([
            ((number / 1000) % 10) as u8,
            ((number / 100) % 10) as u8,
            ((number / 10) % 10) as u8,
            (number % 10) as u8,
        ])
    }

    pub fn digits(&self) -> [u8; DIGITS] {
        self.0
    }

    /// Join the digits back into a number.  Inverse of [`Self::from_number`] for `0..=9999`.
    pub fn to_number(&self) -> u16 {
        self.0
            .iter()
            .fold(0u16, |acc, digit| acc * 10 + *digit as u16)
    }

    /// Segment patterns for each position, or the first digit that can't be shown
    fn encode(&self) -> Result<[u8; DIGITS], InvalidDigit> {
        let mut masks = [0u8; DIGITS];
        for (mask, digit) in masks.iter_mut().zip(self.0.iter()) {
            *mask = font::encode(*digit)?.bits();
        }

        Ok(masks)
    }
}

pub struct Tm1637Builder;

impl Tm1637Builder {
    /// Use an arbitrary [`BusDriver`] implementation; nothing more needs to be specified!
    pub fn with_bus_driver<D: BusDriver>(self, driver: D) -> Tm1637Builder3<D> {
        Tm1637Builder3 { driver }
    }

    /// Use an arbitrary [`Timer`] implementation with the bit-banging bus driver.
    pub fn with_timer<T: Timer>(self, timer: T) -> Tm1637Builder1<T> {
        Tm1637Builder1 { timer }
    }

    #[cfg(feature = "embassy-time")]
    /// Use the [`Timer`] implementation built using `embassy-time`, with the default delay unit
    pub fn with_embassy_timer(self) -> Tm1637Builder1<EmbassyTimeTimer> {
        self.with_timer(EmbassyTimeTimer::new())
    }
}

pub struct Tm1637Builder1<T: Timer> {
    timer: T,
}

impl<T: Timer> Tm1637Builder1<T> {
    /// Use the bit-banging driver, with arbitrary [`OpenDrainLine`] implementations specific to
    /// your target platform
    pub fn with_lines<Clk, Dio>(self, clk: Clk, dio: Dio) -> Tm1637Builder2<Clk, Dio, T>
    where
        Clk: OpenDrainLine,
        Dio: OpenDrainLine<Error = Clk::Error>,
    {
        Tm1637Builder2 {
            clk,
            dio,
            timer: self.timer,
        }
    }

    /// Use a bit-banging driver talking to the specified Embassy RP HAL pins, with open-drain
    /// emulated by switching the pin direction
    #[cfg(feature = "embassy-rp")]
    pub fn with_embassy_rp_pins<
        'a,
        ClockPin: embassy_rp::gpio::Pin,
        DioPin: embassy_rp::gpio::Pin,
    >(
        self,
        clock: impl embassy_rp::Peripheral<P = ClockPin> + 'a,
        dio: impl embassy_rp::Peripheral<P = DioPin> + 'a,
    ) -> Tm1637Builder2<FlexLine<'a, ClockPin>, FlexLine<'a, DioPin>, T> {
        self.with_lines(FlexLine::new(clock), FlexLine::new(dio))
    }
}

pub struct Tm1637Builder2<Clk, Dio, T: Timer> {
    clk: Clk,
    dio: Dio,
    timer: T,
}

impl<Clk, Dio, T> Tm1637Builder2<Clk, Dio, T>
where
    Clk: OpenDrainLine,
    Dio: OpenDrainLine<Error = Clk::Error>,
    T: Timer,
{
    /// Construct the [`Tm1637`] instance using the bit-banging driver.
    ///
    /// This is fallible if the underling I/O implementation is.
    pub fn build(self) -> Result<Tm1637<BitBangingBusDriver<Clk, Dio, T>>, Clk::Error> {
        let driver = BitBangingBusDriver::new(self.clk, self.dio, self.timer)?;
        Ok(Tm1637::new(driver))
    }
}

pub struct Tm1637Builder3<D: BusDriver> {
    driver: D,
}

impl<D: BusDriver> Tm1637Builder3<D> {
    /// Construct the [`Tm1637`] instance using the selected driver.
    pub fn build(self) -> Tm1637<D> {
        Tm1637::new(self.driver)
    }
}

/// Driver for TM1637 4-digit 7-segment display controllers.
///
/// The implementation is generalized over the implementation of the underling bus protocol driver,
/// behind the [`BusDriver`] trait.  This allows most of the code to remain the same, while
/// supporting multiple hardware HALs and timer implementations.
///
/// The most straightforward way to instantiate this driver is using [`Self::builder`] which
/// returns a builder type with which you can get easy access to the built-in implementations.
///
/// For example, to use the `embassy-time` timer implementation and the `embassy-rp` HAL for
/// RP2040:
///
/// ```
/// # #[cfg(all(feature = "embassy-time", feature = "embassy-rp"))]
/// # {
/// let p = embassy_rp::init(Default::default());
/// let mut display = tm1637::Tm1637::builder()
///     .with_embassy_timer()
///     .with_embassy_rp_pins(p.PIN_2, p.PIN_3)
///     .build()
///     .unwrap();
/// # }
/// ```
///
/// The TM1637 acknowledges every byte by pulling DIO low.  A missing acknowledge does not fail an
/// update; it is counted (see [`Self::missed_acks`]) and logged, and the update carries on.  A
/// display that is flaky or unplugged therefore never stalls the caller.
pub struct Tm1637<Driver> {
    driver: Driver,
    missed_acks: u32,
}

impl Tm1637<()> {
    /// Return a builder pattern implementation to ease some of the type parameter complexity
    /// around creating the bus driver and timer.
    ///
    /// This is not required; you can always instantiate the driver without a builder, but you
    /// might have to type more angle brackets to do so.
    pub fn builder() -> Tm1637Builder {
        Tm1637Builder
    }
}

impl<Driver: BusDriver> Tm1637<Driver> {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            missed_acks: 0,
        }
    }

    /// Show `number` as 4 decimal digits, with leading zeros.
    ///
    /// See [`DisplayFrame::from_number`] for what happens to values above 9999.
    pub async fn show(&mut self, number: u16) -> Result<(), Error<Driver::Error>> {
        self.show_digits(DisplayFrame::from_number(number)).await
    }

    /// Write all 4 digit positions and switch the display on at full brightness.
    ///
    /// All digits are checked before anything is sent, so an invalid digit leaves the display
    /// untouched.
    pub async fn show_digits(&mut self, frame: DisplayFrame) -> Result<(), Error<Driver::Error>> {
        let segment_masks = frame.encode()?;

        #[cfg(feature = "defmt")]
        defmt::debug!("showing {}", frame);

        self.apply_write_command(WriteCommand::SetIncrementalDisplayAddressing)
            .await?;
        self.apply_write_command(WriteCommand::WriteDigits {
            start_position: 0,
            segment_masks: &segment_masks,
        })
        .await?;
        self.apply_write_command(WriteCommand::ActivateDisplay {
            brightness: BRIGHTNESS_MAX,
        })
        .await
    }

    /// Number of transactions with at least one byte the display failed to acknowledge, since this
    /// driver was created
    pub fn missed_acks(&self) -> u32 {
        self.missed_acks
    }

    /// Give back the bus driver
    pub fn into_driver(self) -> Driver {
        self.driver
    }

    /// Apply the command to the controller
    async fn apply_write_command<'c>(
        &mut self,
        command: WriteCommand<'c>,
    ) -> Result<(), Error<Driver::Error>> {
        let (command_byte, data_bytes) = command.encode();

        #[cfg(feature = "defmt")]
        defmt::trace!("command byte = {=u8:x}", command_byte);

        let result = if let Some(data_bytes) = data_bytes {
            self.driver
                .send_command_write_data(command_byte, data_bytes)
                .await
        } else {
            self.driver.send_command(command_byte).await
        };
        let ack = result.map_err(Error::Line)?;

        if ack == Ack::Missing {
            self.missed_acks = self.missed_acks.wrapping_add(1);

            #[cfg(feature = "defmt")]
            defmt::warn!(
                "no acknowledge from display for command {=u8:x}",
                command_byte
            );
        }

        Ok(())
    }
}

/// Represents the write commands sent to the TM1637 as Rust enums for greater readability.
enum WriteCommand<'a> {
    /// Turn on the display at the given brightness.
    ActivateDisplay {
        /// Brightness, in a range from 0 to 7.  If `brightness` is larger than this range it will
        /// be set to the value `brightness` mod 8.
        brightness: u8,
    },

    /// Set the data command to "write to display register" with the address incrementing after
    /// each data byte, so all digits can be written in one transaction.
    SetIncrementalDisplayAddressing,

    /// Set the address of the first digit position to write, and write one or more segment
    /// masks to consecutive positions.  Use this only with incremental display addressing mode.
    WriteDigits {
        /// The position of the first digit to write to, `0` being the left-most.
        start_position: u8,

        /// Segment masks for the digit(s) being written to.
        segment_masks: &'a [u8],
    },
}

impl<'a> WriteCommand<'a> {
    /// Convert this command into the appropriate byte sequence to send to the controller.
    ///
    /// Return value is a tuple consisting of the following:
    ///
    /// - Command byte to send to controller
    /// - (Optional) slice of data bytes to send along with command byte
    ///
    /// The command byte and data bytes (if any) are sent together, between one start and one stop
    /// condition.
    fn encode<'me>(&'me self) -> (u8, Option<&'me [u8]>)
    where
        'a: 'me,
    {
        match self {
            WriteCommand::ActivateDisplay { brightness } => {
                // Display control command: bit 3 switches the display on, the lowest three bits
                // are the pulse width (brightness)
                #[cfg(feature = "defmt")]
                defmt::debug_assert!(*brightness < 0b1000);
                let brightness = brightness & 0b0000_0111;

                (0b1000_1000 | brightness, None)
            }
            WriteCommand::SetIncrementalDisplayAddressing => {
                // Data command, write to display register, automatic address increment, normal
                // mode
                (0b0100_0000, None)
            }
            WriteCommand::WriteDigits {
                start_position,
                segment_masks,
            } => {
                // Address command.  The module has 6 display registers (C0H-C5H); a 4-digit module
                // only has the first four wired up.
                #[cfg(feature = "defmt")]
                defmt::debug_assert!(*start_position as usize + segment_masks.len() <= 6);
                (
                    0b1100_0000 | (start_position & 0b0000_0111),
                    Some(segment_masks),
                )
            }
        }
    }
}
