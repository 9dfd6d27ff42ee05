//! Segment patterns for rendering decimal digits on the 7 segment displays of a TM1637 module.

/// Segment bits as the TM1637 maps them onto the SEG outputs of a typical 4-digit module:
///
/// ```text
///      a
///     ---
///  f |   | b
///     -g-
///  e |   | c
///     ---   . dp
///      d
/// ```
///
/// Bit 0 is segment `a` through bit 6 for segment `g`; bit 7 is the decimal point (or the colon on
/// clock-style modules).
pub const SEGMENT_DECIMAL_POINT: u8 = 0b1000_0000;

/// Digit patterns, indexed by the digit value.
const DIGIT_SEGMENTS: [u8; 10] = [
    0b0011_1111, /* 0 */
    0b0000_0110, /* 1 */
    0b0101_1011, /* 2 */
    0b0100_1111, /* 3 */
    0b0110_0110, /* 4 */
    0b0110_1101, /* 5 */
    0b0111_1101, /* 6 */
    0b0000_0111, /* 7 */
    0b0111_1111, /* 8 */
    0b0110_1111, /* 9 */
];

/// The byte sent to the TM1637 to light the segments of one digit position.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentPattern(u8);

impl SegmentPattern {
    pub fn bits(self) -> u8 {
        self.0
    }

    /// The same pattern with the decimal point lit
    pub fn with_decimal_point(self) -> Self {
        Self(self.0 | SEGMENT_DECIMAL_POINT)
    }
}

impl From<SegmentPattern> for u8 {
    fn from(pattern: SegmentPattern) -> u8 {
        pattern.0
    }
}

/// A value outside of `0..=9` was given where a single decimal digit was expected
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidDigit(pub u8);

/// Look up the segment pattern for a decimal digit.
pub fn encode(digit: u8) -> Result<SegmentPattern, InvalidDigit> {
    DIGIT_SEGMENTS
        .get(digit as usize)
        .copied()
        .map(SegmentPattern)
        .ok_or(InvalidDigit(digit))
}
