//! Packed RGBA colour voxel

use bytemuck::{Pod, Zeroable};

const RED_MSB: u32 = 31;
const RED_LSB: u32 = 27;
const GREEN_MSB: u32 = 26;
const GREEN_LSB: u32 = 21;
const BLUE_MSB: u32 = 20;
const BLUE_LSB: u32 = 16;
const ALPHA_MSB: u32 = 15;
const ALPHA_LSB: u32 = 12;

/// Multiplier from a stored channel back to 0..=255
const fn scale_factor(msb: u32, lsb: u32) -> u32 {
    255 / ((1 << (msb - lsb + 1)) - 1)
}

const RED_SCALE: u32 = scale_factor(RED_MSB, RED_LSB);
const GREEN_SCALE: u32 = scale_factor(GREEN_MSB, GREEN_LSB);
const BLUE_SCALE: u32 = scale_factor(BLUE_MSB, BLUE_LSB);
const ALPHA_SCALE: u32 = scale_factor(ALPHA_MSB, ALPHA_LSB);

/// Colour voxel packed into 32 bits: red 5, green 6, blue 5, alpha 4.
/// The low 12 bits are unused and kept zero.
///
/// A voxel with zero alpha is empty space.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Color(u32);

impl Color {
    /// Fully transparent, the value of unwritten voxels
    pub const EMPTY: Color = Color(0);

    /// Create from 8-bit channels. Low bits are truncated to the stored precision.
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        let mut color = Color(0);
        color.set_red(red);
        color.set_green(green);
        color.set_blue(blue);
        color.set_alpha(alpha);
        color
    }

    /// Opaque colour
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::new(red, green, blue, 255)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    pub fn red(self) -> u8 {
        (self.bits(RED_MSB, RED_LSB) * RED_SCALE) as u8
    }

    pub fn green(self) -> u8 {
        (self.bits(GREEN_MSB, GREEN_LSB) * GREEN_SCALE) as u8
    }

    pub fn blue(self) -> u8 {
        (self.bits(BLUE_MSB, BLUE_LSB) * BLUE_SCALE) as u8
    }

    pub fn alpha(self) -> u8 {
        (self.bits(ALPHA_MSB, ALPHA_LSB) * ALPHA_SCALE) as u8
    }

    pub fn set_red(&mut self, value: u8) {
        self.set_bits(RED_MSB, RED_LSB, value as u32 / RED_SCALE);
    }

    pub fn set_green(&mut self, value: u8) {
        self.set_bits(GREEN_MSB, GREEN_LSB, value as u32 / GREEN_SCALE);
    }

    pub fn set_blue(&mut self, value: u8) {
        self.set_bits(BLUE_MSB, BLUE_LSB, value as u32 / BLUE_SCALE);
    }

    pub fn set_alpha(&mut self, value: u8) {
        self.set_bits(ALPHA_MSB, ALPHA_LSB, value as u32 / ALPHA_SCALE);
    }

    /// True if the voxel occupies space
    pub fn is_solid(self) -> bool {
        self.bits(ALPHA_MSB, ALPHA_LSB) > 0
    }

    fn bits(self, msb: u32, lsb: u32) -> u32 {
        let width = msb - lsb + 1;
        (self.0 >> lsb) & ((1 << width) - 1)
    }

    fn set_bits(&mut self, msb: u32, lsb: u32, value: u32) {
        let width = msb - lsb + 1;
        let mask = ((1u32 << width) - 1) << lsb;
        self.0 = (self.0 & !mask) | ((value << lsb) & mask);
    }
}
