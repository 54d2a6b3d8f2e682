//! Bit-level message packing for quantized device state payloads
//!
//! Device state is broadcast as small bit-packed blobs inside the bincode
//! packet envelope: booleans as single bits, ranged floats as fixed-width
//! unsigned integers scaled linearly across their declared domain, and small
//! enums as fixed-width fields sized to the declared state count. Encode and
//! decode must agree on field order and bit widths, and every device payload
//! is padded to a byte boundary after its last field.

use std::fmt;

/// Errors surfaced while decoding a bit-packed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Reader ran past the end of the payload
    OutOfBits,
    /// A fixed-width field decoded to a value outside its declared domain
    OutOfRange,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::OutOfBits => write!(f, "payload ended mid-field"),
            WireError::OutOfRange => write!(f, "field value outside declared range"),
        }
    }
}

impl std::error::Error for WireError {}

/// Returns the number of bits needed to encode values in `0..count`
pub fn bits_for_state_count(count: u32) -> u8 {
    debug_assert!(count > 1);
    (32 - (count - 1).leading_zeros()) as u8
}

/// Accumulates bits MSB-first into a growable byte buffer
#[derive(Debug, Default)]
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(16),
            bits_written: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;
        if bit {
            self.scratch |= 1;
        }
        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index == 8 {
            self.buffer.push(self.scratch);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    /// Writes the low `bits` bits of `value`, most significant first
    pub fn write_bits(&mut self, value: u32, bits: u8) {
        debug_assert!(bits <= 32);
        for i in (0..bits).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    /// Writes a full-precision float as its 32 raw bits
    pub fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    /// Quantizes `value` across `[min, max]` into a `bits`-wide field.
    /// Values outside the domain are clamped before quantization.
    pub fn write_ranged_f32(&mut self, value: f32, min: f32, max: f32, bits: u8) {
        debug_assert!(max > min);
        let max_encoded = ((1u32 << bits) - 1) as f32;
        let normalized = (value.clamp(min, max) - min) / (max - min);
        let quantized = (normalized * max_encoded).round() as u32;
        self.write_bits(quantized, bits);
    }

    /// Writes `value` from `min..=max` in the minimum fixed width for the range
    pub fn write_ranged_u32(&mut self, value: u32, min: u32, max: u32) {
        debug_assert!(value >= min && value <= max);
        let bits = bits_for_state_count(max - min + 1);
        self.write_bits(value - min, bits);
    }

    /// Pads with zero bits up to the next byte boundary
    pub fn write_pad_bits(&mut self) {
        while self.scratch_index != 0 {
            self.write_bit(false);
        }
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.write_pad_bits();
        self.buffer
    }
}

/// Reads bits MSB-first from a byte slice, mirroring [`BitWriter`]
#[derive(Debug)]
pub struct BitReader<'a> {
    buffer: &'a [u8],
    bit_index: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_index: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<bool, WireError> {
        let byte = self.bit_index / 8;
        if byte >= self.buffer.len() {
            return Err(WireError::OutOfBits);
        }
        let shift = 7 - (self.bit_index % 8);
        self.bit_index += 1;
        Ok((self.buffer[byte] >> shift) & 1 != 0)
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        self.read_bit()
    }

    pub fn read_bits(&mut self, bits: u8) -> Result<u32, WireError> {
        debug_assert!(bits <= 32);
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    /// Decodes a `bits`-wide quantized field back into `[min, max]`
    pub fn read_ranged_f32(&mut self, min: f32, max: f32, bits: u8) -> Result<f32, WireError> {
        debug_assert!(max > min);
        let max_encoded = ((1u32 << bits) - 1) as f32;
        let quantized = self.read_bits(bits)? as f32;
        Ok(min + (quantized / max_encoded) * (max - min))
    }

    pub fn read_ranged_u32(&mut self, min: u32, max: u32) -> Result<u32, WireError> {
        let bits = bits_for_state_count(max - min + 1);
        let value = min + self.read_bits(bits)?;
        if value > max {
            return Err(WireError::OutOfRange);
        }
        Ok(value)
    }

    /// Skips the zero padding inserted by [`BitWriter::write_pad_bits`]
    pub fn read_pad_bits(&mut self) {
        let rem = self.bit_index % 8;
        if rem != 0 {
            self.bit_index += 8 - rem;
        }
    }
}
