//! The boot image header.
//!
//! A program image is loaded verbatim into hub RAM starting at
//! address 0.  Its first sixteen bytes describe how to start it:
//!
//! | offset | size | field                                     |
//! | ------ | ---- | ----------------------------------------- |
//! | 0x0    | long | system clock frequency                    |
//! | 0x4    | byte | clock mode (the CLK register)             |
//! | 0x5    | byte | checksum                                  |
//! | 0x6    | word | root object address                       |
//! | 0x8    | word | variable base                             |
//! | 0xA    | word | local frame (stack frame base)            |
//! | 0xC    | word | entry point of the first method           |
//! | 0xE    | word | initial stack pointer                     |
//!
//! The checksum byte is chosen so that all the bytes of the image,
//! plus the bytes of the initial call frame which the boot loader
//! places below the local frame, sum to zero modulo 256.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use super::clockmode::ClockMode;

/// Length of the header in bytes.
pub const HEADER_LENGTH: usize = 16;

/// Images longer than hub RAM cannot be loaded.
pub const MAX_IMAGE_LENGTH: usize = 0x8000;

/// The call frame placed immediately below the local frame at
/// reset.  Returning through it lands in the ROM routine which stops
/// the cog.
pub const BOOT_FRAME: [u8; 8] = [0xFF, 0xFF, 0xF9, 0xFF, 0xFF, 0xFF, 0xF9, 0xFF];

/// Describes a problem with a boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// The image is too short to contain a header.
    Truncated(usize),
    /// The image does not fit in hub RAM.
    TooLong(usize),
    /// The bytes of the image do not sum to zero.  The value is the
    /// actual sum (modulo 256).
    BadChecksum(u8),
}

impl Display for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ImageError::Truncated(len) => write!(
                f,
                "image is only {len} bytes long, but the header alone needs {HEADER_LENGTH}"
            ),
            ImageError::TooLong(len) => write!(
                f,
                "image is {len} bytes long but hub RAM only holds {MAX_IMAGE_LENGTH}"
            ),
            ImageError::BadChecksum(sum) => {
                write!(f, "image checksum is incorrect (bytes sum to {sum:#04x})")
            }
        }
    }
}

impl Error for ImageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootHeader {
    pub clock_frequency: u32,
    pub clock_mode: ClockMode,
    pub checksum: u8,
    pub root_object: u16,
    pub variable_base: u16,
    pub local_frame: u16,
    pub entry_pc: u16,
    pub initial_stack: u16,
}

fn word_at(image: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([image[offset], image[offset + 1]])
}

impl BootHeader {
    /// Decodes the header at the start of `image`.  The checksum is
    /// not verified; see [`BootHeader::verify`].
    pub fn parse(image: &[u8]) -> Result<BootHeader, ImageError> {
        if image.len() < HEADER_LENGTH {
            return Err(ImageError::Truncated(image.len()));
        }
        Ok(BootHeader {
            clock_frequency: u32::from_le_bytes([image[0], image[1], image[2], image[3]]),
            clock_mode: ClockMode::new(image[4]),
            checksum: image[5],
            root_object: word_at(image, 6),
            variable_base: word_at(image, 8),
            local_frame: word_at(image, 0xA),
            entry_pc: word_at(image, 0xC),
            initial_stack: word_at(image, 0xE),
        })
    }

    /// Decodes the header and also checks the image length and the
    /// checksum.
    pub fn verify(image: &[u8]) -> Result<BootHeader, ImageError> {
        let header = BootHeader::parse(image)?;
        if image.len() > MAX_IMAGE_LENGTH {
            return Err(ImageError::TooLong(image.len()));
        }
        match image_sum(image) {
            0 => Ok(header),
            sum => Err(ImageError::BadChecksum(sum)),
        }
    }

    /// Encodes the header.  The checksum byte is copied as-is; use
    /// [`seal`] on the complete image to correct it.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[0..4].copy_from_slice(&self.clock_frequency.to_le_bytes());
        out[4] = self.clock_mode.bits();
        out[5] = self.checksum;
        for (offset, word) in [
            (6, self.root_object),
            (8, self.variable_base),
            (0xA, self.local_frame),
            (0xC, self.entry_pc),
            (0xE, self.initial_stack),
        ] {
            out[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// Sums the bytes of the image and the boot frame, modulo 256.
#[must_use]
pub fn image_sum(image: &[u8]) -> u8 {
    image
        .iter()
        .chain(BOOT_FRAME.iter())
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Rewrites the checksum byte of `image` so that it verifies.
pub fn seal(image: &mut [u8]) -> Result<(), ImageError> {
    if image.len() < HEADER_LENGTH {
        return Err(ImageError::Truncated(image.len()));
    }
    image[5] = 0;
    let sum = image_sum(image);
    image[5] = sum.wrapping_neg();
    Ok(())
}

#[cfg(test)]
fn sample_header() -> BootHeader {
    BootHeader {
        clock_frequency: 80_000_000,
        clock_mode: ClockMode::new(0x6F),
        checksum: 0,
        root_object: 0x10,
        variable_base: 0x20,
        local_frame: 0x28,
        entry_pc: 0x18,
        initial_stack: 0x30,
    }
}

#[test]
fn test_boot_frame_sum() {
    assert_eq!(image_sum(&[]), 0xEC);
}

#[test]
fn test_parse_header_fields() {
    let mut image = sample_header().encode().to_vec();
    image.resize(0x20, 0);
    seal(&mut image).expect("image has a header");
    let header = BootHeader::verify(&image).expect("sealed image should verify");
    assert_eq!(header.clock_frequency, 80_000_000);
    assert_eq!(header.clock_mode, ClockMode::new(0x6F));
    assert_eq!(header.root_object, 0x10);
    assert_eq!(header.variable_base, 0x20);
    assert_eq!(header.local_frame, 0x28);
    assert_eq!(header.entry_pc, 0x18);
    assert_eq!(header.initial_stack, 0x30);
}

#[test]
fn test_checksum_rejects_corruption() {
    let mut image = sample_header().encode().to_vec();
    image.push(0x21);
    seal(&mut image).expect("image has a header");
    assert!(BootHeader::verify(&image).is_ok());
    image[HEADER_LENGTH] = 0x22;
    assert_eq!(BootHeader::verify(&image), Err(ImageError::BadChecksum(1)));
    // parse() does not care.
    assert!(BootHeader::parse(&image).is_ok());
}

#[test]
fn test_truncated_and_oversize_images() {
    assert_eq!(BootHeader::parse(&[0; 15]), Err(ImageError::Truncated(15)));
    let mut big = vec![0u8; MAX_IMAGE_LENGTH + 4];
    seal(&mut big).expect("image has a header");
    assert_eq!(
        BootHeader::verify(&big),
        Err(ImageError::TooLong(MAX_IMAGE_LENGTH + 4))
    );
}
