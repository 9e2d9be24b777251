//! The video generator.
//!
//! Each cog has a video generator which serialises pixel data onto a
//! group of eight pins.  It is clocked by the cog's PLL (counter A in
//! one of its PLL modes).  Two registers control it:
//!
//! VCFG: VMode (bits 30..29: 0 off, 1 VGA, 2 and 3 composite), CMode
//! (bit 28: four-colour mode), Chroma1 (bit 27, broadcast chroma),
//! Chroma0 (bit 26, baseband chroma), AuralSub (bits 25..23), VGroup
//! (bits 11..9) and VPins (bits 7..0).
//!
//! VSCL: PixelClocks (bits 19..12) is the number of PLL clocks per
//! pixel and FrameClocks (bits 11..0) the number per frame.  In both
//! fields zero means the largest value.
//!
//! A WAITVID instruction hands the generator a colour long and a
//! pixel long.  They are latched at the start of the next frame; the
//! cog waits until then.  If no new data arrives in time, the
//! previous frame's data is shifted out again.
use serde::Serialize;
use tracing::{event, Level};

use super::clock::ClockSource;
use super::pll::PllClocked;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoMode {
    Disabled,
    Vga,
    /// Composite video with baseband on the lower nibble of the pin
    /// group.
    CompositeLow,
    /// Composite video with baseband on the upper nibble.
    CompositeHigh,
}

#[derive(Debug, Clone)]
pub struct VideoGenerator {
    config: u32,
    scale: u32,
    colors: u32,
    frame_pixels: u32,
    pixels: u32,
    pending: Option<(u32, u32)>,
    pixel_count: u32,
    frame_count: u32,
    chroma_phase: u32,
    phase: f64,
    frequency: f64,
    aural_source: Option<u32>,
    output: u64,
}

impl Default for VideoGenerator {
    fn default() -> VideoGenerator {
        VideoGenerator::new()
    }
}

impl VideoGenerator {
    #[must_use]
    pub fn new() -> VideoGenerator {
        VideoGenerator {
            config: 0,
            scale: 0,
            colors: 0,
            frame_pixels: 0,
            pixels: 0,
            pending: None,
            pixel_count: 0,
            frame_count: 0,
            chroma_phase: 0,
            phase: 0.0,
            frequency: 0.0,
            aural_source: None,
            output: 0,
        }
    }

    #[must_use]
    pub fn mode(&self) -> VideoMode {
        match (self.config >> 29) & 3 {
            0 => VideoMode::Disabled,
            1 => VideoMode::Vga,
            2 => VideoMode::CompositeLow,
            _ => VideoMode::CompositeHigh,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.mode() != VideoMode::Disabled
    }

    fn four_colour(&self) -> bool {
        self.config & (1 << 28) != 0
    }

    fn broadcast_chroma(&self) -> bool {
        self.config & (1 << 27) != 0
    }

    fn baseband_chroma(&self) -> bool {
        self.config & (1 << 26) != 0
    }

    fn pin_group(&self) -> u32 {
        (self.config >> 9) & 7
    }

    fn pin_mask(&self) -> u32 {
        self.config & 0xFF
    }

    fn pixel_clocks(&self) -> u32 {
        match (self.scale >> 12) & 0xFF {
            0 => 256,
            n => n,
        }
    }

    fn frame_clocks(&self) -> u32 {
        match self.scale & 0xFFF {
            0 => 4096,
            n => n,
        }
    }

    pub(crate) fn set_config(&mut self, value: u32) {
        self.config = value;
        self.aural_source = if self.mode() != VideoMode::Disabled
            && self.mode() != VideoMode::Vga
            && self.broadcast_chroma()
        {
            Some((value >> 23) & 7)
        } else {
            None
        };
        self.update_output();
    }

    pub(crate) fn set_scale(&mut self, value: u32) {
        self.scale = value;
    }

    /// Hands over the data of a WAITVID instruction.
    pub(crate) fn feed(&mut self, colors: u32, pixels: u32) {
        if self.pending.is_some() {
            event!(
                Level::WARN,
                "video generator was given new data before it latched the last lot"
            );
        }
        self.pending = Some((colors, pixels));
    }

    /// True while data handed over by WAITVID has not yet been
    /// latched.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// The cog whose counter modulates the aural sub-carrier, if
    /// broadcast output is enabled.
    #[must_use]
    pub fn aural_source(&self) -> Option<u32> {
        self.aural_source
    }

    /// Releases the aural sub-carrier.
    pub fn detach_aural(&mut self) {
        if let Some(source) = self.aural_source.take() {
            event!(Level::TRACE, "detaching aural source {}", source);
        }
    }

    /// The pins currently driven high by the video generator.
    #[must_use]
    pub fn output(&self) -> u64 {
        self.output
    }

    fn start_frame(&mut self) {
        self.frame_count = self.frame_clocks();
        self.pixel_count = self.pixel_clocks();
        if let Some((colors, pixels)) = self.pending.take() {
            self.colors = colors;
            self.frame_pixels = pixels;
        }
        self.pixels = self.frame_pixels;
    }

    /// Performs the work of one PLL clock.
    fn edge(&mut self) {
        self.chroma_phase = (self.chroma_phase + 1) & 0xF;
        if self.frame_count <= 1 {
            self.start_frame();
        } else {
            self.frame_count -= 1;
            if self.pixel_count <= 1 {
                self.pixel_count = self.pixel_clocks();
                self.pixels >>= if self.four_colour() { 2 } else { 1 };
            } else {
                self.pixel_count -= 1;
            }
        }
        self.update_output();
    }

    /// The luma modulator is three bits wide: bit 3 of the nibble is
    /// the broadcast carrier, which modulation never reaches.
    fn composite_nibble(&self, color: u32) -> u32 {
        let luma = color & 7;
        if color & 8 != 0 && self.baseband_chroma() {
            let hue = color >> 4;
            if (self.chroma_phase + hue) & 0xF < 8 {
                (luma + 1) & 7
            } else {
                luma.wrapping_sub(1) & 7
            }
        } else {
            luma
        }
    }

    fn update_output(&mut self) {
        let index = if self.four_colour() {
            self.pixels & 3
        } else {
            self.pixels & 1
        };
        let color = (self.colors >> (8 * index)) & 0xFF;
        let value = match self.mode() {
            VideoMode::Disabled => 0,
            VideoMode::Vga => color,
            VideoMode::CompositeLow => self.composite_nibble(color),
            VideoMode::CompositeHigh => self.composite_nibble(color) << 4,
        };
        self.output = u64::from(value & self.pin_mask()) << (8 * self.pin_group());
    }
}

impl ClockSource for VideoGenerator {
    fn time_until_edge(&self) -> f64 {
        if self.enabled() && self.frequency > 0.0 {
            (1.0 - self.phase) / self.frequency
        } else {
            f64::INFINITY
        }
    }

    fn advance(&mut self, time: f64) {
        if !self.enabled() || self.frequency <= 0.0 {
            return;
        }
        self.phase += time * self.frequency;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.edge();
        }
    }
}

impl PllClocked for VideoGenerator {
    fn retune(&mut self, frequency: f64) {
        self.frequency = frequency;
    }
}
