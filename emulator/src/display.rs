//! Frames handed from the execution thread to a display.
//!
//! The engine is the only writer of VRAM and of the display parameters. When the program
//! requests a blit, the engine copies the visible part of VRAM into a [`Frame`] and offers
//! it on a bounded channel of capacity 1. The request stays pending until the display has
//! taken the previous frame, so the display never observes VRAM while it is being written.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

use parse_display::Display;
use thiserror::Error;

use crate::constants::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum DisplayMode {
    /// Text output only, nothing to draw
    #[default]
    Console,

    /// One luminance byte per pixel
    BlackAndWhite,

    /// One palette index per pixel
    Palette,

    /// Three bytes per pixel, red, green then blue
    Bitmap,
}

impl DisplayMode {
    #[must_use]
    pub const fn from_word(value: Word) -> Option<Self> {
        match value {
            0 => Some(Self::Console),
            1 => Some(Self::BlackAndWhite),
            2 => Some(Self::Palette),
            3 => Some(Self::Bitmap),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bitmap => 3,
            Self::Console | Self::BlackAndWhite | Self::Palette => 1,
        }
    }
}

/// Display parameters set by the program
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub mode: DisplayMode,
    pub width: u32,
    pub height: u32,
    pub blit_requested: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("VRAM too small for the frame buffer: {needed} bytes needed, {available} available")]
    VramTooSmall { needed: usize, available: usize },

    #[error("display mode {0} has no pixel representation")]
    Unsupported(DisplayMode),
}

/// A snapshot of VRAM, as it was when the blit was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub mode: DisplayMode,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Copy the visible part of VRAM
    ///
    /// # Errors
    ///
    /// Fails if VRAM holds fewer bytes than the frame needs.
    pub fn capture(state: &DisplayState, vram: &[u8]) -> Result<Self, FrameError> {
        let needed = (state.width as usize)
            .saturating_mul(state.height as usize)
            .saturating_mul(state.mode.bytes_per_pixel());

        let pixels = vram.get(..needed).ok_or(FrameError::VramTooSmall {
            needed,
            available: vram.len(),
        })?;

        Ok(Self {
            mode: state.mode,
            width: state.width,
            height: state.height,
            pixels: pixels.to_vec(),
        })
    }

    /// Color of a pixel, for the modes that have one
    #[must_use]
    pub fn rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let index = (y as usize * self.width as usize + x as usize) * self.mode.bytes_per_pixel();
        match self.mode {
            DisplayMode::BlackAndWhite => {
                let l = *self.pixels.get(index)?;
                Some([l, l, l])
            }
            DisplayMode::Bitmap => {
                let rgb = self.pixels.get(index..index + 3)?;
                Some([rgb[0], rgb[1], rgb[2]])
            }
            DisplayMode::Console | DisplayMode::Palette => None,
        }
    }

    /// Encode the frame as a binary PPM image
    ///
    /// # Errors
    ///
    /// Fails for the modes which have no color representation.
    pub fn to_ppm(&self) -> Result<Vec<u8>, FrameError> {
        if !matches!(self.mode, DisplayMode::BlackAndWhite | DisplayMode::Bitmap) {
            return Err(FrameError::Unsupported(self.mode));
        }

        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        for y in 0..self.height {
            for x in 0..self.width {
                out.extend_from_slice(&self.rgb(x, y).unwrap_or_default());
            }
        }

        Ok(out)
    }
}

/// Outcome of offering a frame to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Delivered,
    Busy,
    Disconnected,
}

/// Sending half of the frame hand-off
#[derive(Debug, Clone)]
pub struct DisplayLink {
    sender: SyncSender<Frame>,
}

impl DisplayLink {
    /// Create a link and the receiver the display should poll
    #[must_use]
    pub fn channel() -> (Self, Receiver<Frame>) {
        let (sender, receiver) = sync_channel(1);
        (Self { sender }, receiver)
    }

    pub(crate) fn offer(&self, frame: Frame) -> Offer {
        match self.sender.try_send(frame) {
            Ok(()) => Offer::Delivered,
            Err(TrySendError::Full(_)) => Offer::Busy,
            Err(TrySendError::Disconnected(_)) => Offer::Disconnected,
        }
    }
}
