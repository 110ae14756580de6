//! Off-screen panel with optional PNG snapshots.

use std::path::PathBuf;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay};
use log::{trace, warn};

/// Side of the square panel, in pixels.
pub const DISPLAY_SIZE_PX: u32 = 240;

/// Renders into a [`SimulatorDisplay`] and, if configured, writes every
/// flushed frame to a PNG file (last frame wins).
pub struct SnapshotPanel {
    display: SimulatorDisplay<Rgb565>,
    snapshot: Option<PathBuf>,
    frames: u32,
}

impl SnapshotPanel {
    pub fn new(snapshot: Option<PathBuf>) -> Self {
        Self {
            display: SimulatorDisplay::new(Size::new(DISPLAY_SIZE_PX, DISPLAY_SIZE_PX)),
            snapshot,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn pixel(&self, point: Point) -> Rgb565 {
        self.display.get_pixel(point)
    }

    fn save_snapshot(&self) {
        let Some(path) = &self.snapshot else {
            return;
        };
        let image = self
            .display
            .to_rgb_output_image(&OutputSettingsBuilder::new().build());
        if let Err(e) = image.save_png(path) {
            warn!("Could not write snapshot {}: {}", path.display(), e);
        }
    }
}

impl OriginDimensions for SnapshotPanel {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl DrawTarget for SnapshotPanel {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }

    /// The frame buffer flushes through here once per screen update.
    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        self.display.fill_contiguous(area, colors)?;
        self.frames += 1;
        trace!("Frame {} ({:?})", self.frames, area);
        self.save_snapshot();
        Ok(())
    }
}
