//! In-RAM framebuffer with dirty-region tracking.
//!
//! Screens are composed here first. [`FrameBuffer::flush`] then sends only
//! the bounding box of changed pixels to the panel in a single
//! `fill_contiguous`.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PointsIter, Rectangle};
use log::trace;

/// Bounding box of pixels that changed since the last flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}

/// `Rgb565` framebuffer sized to the panel.
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Rgb565>,
    dirty: Option<DirtyRect>,
}

impl FrameBuffer {
    /// Allocate a black framebuffer. The first flush sends the whole screen.
    pub fn new(size: Size) -> Self {
        let width = size.width as usize;
        let height = size.height as usize;
        let dirty = (width > 0 && height > 0).then(|| DirtyRect {
            min_x: 0,
            min_y: 0,
            max_x: width - 1,
            max_y: height - 1,
        });
        Self {
            width,
            height,
            pixels: vec![Rgb565::BLACK; width * height],
            dirty,
        }
    }

    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        let (x, y) = self.index_of(point)?;
        Some(self.pixels[y * self.width + x])
    }

    /// Whether anything changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    fn index_of(&self, point: Point) -> Option<(usize, usize)> {
        let x = usize::try_from(point.x).ok()?;
        let y = usize::try_from(point.y).ok()?;
        (x < self.width && y < self.height).then_some((x, y))
    }

    #[inline]
    fn set_pixel(&mut self, x: usize, y: usize, color: Rgb565) {
        let idx = y * self.width + x;
        if self.pixels[idx] != color {
            self.pixels[idx] = color;
            match &mut self.dirty {
                Some(rect) => rect.expand(x, y),
                None => self.dirty = Some(DirtyRect::from_point(x, y)),
            }
        }
    }

    /// Send the dirty region to `panel` and reset the dirty state.
    ///
    /// A no-op when nothing changed. On error the region stays dirty so the
    /// next flush retries it.
    pub fn flush<D>(&mut self, panel: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let Some(rect) = self.dirty else {
            return Ok(());
        };

        let width = rect.width();
        let height = rect.height();
        trace!(
            "Flushing {}x{} dirty region at ({}, {})",
            width, height, rect.min_x, rect.min_y
        );

        let area = Rectangle::new(
            Point::new(rect.min_x as i32, rect.min_y as i32),
            Size::new(width as u32, height as u32),
        );

        let pixels = &self.pixels;
        let stride = self.width;
        let colors = (rect.min_y..=rect.max_y).flat_map(move |y| {
            let row_start = y * stride + rect.min_x;
            pixels[row_start..row_start + width].iter().copied()
        });

        panel.fill_contiguous(&area, colors)?;
        self.dirty = None;
        Ok(())
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some((x, y)) = self.index_of(point) {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // Colours are laid out row-major over the unclipped area
        let points = area.points();
        for (point, color) in points.zip(colors) {
            if let Some((x, y)) = self.index_of(point) {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let Some(bottom_right) = area.bottom_right() else {
            return Ok(());
        };

        for y in area.top_left.y as usize..=bottom_right.y as usize {
            for x in area.top_left.x as usize..=bottom_right.x as usize {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_pixel(x, y, color);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mock_display::MockDisplay;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    #[test]
    fn test_first_flush_covers_screen() {
        let mut frame = FrameBuffer::new(Size::new(4, 3));
        let mut panel: MockDisplay<Rgb565> = MockDisplay::new();
        frame.flush(&mut panel).unwrap();
        assert_eq!(panel.affected_area(), Rectangle::new(Point::zero(), Size::new(4, 3)));
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_unchanged_pixels_are_not_dirty() {
        let mut frame = FrameBuffer::new(Size::new(8, 8));
        let mut panel: MockDisplay<Rgb565> = MockDisplay::new();
        frame.flush(&mut panel).unwrap();

        frame.clear(Rgb565::BLACK).unwrap();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_flush_sends_only_dirty_region() {
        let mut frame = FrameBuffer::new(Size::new(16, 16));
        let mut first: MockDisplay<Rgb565> = MockDisplay::new();
        frame.flush(&mut first).unwrap();

        Rectangle::new(Point::new(2, 3), Size::new(3, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::RED))
            .draw(&mut frame)
            .unwrap();

        let mut panel: MockDisplay<Rgb565> = MockDisplay::new();
        frame.flush(&mut panel).unwrap();
        assert_eq!(
            panel.affected_area(),
            Rectangle::new(Point::new(2, 3), Size::new(3, 2))
        );
        assert_eq!(frame.pixel(Point::new(3, 4)), Some(Rgb565::RED));
    }

    #[test]
    fn test_drawing_is_clipped() {
        let mut frame = FrameBuffer::new(Size::new(4, 4));
        Rectangle::new(Point::new(-2, -2), Size::new(10, 3))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::GREEN))
            .draw(&mut frame)
            .unwrap();
        assert_eq!(frame.pixel(Point::new(0, 0)), Some(Rgb565::GREEN));
        assert_eq!(frame.pixel(Point::new(3, 1)), Some(Rgb565::BLACK));
        assert_eq!(frame.pixel(Point::new(4, 0)), None);
    }
}
