//! [`TallyDisplay`] on top of any `embedded-graphics` panel.

use core::fmt::Debug;
use core::net::Ipv4Addr;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use log::debug;
use thiserror_no_std::Error;

use super::{FrameBuffer, IndicatorLayout, draw_identity, draw_notice};
use crate::identity::MacAddress;
use crate::platform::{Severity, TallyDisplay};
use crate::tally::{CameraNumber, TallyIndication};

/// Panel backlight (PWM channel, PMIC rail, ...).
pub trait Backlight {
    type Error: Debug;

    /// Brightness in percent, `0..=100`.
    fn set_level(&mut self, pct: u8) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum DisplayError<P: Debug, B: Debug> {
    #[error("panel write failed: {0:?}")]
    Panel(P),
    #[error("backlight control failed: {0:?}")]
    Backlight(B),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Tally,
    Notice,
    Identity,
}

/// Tally display drawing through a [`FrameBuffer`].
pub struct GraphicsDisplay<P, B> {
    panel: P,
    backlight: B,
    frame: FrameBuffer,
    layout: IndicatorLayout,
    indication: TallyIndication,
    camera: Option<CameraNumber>,
    screen: Screen,
    /// The panel shows the current tally state.
    tally_drawn: bool,
}

impl<P, B> GraphicsDisplay<P, B>
where
    P: DrawTarget<Color = Rgb565>,
    P::Error: Debug,
    B: Backlight,
{
    pub fn new(panel: P, backlight: B) -> Self {
        let frame = FrameBuffer::new(panel.bounding_box().size);
        Self {
            panel,
            backlight,
            frame,
            layout: IndicatorLayout::default(),
            indication: TallyIndication::Unassigned,
            camera: None,
            screen: Screen::Tally,
            tally_drawn: false,
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn layout(&self) -> IndicatorLayout {
        self.layout
    }

    fn flush(&mut self) -> Result<(), DisplayError<P::Error, B::Error>> {
        self.frame.flush(&mut self.panel).map_err(DisplayError::Panel)
    }

    fn redraw_tally(&mut self) -> Result<(), DisplayError<P::Error, B::Error>> {
        self.screen = Screen::Tally;
        self.tally_drawn = false;
        let Ok(()) = self.layout.draw(&mut self.frame, self.indication, self.camera);
        self.flush()?;
        self.tally_drawn = true;
        Ok(())
    }
}

impl<P, B> TallyDisplay for GraphicsDisplay<P, B>
where
    P: DrawTarget<Color = Rgb565>,
    P::Error: Debug,
    B: Backlight,
{
    type Error = DisplayError<P::Error, B::Error>;

    fn set_layout(&mut self, layout: IndicatorLayout) -> Result<(), Self::Error> {
        debug!("Indicator layout: {:?}", layout);
        self.layout = layout;
        match self.screen {
            Screen::Tally => self.redraw_tally(),
            Screen::Notice | Screen::Identity => Ok(()),
        }
    }

    fn set_state(
        &mut self,
        indication: TallyIndication,
        camera: Option<CameraNumber>,
    ) -> Result<(), Self::Error> {
        let unchanged = self.indication == indication && self.camera == camera;
        self.indication = indication;
        self.camera = camera;
        match self.screen {
            Screen::Notice => Ok(()),
            Screen::Tally if unchanged && self.tally_drawn => Ok(()),
            Screen::Tally | Screen::Identity => self.redraw_tally(),
        }
    }

    fn show_notice(&mut self, message: &str, severity: Severity) -> Result<(), Self::Error> {
        self.screen = Screen::Notice;
        self.tally_drawn = false;
        let Ok(()) = draw_notice(&mut self.frame, message, severity);
        self.flush()
    }

    fn clear_notice(&mut self) -> Result<(), Self::Error> {
        if self.screen == Screen::Notice {
            self.redraw_tally()
        } else {
            Ok(())
        }
    }

    fn show_identity(&mut self, mac: MacAddress, ip: Option<Ipv4Addr>) -> Result<(), Self::Error> {
        self.screen = Screen::Identity;
        self.tally_drawn = false;
        let Ok(()) = draw_identity(&mut self.frame, mac, ip);
        self.flush()
    }

    fn set_backlight(&mut self, pct: u8) -> Result<(), Self::Error> {
        self.backlight
            .set_level(pct.min(100))
            .map_err(DisplayError::Backlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_graphics::primitives::Rectangle;

    /// Counts flushed pixels instead of storing them.
    struct CountingPanel {
        size: Size,
        pixels: usize,
    }

    impl OriginDimensions for CountingPanel {
        fn size(&self) -> Size {
            self.size
        }
    }

    impl DrawTarget for CountingPanel {
        type Color = Rgb565;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.pixels += pixels.into_iter().count();
            Ok(())
        }

        fn fill_contiguous<I>(&mut self, _area: &Rectangle, colors: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Self::Color>,
        {
            self.pixels += colors.into_iter().count();
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingBacklight {
        level: Option<u8>,
    }

    impl Backlight for RecordingBacklight {
        type Error = Infallible;

        fn set_level(&mut self, pct: u8) -> Result<(), Self::Error> {
            self.level = Some(pct);
            Ok(())
        }
    }

    fn display() -> GraphicsDisplay<CountingPanel, RecordingBacklight> {
        let panel = CountingPanel {
            size: Size::new(240, 240),
            pixels: 0,
        };
        GraphicsDisplay::new(panel, RecordingBacklight::default())
    }

    #[test]
    fn test_state_while_notice_is_deferred() {
        let mut display = display();
        display.show_notice("Waiting for data...", Severity::Info).unwrap();
        let flushed = display.panel().pixels;

        display.set_state(TallyIndication::Live, Some(1)).unwrap();
        assert_eq!(display.panel().pixels, flushed);

        display.clear_notice().unwrap();
        assert!(display.panel().pixels > flushed);
        assert_eq!(display.frame().pixel(Point::new(120, 13)), Some(Rgb565::RED));
    }

    #[test]
    fn test_redrawing_same_state_sends_nothing() {
        let mut display = display();
        display.set_state(TallyIndication::Preview, Some(3)).unwrap();
        let flushed = display.panel().pixels;
        display.set_state(TallyIndication::Preview, Some(3)).unwrap();
        assert_eq!(display.panel().pixels, flushed);
    }

    #[test]
    fn test_clear_without_notice_is_noop() {
        let mut display = display();
        display.set_state(TallyIndication::Standby, Some(3)).unwrap();
        let flushed = display.panel().pixels;
        display.clear_notice().unwrap();
        assert_eq!(display.panel().pixels, flushed);
    }

    #[test]
    fn test_backlight_is_clamped() {
        let mut display = display();
        display.set_backlight(180).unwrap();
        assert_eq!(display.backlight.level, Some(100));
    }

    #[test]
    fn test_bar_layout_for_square_board() {
        let mut display = display();
        display.set_layout(IndicatorLayout::Bar).unwrap();
        display.set_state(TallyIndication::Live, Some(1)).unwrap();
        assert_eq!(display.frame().pixel(Point::new(2, 2)), Some(Rgb565::RED));
    }
}
