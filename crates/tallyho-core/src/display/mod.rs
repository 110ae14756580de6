//! Screen layouts for the tally indicator, notices and identify.
//!
//! Everything here draws onto any `DrawTarget<Color = Rgb565>`. The
//! [`GraphicsDisplay`] composes the screens in a [`FrameBuffer`] and flushes
//! the changed region to the panel.

mod framebuffer;
mod graphics;

pub use framebuffer::*;
pub use graphics::*;

use alloc::format;
use core::net::Ipv4Addr;

use embedded_graphics::{
    mono_font::{MonoTextStyle, ascii::FONT_10X20},
    geometry::Angle,
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Arc, Circle, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::constants::PREVIEW_FILL_PCT;
use crate::identity::MacAddress;
use crate::platform::Severity;
use crate::tally::{CameraNumber, TallyIndication};

/// Width of the ring indicator stroke.
const RING_STROKE_PX: u32 = 24;

const LIVE_COLOR: Rgb565 = Rgb565::RED;
const PREVIEW_COLOR: Rgb565 = Rgb565::new(0x00, 0x77 >> 2, 0x00);
const WARNING_COLOR: Rgb565 = Rgb565::new(0xFF >> 3, 0x66 >> 2, 0x00);
const TRACK_COLOR: Rgb565 = Rgb565::new(6, 12, 6);
const ALERT_BACKGROUND: Rgb565 = Rgb565::new(0x22 >> 3, 0x00, 0x00);
const IDENTIFY_BACKGROUND: Rgb565 = Rgb565::new(0x00, 0x00, 0x90 >> 3);

/// Indicator style, chosen once at setup from the board model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorLayout {
    /// Arc around the edge of a round panel.
    #[default]
    Ring,
    /// Bottom-anchored fill on a rectangular panel.
    Bar,
}

/// Indicator colour and fill share (percent) for an indication, if lit.
pub fn indicator_fill(indication: TallyIndication) -> Option<(Rgb565, u8)> {
    match indication {
        TallyIndication::Live => Some((LIVE_COLOR, 100)),
        TallyIndication::Preview => Some((PREVIEW_COLOR, PREVIEW_FILL_PCT)),
        TallyIndication::Standby | TallyIndication::Unassigned => None,
    }
}

/// Text colour for a notice.
pub fn severity_color(severity: Severity) -> Rgb565 {
    match severity {
        Severity::Info => Rgb565::WHITE,
        Severity::Ok => PREVIEW_COLOR,
        Severity::Warning => WARNING_COLOR,
        Severity::Error => Rgb565::RED,
    }
}

fn centered_text<D>(display: &mut D, text: &str, position: Point, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build();
    Text::with_text_style(text, position, MonoTextStyle::new(&FONT_10X20, color), style)
        .draw(display)?;
    Ok(())
}

impl IndicatorLayout {
    /// Draw the full tally screen for `indication`.
    pub fn draw<D>(
        self,
        display: &mut D,
        indication: TallyIndication,
        camera: Option<CameraNumber>,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let bounds = display.bounding_box();
        display.clear(Rgb565::BLACK)?;

        match self {
            Self::Ring => draw_ring(display, bounds, indication)?,
            Self::Bar => draw_bar(display, bounds, indication)?,
        }

        let center = bounds.center();
        match camera {
            Some(camera) => centered_text(display, &format!("Camera {}", camera), center, Rgb565::WHITE),
            None => centered_text(display, "No camera", center, WARNING_COLOR),
        }
    }
}

fn draw_ring<D>(display: &mut D, bounds: Rectangle, indication: TallyIndication) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let diameter = bounds.size.width.min(bounds.size.height).saturating_sub(RING_STROKE_PX);
    let center = bounds.center();

    Circle::with_center(center, diameter)
        .into_styled(PrimitiveStyle::with_stroke(TRACK_COLOR, RING_STROKE_PX))
        .draw(display)?;

    let Some((color, pct)) = indicator_fill(indication) else {
        return Ok(());
    };

    // The uncovered part of a partial ring is centred at the bottom
    let sweep = 360.0 * f32::from(pct) / 100.0;
    let start = 90.0 + (360.0 - sweep) / 2.0;
    Arc::with_center(
        center,
        diameter,
        Angle::from_degrees(start),
        Angle::from_degrees(sweep),
    )
    .into_styled(PrimitiveStyle::with_stroke(color, RING_STROKE_PX))
    .draw(display)
}

fn draw_bar<D>(display: &mut D, bounds: Rectangle, indication: TallyIndication) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let (color, pct) = indicator_fill(indication).unwrap_or((TRACK_COLOR, 100));
    let height = bounds.size.height * u32::from(pct) / 100;
    let top = bounds.top_left.y + (bounds.size.height - height) as i32;

    Rectangle::new(
        Point::new(bounds.top_left.x, top),
        Size::new(bounds.size.width, height),
    )
    .into_styled(PrimitiveStyle::with_fill(color))
    .draw(display)
}

/// Full-screen message. Lines are separated by `\n`.
pub fn draw_notice<D>(display: &mut D, message: &str, severity: Severity) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let background = match severity {
        Severity::Warning | Severity::Error => ALERT_BACKGROUND,
        Severity::Info | Severity::Ok => Rgb565::BLACK,
    };
    let center = display.bounding_box().center();
    display.clear(background)?;
    centered_text(display, message, center, severity_color(severity))
}

/// Identify screen: MAC and IP on a blue background.
pub fn draw_identity<D>(display: &mut D, mac: MacAddress, ip: Option<Ipv4Addr>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let center = display.bounding_box().center();
    display.clear(IDENTIFY_BACKGROUND)?;
    let text = match ip {
        Some(ip) => format!("IDENTIFY\n\n{}\n{}", mac, ip),
        None => format!("IDENTIFY\n\n{}\nNo IP", mac),
    };
    centered_text(display, &text, center, Rgb565::WHITE)
}
