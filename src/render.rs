//! Overlay rendering: the original image rescaled into a display box, with
//! color-coded detection boxes and labels drawn on top.

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Result};
use image::{GenericImageView, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detections::{box_is_valid, BatchResult, Damage, Plate};
use crate::upload::UploadFile;

static FONT_BYTES: &[u8] = include_bytes!("../fonts/DejaVuSans.ttf");

/// Cycling palette for distinct (non-duplicate) damages.
pub const DAMAGE_PALETTE: [Rgba<u8>; 7] = [
    Rgba([0xFF, 0x00, 0x00, 0xFF]), // red
    Rgba([0x00, 0x00, 0xFF, 0xFF]), // blue
    Rgba([0xFF, 0x00, 0xFF, 0xFF]), // magenta
    Rgba([0xFF, 0xC0, 0x00, 0xFF]), // orange
    Rgba([0x00, 0xCC, 0x00, 0xFF]), // green
    Rgba([0xFF, 0xFC, 0x00, 0xFF]), // yellow
    Rgba([0x00, 0xFF, 0xFF, 0xFF]), // cyan
];

/// Probable duplicates all share one muted style instead of consuming a
/// palette slot: black, dashed, drawn at 3/4 opacity.
pub const DUPLICATE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 191]);
const DUPLICATE_DASH: (f32, f32) = (3.0, 3.0);

pub const PLATE_COLOR: Rgba<u8> = Rgba([0xFF, 0x00, 0x00, 0xFF]);
const PLATE_DASH: (f32, f32) = (10.0, 5.0);
const PLATE_STROKE_WIDTH: u32 = 3;

const FILL_OVERLAY: Rgba<u8> = Rgba([255, 255, 255, 26]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_HEIGHT: u32 = 15;
const LABEL_SCALE: f32 = 12.0;

/// Per-file drawing state: the scale factors mapping original-image pixel
/// coordinates onto the display canvas, plus the palette cursor. One context
/// per rendered file; nothing is attached to the drawing surface itself.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub ratio_w: f64,
    pub ratio_h: f64,
    palette_cursor: usize,
}

impl RenderContext {
    pub fn new(
        original_width: u32,
        original_height: u32,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        Self {
            ratio_w: display_width as f64 / original_width as f64,
            ratio_h: display_height as f64 / original_height as f64,
            palette_cursor: 0,
        }
    }

    /// Map a box from original-image coordinates into display coordinates,
    /// returning `(x, y, width, height)`.
    pub fn scale_box(&self, coords: &[f64; 4]) -> (f32, f32, f32, f32) {
        let x = coords[0] * self.ratio_w;
        let y = coords[1] * self.ratio_h;
        let w = (coords[2] - coords[0]) * self.ratio_w;
        let h = (coords[3] - coords[1]) * self.ratio_h;
        (x as f32, y as f32, w as f32, h as f32)
    }

    /// Pick the stroke color for a damage. Only non-duplicates advance the
    /// cycling cursor; duplicates never observe or consume it.
    pub fn damage_color(&mut self, probable_duplicate: bool) -> Rgba<u8> {
        if probable_duplicate {
            DUPLICATE_COLOR
        } else {
            let color = DAMAGE_PALETTE[self.palette_cursor % DAMAGE_PALETTE.len()];
            self.palette_cursor += 1;
            color
        }
    }

    /// How many non-duplicate damages have been drawn so far.
    pub fn palette_cursor(&self) -> usize {
        self.palette_cursor
    }
}

/// Render one file's detections over its rescaled image. Only detections
/// joined to this file by name are drawn; boxes with inverted corners are
/// skipped.
pub fn render_overlay(file: &UploadFile, result: &BatchResult, display_size: u32) -> Result<RgbaImage> {
    render_overlay_with_context(file, result, display_size).map(|(canvas, _)| canvas)
}

/// Like [`render_overlay`] but also returns the final per-file context.
pub fn render_overlay_with_context(
    file: &UploadFile,
    result: &BatchResult,
    display_size: u32,
) -> Result<(RgbaImage, RenderContext)> {
    let original = image::load_from_memory(&file.bytes)
        .map_err(|e| anyhow!("Failed to decode {}: {e}", file.name))?;
    let (original_width, original_height) = original.dimensions();

    // The display box is square; the image is stretched to fill it, and the
    // per-axis ratios carry the distortion into the box coordinates.
    let mut canvas = original
        .resize_exact(
            display_size,
            display_size,
            image::imageops::FilterType::Triangle,
        )
        .to_rgba8();
    let mut ctx = RenderContext::new(original_width, original_height, display_size, display_size);

    let font = FontRef::try_from_slice(FONT_BYTES)
        .map_err(|e| anyhow!("Embedded label font failed to parse: {e}"))?;

    for (index, damage) in result.damages_for(&file.name).enumerate() {
        if !box_is_valid(&damage.coords) {
            log::warn!(
                "{} Skipping damage {index} on {}: inverted box {:?}",
                crate::color_utils::symbols::warning(),
                file.name,
                damage.coords
            );
            continue;
        }
        draw_damage(&mut canvas, &mut ctx, &font, damage, index);
    }

    for (index, plate) in result.plates_for(&file.name).enumerate() {
        if !box_is_valid(&plate.coords) {
            log::warn!(
                "{} Skipping plate {index} on {}: inverted box {:?}",
                crate::color_utils::symbols::warning(),
                file.name,
                plate.coords
            );
            continue;
        }
        draw_plate(&mut canvas, &ctx, plate);
    }

    Ok((canvas, ctx))
}

fn draw_damage(
    canvas: &mut RgbaImage,
    ctx: &mut RenderContext,
    font: &FontRef,
    damage: &Damage,
    index: usize,
) {
    let (x, y, w, h) = ctx.scale_box(&damage.coords);
    let color = ctx.damage_color(damage.probable_duplicate);

    if damage.probable_duplicate {
        draw_dashed_rect(canvas, x, y, w, h, color, DUPLICATE_DASH, 1);
    } else {
        let rect = Rect::at(x as i32, y as i32).of_size(w.max(1.0) as u32, h.max(1.0) as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }

    blend_fill_rect(canvas, x, y, w, h, FILL_OVERLAY);

    // Label on an opaque white background sized to the text, drawn in the
    // box color.
    let label = format!("{index} {}", damage.kind);
    let scale = PxScale::from(LABEL_SCALE);
    let (text_width, _) = text_size(scale, font, &label);
    let label_x = x.max(0.0) as i32;
    let label_y = y.max(0.0) as i32;
    draw_filled_rect_mut(
        canvas,
        Rect::at(label_x, label_y).of_size(text_width + 10, LABEL_HEIGHT),
        LABEL_BACKGROUND,
    );
    draw_text_mut(canvas, color, label_x + 5, label_y + 2, scale, font, &label);
}

fn draw_plate(canvas: &mut RgbaImage, ctx: &RenderContext, plate: &Plate) {
    let (x, y, w, h) = ctx.scale_box(&plate.coords);
    // No fill, no label; the stroke width stays local to this call, nothing
    // leaks into later drawing.
    draw_dashed_rect(canvas, x, y, w, h, PLATE_COLOR, PLATE_DASH, PLATE_STROKE_WIDTH);
}

/// Alpha-blend `color` onto a single pixel, ignoring out-of-bounds hits.
fn blend_pixel(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.get_pixel_mut(x as u32, y as u32).blend(&color);
    }
}

/// Alpha-blend a filled rectangle (used for the translucent white wash over
/// each damage box).
fn blend_fill_rect(canvas: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
    let x0 = x.round() as i32;
    let y0 = y.round() as i32;
    let x1 = (x + w).round() as i32;
    let y1 = (y + h).round() as i32;
    for py in y0..y1 {
        for px in x0..x1 {
            blend_pixel(canvas, px, py, color);
        }
    }
}

/// Dashed rectangle outline with the given on/off dash pattern and stroke
/// width. Strokes thicker than 1px grow inward from the box edge.
fn draw_dashed_rect(
    canvas: &mut RgbaImage,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    color: Rgba<u8>,
    dash: (f32, f32),
    stroke_width: u32,
) {
    let x2 = x + w;
    let y2 = y + h;
    for offset in 0..stroke_width {
        let o = offset as f32;
        dashed_hline(canvas, x, x2, y + o, color, dash);
        dashed_hline(canvas, x, x2, y2 - o, color, dash);
        dashed_vline(canvas, y, y2, x + o, color, dash);
        dashed_vline(canvas, y, y2, x2 - o, color, dash);
    }
}

fn dashed_hline(canvas: &mut RgbaImage, x0: f32, x1: f32, y: f32, color: Rgba<u8>, dash: (f32, f32)) {
    let (on, off) = dash;
    let period = on + off;
    let mut x = x0;
    while x <= x1 {
        if (x - x0) % period < on {
            blend_pixel(canvas, x.round() as i32, y.round() as i32, color);
        }
        x += 1.0;
    }
}

fn dashed_vline(canvas: &mut RgbaImage, y0: f32, y1: f32, x: f32, color: Rgba<u8>, dash: (f32, f32)) {
    let (on, off) = dash;
    let period = on + off;
    let mut y = y0;
    while y <= y1 {
        if (y - y0) % period < on {
            blend_pixel(canvas, x.round() as i32, y.round() as i32, color);
        }
        y += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::aggregate;
    use image::DynamicImage;
    use serde_json::{json, Value};

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([40, 40, 40, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn upload_file(name: &str, width: u32, height: u32) -> UploadFile {
        UploadFile {
            name: name.to_string(),
            bytes: encoded_png(width, height),
        }
    }

    #[test]
    fn test_scale_box_is_exact() {
        let ctx = RenderContext::new(100, 200, 50, 50);
        assert_eq!(ctx.ratio_w, 0.5);
        assert_eq!(ctx.ratio_h, 0.25);

        let (x, y, w, h) = ctx.scale_box(&[10.0, 10.0, 50.0, 50.0]);
        assert_eq!(x, 5.0);
        assert_eq!(y, 2.5);
        assert_eq!(w, 20.0);
        assert_eq!(h, 10.0);
    }

    #[test]
    fn test_palette_cursor_only_advances_for_non_duplicates() {
        let mut ctx = RenderContext::new(100, 100, 100, 100);

        assert_eq!(ctx.damage_color(false), DAMAGE_PALETTE[0]);
        assert_eq!(ctx.damage_color(true), DUPLICATE_COLOR);
        assert_eq!(ctx.damage_color(true), DUPLICATE_COLOR);
        assert_eq!(ctx.damage_color(false), DAMAGE_PALETTE[1]);
        assert_eq!(ctx.palette_cursor(), 2);
    }

    #[test]
    fn test_palette_cycles_modulo_seven() {
        let mut ctx = RenderContext::new(100, 100, 100, 100);
        for _ in 0..7 {
            ctx.damage_color(false);
        }
        assert_eq!(ctx.damage_color(false), DAMAGE_PALETTE[0]);
    }

    #[test]
    fn test_render_skips_detections_for_other_files() {
        let file = upload_file("a.jpg", 32, 32);
        let result = aggregate(
            json!({"damages": [{"file": "b.jpg", "coords": [1.0, 1.0, 10.0, 10.0], "type": "hood_damage", "action": "REPAIR"}]}),
            Value::Null,
        );

        let (canvas, ctx) = render_overlay_with_context(&file, &result, 64).unwrap();
        assert_eq!(canvas.dimensions(), (64, 64));
        // The other file's damage never touched this context
        assert_eq!(ctx.palette_cursor(), 0);
    }

    #[test]
    fn test_duplicate_scenario_leaves_cursor_at_one() {
        // Two damages on one file, the second flagged as a duplicate: the
        // first takes palette slot 0, the cursor ends at 1, not 2.
        let file = upload_file("a.jpg", 64, 64);
        let result = aggregate(
            json!({"damages": [
                {"file": "a.jpg", "coords": [4.0, 4.0, 20.0, 20.0], "type": "hood_damage", "action": "REPLACE"},
                {"file": "a.jpg", "coords": [5.0, 5.0, 21.0, 21.0], "type": "hood_damage", "action": "REPLACE", "probable_duplicate": true}
            ]}),
            Value::Null,
        );

        let (_, ctx) = render_overlay_with_context(&file, &result, 128).unwrap();
        assert_eq!(ctx.palette_cursor(), 1);
    }

    #[test]
    fn test_first_damage_gets_palette_color_zero() {
        let file = upload_file("a.jpg", 100, 100);
        let result = aggregate(
            json!({"damages": [{"file": "a.jpg", "coords": [10.0, 10.0, 50.0, 50.0], "type": "hood_damage", "action": "REPLACE", "probable_duplicate": false}]}),
            Value::Null,
        );

        let (canvas, ctx) = render_overlay_with_context(&file, &result, 100).unwrap();
        assert_eq!(ctx.palette_cursor(), 1);
        // Stroke drawn in palette color 0 (red) on the box's left edge,
        // below the label, then washed by the translucent fill
        let mut expected = DAMAGE_PALETTE[0];
        expected.blend(&FILL_OVERLAY);
        assert_eq!(*canvas.get_pixel(10, 30), expected);
    }

    #[test]
    fn test_inverted_box_is_skipped() {
        let file = upload_file("a.jpg", 32, 32);
        let result = aggregate(
            json!({"damages": [{"file": "a.jpg", "coords": [20.0, 20.0, 4.0, 4.0], "type": "hood_damage", "action": "REPAIR"}]}),
            Value::Null,
        );

        let (_, ctx) = render_overlay_with_context(&file, &result, 64).unwrap();
        assert_eq!(ctx.palette_cursor(), 0);
    }

    #[test]
    fn test_plate_box_draws_dashed_red() {
        let file = upload_file("b.jpg", 100, 100);
        let result = aggregate(
            Value::Null,
            json!({"plates": [{"file": "b.jpg", "coords": [5.0, 5.0, 40.0, 20.0], "text": "AB123CD"}]}),
        );

        let canvas = render_overlay(&file, &result, 100).unwrap();
        // Dash pattern [10, 5]: the first 10 px of the top edge are on
        assert_eq!(*canvas.get_pixel(6, 5), PLATE_COLOR);
        // ...and the gap after them is off (background untouched)
        assert_ne!(*canvas.get_pixel(16, 5), PLATE_COLOR);
    }

    #[test]
    fn test_undecodable_image_is_an_error() {
        let file = UploadFile {
            name: "broken.jpg".to_string(),
            bytes: vec![0, 1, 2, 3],
        };
        let err = render_overlay(&file, &BatchResult::default(), 64).unwrap_err();
        assert!(err.to_string().contains("Failed to decode broken.jpg"));
    }
}
