//! Frame annotations drawn straight into the RGB frame.
//!
//! Layout (640×480):
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Hand Gesture Volume Control              │  title   (10, 30)
//! │ Audio: ACTIVE                            │  status  (10, 60)
//! │  ┌──┐                                    │
//! │  │  │        ●───────●  thumb / index    │
//! │  │██│            ◉      pinch midpoint   │
//! │  │██│                                    │  bar (50,150)-(85,400)
//! │  └──┘                                    │
//! │ 73%                                      │  percent (40, 450)
//! └──────────────────────────────────────────┘
//! ```

use image::{Rgb, RgbImage};
use pinchvol_core::gesture::{interp, GestureReading};
use pinchvol_core::types::{HandLandmarks, Keypoint, HAND_CONNECTIONS};

// ── Layout ───────────────────────────────────────────────────────────────────

pub const TITLE: &str = "Hand Gesture Volume Control";
const TITLE_POS: (i32, i32) = (10, 30);
const TITLE_SCALE: i32 = 3;
const STATUS_POS: (i32, i32) = (10, 60);
const STATUS_SCALE: i32 = 3;

const BAR_LEFT: i32 = 50;
const BAR_RIGHT: i32 = 85;
const BAR_TOP: i32 = 150;
const BAR_BOTTOM: i32 = 400;
const BAR_BORDER: i32 = 3;
const PERCENT_POS: (i32, i32) = (40, 450);
const PERCENT_SCALE: i32 = 4;

const TIP_RADIUS: i32 = 15;
const MIDPOINT_RADIUS: i32 = 10;
const TIP_LINE_WIDTH: i32 = 3;
const BONE_WIDTH: i32 = 2;
const JOINT_RADIUS: i32 = 4;

// ── Colors ───────────────────────────────────────────────────────────────────

pub const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Pixel row the volume bar fill starts at for `percent`.
pub fn bar_top_for(percent: u8) -> i32 {
    interp(
        percent as f64,
        (0.0, 100.0),
        (BAR_BOTTOM as f64, BAR_TOP as f64),
    ) as i32
}

/// Hand skeleton, fingertip markers, volume bar and percent readout.
pub fn draw_hand(img: &mut RgbImage, hand: &HandLandmarks, reading: &GestureReading) {
    let points = hand.keypoints(img.width(), img.height());
    for (a, b) in HAND_CONNECTIONS {
        draw_line(img, points[a], points[b], BONE_WIDTH, WHITE);
    }
    for &p in &points {
        fill_circle(img, p, JOINT_RADIUS, RED);
    }

    fill_circle(img, reading.thumb, TIP_RADIUS, MAGENTA);
    fill_circle(img, reading.index, TIP_RADIUS, MAGENTA);
    draw_line(img, reading.thumb, reading.index, TIP_LINE_WIDTH, MAGENTA);

    draw_rect_outline(img, BAR_LEFT, BAR_TOP, BAR_RIGHT, BAR_BOTTOM, BAR_BORDER, GREEN);
    fill_rect(img, BAR_LEFT, bar_top_for(reading.percent), BAR_RIGHT, BAR_BOTTOM, GREEN);
    draw_text(
        img,
        &format!("{}%", reading.percent),
        PERCENT_POS,
        PERCENT_SCALE,
        GREEN,
    );

    let marker = if reading.pinched { RED } else { MAGENTA };
    fill_circle(img, reading.midpoint, MIDPOINT_RADIUS, marker);
}

/// Title and audio status line, drawn on every frame.
pub fn draw_status(img: &mut RgbImage, audio_active: bool) {
    draw_text(img, TITLE, TITLE_POS, TITLE_SCALE, WHITE);
    let (text, color) = if audio_active {
        ("Audio: ACTIVE", GREEN)
    } else {
        ("Audio: INACTIVE", RED)
    };
    draw_text(img, text, STATUS_POS, STATUS_SCALE, color);
}

// ── Primitive drawing helpers ────────────────────────────────────────────────

fn set_pixel(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Inclusive corners.
fn fill_rect(img: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    for y in y0.min(y1)..=y0.max(y1) {
        for x in x0.min(x1)..=x0.max(x1) {
            set_pixel(img, x, y, color);
        }
    }
}

/// Border of `thickness` pixels drawn inward from the inclusive corners.
fn draw_rect_outline(
    img: &mut RgbImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let t = thickness.max(1) - 1;
    fill_rect(img, x0, y0, x1, y0 + t, color);
    fill_rect(img, x0, y1 - t, x1, y1, color);
    fill_rect(img, x0, y0, x0 + t, y1, color);
    fill_rect(img, x1 - t, y0, x1, y1, color);
}

fn fill_circle(img: &mut RgbImage, center: Keypoint, radius: i32, color: Rgb<u8>) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                set_pixel(
                    img,
                    center.x.saturating_add(dx),
                    center.y.saturating_add(dy),
                    color,
                );
            }
        }
    }
}

/// Bresenham line, stamped with a disc for widths above one pixel.
///
/// Endpoints are first clipped to the image grown by the stamp radius, so
/// the step count is bounded by the image size.
fn draw_line(img: &mut RgbImage, a: Keypoint, b: Keypoint, width: i32, color: Rgb<u8>) {
    let radius = (width - 1) / 2;
    let bounds = (
        -radius as f64,
        -radius as f64,
        (img.width() as i32 - 1 + radius) as f64,
        (img.height() as i32 - 1 + radius) as f64,
    );
    let Some((a, b)) = clip_segment(a, b, bounds) else {
        return;
    };
    let (mut x, mut y) = (a.x, a.y);
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if radius == 0 {
            set_pixel(img, x, y, color);
        } else {
            fill_circle(img, Keypoint::new(x, y), radius, color);
        }
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Liang–Barsky clip of segment `a`–`b` to the inclusive box
/// `(x_min, y_min, x_max, y_max)`. Endpoints already inside are kept exactly.
fn clip_segment(
    a: Keypoint,
    b: Keypoint,
    bounds: (f64, f64, f64, f64),
) -> Option<(Keypoint, Keypoint)> {
    let (x_min, y_min, x_max, y_max) = bounds;
    let inside = |p: Keypoint| {
        let (x, y) = (p.x as f64, p.y as f64);
        x >= x_min && x <= x_max && y >= y_min && y <= y_max
    };
    if inside(a) && inside(b) {
        return Some((a, b));
    }

    let (x0, y0) = (a.x as f64, a.y as f64);
    let dx = b.x as f64 - x0;
    let dy = b.y as f64 - y0;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x0 - x_min),
        (dx, x_max - x0),
        (-dy, y0 - y_min),
        (dy, y_max - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| {
        let x = (x0 + t * dx).round().clamp(x_min, x_max);
        let y = (y0 + t * dy).round().clamp(y_min, y_max);
        Keypoint::new(x as i32, y as i32)
    };
    let start = if t0 == 0.0 { a } else { at(t0) };
    let end = if t1 == 1.0 { b } else { at(t1) };
    Some((start, end))
}

/// Draw `text` with its bottom-left corner at `origin` (text baseline).
fn draw_text(img: &mut RgbImage, text: &str, origin: (i32, i32), scale: i32, color: Rgb<u8>) {
    let (mut cx, baseline) = origin;
    let top = baseline - GLYPH_H * scale;
    for ch in text.chars() {
        let glyph = char_glyph(ch);
        for (row, &bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) != 0 {
                    let px = cx + col * scale;
                    let py = top + row as i32 * scale;
                    fill_rect(img, px, py, px + scale - 1, py + scale - 1, color);
                }
            }
        }
        cx += (GLYPH_W + 1) * scale;
    }
}

// ── Minimal 3×5 bitmap font ──────────────────────────────────────────────────

const GLYPH_W: i32 = 3;
const GLYPH_H: i32 = 5;

fn char_glyph(c: char) -> [u8; 5] {
    match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'a' | 'A' => [0b111, 0b101, 0b111, 0b101, 0b101],
        'b' | 'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' | 'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'd' | 'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' | 'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'f' | 'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'g' | 'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'h' | 'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' | 'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' | 'J' => [0b001, 0b001, 0b001, 0b101, 0b111],
        'k' | 'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' | 'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' | 'M' => [0b101, 0b111, 0b101, 0b101, 0b101],
        'n' | 'N' => [0b111, 0b101, 0b101, 0b101, 0b101],
        'o' | 'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'p' | 'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'q' | 'Q' => [0b111, 0b101, 0b101, 0b111, 0b001],
        'r' | 'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' | 'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        't' | 'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' | 'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' | 'V' => [0b101, 0b101, 0b101, 0b010, 0b010],
        'w' | 'W' => [0b101, 0b101, 0b101, 0b111, 0b101],
        'x' | 'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' | 'Y' => [0b101, 0b101, 0b111, 0b010, 0b010],
        'z' | 'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _ => [0b000, 0b000, 0b010, 0b000, 0b000],
    }
}
