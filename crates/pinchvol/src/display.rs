//! Preview window using `minifb`.

use anyhow::{anyhow, Result};
use image::RgbImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

/// Capability: present an annotated frame and report whether to keep going.
pub trait Display {
    /// Show `frame`. Returns false once the user asked to quit.
    fn show(&mut self, frame: &RgbImage) -> bool;
}

/// Software-rendered preview window. `q`, Escape or closing the window quits.
pub struct PreviewWindow {
    window: Window,
    buf: Vec<u32>,
}

impl PreviewWindow {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let mut window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("failed to open preview window: {e}"))?;

        // Frame pacing comes from the camera.
        window.set_target_fps(0);

        tracing::debug!(width, height, "preview window opened");
        Ok(Self {
            window,
            buf: Vec::new(),
        })
    }

    fn quit_requested(&self) -> bool {
        !self.window.is_open()
            || self.window.is_key_pressed(Key::Q, KeyRepeat::No)
            || self.window.is_key_pressed(Key::Escape, KeyRepeat::No)
    }
}

impl Display for PreviewWindow {
    fn show(&mut self, frame: &RgbImage) -> bool {
        if !self.window.is_open() {
            return false;
        }

        pack_argb(frame, &mut self.buf);
        let (w, h) = frame.dimensions();
        if let Err(e) = self
            .window
            .update_with_buffer(&self.buf, w as usize, h as usize)
        {
            tracing::warn!(error = %e, "preview window update failed");
            return false;
        }

        !self.quit_requested()
    }
}

/// Repack RGB24 into minifb's 0RGB u32 pixels, reusing `buf`.
fn pack_argb(frame: &RgbImage, buf: &mut Vec<u32>) {
    buf.clear();
    buf.extend(
        frame
            .pixels()
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_pack_argb() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([0x12, 0x34, 0x56]));
        frame.put_pixel(1, 0, Rgb([0xFF, 0x00, 0xFF]));

        let mut buf = vec![0xDEAD_BEEF; 7];
        pack_argb(&frame, &mut buf);
        assert_eq!(buf, vec![0x0012_3456, 0x00FF_00FF]);
    }
}
