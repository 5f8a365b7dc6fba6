//! Frame rotation, scaling and JPEG encoding

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};

use super::{CaptureError, RawFrame, Result, Rotation, BYTES_PER_PIXEL};

/// Drop alpha and reorder BGRA to packed RGB
pub fn bgra_to_rgb(frame: &RawFrame) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for y in 0..frame.height {
        for px in frame.row(y).chunks_exact(BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }
    rgb
}

/// Encode a frame as JPEG.
///
/// `quality` is clamped to `1..=100`; 0 is treated as 1.
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Bytes> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CaptureError::InvalidFrame("empty frame".into()));
    }
    encode_rgb(&bgra_to_rgb(frame), frame.width, frame.height, quality)
}

fn encode_rgb(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Bytes> {
    let mut out = Vec::with_capacity(rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        rgb,
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}

/// Largest size fitting in `max_width` x `max_height` that keeps the aspect
/// ratio. Never upscales; never returns a zero dimension.
pub fn thumbnail_size(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Downscale to fit `max_width` x `max_height` and encode as JPEG
pub fn encode_thumbnail(frame: &RawFrame, max_width: u32, max_height: u32, quality: u8) -> Result<Bytes> {
    let (w, h) = thumbnail_size(frame.width, frame.height, max_width, max_height);
    if (w, h) == (frame.width, frame.height) {
        return encode_jpeg(frame, quality);
    }

    let full = RgbImage::from_raw(frame.width, frame.height, bgra_to_rgb(frame))
        .ok_or_else(|| CaptureError::InvalidFrame("RGB buffer size mismatch".into()))?;
    let scaled = image::imageops::resize(&full, w, h, FilterType::Triangle);
    encode_rgb(scaled.as_raw(), w, h, quality)
}

/// Turn a pitched source image captured from an output with `rotation` into
/// an upright, tightly packed frame.
///
/// `src` is `width` x `height` pixels in the output's native orientation with
/// `row_pitch` bytes per row, as handed out by a mapped staging texture.
pub fn rotate_bgra(src: &[u8], width: u32, height: u32, row_pitch: usize, rotation: Rotation) -> Result<RawFrame> {
    let (w, h) = (width as usize, height as usize);
    let row_bytes = w * BYTES_PER_PIXEL;
    if row_pitch < row_bytes || (h > 0 && src.len() < row_pitch * (h - 1) + row_bytes) {
        return Err(CaptureError::InvalidFrame(format!(
            "{} bytes with pitch {} for {}x{}",
            src.len(),
            row_pitch,
            width,
            height
        )));
    }

    if rotation == Rotation::Identity {
        let mut out = RawFrame::black(width, height);
        for y in 0..h {
            out.data[y * row_bytes..(y + 1) * row_bytes]
                .copy_from_slice(&src[y * row_pitch..y * row_pitch + row_bytes]);
        }
        return Ok(out);
    }

    let (out_w, out_h) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
    let mut out = RawFrame::black(out_w as u32, out_h as u32);

    for sy in 0..h {
        let src_row = &src[sy * row_pitch..sy * row_pitch + row_bytes];
        for sx in 0..w {
            let (dx, dy) = match rotation {
                // panel turned clockwise: undo with a counter-clockwise turn
                Rotation::Rotate90 => (sy, w - 1 - sx),
                Rotation::Rotate180 => (w - 1 - sx, h - 1 - sy),
                Rotation::Rotate270 => (h - 1 - sy, sx),
                Rotation::Identity => (sx, sy),
            };
            let s = sx * BYTES_PER_PIXEL;
            let d = dy * out.stride + dx * BYTES_PER_PIXEL;
            out.data[d..d + BYTES_PER_PIXEL].copy_from_slice(&src_row[s..s + BYTES_PER_PIXEL]);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x2 frame where each pixel's blue channel is its index
    fn indexed_source(pitch: usize) -> Vec<u8> {
        let mut src = vec![0xAB; pitch * 2];
        for y in 0..2 {
            for x in 0..3 {
                let o = y * pitch + x * 4;
                src[o..o + 4].copy_from_slice(&[(y * 3 + x) as u8, 0, 0, 255]);
            }
        }
        src
    }

    fn blue_grid(frame: &RawFrame) -> Vec<Vec<u8>> {
        (0..frame.height)
            .map(|y| (0..frame.width).map(|x| frame.pixel(x, y)[0]).collect())
            .collect()
    }

    #[test]
    fn test_identity_strips_pitch() {
        let frame = rotate_bgra(&indexed_source(16), 3, 2, 16, Rotation::Identity).unwrap();
        assert_eq!(frame.stride, 12);
        assert_eq!(blue_grid(&frame), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_rotate90() {
        let frame = rotate_bgra(&indexed_source(12), 3, 2, 12, Rotation::Rotate90).unwrap();
        assert_eq!((frame.width, frame.height), (2, 3));
        assert_eq!(blue_grid(&frame), vec![vec![2, 5], vec![1, 4], vec![0, 3]]);
    }

    #[test]
    fn test_rotate180() {
        let frame = rotate_bgra(&indexed_source(12), 3, 2, 12, Rotation::Rotate180).unwrap();
        assert_eq!(blue_grid(&frame), vec![vec![5, 4, 3], vec![2, 1, 0]]);
    }

    #[test]
    fn test_rotate270() {
        let frame = rotate_bgra(&indexed_source(16), 3, 2, 16, Rotation::Rotate270).unwrap();
        assert_eq!((frame.width, frame.height), (2, 3));
        assert_eq!(blue_grid(&frame), vec![vec![3, 0], vec![4, 1], vec![5, 2]]);
    }

    #[test]
    fn test_rotate_rejects_short_buffer() {
        assert!(rotate_bgra(&[0; 20], 3, 2, 12, Rotation::Identity).is_err());
        assert!(rotate_bgra(&[0; 24], 3, 2, 8, Rotation::Identity).is_err());
    }

    #[test]
    fn test_thumbnail_size_keeps_aspect() {
        assert_eq!(thumbnail_size(1920, 1080, 320, 180), (320, 180));
        assert_eq!(thumbnail_size(3840, 1080, 320, 180), (320, 90));
        assert_eq!(thumbnail_size(1080, 1920, 320, 180), (101, 180));
    }

    #[test]
    fn test_thumbnail_never_upscales() {
        assert_eq!(thumbnail_size(100, 50, 320, 180), (100, 50));
        assert_eq!(thumbnail_size(0, 50, 320, 180), (1, 1));
    }

    #[test]
    fn test_bgra_to_rgb() {
        let frame = RawFrame::from_bgra(1, 1, 4, vec![10, 20, 30, 255]).unwrap();
        assert_eq!(bgra_to_rgb(&frame), vec![30, 20, 10]);
    }

    #[test]
    fn test_jpeg_output_is_jpeg() {
        let frame = RawFrame::black(16, 16);
        for quality in [0, 1, 60, 100, 255] {
            let jpeg = encode_jpeg(&frame, quality).unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn test_thumbnail_decodes_to_target_size() {
        let frame = RawFrame::black(64, 32);
        let jpeg = encode_thumbnail(&frame, 16, 16, 50).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(encode_jpeg(&RawFrame::black(0, 10), 50).is_err());
    }
}
