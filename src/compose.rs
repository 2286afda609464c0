use crate::core::Canvas;
use crate::error::{LipwaveError, LipwaveResult};
use crate::mapping::PreparedImage;

/// One composited output frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixel bytes.
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

pub type PremulRgba8 = [u8; 4];

/// Source-over blend of premultiplied RGBA8 pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);

    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Source-over blend of whole equal-sized premultiplied RGBA8 buffers.
pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> LipwaveResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(LipwaveError::validation(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Composite one frame bottom to top: background (or a transparent canvas)
/// then each overlay layer in order.
///
/// All layers must match the canvas dimensions; callers validate that at
/// load time so this only defends against internal misuse.
pub fn composite_frame(
    canvas: Canvas,
    background: Option<&PreparedImage>,
    layers: &[&PreparedImage],
) -> LipwaveResult<FrameRgba> {
    let len = canvas.width as usize * canvas.height as usize * 4;
    let mut data = match background {
        Some(bg) => {
            if bg.canvas() != canvas {
                return Err(LipwaveError::dimension_mismatch(format!(
                    "background is {}x{}, canvas is {}x{}",
                    bg.width, bg.height, canvas.width, canvas.height
                )));
            }
            bg.rgba8_premul.as_ref().clone()
        }
        None => vec![0u8; len],
    };

    for layer in layers {
        if layer.canvas() != canvas {
            return Err(LipwaveError::dimension_mismatch(format!(
                "overlay is {}x{}, canvas is {}x{}",
                layer.width, layer.height, canvas.width, canvas.height
            )));
        }
        over_in_place(&mut data, &layer.rgba8_premul)?;
    }

    Ok(FrameRgba {
        width: canvas.width,
        height: canvas.height,
        data,
        premultiplied: true,
    })
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
