use crate::foundation::error::{ReframeError, ReframeResult};

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Composite straight-alpha RGBA8 over an opaque background, writing opaque RGBA8.
pub(crate) fn flatten_over_bg_rgba8(
    dst: &mut [u8],
    src: &[u8],
    bg_rgba: [u8; 4],
) -> ReframeResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReframeError::validation(
            "flatten_over_bg_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = u16::from(bg_rgba[0]);
    let bg_g = u16::from(bg_rgba[1]);
    let bg_b = u16::from(bg_rgba[2]);

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let r = mul_div255_u16(u16::from(s[0]), a) + mul_div255_u16(bg_r, inv);
        let g = mul_div255_u16(u16::from(s[1]), a) + mul_div255_u16(bg_g, inv);
        let b = mul_div255_u16(u16::from(s[2]), a) + mul_div255_u16(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

/// Same as [`flatten_over_bg_rgba8`] but drops the alpha channel.
pub(crate) fn flatten_over_bg_rgb8(src: &[u8], bg_rgba: [u8; 4]) -> ReframeResult<Vec<u8>> {
    let mut rgba = vec![0u8; src.len()];
    flatten_over_bg_rgba8(&mut rgba, src, bg_rgba)?;
    Ok(rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect())
}
