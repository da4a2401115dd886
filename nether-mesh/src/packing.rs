//! Attribute quantization
//!
//! Converts welded f32 streams to their stored formats:
//! - normals and tangents → snorm16 (-1.0 to 1.0)
//! - vertex group weights → unorm16 (0.0 to 1.0)
//! - vertex colors → unorm8 (0.0 to 1.0), optionally dropping unused channels
//!
//! Positions, texture coordinates and shading tangents stay f32.

// ============================================================================
// Format Flags
// ============================================================================

/// Format flag: tangents (snorm16x4 per frame)
pub const FORMAT_TANGENT: u8 = 1;
/// Format flag: first texture coordinate layer (f32x2)
pub const FORMAT_TEXCOORD: u8 = 2;
/// Format flag: second texture coordinate layer (f32x2)
pub const FORMAT_TEXCOORD2: u8 = 4;
/// Format flag: shading tangents (f32x3)
pub const FORMAT_SHADE_TANGENT: u8 = 8;
/// Format flag: vertex group weights (unorm16 per group)
pub const FORMAT_GROUP: u8 = 16;
/// Format flag: vertex colors (unorm8 per present channel)
pub const FORMAT_COLOR: u8 = 32;

/// Stored bytes per vertex for one frame of positions plus the flagged extras
///
/// `frames` scales position, normal and tangent; `groups` and `color_channels`
/// scale their sections.
pub const fn vertex_bytes(
    format: u8,
    frames: usize,
    groups: usize,
    color_channels: usize,
) -> usize {
    let mut bytes = frames * (12 + 6); // position f32x3 + normal snorm16x3

    if format & FORMAT_TANGENT != 0 {
        bytes += frames * 8;
    }
    if format & FORMAT_TEXCOORD != 0 {
        bytes += 8;
    }
    if format & FORMAT_TEXCOORD2 != 0 {
        bytes += 8;
    }
    if format & FORMAT_SHADE_TANGENT != 0 {
        bytes += 12;
    }
    if format & FORMAT_GROUP != 0 {
        bytes += groups * 2;
    }
    if format & FORMAT_COLOR != 0 {
        bytes += color_channels;
    }

    bytes
}

// ============================================================================
// Scalar Conversions
// ============================================================================

/// Convert f32 to signed normalized 16-bit integer (snorm16)
///
/// Maps [-1.0, 1.0] to [-32767, 32767], rounding to nearest.
#[inline]
pub fn f32_to_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Convert f32 to unsigned normalized 16-bit integer (unorm16)
#[inline]
pub fn f32_to_unorm16(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Convert f32 to unsigned normalized 8-bit integer (unorm8)
#[inline]
pub fn f32_to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub fn snorm16_to_f32(value: i16) -> f32 {
    (value as f32 / 32767.0).max(-1.0)
}

#[inline]
pub fn unorm16_to_f32(value: u16) -> f32 {
    value as f32 / 65535.0
}

#[inline]
pub fn unorm8_to_f32(value: u8) -> f32 {
    value as f32 / 255.0
}

// ============================================================================
// Stream Conversions
// ============================================================================

pub fn quantize_snorm16(values: &[f32]) -> Vec<i16> {
    values.iter().map(|&v| f32_to_snorm16(v)).collect()
}

pub fn quantize_unorm16(values: &[f32]) -> Vec<u16> {
    values.iter().map(|&v| f32_to_unorm16(v)).collect()
}

pub fn quantize_unorm8(values: &[f32]) -> Vec<u8> {
    values.iter().map(|&v| f32_to_unorm8(v)).collect()
}

/// Keep only the used channels of layer-major RGB color data
///
/// `colors` holds `channels.len()` layers of `vertex_count` RGB triples. The
/// result keeps layer-major order, each vertex emitting its present channels
/// in R, G, B order.
pub fn reduce_color_channels(
    colors: &[f32],
    vertex_count: usize,
    channels: &[[bool; 3]],
) -> Vec<f32> {
    let kept: usize = channels
        .iter()
        .map(|c| c.iter().filter(|&&used| used).count())
        .sum();
    let mut reduced = Vec::with_capacity(kept * vertex_count);

    for (layer, mask) in channels.iter().enumerate() {
        let start = layer * vertex_count * 3;
        let Some(values) = colors.get(start..start + vertex_count * 3) else {
            break;
        };
        for rgb in values.chunks_exact(3) {
            reduced.extend(rgb.iter().zip(mask).filter(|(_, used)| **used).map(|(v, _)| *v));
        }
    }

    reduced
}
