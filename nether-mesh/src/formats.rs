//! Baked submesh container (.nbsub) and JSON metadata sidecar
//!
//! POD format - no magic bytes, all values little-endian.
//!
//! # Layout
//! ```text
//! 0x00: vertex_count u32
//! 0x04: index_count u32
//! 0x08: frame_count u16
//! 0x0A: group_count u16
//! 0x0C: color_channels u16
//! 0x0E: format u8 (FORMAT_* flags)
//! 0x0F: status u8 (attribute error flags)
//! 0x10: indices      index_count * u32
//! var:  position     frame_count * vertex_count * f32x3
//! var:  normal       frame_count * vertex_count * snorm16x3
//! var:  tangent      frame_count * vertex_count * snorm16x4, if FORMAT_TANGENT
//! var:  texcoord     vertex_count * f32x2, if FORMAT_TEXCOORD
//! var:  texcoord2    vertex_count * f32x2, if FORMAT_TEXCOORD2
//! var:  shade_tangs  vertex_count * f32x3, if FORMAT_SHADE_TANGENT
//! var:  group        group_count * vertex_count * unorm16, if FORMAT_GROUP
//! var:  color        vertex_count * color_channels * unorm8, if FORMAT_COLOR
//! ```

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeStatus;
use crate::bake::BakedSubmesh;
use crate::bounds::BoundingVolumes;
use crate::error::{BakeError, Result};
use crate::packing::{
    FORMAT_COLOR, FORMAT_GROUP, FORMAT_SHADE_TANGENT, FORMAT_TANGENT, FORMAT_TEXCOORD,
    FORMAT_TEXCOORD2, vertex_bytes,
};

/// File extension of the binary container
pub const SUBMESH_EXTENSION: &str = "nbsub";

/// Baked submesh header (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SubmeshHeader {
    pub vertex_count: u32,
    pub index_count: u32,
    pub frame_count: u16,
    pub group_count: u16,
    pub color_channels: u16,
    pub format: u8,
    pub status: u8,
}

/// One data section following the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    /// Byte offset from the start of the file
    pub offset: usize,
    pub size: usize,
}

impl SubmeshHeader {
    pub const SIZE: usize = 16;

    /// Header for a baked submesh, failing if a count exceeds its field
    pub fn for_baked(baked: &BakedSubmesh) -> Result<Self> {
        Ok(Self {
            vertex_count: narrow("vertex count", baked.vertex_count)?,
            index_count: narrow("index count", baked.index_count())?,
            frame_count: narrow("frame count", baked.frame_count)?,
            group_count: narrow("group count", baked.group_count)?,
            color_channels: narrow("color channels", baked.color_channels())?,
            format: baked.format(),
            status: baked.status.bits(),
        })
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.vertex_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.index_count.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.frame_count.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.group_count.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.color_channels.to_le_bytes());
        bytes[14] = self.format;
        bytes[15] = self.status;
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            vertex_count: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            index_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            frame_count: u16::from_le_bytes([bytes[8], bytes[9]]),
            group_count: u16::from_le_bytes([bytes[10], bytes[11]]),
            color_channels: u16::from_le_bytes([bytes[12], bytes[13]]),
            format: bytes[14],
            status: bytes[15],
        })
    }

    /// Present sections with their offsets and sizes, in file order
    pub fn sections(&self) -> Vec<Section> {
        let v = self.vertex_count as usize;
        let f = self.frame_count as usize;
        let has = |flag: u8| self.format & flag != 0;

        let sizes = [
            ("indices", true, self.index_count as usize * 4),
            ("position", true, f * v * 12),
            ("normal", true, f * v * 6),
            ("tangent", has(FORMAT_TANGENT), f * v * 8),
            ("texcoord", has(FORMAT_TEXCOORD), v * 8),
            ("texcoord2", has(FORMAT_TEXCOORD2), v * 8),
            ("shade_tangs", has(FORMAT_SHADE_TANGENT), v * 12),
            ("group", has(FORMAT_GROUP), self.group_count as usize * v * 2),
            ("color", has(FORMAT_COLOR), self.color_channels as usize * v),
        ];

        let mut offset = Self::SIZE;
        sizes
            .into_iter()
            .filter(|(_, present, _)| *present)
            .map(|(name, _, size)| {
                let section = Section { name, offset, size };
                offset += size;
                section
            })
            .collect()
    }

    /// Total file size implied by the header
    pub fn file_size(&self) -> usize {
        let per_vertex = vertex_bytes(
            self.format,
            self.frame_count as usize,
            self.group_count as usize,
            self.color_channels as usize,
        );
        Self::SIZE + self.index_count as usize * 4 + self.vertex_count as usize * per_vertex
    }
}

fn narrow<T: TryFrom<usize>>(what: &str, value: usize) -> Result<T> {
    T::try_from(value)
        .map_err(|_| BakeError::StreamLayout(format!("{what} {value} does not fit the header")))
}

/// Write a baked submesh in the container layout
pub fn write_baked_submesh<W: Write>(w: &mut W, baked: &BakedSubmesh) -> Result<()> {
    let header = SubmeshHeader::for_baked(baked)?;
    w.write_all(&header.to_bytes())?;

    for &index in &baked.indices {
        w.write_all(&index.to_le_bytes())?;
    }
    write_f32s(w, &baked.position)?;
    write_i16s(w, &baked.normal)?;
    if let Some(tangent) = &baked.tangent {
        write_i16s(w, tangent)?;
    }
    for uv in &baked.texcoords {
        write_f32s(w, uv)?;
    }
    if let Some(shade) = &baked.shade_tangent {
        write_f32s(w, shade)?;
    }
    if let Some(group) = &baked.group {
        for &weight in group {
            w.write_all(&weight.to_le_bytes())?;
        }
    }
    if let Some(color) = &baked.color {
        w.write_all(color)?;
    }

    Ok(())
}

fn write_f32s<W: Write>(w: &mut W, values: &[f32]) -> Result<()> {
    for value in values {
        w.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn write_i16s<W: Write>(w: &mut W, values: &[i16]) -> Result<()> {
    for value in values {
        w.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Header and section slices of a container
#[derive(Debug, Clone)]
pub struct ParsedSubmesh<'a> {
    pub header: SubmeshHeader,
    pub sections: Vec<(Section, &'a [u8])>,
}

impl<'a> ParsedSubmesh<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = SubmeshHeader::from_bytes(bytes).ok_or_else(|| {
            BakeError::StreamLayout(format!(
                "{} bytes is shorter than the {} byte header",
                bytes.len(),
                SubmeshHeader::SIZE
            ))
        })?;
        let expected = header.file_size();
        if bytes.len() != expected {
            return Err(BakeError::StreamLayout(format!(
                "file is {} bytes, header describes {expected}",
                bytes.len()
            )));
        }
        let sections = header
            .sections()
            .into_iter()
            .map(|s| (s, &bytes[s.offset..s.offset + s.size]))
            .collect();
        Ok(Self { header, sections })
    }

    pub fn section(&self, name: &str) -> Option<&'a [u8]> {
        self.sections
            .iter()
            .find(|(s, _)| s.name == name)
            .map(|(_, data)| *data)
    }

    /// Decoded index buffer
    pub fn indices(&self) -> Vec<u32> {
        self.section("indices")
            .unwrap_or_default()
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

// ============================================================================
// Metadata sidecar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorLayerMetadata {
    pub name: String,
    pub mask: u8,
    pub channels: usize,
}

/// JSON description written next to the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmeshMetadata {
    pub vertex_count: usize,
    pub index_count: usize,
    pub frame_count: usize,
    pub group_count: usize,
    pub uv_layers: usize,
    pub format: u8,
    pub color_layers: Vec<ColorLayerMetadata>,
    pub color_reduced: bool,
    pub status: AttributeStatus,
    /// Human readable attribute errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub acmr: f32,
    pub bounds: BoundingVolumes,
}

impl SubmeshMetadata {
    pub fn from_baked(baked: &BakedSubmesh) -> Self {
        Self {
            vertex_count: baked.vertex_count,
            index_count: baked.index_count(),
            frame_count: baked.frame_count,
            group_count: baked.group_count,
            uv_layers: baked.texcoords.len(),
            format: baked.format(),
            color_layers: baked
                .color_layers
                .iter()
                .map(|layer| ColorLayerMetadata {
                    name: layer.name.clone(),
                    mask: layer.mask,
                    channels: layer.channels,
                })
                .collect(),
            color_reduced: baked.color_reduced,
            status: baked.status,
            errors: baked.status.describe(),
            acmr: baked.acmr,
            bounds: baked.bounds,
        }
    }
}
