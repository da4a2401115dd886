//! Attribute kinds and per-kind status flags

use serde::{Deserialize, Serialize};
use std::fmt;

/// One exported vertex attribute stream
///
/// The declaration order is the interleaving order used when welding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Position,
    Normal,
    Tangent,
    TexCoord0,
    TexCoord1,
    Group,
    Color,
    ShadeTangent,
}

impl AttributeKind {
    pub const COUNT: usize = 8;

    /// All kinds in interleaving order
    pub const ALL: [AttributeKind; Self::COUNT] = [
        AttributeKind::Position,
        AttributeKind::Normal,
        AttributeKind::Tangent,
        AttributeKind::TexCoord0,
        AttributeKind::TexCoord1,
        AttributeKind::Group,
        AttributeKind::Color,
        AttributeKind::ShadeTangent,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Components per vertex and per partition (frame, layer or group)
    pub const fn components(self) -> usize {
        match self {
            AttributeKind::Position | AttributeKind::Normal => 3,
            AttributeKind::Tangent => 4,
            AttributeKind::TexCoord0 | AttributeKind::TexCoord1 => 2,
            AttributeKind::Group => 1,
            AttributeKind::Color | AttributeKind::ShadeTangent => 3,
        }
    }

    /// Buffer name used in baked output and metadata
    pub const fn buffer_name(self) -> &'static str {
        match self {
            AttributeKind::Position => "position",
            AttributeKind::Normal => "normal",
            AttributeKind::Tangent => "tangent",
            AttributeKind::TexCoord0 => "texcoord",
            AttributeKind::TexCoord1 => "texcoord2",
            AttributeKind::Group => "group",
            AttributeKind::Color => "color",
            AttributeKind::ShadeTangent => "shade_tangs",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            AttributeKind::Position => "vertices positions",
            AttributeKind::Normal => "normals",
            AttributeKind::Tangent => "tangents",
            AttributeKind::TexCoord0 | AttributeKind::TexCoord1 => "texture coordinates",
            AttributeKind::Group => "vertex group weights",
            AttributeKind::Color => "vertex color values",
            AttributeKind::ShadeTangent => "shading tangents values",
        }
    }

    #[inline]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.buffer_name())
    }
}

/// Accumulated per-kind attribute errors (NaN replaced during welding)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeStatus(u8);

impl AttributeStatus {
    pub const OK: AttributeStatus = AttributeStatus(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, kind: AttributeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: AttributeKind) {
        self.0 |= kind.bit();
    }

    /// Flagged kinds in interleaving order
    pub fn kinds(self) -> impl Iterator<Item = AttributeKind> {
        AttributeKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    /// Human readable message per flagged kind
    pub fn describe(self) -> Vec<String> {
        self.kinds()
            .map(|kind| format!("Wrong {}.", kind.description()))
            .collect()
    }
}
