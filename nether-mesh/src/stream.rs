//! Attribute streams and strided views into interleaved rows
//!
//! An [`AttributeStream`] owns the values of one attribute kind for every
//! vertex, laid out partition-major: `[partition][vertex][component]`.
//! A partition is an animation frame, a UV/color layer or a vertex group.
//!
//! A [`StridedView`] describes where such a stream lives inside an interleaved
//! row matrix. Within a row the partitions of one kind are contiguous:
//! `row[offset + partition * components + component]`.

use crate::attribute::AttributeKind;
use crate::error::{BakeError, Result};

/// Owned, partition-major attribute values
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeStream {
    components: usize,
    partitions: usize,
    data: Vec<f32>,
}

impl AttributeStream {
    /// Zero-filled stream
    pub fn zeroed(components: usize, partitions: usize, vertex_count: usize) -> Self {
        Self {
            components,
            partitions,
            data: vec![0.0; components * partitions * vertex_count],
        }
    }

    pub fn from_data(components: usize, partitions: usize, data: Vec<f32>) -> Result<Self> {
        let width = components * partitions;
        if width == 0 || data.len() % width != 0 {
            return Err(BakeError::StreamLayout(format!(
                "{} values do not divide into {} partitions of {} components",
                data.len(),
                partitions,
                components
            )));
        }
        Ok(Self {
            components,
            partitions,
            data,
        })
    }

    #[inline]
    pub fn components(&self) -> usize {
        self.components
    }

    #[inline]
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Floats per vertex across all partitions
    #[inline]
    pub fn width(&self) -> usize {
        self.components * self.partitions
    }

    pub fn vertex_count(&self) -> usize {
        match self.width() {
            0 => 0,
            width => self.data.len() / width,
        }
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// All vertices of one partition
    pub fn partition(&self, partition: usize) -> &[f32] {
        let len = self.vertex_count() * self.components;
        &self.data[partition * len..(partition + 1) * len]
    }

    pub fn partition_mut(&mut self, partition: usize) -> &mut [f32] {
        let len = self.vertex_count() * self.components;
        &mut self.data[partition * len..(partition + 1) * len]
    }

    /// Components of one vertex in one partition
    #[inline]
    pub fn get(&self, partition: usize, vertex: usize) -> &[f32] {
        let start = self.element_start(partition, vertex);
        &self.data[start..start + self.components]
    }

    #[inline]
    pub fn get_mut(&mut self, partition: usize, vertex: usize) -> &mut [f32] {
        let start = self.element_start(partition, vertex);
        let components = self.components;
        &mut self.data[start..start + components]
    }

    #[inline]
    fn element_start(&self, partition: usize, vertex: usize) -> usize {
        (self.vertex_count() * partition + vertex) * self.components
    }
}

/// Location of one attribute kind inside an interleaved row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridedView {
    pub offset: usize,
    pub stride: usize,
    pub components: usize,
    pub partitions: usize,
}

impl StridedView {
    #[inline]
    pub fn width(&self) -> usize {
        self.components * self.partitions
    }

    fn check_rows(&self, rows: usize, vertex_count: usize) -> Result<()> {
        if self.offset + self.width() > self.stride {
            return Err(BakeError::StreamLayout(format!(
                "view at offset {} with width {} exceeds stride {}",
                self.offset,
                self.width(),
                self.stride
            )));
        }
        if rows != vertex_count * self.stride {
            return Err(BakeError::StreamLayout(format!(
                "row matrix has {} values, expected {} rows of {}",
                rows, vertex_count, self.stride
            )));
        }
        Ok(())
    }

    /// Write a stream into the row matrix
    ///
    /// NaN values are stored as 0.0. Returns true if any were replaced.
    pub fn store(&self, stream: &AttributeStream, rows: &mut [f32]) -> Result<bool> {
        if stream.components != self.components || stream.partitions != self.partitions {
            return Err(BakeError::StreamLayout(format!(
                "stream is {}x{}, view expects {}x{}",
                stream.partitions, stream.components, self.partitions, self.components
            )));
        }
        let vertex_count = stream.vertex_count();
        self.check_rows(rows.len(), vertex_count)?;

        let mut replaced = false;
        for partition in 0..self.partitions {
            for vertex in 0..vertex_count {
                let src = stream.get(partition, vertex);
                let dst = vertex * self.stride + self.offset + partition * self.components;
                for (k, &value) in src.iter().enumerate() {
                    rows[dst + k] = if value.is_nan() {
                        replaced = true;
                        0.0
                    } else {
                        value
                    };
                }
            }
        }
        Ok(replaced)
    }

    /// Read a stream back out of the row matrix
    pub fn extract(&self, rows: &[f32], vertex_count: usize) -> Result<AttributeStream> {
        self.check_rows(rows.len(), vertex_count)?;

        let mut stream = AttributeStream::zeroed(self.components, self.partitions, vertex_count);
        for partition in 0..self.partitions {
            for vertex in 0..vertex_count {
                let src = vertex * self.stride + self.offset + partition * self.components;
                stream
                    .get_mut(partition, vertex)
                    .copy_from_slice(&rows[src..src + self.components]);
            }
        }
        Ok(stream)
    }
}

/// One optional stream slot per attribute kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    slots: [Option<AttributeStream>; AttributeKind::COUNT],
}

impl AttributeSet {
    #[inline]
    pub fn get(&self, kind: AttributeKind) -> Option<&AttributeStream> {
        self.slots[kind.index()].as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, kind: AttributeKind) -> Option<&mut AttributeStream> {
        self.slots[kind.index()].as_mut()
    }

    pub fn insert(&mut self, kind: AttributeKind, stream: AttributeStream) {
        self.slots[kind.index()] = Some(stream);
    }

    pub fn take(&mut self, kind: AttributeKind) -> Option<AttributeStream> {
        self.slots[kind.index()].take()
    }

    pub fn contains(&self, kind: AttributeKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Present streams in interleaving order
    pub fn iter(&self) -> impl Iterator<Item = (AttributeKind, &AttributeStream)> {
        AttributeKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|stream| (kind, stream)))
    }

    /// Vertex count of the position stream (0 when absent)
    pub fn vertex_count(&self) -> usize {
        self.get(AttributeKind::Position)
            .map(AttributeStream::vertex_count)
            .unwrap_or(0)
    }
}
