//! Bounding volumes of a submesh
//!
//! All volumes are fitted on the raw source positions of the vertices the
//! selected faces reference, independently of triangulation and welding.

pub mod pca;

use glam::{Mat3, Vec2, Vec3, Vec3Swizzles};
use serde::{Deserialize, Serialize};

use crate::source::SourceMesh;

/// Smallest ellipsoid semi-axis, keeps flat point sets from dividing by zero
pub const MIN_SEMI_AXIS: f32 = 1e-4;

// ============================================================================
// Volume types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Running min/max over the points, `None` when empty
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Zero width along all three axes
    pub fn is_degenerate(&self) -> bool {
        self.extent().cmple(Vec3::ZERO).all()
    }

    pub fn contains(&self, point: Vec3, epsilon: f32) -> bool {
        point.cmpge(self.min - epsilon).all() && point.cmple(self.max + epsilon).all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Infinite cylinder along Y
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingCylinder {
    pub center: Vec3,
    pub radius: f32,
}

/// Box in the principal-axis frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: Vec3,
    /// Columns are the box axes
    pub axes: Mat3,
    pub half_extents: Vec3,
}

impl OrientedBox {
    /// Point in the box frame, relative to its center
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.axes.transpose() * (point - self.center)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingEllipsoid {
    pub center: Vec3,
    /// Columns are the ellipsoid axes
    pub axes: Mat3,
    pub semi_axes: Vec3,
}

impl BoundingEllipsoid {
    /// `sum((q_i / s_i)^2)` in the local frame, <= 1 inside
    pub fn normalized_distance_squared(&self, point: Vec3) -> f32 {
        let local = self.axes.transpose() * (point - self.center);
        (local / self.semi_axes).length_squared()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolumes {
    pub aabb: BoundingBox,
    pub sphere: BoundingSphere,
    pub cylinder: BoundingCylinder,
    pub obb: OrientedBox,
    pub ellipsoid: BoundingEllipsoid,
}

// ============================================================================
// Fitting
// ============================================================================

/// Raw positions of the vertices referenced by the selected faces
///
/// Each vertex is visited once, in ascending id order. NaN components read as
/// zero.
pub fn selected_positions(source: &SourceMesh, material: Option<u32>) -> Vec<Vec3> {
    let mut ids: Vec<u32> = source
        .selected_faces(material)
        .flat_map(|(_, face)| face.polygon.vertices().iter().copied())
        .collect();
    ids.sort_unstable();
    ids.dedup();

    ids.iter()
        .filter_map(|&id| source.positions.get(id as usize))
        .map(|p| Vec3::from_array(p.map(|c| if c.is_nan() { 0.0 } else { c })))
        .collect()
}

/// Bounding volumes of the selection, `None` if no face is selected
pub fn compute_bounds(source: &SourceMesh, material: Option<u32>) -> Option<BoundingVolumes> {
    fit_points(&selected_positions(source, material))
}

/// Bounding volumes of a point set, `None` if empty
pub fn fit_points(points: &[Vec3]) -> Option<BoundingVolumes> {
    let aabb = BoundingBox::from_points(points)?;
    let sphere = fit_sphere(points, &aabb);
    let cylinder = fit_cylinder(points, &aabb);
    let (obb, ellipsoid) = fit_oriented(points);

    tracing::debug!(
        "bounds of {} points: sphere r={:.4}, cylinder r={:.4}",
        points.len(),
        sphere.radius,
        cylinder.radius
    );

    Some(BoundingVolumes {
        aabb,
        sphere,
        cylinder,
        obb,
        ellipsoid,
    })
}

/// Moves the center halfway toward an outside point from the far side
///
/// The new circle touches the point and the far edge of the old one, so it
/// contains the old circle.
#[inline]
fn grow<V>(center: V, radius: f32, point: V) -> Option<(V, f32)>
where
    V: Copy
        + std::ops::Sub<Output = V>
        + std::ops::Add<Output = V>
        + std::ops::Mul<f32, Output = V>
        + Length,
{
    let offset = point - center;
    let distance = offset.length();
    if distance <= radius {
        return None;
    }
    let far = center - offset * (radius / distance);
    let center = (far + point) * 0.5;
    Some((center, (point - center).length()))
}

trait Length {
    fn length(self) -> f32;
}

impl Length for Vec3 {
    fn length(self) -> f32 {
        Vec3::length(self)
    }
}

impl Length for Vec2 {
    fn length(self) -> f32 {
        Vec2::length(self)
    }
}

fn fit_sphere(points: &[Vec3], aabb: &BoundingBox) -> BoundingSphere {
    let mut center = aabb.center();
    let mut radius = aabb.extent().max_element() * 0.5;
    for &p in points {
        if let Some((c, r)) = grow(center, radius, p) {
            center = c;
            radius = r;
        }
    }
    BoundingSphere { center, radius }
}

fn fit_cylinder(points: &[Vec3], aabb: &BoundingBox) -> BoundingCylinder {
    let box_center = aabb.center();
    let extent = aabb.extent();
    let mut center = box_center.xz();
    let mut radius = extent.x.max(extent.z) * 0.5;
    for p in points {
        if let Some((c, r)) = grow(center, radius, p.xz()) {
            center = c;
            radius = r;
        }
    }
    BoundingCylinder {
        center: Vec3::new(center.x, box_center.y, center.y),
        radius,
    }
}

fn fit_oriented(points: &[Vec3]) -> (OrientedBox, BoundingEllipsoid) {
    let axes = pca::principal_axes(points);
    let inverse = axes.transpose();

    let first = inverse * points[0];
    let (min, max) = points.iter().fold((first, first), |(min, max), p| {
        let q = inverse * *p;
        (min.min(q), max.max(q))
    });
    let half_extents = (max - min) * 0.5;
    let center = axes * ((min + max) * 0.5);

    let obb = OrientedBox {
        center,
        axes,
        half_extents,
    };

    let base = half_extents.max(Vec3::splat(MIN_SEMI_AXIS));
    let factor = points
        .iter()
        .map(|p| (obb.to_local(*p) / base).length())
        .fold(1.0f32, f32::max);
    let ellipsoid = BoundingEllipsoid {
        center,
        axes,
        semi_axes: base * factor,
    };

    (obb, ellipsoid)
}
