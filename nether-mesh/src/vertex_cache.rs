//! Vertex cache optimization
//!
//! Tom Forsyth's linear-speed vertex cache optimization: triangles are emitted
//! greedily by score, where a vertex scores higher the more recently it entered
//! a simulated LRU cache and the fewer unprocessed triangles still use it.
//!
//! Long index streams are split into chunks that are optimized independently,
//! each with its vertex ids compacted to a dense local range.

use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::error::{BakeError, Result};

/// Largest simulated cache size
pub const MAX_CACHE_SIZE: usize = 64;
pub const DEFAULT_CACHE_SIZE: usize = 32;
/// Index streams longer than this are optimized chunk by chunk
pub const DEFAULT_CHUNK_INDICES: usize = 9000;

const MAX_PRECOMPUTED_VALENCE: usize = 64;
const CACHE_DECAY_POWER: f32 = 1.5;
const LAST_TRIANGLE_SCORE: f32 = 0.75;
const VALENCE_BOOST_SCALE: f32 = 2.0;
const VALENCE_BOOST_POWER: f32 = 0.5;

const EVICTED: usize = usize::MAX;

// ============================================================================
// Score Tables
// ============================================================================

struct ScoreTables {
    /// `cache[size][position]`
    cache: Vec<[f32; MAX_CACHE_SIZE]>,
    valence: [f32; MAX_PRECOMPUTED_VALENCE],
}

fn score_tables() -> &'static ScoreTables {
    static TABLES: OnceLock<ScoreTables> = OnceLock::new();
    TABLES.get_or_init(ScoreTables::build)
}

fn cache_position_score(position: usize, cache_size: usize) -> f32 {
    if position < 3 {
        // the three vertices of the last triangle score the same
        // whatever order they were added in
        LAST_TRIANGLE_SCORE
    } else {
        let scaler = 1.0 / (cache_size - 3) as f32;
        let score = 1.0 - (position - 3) as f32 * scaler;
        score.powf(CACHE_DECAY_POWER)
    }
}

fn valence_score(active_faces: usize) -> f32 {
    VALENCE_BOOST_SCALE * (active_faces as f32).powf(-VALENCE_BOOST_POWER)
}

impl ScoreTables {
    fn build() -> Self {
        let mut cache = vec![[0.0; MAX_CACHE_SIZE]; MAX_CACHE_SIZE + 1];
        for (size, row) in cache.iter_mut().enumerate() {
            for (position, score) in row.iter_mut().enumerate().take(size) {
                *score = cache_position_score(position, size);
            }
        }

        let mut valence = [0.0; MAX_PRECOMPUTED_VALENCE];
        for (count, score) in valence.iter_mut().enumerate() {
            *score = valence_score(count);
        }

        Self { cache, valence }
    }

    /// Score of a vertex, -1 once no unprocessed triangle uses it
    fn vertex_score(&self, active_faces: usize, cache_position: usize, cache_size: usize) -> f32 {
        if active_faces == 0 {
            return -1.0;
        }

        let mut score = 0.0;
        if cache_position < cache_size {
            score += self.cache[cache_size][cache_position];
        }
        if active_faces < MAX_PRECOMPUTED_VALENCE {
            score += self.valence[active_faces];
        } else {
            score += valence_score(active_faces);
        }
        score
    }
}

// ============================================================================
// Optimizer
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct VertexState {
    score: f32,
    face_start: usize,
    face_count: usize,
    cache_pos0: usize,
    cache_pos1: usize,
}

impl Default for VertexState {
    fn default() -> Self {
        Self {
            score: 0.0,
            face_start: 0,
            face_count: 0,
            cache_pos0: EVICTED,
            cache_pos1: EVICTED,
        }
    }
}

fn face_score(vertices: &[VertexState], indices: &[u32], face: usize) -> f32 {
    indices[face * 3..face * 3 + 3]
        .iter()
        .map(|&i| vertices[i as usize].score)
        .sum()
}

/// Reorder one dense triangle list; ids must be `< vertex_count`
fn forsyth(indices: &[u32], vertex_count: usize, cache_size: usize) -> Vec<u32> {
    let tables = score_tables();
    let triangle_count = indices.len() / 3;

    let mut vertices = vec![VertexState::default(); vertex_count];
    for &index in indices {
        vertices[index as usize].face_count += 1;
    }

    let mut start = 0;
    for vertex in &mut vertices {
        vertex.face_start = start;
        start += vertex.face_count;
        vertex.score = tables.vertex_score(vertex.face_count, vertex.cache_pos0, cache_size);
        vertex.face_count = 0;
    }

    let mut active_faces = vec![0usize; start];
    for (face, triangle) in indices.chunks_exact(3).enumerate() {
        for &index in triangle {
            let vertex = &mut vertices[index as usize];
            active_faces[vertex.face_start + vertex.face_count] = face;
            vertex.face_count += 1;
        }
    }

    let mut processed = vec![false; triangle_count];
    let mut cache0 = [0usize; MAX_CACHE_SIZE + 3];
    let mut cache1 = [0usize; MAX_CACHE_SIZE + 3];
    let mut entries0 = 0;

    let max_valence_score = tables.vertex_score(1, EVICTED, cache_size) * 3.0;
    let mut best_face = 0;
    let mut best_score = -1.0f32;
    let mut output = Vec::with_capacity(triangle_count * 3);

    for _ in 0..triangle_count {
        if best_score < 0.0 {
            // nothing in the cache is still needed, scan every remaining triangle
            for face in (0..triangle_count).filter(|&f| !processed[f]) {
                let score = face_score(&vertices, indices, face);
                if score > best_score {
                    best_score = score;
                    best_face = face;
                    if best_score >= max_valence_score {
                        break;
                    }
                }
            }
        }

        processed[best_face] = true;
        let mut entries1 = 0;

        // push the chosen triangle's vertices to the front of the cache
        for &index in &indices[best_face * 3..best_face * 3 + 3] {
            output.push(index);
            let vertex = &mut vertices[index as usize];

            if vertex.cache_pos1 >= entries1 {
                vertex.cache_pos1 = entries1;
                cache1[entries1] = index as usize;
                entries1 += 1;

                if vertex.face_count == 1 {
                    vertex.face_count = 0;
                    continue;
                }
            }

            let faces =
                &mut active_faces[vertex.face_start..vertex.face_start + vertex.face_count];
            if let Some(position) = faces.iter().position(|&f| f == best_face) {
                let last = faces.len() - 1;
                faces.swap(position, last);
                vertex.face_count -= 1;
            }
            vertex.score = tables.vertex_score(vertex.face_count, vertex.cache_pos1, cache_size);
        }

        // shift the previous cache contents down behind them
        for &index in &cache0[..entries0] {
            let vertex = &mut vertices[index];
            if vertex.cache_pos1 >= entries1 {
                vertex.cache_pos1 = entries1;
                cache1[entries1] = index;
                entries1 += 1;
                vertex.score =
                    tables.vertex_score(vertex.face_count, vertex.cache_pos1, cache_size);
            }
        }

        // best triangle among those touching the cache, including the up to
        // three vertices that just fell out of it
        best_score = -1.0;
        for &index in &cache1[..entries1] {
            let vertex = &mut vertices[index];
            vertex.cache_pos0 = vertex.cache_pos1;
            vertex.cache_pos1 = EVICTED;
            let (face_start, face_count) = (vertex.face_start, vertex.face_count);

            for &face in &active_faces[face_start..face_start + face_count] {
                let score = face_score(&vertices, indices, face);
                if score > best_score {
                    best_score = score;
                    best_face = face;
                }
            }
        }

        std::mem::swap(&mut cache0, &mut cache1);
        entries0 = entries1.min(cache_size);
    }

    output
}

fn validate(indices: &[u32], vertex_count: usize) -> Result<()> {
    if indices.len() % 3 != 0 {
        return Err(BakeError::InvalidIndices(format!(
            "{} indices do not form whole triangles",
            indices.len()
        )));
    }
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(BakeError::InvalidIndices(format!(
            "index {index} out of {vertex_count} vertices"
        )));
    }
    Ok(())
}

#[inline]
fn clamp_cache_size(cache_size: usize) -> usize {
    cache_size.clamp(3, MAX_CACHE_SIZE)
}

/// Reorder a triangle list for a cache of `cache_size` entries (3..=64)
pub fn optimize_faces(indices: &[u32], vertex_count: usize, cache_size: usize) -> Result<Vec<u32>> {
    validate(indices, vertex_count)?;
    Ok(forsyth(indices, vertex_count, clamp_cache_size(cache_size)))
}

/// Reorder a triangle list, in chunks of `chunk_indices` when it is longer
///
/// Every chunk is compacted to dense local ids, optimized, and mapped back.
/// Chunks are concatenated in their original order.
pub fn optimize_indices(
    indices: &[u32],
    vertex_count: usize,
    cache_size: usize,
    chunk_indices: usize,
) -> Result<Vec<u32>> {
    validate(indices, vertex_count)?;
    let cache_size = clamp_cache_size(cache_size);
    let chunk = (chunk_indices / 3 * 3).max(3);

    if indices.len() <= chunk {
        return Ok(forsyth(indices, vertex_count, cache_size));
    }

    tracing::debug!(
        "optimizing {} indices in chunks of {}",
        indices.len(),
        chunk
    );

    let mut output = Vec::with_capacity(indices.len());
    for part in indices.chunks(chunk) {
        let mut ids = part.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let local: Vec<u32> = part
            .iter()
            .map(|index| ids.binary_search(index).unwrap_or_else(|p| p) as u32)
            .collect();
        let optimized = forsyth(&local, ids.len(), cache_size);
        output.extend(optimized.into_iter().map(|i| ids[i as usize]));
    }
    Ok(output)
}

/// Average cache miss ratio: LRU misses per triangle
pub fn average_cache_miss_ratio(indices: &[u32], cache_size: usize) -> f32 {
    let triangles = indices.len() / 3;
    if triangles == 0 || cache_size == 0 {
        return 0.0;
    }

    let mut cache: VecDeque<u32> = VecDeque::with_capacity(cache_size + 1);
    let mut misses = 0usize;
    for &index in indices {
        match cache.iter().position(|&cached| cached == index) {
            Some(position) => {
                cache.remove(position);
            }
            None => {
                misses += 1;
                if cache.len() == cache_size {
                    cache.pop_back();
                }
            }
        }
        cache.push_front(index);
    }

    misses as f32 / triangles as f32
}
