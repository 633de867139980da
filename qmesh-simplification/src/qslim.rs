//! Greedy quadric-error decimation
//!
//! Repeatedly contracts the lowest-cost valid vertex pair until a target
//! complexity is reached. Candidates live in a priority queue; because no
//! general-purpose priority queue removes arbitrary elements efficiently,
//! each candidate carries the generation stamps of the vertex versions it
//! was computed against and is lazily discarded or refreshed when popped
//! stale. The surviving vertex of a contraction is always the lower index
//! of the pair.

use std::cmp::Ordering;
use std::collections::HashSet;

use nalgebra::DVector;
use priority_queue::PriorityQueue;
use rayon::prelude::*;

use qmesh_core::{vertex_to_face_map, Error, Point2f, Point3f, Result, TriangleMesh, Vector3f};

use crate::pairs::{self, VertexPair};
use crate::quadric::{accumulate_quadrics, optimal_contraction, vertex_attr, Quadric};
use crate::search::BruteForceSearch;
use crate::MeshSimplifier;

/// Decimation objective and behavior flags.
///
/// At least one of the two targets must be set; when both are set the
/// driver stops at whichever triggers first.
#[derive(Debug, Clone)]
pub struct DecimateParams {
    /// Stop when the live face count reaches this value
    pub target_face_num: Option<usize>,
    /// Stop when the live vertex count reaches this value
    pub target_vertex_num: Option<usize>,
    /// Never contract vertices on a geometric boundary
    pub keep_geom_boundary: bool,
    /// Never contract vertices on a UV-space boundary
    pub keep_uv_boundary: bool,
    /// Also consider spatially close, topologically non-adjacent pairs
    pub accept_non_edge: bool,
    /// Distance threshold for non-edge pairs
    pub non_edge_dist: f32,
    /// Optional bound on the number of contractions performed
    pub max_contractions: Option<usize>,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_face_num: None,
            target_vertex_num: None,
            keep_geom_boundary: false,
            keep_uv_boundary: false,
            accept_non_edge: false,
            non_edge_dist: 0.0,
            max_contractions: None,
        }
    }
}

/// Summary of one decimation run.
///
/// Targets are best-effort: when boundary protection or exhausted
/// candidates stop the run early, the final counts here are larger than
/// requested and the call still succeeds.
#[derive(Debug, Clone, Default)]
pub struct DecimateStats {
    /// Accepted contractions
    pub contractions: usize,
    /// Faces dropped because a contraction made them degenerate
    pub dropped_faces: usize,
    /// Solver invocations that took the singular-quadric fallback
    pub singular_fallbacks: usize,
    /// Error of each accepted contraction, in acceptance order
    pub accepted_errors: Vec<f64>,
    /// Vertex count after compaction
    pub vertex_count: usize,
    /// Face count after compaction
    pub face_count: usize,
}

/// A contraction candidate: the pair, its solved position and error, and
/// the vertex generations it was computed against.
#[derive(Debug, Clone)]
struct Candidate {
    pair: VertexPair,
    attr: DVector<f64>,
    error: f64,
    generations: (u32, u32),
    solved: bool,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.error.total_cmp(&other.error) == Ordering::Equal && self.pair == other.pair
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Highest priority = smallest error; ties break toward the lower pair
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .error
            .total_cmp(&self.error)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// Mutable decimation state: flat vertex/face arenas with validity flags,
/// per-vertex quadrics and generation counters, and an index-based
/// vertex-to-face map. Neighborhoods are always read back from the live
/// faces, never cached as pointers.
struct DecimationState {
    attrs: Vec<DVector<f64>>,
    quadrics: Vec<Quadric>,
    valid: Vec<bool>,
    generations: Vec<u32>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    live_vertices: usize,
    live_faces: usize,
    normals: Option<Vec<Vector3f>>,
    colors: Option<Vec<[u8; 3]>>,
    uvs: Option<Vec<Point2f>>,
}

impl DecimationState {
    fn new(mesh: &TriangleMesh) -> Self {
        let nv = mesh.vertices.len();
        let attrs: Vec<DVector<f64>> = mesh.vertices.iter().map(vertex_attr).collect();
        let quadrics = accumulate_quadrics(&mesh.vertices, &mesh.faces);
        let vertex_faces = vertex_to_face_map(&mesh.faces, nv);

        // Working UVs are per-vertex: the first wedge seen for each vertex.
        // Seam vertices carry several wedge UVs, but they sit on a UV
        // boundary, so with UV protection enabled they never move.
        let uvs = match (&mesh.uvs, &mesh.uv_faces) {
            (Some(uvs), Some(uv_faces)) => {
                let mut per_vertex = vec![Point2f::origin(); nv];
                for (fid, face) in mesh.faces.iter().enumerate().rev() {
                    for i in 0..3 {
                        per_vertex[face[i]] = uvs[uv_faces[fid][i]];
                    }
                }
                Some(per_vertex)
            }
            _ => None,
        };

        Self {
            attrs,
            quadrics,
            valid: vec![true; nv],
            generations: vec![0; nv],
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vertex_faces,
            live_vertices: nv,
            live_faces: mesh.faces.len(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
            uvs,
        }
    }

    /// Current neighbors of `v`, read from the live faces incident to it.
    fn neighbors(&self, v: usize) -> HashSet<usize> {
        let mut out = HashSet::new();
        for &fid in &self.vertex_faces[v] {
            if !self.face_alive[fid] {
                continue;
            }
            for &vi in &self.faces[fid] {
                if vi != v {
                    out.insert(vi);
                }
            }
        }
        out
    }

    fn target_reached(&self, params: &DecimateParams) -> bool {
        let face_hit = params
            .target_face_num
            .map_or(false, |t| self.live_faces <= t);
        let vertex_hit = params
            .target_vertex_num
            .map_or(false, |t| self.live_vertices <= t);
        face_hit || vertex_hit
    }

    /// Contract `pair` into its lower index at `attr`, returning how many
    /// incident faces collapsed to a degenerate index triple.
    fn contract(&mut self, pair: VertexPair, attr: DVector<f64>) -> usize {
        let (keep, remove) = pair;

        self.attrs[keep] = attr;
        let removed_quadric = self.quadrics[remove].clone();
        self.quadrics[keep] += &removed_quadric;

        self.valid[remove] = false;
        self.generations[keep] += 1;
        self.live_vertices -= 1;

        let mut dropped = 0;
        let incident = std::mem::take(&mut self.vertex_faces[remove]);
        for fid in incident {
            if !self.face_alive[fid] {
                continue;
            }
            let face = &mut self.faces[fid];
            for slot in face.iter_mut() {
                if *slot == remove {
                    *slot = keep;
                }
            }
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                self.face_alive[fid] = false;
                self.live_faces -= 1;
                dropped += 1;
            } else {
                self.vertex_faces[keep].push(fid);
            }
        }
        self.vertex_faces[keep].sort_unstable();
        self.vertex_faces[keep].dedup();

        if let Some(normals) = &mut self.normals {
            let avg = (normals[keep] + normals[remove]).normalize();
            if avg.iter().all(|x| x.is_finite()) {
                normals[keep] = avg;
            }
        }
        if let Some(colors) = &mut self.colors {
            let (c1, c2) = (colors[keep], colors[remove]);
            colors[keep] = [
                ((c1[0] as u16 + c2[0] as u16) / 2) as u8,
                ((c1[1] as u16 + c2[1] as u16) / 2) as u8,
                ((c1[2] as u16 + c2[2] as u16) / 2) as u8,
            ];
        }
        if let Some(uvs) = &mut self.uvs {
            uvs[keep] = Point2f::from((uvs[keep].coords + uvs[remove].coords) * 0.5);
        }

        dropped
    }

    fn position(&self, v: usize) -> Point3f {
        let a = &self.attrs[v];
        Point3f::new(a[0] as f32, a[1] as f32, a[2] as f32)
    }

    /// Compact live vertices and faces back into `mesh`, rewriting every
    /// surviving face through an old-to-new index remap.
    fn compact_into(&self, mesh: &mut TriangleMesh) {
        let mut remap = vec![usize::MAX; self.attrs.len()];
        let mut vertices = Vec::with_capacity(self.live_vertices);
        let mut normals = self
            .normals
            .as_ref()
            .map(|_| Vec::with_capacity(self.live_vertices));
        let mut colors = self
            .colors
            .as_ref()
            .map(|_| Vec::with_capacity(self.live_vertices));
        let mut uvs = self
            .uvs
            .as_ref()
            .map(|_| Vec::with_capacity(self.live_vertices));

        for v in 0..self.attrs.len() {
            if !self.valid[v] {
                continue;
            }
            remap[v] = vertices.len();
            vertices.push(self.position(v));
            if let (Some(out), Some(src)) = (normals.as_mut(), self.normals.as_ref()) {
                out.push(src[v]);
            }
            if let (Some(out), Some(src)) = (colors.as_mut(), self.colors.as_ref()) {
                out.push(src[v]);
            }
            if let (Some(out), Some(src)) = (uvs.as_mut(), self.uvs.as_ref()) {
                out.push(src[v]);
            }
        }

        let mut faces = Vec::with_capacity(self.live_faces);
        for (fid, face) in self.faces.iter().enumerate() {
            if !self.face_alive[fid] {
                continue;
            }
            let f = [remap[face[0]], remap[face[1]], remap[face[2]]];
            debug_assert!(f.iter().all(|&v| v != usize::MAX));
            if f[0] != f[1] && f[1] != f[2] && f[2] != f[0] {
                faces.push(f);
            }
        }

        mesh.vertices = vertices;
        mesh.uv_faces = uvs.as_ref().map(|_| faces.clone());
        mesh.faces = faces;
        mesh.normals = normals;
        mesh.colors = colors;
        mesh.uvs = uvs;
    }
}

/// Decimate `mesh` in place toward the configured target complexity.
///
/// Returns a run summary on success. On error the mesh is left unmodified;
/// an unreachable target is not an error, the run simply stops when no
/// contractible pair remains.
pub fn decimate(mesh: &mut TriangleMesh, params: &DecimateParams) -> Result<DecimateStats> {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(Error::InvalidData(
            "mesh has no vertices or faces".to_string(),
        ));
    }
    if params.target_face_num.is_none() && params.target_vertex_num.is_none() {
        return Err(Error::InvalidData(
            "no decimation target configured".to_string(),
        ));
    }
    if params.accept_non_edge && !(params.non_edge_dist > 0.0) {
        return Err(Error::InvalidData(
            "non_edge_dist must be positive".to_string(),
        ));
    }
    if let Some(uv_faces) = &mesh.uv_faces {
        if uv_faces.len() != mesh.faces.len() {
            return Err(Error::InvalidData(
                "uv_faces must have one triple per face".to_string(),
            ));
        }
    }

    // Already at or below target: leave the mesh untouched
    let face_met = params
        .target_face_num
        .map_or(false, |t| mesh.faces.len() <= t);
    let vertex_met = params
        .target_vertex_num
        .map_or(false, |t| mesh.vertices.len() <= t);
    if face_met || vertex_met {
        return Ok(DecimateStats {
            vertex_count: mesh.vertex_count(),
            face_count: mesh.face_count(),
            ..Default::default()
        });
    }

    let protected =
        pairs::protected_vertices(mesh, params.keep_geom_boundary, params.keep_uv_boundary);

    let mut valid_pairs = pairs::prepare_valid_pairs(mesh, &protected);
    if params.accept_non_edge {
        let search = BruteForceSearch::new(&mesh.vertices);
        valid_pairs.extend(pairs::non_edge_pairs(
            mesh,
            &protected,
            params.non_edge_dist,
            &search,
        ));
    }

    let mut state = DecimationState::new(mesh);
    let mut stats = DecimateStats::default();

    // Initial candidate evaluation is independent per pair
    let initial: Vec<Candidate> = valid_pairs
        .par_iter()
        .map(|&(a, b)| {
            let solved = optimal_contraction(
                &state.attrs[a],
                &state.quadrics[a],
                &state.attrs[b],
                &state.quadrics[b],
            );
            Candidate {
                pair: (a, b),
                attr: solved.attr,
                error: solved.error,
                generations: (0, 0),
                solved: solved.solved,
            }
        })
        .collect();

    let mut heap: PriorityQueue<usize, Candidate> = PriorityQueue::new();
    let mut next_id = 0usize;
    for candidate in initial {
        if !candidate.solved {
            stats.singular_fallbacks += 1;
        }
        heap.push(next_id, candidate);
        next_id += 1;
    }

    while !state.target_reached(params)
        && params
            .max_contractions
            .map_or(true, |m| stats.contractions < m)
    {
        let (_, candidate) = match heap.pop() {
            Some(item) => item,
            None => break,
        };
        let (a, b) = candidate.pair;

        // Lazy invalidation: a dead endpoint kills the record outright
        if !state.valid[a] || !state.valid[b] {
            continue;
        }

        // Stale stamps mean the neighborhood changed since this record was
        // computed. Refresh it against current state if the pair is still
        // an edge, then keep iterating.
        if candidate.generations != (state.generations[a], state.generations[b]) {
            if state.neighbors(a).contains(&b) {
                let solved = optimal_contraction(
                    &state.attrs[a],
                    &state.quadrics[a],
                    &state.attrs[b],
                    &state.quadrics[b],
                );
                if !solved.solved {
                    stats.singular_fallbacks += 1;
                }
                heap.push(
                    next_id,
                    Candidate {
                        pair: candidate.pair,
                        attr: solved.attr,
                        error: solved.error,
                        generations: (state.generations[a], state.generations[b]),
                        solved: solved.solved,
                    },
                );
                next_id += 1;
            }
            continue;
        }

        // Cheapest currently-valid candidate: contract it
        let dropped = state.contract(candidate.pair, candidate.attr);
        stats.dropped_faces += dropped;
        stats.accepted_errors.push(candidate.error);
        stats.contractions += 1;

        // Fresh candidates around the survivor
        for n in state.neighbors(a) {
            if !state.valid[n] || protected.contains(&n) {
                continue;
            }
            let pair = pairs::canonical(a, n);
            let solved = optimal_contraction(
                &state.attrs[pair.0],
                &state.quadrics[pair.0],
                &state.attrs[pair.1],
                &state.quadrics[pair.1],
            );
            if !solved.solved {
                stats.singular_fallbacks += 1;
            }
            heap.push(
                next_id,
                Candidate {
                    pair,
                    attr: solved.attr,
                    error: solved.error,
                    generations: (state.generations[pair.0], state.generations[pair.1]),
                    solved: solved.solved,
                },
            );
            next_id += 1;
        }
    }

    state.compact_into(mesh);
    stats.vertex_count = mesh.vertex_count();
    stats.face_count = mesh.face_count();
    Ok(stats)
}

/// Greedy quadric-error decimation behind the [`MeshSimplifier`] trait.
///
/// Maps a reduction ratio onto a face-count target and runs [`decimate`]
/// on a copy of the input mesh.
pub struct QSlimSimplifier {
    /// Preserve geometric boundary vertices
    pub keep_geom_boundary: bool,
    /// Preserve UV boundary vertices
    pub keep_uv_boundary: bool,
    /// Allow contraction of close non-adjacent pairs
    pub accept_non_edge: bool,
    /// Distance threshold for non-edge pairs
    pub non_edge_dist: f32,
}

impl Default for QSlimSimplifier {
    fn default() -> Self {
        Self {
            keep_geom_boundary: true,
            keep_uv_boundary: false,
            accept_non_edge: false,
            non_edge_dist: 0.0,
        }
    }
}

impl QSlimSimplifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeshSimplifier for QSlimSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if reduction_ratio == 0.0 {
            return Ok(mesh.clone());
        }

        let target_faces = ((1.0 - reduction_ratio) * mesh.faces.len() as f32) as usize;
        let params = DecimateParams {
            target_face_num: Some(target_faces),
            keep_geom_boundary: self.keep_geom_boundary,
            keep_uv_boundary: self.keep_uv_boundary,
            accept_non_edge: self.accept_non_edge,
            non_edge_dist: self.non_edge_dist,
            ..Default::default()
        };

        let mut out = mesh.clone();
        decimate(&mut out, &params)?;
        Ok(out)
    }
}
