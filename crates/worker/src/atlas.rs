//! Lightmap UV atlas generation.
//!
//! Every mesh is split into charts (connected groups of triangles sharing
//! vertices). Each chart is projected onto the plane facing its dominant
//! normal axis, and the chart rectangles are shelf-packed into a square
//! atlas. The texel scale shrinks until everything fits. Meshes are then
//! rebuilt with their vertices grouped chart by chart and a `uv2`
//! attribute pointing into the atlas. Vertex and index counts never change.

use std::collections::HashMap;

use lightbake_core::bake::{
    BakeParams, DEFAULT_MARGIN, DEFAULT_RESOLUTION, MAX_MARGIN, MAX_RESOLUTION, MIN_RESOLUTION,
};
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;
use crate::geometry::{Attribute, BufferData, MeshBuffers, POSITION, UV, UV2};

/// Fraction of the atlas the initial texel scale aims to cover.
const FILL_RATIO: f64 = 0.5;
/// Scale factor applied after each failed packing attempt.
const SHRINK: f64 = 0.9;
const MAX_PACK_ATTEMPTS: usize = 64;

/// The ordered phases of [`generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasStage {
    AddingMeshes,
    ComputingCharts,
    PackingCharts,
    RebuildingMeshes,
}

impl AtlasStage {
    pub const ALL: [AtlasStage; 4] = [
        Self::AddingMeshes,
        Self::ComputingCharts,
        Self::PackingCharts,
        Self::RebuildingMeshes,
    ];

    /// Stage name as reported in progress messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::AddingMeshes => "Atlas: Adding meshes",
            Self::ComputingCharts => "Atlas: Computing charts",
            Self::PackingCharts => "Atlas: Packing charts",
            Self::RebuildingMeshes => "Atlas: Rebuilding meshes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasParams {
    /// Atlas width and height in texels.
    pub resolution: u32,
    /// Free texels kept around every chart.
    pub margin: u32,
}

impl Default for AtlasParams {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            margin: DEFAULT_MARGIN,
        }
    }
}

impl AtlasParams {
    /// Same ranges as the bake parameters the atlas is derived from.
    pub fn validate(&self) -> Result<(), AtlasError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution)
            || !self.resolution.is_power_of_two()
        {
            return Err(AtlasError::InvalidParams(format!(
                "resolution must be a power of two between {MIN_RESOLUTION} and {MAX_RESOLUTION}, got {}",
                self.resolution
            )));
        }
        if self.margin > MAX_MARGIN {
            return Err(AtlasError::InvalidParams(format!(
                "margin must be at most {MAX_MARGIN}, got {}",
                self.margin
            )));
        }
        Ok(())
    }
}

impl From<&BakeParams> for AtlasParams {
    fn from(params: &BakeParams) -> Self {
        Self {
            resolution: params.resolution,
            margin: params.margin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasSummary {
    pub charts: usize,
    pub texels_per_unit: f64,
}

/// Progress callback: `(stage, fraction)`. Returning `false` aborts.
pub type ProgressFn<'a> = dyn FnMut(AtlasStage, f64) -> bool + 'a;

struct Chart {
    mesh: usize,
    vertices: Vec<u32>,
    /// Projected vertex coordinates relative to the chart's lower corner.
    coords: Vec<[f32; 2]>,
    size: [f32; 2],
}

#[derive(Default)]
struct ChartBuilder {
    vertices: Vec<u32>,
    normal: [f32; 3],
}

struct Layout {
    scale: f64,
    origins: Vec<[u32; 2]>,
}

/// Generate lightmap coordinates for `meshes` in place.
///
/// The meshes are only written once every stage has completed, so on any
/// error they are left untouched.
pub fn generate(
    meshes: &mut [MeshBuffers],
    params: &AtlasParams,
    progress: &mut ProgressFn<'_>,
) -> Result<AtlasSummary, AtlasError> {
    params.validate()?;

    let mut report = |stage: AtlasStage, value: f64| {
        if progress(stage, value) {
            Ok(())
        } else {
            Err(AtlasError::Aborted)
        }
    };
    let total = meshes.len().max(1) as f64;

    let mut positions = Vec::with_capacity(meshes.len());
    for (i, mesh) in meshes.iter().enumerate() {
        report(AtlasStage::AddingMeshes, i as f64 / total)?;
        positions.push(validate(i, mesh)?);
    }
    report(AtlasStage::AddingMeshes, 1.0)?;

    let mut charts = Vec::new();
    for (i, (mesh, vertex_positions)) in meshes.iter().zip(&positions).enumerate() {
        report(AtlasStage::ComputingCharts, i as f64 / total)?;
        charts.extend(compute_charts(i, &mesh.index, vertex_positions));
    }
    report(AtlasStage::ComputingCharts, 1.0)?;

    report(AtlasStage::PackingCharts, 0.0)?;
    let layout = pack(&charts, params, &mut |value| {
        report(AtlasStage::PackingCharts, value)
    })?;

    let mut charts_by_mesh = vec![Vec::new(); meshes.len()];
    for (c, chart) in charts.iter().enumerate() {
        charts_by_mesh[chart.mesh].push(c);
    }

    let side = f64::from(params.resolution);
    let margin = f64::from(params.margin);
    let mut plans = Vec::with_capacity(meshes.len());
    for (i, vertex_positions) in positions.iter().enumerate() {
        report(AtlasStage::RebuildingMeshes, i as f64 / total)?;

        let vertex_count = vertex_positions.len();
        let mut order = Vec::with_capacity(vertex_count);
        let mut uv2 = Vec::with_capacity(vertex_count * 2);
        for &c in &charts_by_mesh[i] {
            let chart = &charts[c];
            let [x, y] = layout.origins[c];
            for (&vertex, coord) in chart.vertices.iter().zip(&chart.coords) {
                order.push(vertex);
                uv2.push(((f64::from(x) + margin + f64::from(coord[0]) * layout.scale) / side) as f32);
                uv2.push(((f64::from(y) + margin + f64::from(coord[1]) * layout.scale) / side) as f32);
            }
        }

        // Vertices no triangle references keep their data at the end.
        let mut placed = vec![false; vertex_count];
        for &vertex in &order {
            placed[vertex as usize] = true;
        }
        for (vertex, _) in placed.iter().enumerate().filter(|(_, p)| !**p) {
            order.push(vertex as u32);
            uv2.extend([0.0, 0.0]);
        }

        plans.push((order, uv2));
    }
    report(AtlasStage::RebuildingMeshes, 1.0)?;

    for (mesh, (order, uv2)) in meshes.iter_mut().zip(plans) {
        rebuild(mesh, &order, uv2);
    }

    Ok(AtlasSummary {
        charts: charts.len(),
        texels_per_unit: layout.scale,
    })
}

fn validate(mesh_index: usize, mesh: &MeshBuffers) -> Result<Vec<[f32; 3]>, AtlasError> {
    let invalid = |reason: String| AtlasError::invalid(mesh_index, reason);

    let position = mesh
        .attribute(POSITION)
        .ok_or_else(|| invalid("missing position attribute".into()))?;
    if position.item_size != 3 {
        return Err(invalid(format!(
            "position has {} components, expected 3",
            position.item_size
        )));
    }
    let data = position
        .data
        .as_f32()
        .ok_or_else(|| invalid("position must be f32".into()))?;
    let count = position
        .count()
        .ok_or_else(|| invalid("position length is not a multiple of 3".into()))?;
    if u32::try_from(count).is_err() {
        return Err(invalid(format!("{count} vertices exceed the index range")));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(invalid("position contains non-finite values".into()));
    }

    if mesh.index.len() % 3 != 0 {
        return Err(invalid(format!(
            "index length {} is not a multiple of 3",
            mesh.index.len()
        )));
    }
    if let Some(bad) = mesh.index.iter().find(|&&i| i as usize >= count) {
        return Err(invalid(format!(
            "index {bad} out of range for {count} vertices"
        )));
    }

    for (name, attribute) in &mesh.attributes {
        if attribute.count() != Some(count) {
            return Err(invalid(format!(
                "attribute {name} does not hold {count} items of size {}",
                attribute.item_size
            )));
        }
    }

    Ok(data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn compute_charts(mesh: usize, index: &[u32], positions: &[[f32; 3]]) -> Vec<Chart> {
    let mut sets = DisjointSet::new(positions.len());
    for tri in index.chunks_exact(3) {
        sets.union(tri[0] as usize, tri[1] as usize);
        sets.union(tri[0] as usize, tri[2] as usize);
    }

    let mut slot_of_root = HashMap::new();
    let mut builders: Vec<ChartBuilder> = Vec::new();
    let mut seen = vec![false; positions.len()];
    for tri in index.chunks_exact(3) {
        let root = sets.find(tri[0] as usize);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            builders.push(ChartBuilder::default());
            builders.len() - 1
        });
        let builder = &mut builders[slot];

        let normal = face_normal(positions, tri);
        for (acc, n) in builder.normal.iter_mut().zip(normal) {
            *acc += n;
        }
        for &vertex in tri {
            if !seen[vertex as usize] {
                seen[vertex as usize] = true;
                builder.vertices.push(vertex);
            }
        }
    }

    builders
        .into_iter()
        .map(|builder| project(mesh, builder, positions))
        .collect()
}

fn project(mesh: usize, builder: ChartBuilder, positions: &[[f32; 3]]) -> Chart {
    let (a, b) = match dominant_axis(builder.normal) {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let projected: Vec<[f32; 2]> = builder
        .vertices
        .iter()
        .map(|&v| {
            let p = positions[v as usize];
            [p[a], p[b]]
        })
        .collect();

    let mut min = [f32::INFINITY; 2];
    let mut max = [f32::NEG_INFINITY; 2];
    for p in &projected {
        for k in 0..2 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
    }

    Chart {
        mesh,
        coords: projected
            .iter()
            .map(|p| [p[0] - min[0], p[1] - min[1]])
            .collect(),
        size: [max[0] - min[0], max[1] - min[1]],
        vertices: builder.vertices,
    }
}

fn face_normal(positions: &[[f32; 3]], tri: &[u32]) -> [f32; 3] {
    let p0 = positions[tri[0] as usize];
    let p1 = positions[tri[1] as usize];
    let p2 = positions[tri[2] as usize];
    let u = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
    let v = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

/// Index of the largest normal component, preferring z then y on ties.
fn dominant_axis(normal: [f32; 3]) -> usize {
    let [x, y, z] = normal.map(f32::abs);
    if z >= x && z >= y {
        2
    } else if y >= x {
        1
    } else {
        0
    }
}

fn pack(
    charts: &[Chart],
    params: &AtlasParams,
    progress: &mut dyn FnMut(f64) -> Result<(), AtlasError>,
) -> Result<Layout, AtlasError> {
    let resolution = params.resolution;
    let padding = params.margin.saturating_mul(2);
    let failed = || AtlasError::PackingFailed {
        charts: charts.len(),
        resolution,
    };

    if charts.is_empty() {
        progress(1.0)?;
        return Ok(Layout {
            scale: 1.0,
            origins: Vec::new(),
        });
    }
    if padding >= resolution {
        return Err(failed());
    }

    let side = f64::from(resolution);
    let area: f64 = charts
        .iter()
        .map(|c| f64::from(c.size[0]) * f64::from(c.size[1]))
        .sum();
    let longest = charts
        .iter()
        .map(|c| c.size[0].max(c.size[1]))
        .fold(0.0f32, f32::max);

    let mut scale = if area > 0.0 {
        (side * side * FILL_RATIO / area).sqrt()
    } else {
        side
    };
    if longest > 0.0 {
        scale = scale.min((side - f64::from(padding) - 1.0) / f64::from(longest));
    }

    let smallest = [1 + padding; 2];
    for attempt in 0..MAX_PACK_ATTEMPTS {
        let sizes: Vec<[u32; 2]> = charts
            .iter()
            .map(|c| {
                [
                    texels(c.size[0], scale).saturating_add(padding),
                    texels(c.size[1], scale).saturating_add(padding),
                ]
            })
            .collect();

        if let Some(origins) = shelf_pack(&sizes, resolution) {
            progress(1.0)?;
            return Ok(Layout { scale, origins });
        }
        if sizes.iter().all(|s| *s == smallest) {
            break;
        }
        scale *= SHRINK;
        progress((attempt + 1) as f64 / MAX_PACK_ATTEMPTS as f64)?;
    }
    Err(failed())
}

fn texels(extent: f32, scale: f64) -> u32 {
    ((f64::from(extent) * scale).ceil() as u32).max(1)
}

/// Place rectangles on horizontal shelves, tallest first.
///
/// Returns the lower-left corner of each rectangle in input order, or
/// `None` when they do not fit in a `side x side` square.
fn shelf_pack(sizes: &[[u32; 2]], side: u32) -> Option<Vec<[u32; 2]>> {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        sizes[b][1]
            .cmp(&sizes[a][1])
            .then(sizes[b][0].cmp(&sizes[a][0]))
    });

    // Cursors stay <= side, so the sums below fit in u64.
    let side = u64::from(side);
    let mut origins = vec![[0, 0]; sizes.len()];
    let (mut x, mut y, mut shelf_height) = (0u64, 0u64, 0u64);
    for i in order {
        let [w, h] = sizes[i].map(u64::from);
        if w > side {
            return None;
        }
        if x + w > side {
            y += shelf_height;
            x = 0;
            shelf_height = 0;
        }
        if y + h > side {
            return None;
        }
        origins[i] = [u32::try_from(x).ok()?, u32::try_from(y).ok()?];
        x += w;
        shelf_height = shelf_height.max(h);
    }
    Some(origins)
}

/// Reorder `mesh` so new vertex `i` is old vertex `order[i]`, then attach
/// the lightmap coordinates.
fn rebuild(mesh: &mut MeshBuffers, order: &[u32], uv2: Vec<f32>) {
    let mut remap = vec![0u32; order.len()];
    for (new, &old) in order.iter().enumerate() {
        remap[old as usize] = new as u32;
    }
    for index in &mut mesh.index {
        *index = remap[*index as usize];
    }
    for attribute in mesh.attributes.values_mut() {
        attribute.data = attribute.data.gather(attribute.item_size, order);
    }

    let uv2 = Attribute::new(2, BufferData::F32(uv2));
    if !mesh.attributes.contains_key(UV) {
        mesh.attributes.insert(UV.to_string(), uv2.clone());
    }
    mesh.attributes.insert(UV2.to_string(), uv2);
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
