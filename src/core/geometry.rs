//! Polar-to-cartesian geometry engine.
//!
//! Builds a frozen cartesian grid (sector corner/center points plus a
//! cartesian-to-polar lookup) from one [`PolarFrame`] and reconstructs a
//! dense intensity raster with a validity mask from the angular/radial
//! samples. Two reconstruction strategies are supported: nearest-bin copy
//! and a weighted blend of the angularly closest cells of the two nearest
//! beams.

use crate::types::{PolarFrame, SonarImage, SonarMask, SonarResult, MASK_VALID};
use approx::abs_diff_eq;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Cartesian length of one range bin, in pixels
pub const BIN_LENGTH: f32 = 1.0;

/// Default neighborhood half-width used by weighted reconstruction
pub const DEFAULT_NEIGHBOR_SIZE: usize = 3;

// Keeps inverse-distance weights finite on exact cell centers.
const WEIGHT_EPSILON: f32 = 1e-3;

const BEARING_EPSILON: f32 = 1e-6;

/// Polar-to-cartesian reconstruction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Each pixel copies the intensity of its assigned polar bin
    Nearest,
    /// Each pixel blends the angularly closest cells of its two nearest beams
    Weighted,
}

/// 2D cartesian point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned rectangle in cartesian coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    /// Smallest axis-aligned rectangle covering all points
    pub fn bounding(points: &[Point2]) -> RectF {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        RectF {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// Radial and angular extent of one polar cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorLimits {
    pub start_radius: f32,
    pub final_radius: f32,
    pub start_angle: f32,
    pub final_angle: f32,
}

/// Frozen cartesian geometry derived from one frame's bin/beam layout.
///
/// Built once per geometry and reused across raster reconstructions for
/// frames sharing the same layout; only read queries after construction.
struct CartesianGrid {
    /// Sector corner points, one per (bin edge, beam edge), beam-major
    corner_points: Vec<Point2>,
    /// Sector center points, one per polar cell in flat-index order
    center_points: Vec<Point2>,
    /// Raster size as (height, width)
    cart_size: (usize, usize),
    /// Translation applied to keep all coordinates non-negative
    cart_origin: Point2,
    /// Assigned polar index per pixel, -1 where no sector covers the pixel
    cart_to_polar: Array2<i32>,
    /// True radial coordinate of each pixel, in bin units
    radius: Array2<f32>,
    /// True bearing of each pixel, in radians
    angle: Array2<f32>,
}

impl CartesianGrid {
    fn build(frame: &PolarFrame) -> CartesianGrid {
        let bin_count = frame.bin_count();
        let beam_count = frame.beam_count();
        let bearings = frame.bearings();

        // Corner lattice: one point per (bin edge, beam edge).
        let mut corner_points = Vec::with_capacity((beam_count + 1) * (bin_count + 1));
        for &theta in bearings.iter() {
            let (sin_t, cos_t) = theta.sin_cos();
            for bin_edge in 0..=bin_count {
                let r = bin_edge as f32 * BIN_LENGTH;
                corner_points.push(Point2 {
                    x: r * sin_t,
                    y: r * cos_t,
                });
            }
        }

        let bounds = RectF::bounding(&corner_points);
        let cart_origin = Point2 {
            x: -bounds.x,
            y: -bounds.y,
        };
        for p in corner_points.iter_mut() {
            p.x += cart_origin.x;
            p.y += cart_origin.y;
        }
        let width = bounds.width.ceil() as usize + 1;
        let height = bounds.height.ceil() as usize + 1;

        let mut center_points = Vec::with_capacity(frame.total_bins());
        for beam in 0..beam_count {
            let (sin_t, cos_t) = frame.beam_center(beam).sin_cos();
            for bin in 0..bin_count {
                let r = (bin as f32 + 0.5) * BIN_LENGTH;
                center_points.push(Point2 {
                    x: r * sin_t + cart_origin.x,
                    y: r * cos_t + cart_origin.y,
                });
            }
        }

        // True polar coordinates of every pixel, relative to the fan apex.
        let mut radius = Array2::<f32>::zeros((height, width));
        let mut angle = Array2::<f32>::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cart_origin.x;
                let dy = y as f32 - cart_origin.y;
                radius[[y, x]] = (dx * dx + dy * dy).sqrt();
                angle[[y, x]] = dx.atan2(dy);
            }
        }

        let mut grid = CartesianGrid {
            corner_points,
            center_points,
            cart_size: (height, width),
            cart_origin,
            cart_to_polar: Array2::from_elem((height, width), -1),
            radius,
            angle,
        };
        grid.assign_sectors(frame);

        log::debug!(
            "cartesian grid {}x{} built from {} bins x {} beams",
            width,
            height,
            bin_count,
            beam_count
        );
        grid
    }

    /// Rasterize every sector and claim the pixels it covers. A pixel
    /// contested by several sectors goes to the one whose center is
    /// closest; equal distances keep the lower polar index.
    fn assign_sectors(&mut self, frame: &PolarFrame) {
        let (height, width) = self.cart_size;
        let bearings = frame.bearings();
        let mut best_score = Array2::<f32>::from_elem((height, width), f32::INFINITY);

        for index in 0..frame.total_bins() {
            let (bin, beam) = frame.index_to_polar(index);
            let rect = self.sector_bounding_rect_inner(frame, index);

            let x0 = rect.x.floor().max(0.0) as usize;
            let y0 = rect.y.floor().max(0.0) as usize;
            let x1 = ((rect.x + rect.width).ceil() as usize).min(width - 1);
            let y1 = ((rect.y + rect.height).ceil() as usize).min(height - 1);

            let r_min = bin as f32 * BIN_LENGTH;
            let r_max = (bin + 1) as f32 * BIN_LENGTH;
            let theta_min = bearings[beam];
            let theta_max = bearings[beam + 1];
            let center_radius = (bin as f32 + 0.5) * BIN_LENGTH;
            let center_angle = frame.beam_center(beam);

            for y in y0..=y1 {
                for x in x0..=x1 {
                    let r = self.radius[[y, x]];
                    let theta = self.angle[[y, x]];
                    if r < r_min || r > r_max || theta < theta_min || theta > theta_max {
                        continue;
                    }
                    let dr = r - center_radius;
                    let da = (theta - center_angle) * r;
                    let score = dr * dr + da * da;
                    if score < best_score[[y, x]] {
                        best_score[[y, x]] = score;
                        self.cart_to_polar[[y, x]] = index as i32;
                    }
                }
            }
        }
    }

    fn corner_index(&self, bin_count: usize, bin_edge: usize, beam_edge: usize) -> usize {
        beam_edge * (bin_count + 1) + bin_edge
    }

    fn corner_point(&self, bin_count: usize, bin_edge: usize, beam_edge: usize) -> Point2 {
        self.corner_points[self.corner_index(bin_count, bin_edge, beam_edge)]
    }

    fn sector_points_inner(&self, frame: &PolarFrame, polar_index: usize) -> [Point2; 4] {
        let (bin, beam) = frame.index_to_polar(polar_index);
        let n = frame.bin_count();
        [
            self.corner_point(n, bin, beam),
            self.corner_point(n, bin, beam + 1),
            self.corner_point(n, bin + 1, beam),
            self.corner_point(n, bin + 1, beam + 1),
        ]
    }

    fn sector_bounding_rect_inner(&self, frame: &PolarFrame, polar_index: usize) -> RectF {
        RectF::bounding(&self.sector_points_inner(frame, polar_index))
    }
}

/// Geometry engine holding one frame's polar samples and the cartesian
/// raster reconstructed from them.
pub struct SonarGeometry {
    frame: PolarFrame,
    mode: InterpolationMode,
    neighbor_size: usize,
    grid: CartesianGrid,
    cart_image: SonarImage,
    cart_mask: SonarMask,
}

impl SonarGeometry {
    /// Build the cartesian grid for `frame` and reconstruct its raster.
    pub fn new(frame: PolarFrame, mode: InterpolationMode) -> Self {
        let grid = CartesianGrid::build(&frame);
        let mut geometry = Self {
            frame,
            mode,
            neighbor_size: DEFAULT_NEIGHBOR_SIZE,
            grid,
            cart_image: Array2::zeros((0, 0)),
            cart_mask: Array2::zeros((0, 0)),
        };
        geometry.reconstruct();
        geometry
    }

    /// Convenience constructor from raw bins and a start angle.
    pub fn from_start_beam(
        bins: Vec<f32>,
        start_beam: f32,
        beam_width: f32,
        bin_count: usize,
        beam_count: usize,
        mode: InterpolationMode,
    ) -> SonarResult<Self> {
        let frame = PolarFrame::from_start_beam(bins, start_beam, beam_width, bin_count, beam_count)?;
        Ok(Self::new(frame, mode))
    }

    /// Convenience constructor from raw bins and explicit beam-edge bearings.
    pub fn from_bearings(
        bins: Vec<f32>,
        bearings: Vec<f32>,
        beam_width: f32,
        bin_count: usize,
        beam_count: usize,
        mode: InterpolationMode,
    ) -> SonarResult<Self> {
        let frame = PolarFrame::from_bearings(bins, bearings, beam_width, bin_count, beam_count)?;
        Ok(Self::new(frame, mode))
    }

    /// Replace the frame. The grid is rebuilt only when the bin/beam layout
    /// changed; otherwise it is reused and only the raster is reconstructed.
    pub fn reset(&mut self, frame: PolarFrame) {
        let same_layout = self.frame.bin_count() == frame.bin_count()
            && self.frame.beam_count() == frame.beam_count()
            && abs_diff_eq!(
                self.frame.beam_width(),
                frame.beam_width(),
                epsilon = BEARING_EPSILON
            )
            && self
                .frame
                .bearings()
                .iter()
                .zip(frame.bearings())
                .all(|(a, b)| abs_diff_eq!(a, b, epsilon = BEARING_EPSILON));

        self.frame = frame;
        if !same_layout {
            log::debug!("frame layout changed, rebuilding cartesian grid");
            self.grid = CartesianGrid::build(&self.frame);
        }
        self.reconstruct();
    }

    /// Use a non-default neighborhood half-width for weighted reconstruction.
    /// Nearest-mode rasters do not depend on it, so only weighted mode
    /// reconstructs again.
    pub fn with_neighbor_size(mut self, neighbor_size: usize) -> Self {
        let neighbor_size = neighbor_size.max(1);
        if neighbor_size != self.neighbor_size {
            self.neighbor_size = neighbor_size;
            if self.mode == InterpolationMode::Weighted {
                self.reconstruct();
            }
        }
        self
    }

    fn reconstruct(&mut self) {
        let (height, width) = self.grid.cart_size;
        let mut image = Array2::<f32>::zeros((height, width));
        let mut mask = Array2::<u8>::zeros((height, width));

        for y in 0..height {
            for x in 0..width {
                let index = self.grid.cart_to_polar[[y, x]];
                if index < 0 {
                    continue;
                }
                let index = index as usize;
                let value = match self.mode {
                    InterpolationMode::Nearest => self.frame.value_at(index),
                    InterpolationMode::Weighted => self.weighted_value(
                        index,
                        self.grid.radius[[y, x]],
                        self.grid.angle[[y, x]],
                    ),
                };
                image[[y, x]] = value;
                mask[[y, x]] = MASK_VALID;
            }
        }

        self.cart_image = image;
        self.cart_mask = mask;
    }

    /// Blend the assigned cell's neighborhood: the angularly closest cell
    /// picks the primary beam, the angularly closest cell of a different
    /// beam picks the secondary one, and the radially closest cell of each
    /// beam contributes with an inverse-distance weight.
    fn weighted_value(&self, index: usize, r: f32, alpha: f32) -> f32 {
        let (indices, angles) = self.neighborhood_angles(index, self.neighbor_size);
        let primary = match self.min_angle_distance(&angles, &indices, alpha) {
            Some(i) => i,
            None => return self.frame.value_at(index),
        };
        let primary_beam = self.frame.index_to_beam(primary);
        let (v0, d0) = self.closest_in_beam(&indices, primary_beam, r, alpha);

        let (other_indices, other_angles): (Vec<usize>, Vec<f32>) = indices
            .iter()
            .zip(&angles)
            .filter(|(&i, _)| self.frame.index_to_beam(i) != primary_beam)
            .map(|(&i, &a)| (i, a))
            .unzip();
        let secondary = match self.min_angle_distance(&other_angles, &other_indices, alpha) {
            Some(i) => i,
            None => return v0,
        };
        let secondary_beam = self.frame.index_to_beam(secondary);
        let (v1, d1) = self.closest_in_beam(&indices, secondary_beam, r, alpha);

        let w0 = 1.0 / (d0 + WEIGHT_EPSILON);
        let w1 = 1.0 / (d1 + WEIGHT_EPSILON);
        (v0 * w0 + v1 * w1) / (w0 + w1)
    }

    /// Radially closest candidate cell belonging to `beam`, with its
    /// combined radial/arc distance to the query point.
    fn closest_in_beam(&self, indices: &[usize], beam: usize, r: f32, alpha: f32) -> (f32, f32) {
        let da = (alpha - self.frame.beam_center(beam)) * r;
        let mut best_value = 0.0;
        let mut best_distance = f32::INFINITY;
        for &i in indices {
            if self.frame.index_to_beam(i) != beam {
                continue;
            }
            let bin = self.frame.index_to_bin(i);
            let dr = r - (bin as f32 + 0.5) * BIN_LENGTH;
            let distance = (dr * dr + da * da).sqrt();
            if distance < best_distance {
                best_distance = distance;
                best_value = self.frame.value_at(i);
            }
        }
        (best_value, best_distance)
    }

    /// Polar cells in the `(2n+1)²` square around `polar_index`, clipped to
    /// the bin/beam grid. No wraparound across the angular seam.
    pub fn neighborhood(&self, polar_index: usize, neighbor_size: usize) -> Vec<usize> {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        let bin_count = self.frame.bin_count();
        let beam_count = self.frame.beam_count();
        let n = neighbor_size;

        let beam_lo = beam.saturating_sub(n);
        let beam_hi = (beam + n).min(beam_count - 1);
        let bin_lo = bin.saturating_sub(n);
        let bin_hi = (bin + n).min(bin_count - 1);

        let mut indices = Vec::with_capacity((2 * n + 1) * (2 * n + 1));
        for b in beam_lo..=beam_hi {
            for k in bin_lo..=bin_hi {
                indices.push(self.frame.index_at(b, k));
            }
        }
        indices
    }

    /// Neighborhood indices paired with each cell's center bearing.
    pub fn neighborhood_angles(
        &self,
        polar_index: usize,
        neighbor_size: usize,
    ) -> (Vec<usize>, Vec<f32>) {
        let indices = self.neighborhood(polar_index, neighbor_size);
        let angles = indices
            .iter()
            .map(|&i| self.frame.beam_center(self.frame.index_to_beam(i)))
            .collect();
        (indices, angles)
    }

    /// Candidate whose bearing is angularly closest to `alpha`. `angles`
    /// and `indices` run parallel; ties keep the earliest candidate.
    pub fn min_angle_distance(
        &self,
        angles: &[f32],
        indices: &[usize],
        alpha: f32,
    ) -> Option<usize> {
        debug_assert_eq!(angles.len(), indices.len());
        let mut best: Option<(f32, usize)> = None;
        for (&angle, &index) in angles.iter().zip(indices) {
            let distance = (angle - alpha).abs();
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, index));
            }
        }
        best.map(|(_, index)| index)
    }

    // --- frame accessors -------------------------------------------------

    pub fn frame(&self) -> &PolarFrame {
        &self.frame
    }

    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.mode
    }

    pub fn bins(&self) -> &[f32] {
        self.frame.bins()
    }

    pub fn bearings(&self) -> &[f32] {
        self.frame.bearings()
    }

    pub fn bin_count(&self) -> usize {
        self.frame.bin_count()
    }

    pub fn beam_count(&self) -> usize {
        self.frame.beam_count()
    }

    pub fn beam_width(&self) -> f32 {
        self.frame.beam_width()
    }

    pub fn beam_step(&self) -> f32 {
        self.frame.beam_step()
    }

    pub fn value_at(&self, index: usize) -> f32 {
        self.frame.value_at(index)
    }

    pub fn value_at_polar(&self, bin: usize, beam: usize) -> f32 {
        self.frame.value_at_polar(bin, beam)
    }

    pub fn values(&self, indices: &[usize]) -> Vec<f32> {
        self.frame.values(indices)
    }

    pub fn index_at(&self, beam: usize, bin: usize) -> usize {
        self.frame.index_at(beam, bin)
    }

    pub fn index_to_beam(&self, index: usize) -> usize {
        self.frame.index_to_beam(index)
    }

    pub fn index_to_bin(&self, index: usize) -> usize {
        self.frame.index_to_bin(index)
    }

    pub fn index_to_polar(&self, index: usize) -> (usize, usize) {
        self.frame.index_to_polar(index)
    }

    // --- cartesian queries -----------------------------------------------

    /// Reconstructed intensity raster
    pub fn cart_image(&self) -> &SonarImage {
        &self.cart_image
    }

    /// Validity mask of the reconstructed raster; a pixel is valid iff some
    /// polar sector maps onto it
    pub fn cart_image_mask(&self) -> &SonarMask {
        &self.cart_mask
    }

    /// Raster size as (height, width)
    pub fn cart_size(&self) -> (usize, usize) {
        self.grid.cart_size
    }

    /// Translation that maps the fan apex into raster coordinates
    pub fn cart_origin(&self) -> Point2 {
        self.grid.cart_origin
    }

    /// Corner point at the given bin/beam edges
    pub fn cart_point(&self, bin: usize, beam: usize) -> Point2 {
        self.grid.corner_point(self.frame.bin_count(), bin, beam)
    }

    /// Center point of the polar cell at `polar_index`
    pub fn cart_center_point(&self, polar_index: usize) -> Point2 {
        self.grid.center_points[polar_index]
    }

    pub fn cart_center_point_at(&self, bin: usize, beam: usize) -> Point2 {
        self.cart_center_point(self.frame.index_at(beam, bin))
    }

    /// Polar index assigned to the pixel, if any sector covers it
    pub fn polar_index_at_pixel(&self, x: usize, y: usize) -> Option<usize> {
        let index = self.grid.cart_to_polar[[y, x]];
        (index >= 0).then(|| index as usize)
    }

    pub fn sector_top_left(&self, polar_index: usize) -> Point2 {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        self.cart_point(bin, beam)
    }

    pub fn sector_top_right(&self, polar_index: usize) -> Point2 {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        self.cart_point(bin, beam + 1)
    }

    pub fn sector_bottom_left(&self, polar_index: usize) -> Point2 {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        self.cart_point(bin + 1, beam)
    }

    pub fn sector_bottom_right(&self, polar_index: usize) -> Point2 {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        self.cart_point(bin + 1, beam + 1)
    }

    /// The four cartesian corner points of a polar cell
    pub fn sector_points(&self, polar_index: usize) -> [Point2; 4] {
        self.grid.sector_points_inner(&self.frame, polar_index)
    }

    /// Radial/angular bounds of a polar cell
    pub fn polar_limits(&self, polar_index: usize) -> SectorLimits {
        let (bin, beam) = self.frame.index_to_polar(polar_index);
        SectorLimits {
            start_radius: bin as f32 * BIN_LENGTH,
            final_radius: (bin + 1) as f32 * BIN_LENGTH,
            start_angle: self.frame.bearing_at(beam),
            final_angle: self.frame.bearing_at(beam + 1),
        }
    }

    /// Axis-aligned box of the four corners spanning two bin edges and two
    /// beam edges
    pub fn cart_bounding_rect(
        &self,
        bin0: usize,
        beam0: usize,
        bin1: usize,
        beam1: usize,
    ) -> RectF {
        RectF::bounding(&[
            self.cart_point(bin0, beam0),
            self.cart_point(bin1, beam0),
            self.cart_point(bin0, beam1),
            self.cart_point(bin1, beam1),
        ])
    }

    /// Axis-aligned box of one polar cell's corners
    pub fn sector_bounding_rect(&self, polar_index: usize) -> RectF {
        self.grid.sector_bounding_rect_inner(&self.frame, polar_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn uniform_geometry(
        bin_count: usize,
        beam_count: usize,
        value: f32,
        mode: InterpolationMode,
    ) -> SonarGeometry {
        let bins = vec![value; bin_count * beam_count];
        SonarGeometry::from_start_beam(bins, -0.3, 0.6, bin_count, beam_count, mode).unwrap()
    }

    #[test]
    fn test_rejects_zero_size_frame() {
        assert!(
            SonarGeometry::from_start_beam(vec![], -0.3, 0.6, 0, 8, InterpolationMode::Nearest)
                .is_err()
        );
        assert!(
            SonarGeometry::from_start_beam(vec![], -0.3, 0.6, 8, 0, InterpolationMode::Nearest)
                .is_err()
        );
    }

    #[test]
    fn test_corner_points_lie_on_bin_radii() {
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        let origin = geometry.cart_origin();
        for beam_edge in 0..=8 {
            for bin_edge in 0..=16 {
                let p = geometry.cart_point(bin_edge, beam_edge);
                let r = ((p.x - origin.x).powi(2) + (p.y - origin.y).powi(2)).sqrt();
                assert_abs_diff_eq!(r, bin_edge as f32 * BIN_LENGTH, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_center_point_between_sector_corners() {
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        let index = geometry.index_at(3, 10);
        let rect = geometry.sector_bounding_rect(index);
        let center = geometry.cart_center_point(index);
        assert!(center.x >= rect.x && center.x <= rect.x + rect.width);
        assert!(center.y >= rect.y && center.y <= rect.y + rect.height);
    }

    #[test]
    fn test_sector_points_match_corner_queries() {
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        let index = geometry.index_at(5, 7);
        let points = geometry.sector_points(index);
        assert_eq!(points[0], geometry.sector_top_left(index));
        assert_eq!(points[1], geometry.sector_top_right(index));
        assert_eq!(points[2], geometry.sector_bottom_left(index));
        assert_eq!(points[3], geometry.sector_bottom_right(index));
    }

    #[test]
    fn test_polar_limits() {
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        let index = geometry.index_at(2, 4);
        let limits = geometry.polar_limits(index);
        assert_abs_diff_eq!(limits.start_radius, 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(limits.final_radius, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(limits.start_angle, geometry.bearings()[2], epsilon = 1e-6);
        assert_abs_diff_eq!(limits.final_angle, geometry.bearings()[3], epsilon = 1e-6);
    }

    #[test]
    fn test_neighborhood_clips_at_grid_edges() {
        let geometry = uniform_geometry(8, 4, 1.0, InterpolationMode::Nearest);

        // corner cell: only the forward half of the window exists
        let corner = geometry.index_at(0, 0);
        let neighbors = geometry.neighborhood(corner, 3);
        assert_eq!(neighbors.len(), 4 * 4);
        assert!(neighbors.iter().all(|&i| i < geometry.frame().total_bins()));

        // interior cell of a grid large enough for the full window
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        let interior = geometry.index_at(4, 8);
        assert_eq!(geometry.neighborhood(interior, 3).len(), 7 * 7);
    }

    #[test]
    fn test_min_angle_distance_tie_breaks_earliest() {
        let geometry = uniform_geometry(8, 4, 1.0, InterpolationMode::Nearest);
        let angles = [0.2, 0.1, 0.3, 0.1];
        let indices = [10, 11, 12, 13];
        // 0.1 appears twice at equal distance from alpha = 0.1
        assert_eq!(geometry.min_angle_distance(&angles, &indices, 0.1), Some(11));
        assert_eq!(geometry.min_angle_distance(&[], &[], 0.1), None);
    }

    #[test]
    fn test_nearest_reconstruction_copies_bin_values() {
        let bin_count = 24;
        let beam_count = 6;
        let mut bins = vec![0.0; bin_count * beam_count];
        for beam in 0..beam_count {
            for bin in 0..bin_count {
                bins[beam * bin_count + bin] = beam as f32 / beam_count as f32;
            }
        }
        let geometry = SonarGeometry::from_start_beam(
            bins,
            -0.4,
            0.8,
            bin_count,
            beam_count,
            InterpolationMode::Nearest,
        )
        .unwrap();

        let image = geometry.cart_image();
        let mask = geometry.cart_image_mask();
        let (height, width) = geometry.cart_size();
        for y in 0..height {
            for x in 0..width {
                if mask[[y, x]] == 0 {
                    assert_eq!(image[[y, x]], 0.0);
                    continue;
                }
                let index = geometry.polar_index_at_pixel(x, y).unwrap();
                assert_eq!(image[[y, x]], geometry.value_at(index));
            }
        }
    }

    #[test]
    fn test_neighbor_size_only_affects_weighted_mode() {
        let bin_count = 24;
        let beam_count = 6;
        let bins: Vec<f32> = (0..bin_count * beam_count)
            .map(|i| (i % 5) as f32 / 5.0)
            .collect();

        let nearest = SonarGeometry::from_start_beam(
            bins.clone(),
            -0.4,
            0.8,
            bin_count,
            beam_count,
            InterpolationMode::Nearest,
        )
        .unwrap();
        let image_before = nearest.cart_image().clone();
        let nearest = nearest.with_neighbor_size(5);
        assert_eq!(nearest.cart_image(), &image_before);

        // weighted rasters do respond to the window size
        let weighted = SonarGeometry::from_start_beam(
            bins,
            -0.4,
            0.8,
            bin_count,
            beam_count,
            InterpolationMode::Weighted,
        )
        .unwrap()
        .with_neighbor_size(1);
        let mask = weighted.cart_image_mask();
        let image = weighted.cart_image();
        for ((y, x), &m) in mask.indexed_iter() {
            if m != 0 {
                assert!((0.0..=1.0).contains(&image[[y, x]]));
            }
        }
    }

    #[test]
    fn test_reset_reuses_grid_for_same_layout() {
        let bin_count = 16;
        let beam_count = 8;
        let mut geometry = uniform_geometry(bin_count, beam_count, 0.25, InterpolationMode::Nearest);
        let size_before = geometry.cart_size();
        let origin_before = geometry.cart_origin();

        let frame = PolarFrame::from_start_beam(
            vec![0.75; bin_count * beam_count],
            -0.3,
            0.6,
            bin_count,
            beam_count,
        )
        .unwrap();
        geometry.reset(frame);

        assert_eq!(geometry.cart_size(), size_before);
        assert_eq!(geometry.cart_origin(), origin_before);
        let mask = geometry.cart_image_mask();
        let image = geometry.cart_image();
        for ((y, x), &m) in mask.indexed_iter() {
            if m != 0 {
                assert_eq!(image[[y, x]], 0.75);
            }
        }
    }

    #[test]
    fn test_reset_rebuilds_grid_for_new_layout() {
        let mut geometry = uniform_geometry(16, 8, 0.5, InterpolationMode::Nearest);
        let size_before = geometry.cart_size();

        let frame =
            PolarFrame::from_start_beam(vec![0.5; 32 * 8], -0.3, 0.6, 32, 8).unwrap();
        geometry.reset(frame);
        assert_ne!(geometry.cart_size(), size_before);
    }

    #[test]
    fn test_cart_bounding_rect_of_one_cell_matches_sector_rect() {
        let geometry = uniform_geometry(16, 8, 1.0, InterpolationMode::Nearest);
        for &(bin, beam) in &[(0usize, 0usize), (10, 3), (15, 7)] {
            let index = geometry.index_at(beam, bin);
            let from_edges = geometry.cart_bounding_rect(bin, beam, bin + 1, beam + 1);
            let from_sector = geometry.sector_bounding_rect(index);
            assert_abs_diff_eq!(from_edges.x, from_sector.x, epsilon = 1e-5);
            assert_abs_diff_eq!(from_edges.y, from_sector.y, epsilon = 1e-5);
            assert_abs_diff_eq!(from_edges.width, from_sector.width, epsilon = 1e-5);
            assert_abs_diff_eq!(from_edges.height, from_sector.height, epsilon = 1e-5);
        }
    }
}
