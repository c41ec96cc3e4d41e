use ndarray::{Array2, Array3};

/// Real-valued sonar intensity data
pub type SonarReal = f32;

/// 2D intensity raster (rows x columns), values conventionally in [0, 1]
pub type SonarImage = Array2<SonarReal>;

/// 3-channel color raster (rows x columns x channel)
pub type SonarColorImage = Array3<SonarReal>;

/// Per-pixel validity mask, 0 = invalid
pub type SonarMask = Array2<u8>;

/// Mask value marking a valid pixel
pub const MASK_VALID: u8 = 255;

/// One sonar ping: bin intensities organized beam-major plus the beam-edge
/// bearings that bound each beam.
///
/// `bins` holds `bin_count * beam_count` samples at flat index
/// `beam * bin_count + bin`. `bearings` holds `beam_count + 1` strictly
/// increasing edge angles in radians, so beam `b` sweeps
/// `[bearings[b], bearings[b + 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarFrame {
    bins: Vec<f32>,
    bearings: Vec<f32>,
    bin_count: usize,
    beam_count: usize,
    beam_width: f32,
}

impl PolarFrame {
    /// Create a frame with bearings derived from a start angle: `beam_count + 1`
    /// evenly spaced edge angles over `[start_beam, start_beam + beam_width]`.
    pub fn from_start_beam(
        bins: Vec<f32>,
        start_beam: f32,
        beam_width: f32,
        bin_count: usize,
        beam_count: usize,
    ) -> SonarResult<Self> {
        if beam_count == 0 {
            return Err(SonarError::InvalidFrame(
                "frame must have at least one beam".to_string(),
            ));
        }
        let bearings = (0..=beam_count)
            .map(|i| start_beam + beam_width * i as f32 / beam_count as f32)
            .collect();
        Self::from_bearings(bins, bearings, beam_width, bin_count, beam_count)
    }

    /// Create a frame from an explicit bearing sequence (beam-edge angles).
    pub fn from_bearings(
        bins: Vec<f32>,
        bearings: Vec<f32>,
        beam_width: f32,
        bin_count: usize,
        beam_count: usize,
    ) -> SonarResult<Self> {
        if bin_count == 0 || beam_count == 0 {
            return Err(SonarError::InvalidFrame(format!(
                "frame must be non-empty, got {} bins x {} beams",
                bin_count, beam_count
            )));
        }
        if bins.len() != bin_count * beam_count {
            return Err(SonarError::InvalidFrame(format!(
                "expected {} samples ({} bins x {} beams), got {}",
                bin_count * beam_count,
                bin_count,
                beam_count,
                bins.len()
            )));
        }
        if bearings.len() != beam_count + 1 {
            return Err(SonarError::InvalidFrame(format!(
                "expected {} beam-edge bearings for {} beams, got {}",
                beam_count + 1,
                beam_count,
                bearings.len()
            )));
        }
        if !bearings.windows(2).all(|w| w[1] > w[0]) {
            return Err(SonarError::InvalidFrame(
                "bearings must be strictly increasing".to_string(),
            ));
        }
        if !(beam_width > 0.0) {
            return Err(SonarError::InvalidFrame(format!(
                "beam width must be positive, got {}",
                beam_width
            )));
        }
        Ok(Self {
            bins,
            bearings,
            bin_count,
            beam_count,
            beam_width,
        })
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Beam-edge angles, length `beam_count + 1`
    pub fn bearings(&self) -> &[f32] {
        &self.bearings
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn beam_count(&self) -> usize {
        self.beam_count
    }

    pub fn beam_width(&self) -> f32 {
        self.beam_width
    }

    /// Angular width of a single beam
    pub fn beam_step(&self) -> f32 {
        self.beam_width / self.beam_count as f32
    }

    /// Total number of polar cells
    pub fn total_bins(&self) -> usize {
        self.bin_count * self.beam_count
    }

    /// Edge bearing of beam `beam` (its lower angular bound)
    pub fn bearing_at(&self, beam: usize) -> f32 {
        self.bearings[beam]
    }

    /// Center bearing of beam `beam`
    pub fn beam_center(&self, beam: usize) -> f32 {
        0.5 * (self.bearings[beam] + self.bearings[beam + 1])
    }

    pub fn value_at(&self, index: usize) -> f32 {
        self.bins[index]
    }

    pub fn value_at_polar(&self, bin: usize, beam: usize) -> f32 {
        self.bins[self.index_at(beam, bin)]
    }

    /// Gather intensities at the given flat indices
    pub fn values(&self, indices: &[usize]) -> Vec<f32> {
        indices.iter().map(|&i| self.bins[i]).collect()
    }

    pub fn index_at(&self, beam: usize, bin: usize) -> usize {
        beam * self.bin_count + bin
    }

    pub fn index_to_beam(&self, index: usize) -> usize {
        index / self.bin_count
    }

    pub fn index_to_bin(&self, index: usize) -> usize {
        index % self.bin_count
    }

    /// Split a flat index into its (bin, beam) pair
    pub fn index_to_polar(&self, index: usize) -> (usize, usize) {
        (self.index_to_bin(index), self.index_to_beam(index))
    }
}

/// Error types for sonar processing
#[derive(Debug, thiserror::Error)]
pub enum SonarError {
    #[error("invalid frame geometry: {0}")]
    InvalidFrame(String),

    #[error("filter precondition failed: {0}")]
    FilterInput(String),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for sonar operations
pub type SonarResult<T> = Result<T, SonarError>;
