//! Discretized spatio-temporal receptive-field kernels.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::LgnError;

/// A spatio-temporal receptive field, quantized onto a (x, y, t) grid.
///
/// Coordinates x = 0 and y = 0 are at the centre of the spatial kernel; the
/// temporal axis starts at 0. The kernel is built once from an analytic
/// function and is immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatioTemporalKernel {
    /// Requested x-dimension size (degrees); the actual extent is `nx * dx`.
    width: f64,
    /// Requested y-dimension size (degrees).
    height: f64,
    /// Requested length of the temporal axis (ms).
    duration: f64,
    spatial_resolution: f64,
    temporal_resolution: f64,
    kernel: Array3<f64>,
    // Kernel flattened over (x, y) against time and transposed, shape
    // (nt, nx * ny). Row t dotted with a flattened frame gives the
    // contribution of that frame to the response at lag t.
    reshaped: Array2<f64>,
}

impl SpatioTemporalKernel {
    /// Quantize the analytic receptive field `func(x, y, t)` onto a grid with
    /// steps `dx`, `dy` (degrees) and `dt` (ms).
    ///
    /// If `dx` does not divide exactly into the width, the actual width is
    /// slightly larger than the nominal width (ceiling to a whole number of
    /// pixels); likewise for height and duration. The kernel is divided by
    /// `nx * ny * nt` to make its sum quasi-independent of the quantization.
    pub fn quantize<F>(
        func: F,
        width: f64,
        height: f64,
        duration: f64,
        dx: f64,
        dy: f64,
        dt: f64,
    ) -> Result<Self, LgnError>
    where
        F: Fn(f64, f64, f64) -> f64,
    {
        if dx != dy {
            return Err(LgnError::InvalidParameters(format!(
                "Spatial quantization steps must be equal (dx = {}, dy = {})",
                dx, dy
            )));
        }
        if dx <= 0.0 || dt <= 0.0 || width <= 0.0 || height <= 0.0 || duration <= 0.0 {
            return Err(LgnError::InvalidParameters(
                "Kernel extents and quantization steps must be positive".to_string(),
            ));
        }

        let nx = (width / dx).ceil() as usize;
        let ny = (height / dy).ceil() as usize;
        let nt = (duration / dt).ceil() as usize;
        let actual_width = nx as f64 * dx;
        let actual_height = ny as f64 * dy;

        // x and y are the coordinates of the centre of each pixel; t is the
        // time at the beginning of each time step.
        let xs: Vec<f64> = (0..nx)
            .map(|i| i as f64 * dx + dx / 2.0 - actual_width / 2.0)
            .collect();
        let ys: Vec<f64> = (0..ny)
            .map(|j| j as f64 * dy + dy / 2.0 - actual_height / 2.0)
            .collect();
        let ts: Vec<f64> = (0..nt).map(|k| k as f64 * dt).collect();

        let norm = (nx * ny * nt) as f64;
        let kernel =
            Array3::from_shape_fn((nx, ny, nt), |(i, j, k)| func(xs[i], ys[j], ts[k]) / norm);

        let reshaped = Self::reshape(&kernel);

        Ok(SpatioTemporalKernel {
            width,
            height,
            duration,
            spatial_resolution: dx,
            temporal_resolution: dt,
            kernel,
            reshaped,
        })
    }

    fn reshape(kernel: &Array3<f64>) -> Array2<f64> {
        let (nx, ny, nt) = kernel.dim();
        Array2::from_shape_fn((nt, nx * ny), |(t, s)| kernel[(s / ny, s % ny, t)])
    }

    /// The kernel with every weight negated (an OFF kernel from an ON one).
    pub fn negated(&self) -> Self {
        let kernel = self.kernel.mapv(|v| -v);
        let reshaped = Self::reshape(&kernel);
        SpatioTemporalKernel {
            kernel,
            reshaped,
            ..self.clone()
        }
    }

    /// Grid shape (nx, ny, nt).
    pub fn shape(&self) -> (usize, usize, usize) {
        self.kernel.dim()
    }

    /// Number of time bins of the kernel.
    pub fn duration_steps(&self) -> usize {
        self.kernel.dim().2
    }

    pub fn spatial_resolution(&self) -> f64 {
        self.spatial_resolution
    }

    pub fn temporal_resolution(&self) -> f64 {
        self.temporal_resolution
    }

    /// Requested width (degrees). The discretized extent is `nx * dx` >= this.
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn actual_width(&self) -> f64 {
        self.kernel.dim().0 as f64 * self.spatial_resolution
    }

    pub fn actual_height(&self) -> f64 {
        self.kernel.dim().1 as f64 * self.spatial_resolution
    }

    pub fn actual_duration(&self) -> f64 {
        self.kernel.dim().2 as f64 * self.temporal_resolution
    }

    pub fn kernel(&self) -> &Array3<f64> {
        &self.kernel
    }

    /// Kernel flattened over (x, y) against time and transposed; used as the
    /// per-frame convolution matrix.
    pub fn reshaped(&self) -> &Array2<f64> {
        &self.reshaped
    }

    /// Sum of all kernel weights.
    pub fn sum(&self) -> f64 {
        self.kernel.sum()
    }

    /// Sum of the kernel over the time slices strictly after `i`, i.e. over
    /// t in (i, L). Used for the steady-state response to the background
    /// before stimulus onset.
    pub fn future_sum(&self, i: usize) -> f64 {
        let nt = self.duration_steps();
        ((i + 1)..nt).map(|t| self.reshaped.row(t).sum()).sum()
    }

    /// Sum of the kernel over the time slices t in [0, L - i). Used for the
    /// steady-state response to the background after stimulus offset.
    pub fn past_sum(&self, i: usize) -> f64 {
        let nt = self.duration_steps();
        (0..nt.saturating_sub(i))
            .map(|t| self.reshaped.row(t).sum())
            .sum()
    }

    /// Mean of the absolute kernel over space, per time bin. Profile used to
    /// smooth the per-frame contrast estimate.
    pub fn mean_abs_time_profile(&self) -> Vec<f64> {
        let (nx, ny, nt) = self.kernel.dim();
        let n = (nx * ny) as f64;
        (0..nt)
            .map(|t| self.reshaped.row(t).iter().map(|v| v.abs()).sum::<f64>() / n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;

    // Centre-surround spatial profile with a biphasic time course.
    fn dog(x: f64, y: f64, t: f64) -> f64 {
        let r2 = x * x + y * y;
        ((-r2).exp() - 0.5 * (-r2 / 4.0).exp()) * (t / 20.0) * (-t / 20.0).exp()
    }

    #[test]
    fn test_quantize_shape() {
        let kernel =
            SpatioTemporalKernel::quantize(dog, 2.0, 2.0, 100.0, 0.5, 0.5, 10.0).unwrap();
        assert_eq!(kernel.shape(), (4, 4, 10));
        assert_eq!(kernel.duration_steps(), 10);
        assert_relative_eq!(kernel.actual_width(), 2.0);
        assert_relative_eq!(kernel.actual_duration(), 100.0);
    }

    #[test]
    fn test_quantize_rounds_up() {
        // 2.3 / 0.5 = 4.6 pixels, rounded up to 5; extents are integer
        // multiples of the resolution and at least the requested size.
        let kernel =
            SpatioTemporalKernel::quantize(dog, 2.3, 2.3, 95.0, 0.5, 0.5, 10.0).unwrap();
        assert_eq!(kernel.shape(), (5, 5, 10));
        assert_relative_eq!(kernel.actual_width(), 2.5);
        assert!(kernel.actual_width() >= kernel.width());
        assert_relative_eq!(kernel.actual_duration(), 100.0);
    }

    #[test]
    fn test_quantize_requires_square_pixels() {
        assert_eq!(
            SpatioTemporalKernel::quantize(dog, 2.0, 2.0, 100.0, 0.5, 0.25, 10.0),
            Err(LgnError::InvalidParameters(
                "Spatial quantization steps must be equal (dx = 0.5, dy = 0.25)".to_string()
            ))
        );
    }

    #[test]
    fn test_normalization_quantization_invariant() {
        // The kernel sum scaled back by nx*ny*nt approximates the Riemann sum
        // of the analytic function regardless of the quantization step.
        let coarse =
            SpatioTemporalKernel::quantize(dog, 4.0, 4.0, 100.0, 0.5, 0.5, 10.0).unwrap();
        let fine =
            SpatioTemporalKernel::quantize(dog, 4.0, 4.0, 100.0, 0.25, 0.25, 5.0).unwrap();
        assert_abs_diff_eq!(coarse.sum(), fine.sum(), epsilon = 5e-3);
    }

    #[test]
    fn test_negated() {
        let on = SpatioTemporalKernel::quantize(dog, 2.0, 2.0, 100.0, 0.5, 0.5, 10.0).unwrap();
        let off = on.negated();
        assert_relative_eq!(off.sum(), -on.sum());
        assert_relative_eq!(off.reshaped()[(3, 5)], -on.reshaped()[(3, 5)]);
    }

    #[test]
    fn test_partial_sums() {
        let kernel =
            SpatioTemporalKernel::quantize(dog, 2.0, 2.0, 100.0, 0.5, 0.5, 10.0).unwrap();
        let nt = kernel.duration_steps();

        // future_sum(0) + slice 0 = total; past_sum(0) = total.
        let slice0: f64 = kernel.reshaped().row(0).sum();
        assert_relative_eq!(kernel.future_sum(0) + slice0, kernel.sum(), epsilon = 1e-12);
        assert_relative_eq!(kernel.past_sum(0), kernel.sum(), epsilon = 1e-12);
        assert_relative_eq!(kernel.future_sum(nt - 1), 0.0);
    }

    #[test]
    fn test_reshaped_layout() {
        let kernel =
            SpatioTemporalKernel::quantize(dog, 2.0, 2.0, 100.0, 0.5, 0.5, 10.0).unwrap();
        let (_, ny, _) = kernel.shape();
        assert_eq!(kernel.reshaped().dim(), (10, 16));
        // Row-major flattening of the spatial axes.
        assert_relative_eq!(kernel.reshaped()[(3, 2 * ny + 1)], kernel.kernel()[(2, 1, 3)]);
    }
}
