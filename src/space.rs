//! The visual-space collaborator: a source of 2D luminance frames that the
//! retina pipeline samples receptive-field patches from.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A rectangular region of visual space, given by its centre and size in
/// degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualRegion {
    pub location_x: f64,
    pub location_y: f64,
    pub size_x: f64,
    pub size_y: f64,
}

/// Provider of stimulus frames. Frames advance in steps of `update_interval`
/// milliseconds; between updates the luminance field is constant.
pub trait VisualSpace: Sync {
    /// The frame duration (ms).
    fn update_interval(&self) -> f64;

    /// The luminance of the background the stimulus is embedded in (cd/m²).
    fn background_luminance(&self) -> f64;

    /// Set the total presentation duration (ms).
    fn set_duration(&mut self, duration: f64);

    /// Advance to the next frame; returns the elapsed time (ms) at the end of
    /// the new frame.
    fn update(&mut self) -> f64;

    /// The luminance values of the current frame over `region`, sampled on a
    /// grid of `pixel_size` degrees. The returned array has shape
    /// `(ceil(size_x / pixel_size), ceil(size_y / pixel_size))`; locations
    /// outside the stimulus field read as background luminance.
    fn view(&self, region: &VisualRegion, pixel_size: f64) -> Array2<f64>;
}

/// Pixel-grid geometry shared by the concrete visual spaces.
fn patch_axes(region: &VisualRegion, pixel_size: f64) -> (Vec<f64>, Vec<f64>) {
    let nx = (region.size_x / pixel_size).ceil() as usize;
    let ny = (region.size_y / pixel_size).ceil() as usize;
    let xs = (0..nx)
        .map(|i| region.location_x - region.size_x / 2.0 + (i as f64 + 0.5) * pixel_size)
        .collect();
    let ys = (0..ny)
        .map(|j| region.location_y - region.size_y / 2.0 + (j as f64 + 0.5) * pixel_size)
        .collect();
    (xs, ys)
}

/// A blank visual space: every frame is the background luminance everywhere.
#[derive(Debug, Clone)]
pub struct UniformSpace {
    background_luminance: f64,
    update_interval: f64,
    duration: f64,
    time: f64,
}

impl UniformSpace {
    pub fn new(background_luminance: f64, update_interval: f64) -> Self {
        UniformSpace {
            background_luminance,
            update_interval,
            duration: 0.0,
            time: 0.0,
        }
    }

    /// The currently configured presentation duration (ms).
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl VisualSpace for UniformSpace {
    fn update_interval(&self) -> f64 {
        self.update_interval
    }

    fn background_luminance(&self) -> f64 {
        self.background_luminance
    }

    fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
        self.time = 0.0;
    }

    fn update(&mut self) -> f64 {
        self.time += self.update_interval;
        self.time
    }

    fn view(&self, region: &VisualRegion, pixel_size: f64) -> Array2<f64> {
        let (xs, ys) = patch_axes(region, pixel_size);
        Array2::from_elem((xs.len(), ys.len()), self.background_luminance)
    }
}

/// A visual space backed by a sequence of full-field luminance frames,
/// covering a rectangle of `field_size_x` by `field_size_y` degrees centred
/// at the origin with square pixels of `pixel_size` degrees. The sequence is
/// held past its end: once exhausted, the last frame stays on.
#[derive(Debug, Clone)]
pub struct ImageSequenceSpace {
    frames: Vec<Array2<f64>>,
    field_size_x: f64,
    field_size_y: f64,
    pixel_size: f64,
    background_luminance: f64,
    update_interval: f64,
    duration: f64,
    time: f64,
    current: usize,
}

impl ImageSequenceSpace {
    pub fn new(
        frames: Vec<Array2<f64>>,
        field_size_x: f64,
        field_size_y: f64,
        pixel_size: f64,
        background_luminance: f64,
        update_interval: f64,
    ) -> Result<Self, crate::error::LgnError> {
        if frames.is_empty() {
            return Err(crate::error::LgnError::InvalidParameters(
                "Image sequence must contain at least one frame".to_string(),
            ));
        }
        let expected = (
            (field_size_x / pixel_size).ceil() as usize,
            (field_size_y / pixel_size).ceil() as usize,
        );
        for frame in &frames {
            if frame.dim() != expected {
                return Err(crate::error::LgnError::InvalidParameters(format!(
                    "Frame shape {:?} does not match field shape {:?}",
                    frame.dim(),
                    expected
                )));
            }
        }

        Ok(ImageSequenceSpace {
            frames,
            field_size_x,
            field_size_y,
            pixel_size,
            background_luminance,
            update_interval,
            duration: 0.0,
            time: 0.0,
            current: 0,
        })
    }

    /// The currently configured presentation duration (ms).
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl VisualSpace for ImageSequenceSpace {
    fn update_interval(&self) -> f64 {
        self.update_interval
    }

    fn background_luminance(&self) -> f64 {
        self.background_luminance
    }

    fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
        self.time = 0.0;
        self.current = 0;
    }

    fn update(&mut self) -> f64 {
        if self.time > 0.0 && self.current + 1 < self.frames.len() {
            self.current += 1;
        }
        self.time += self.update_interval;
        self.time
    }

    fn view(&self, region: &VisualRegion, pixel_size: f64) -> Array2<f64> {
        let frame = &self.frames[self.current];
        let (xs, ys) = patch_axes(region, pixel_size);
        Array2::from_shape_fn((xs.len(), ys.len()), |(i, j)| {
            let x = xs[i];
            let y = ys[j];
            // Nearest pixel of the underlying field; outside it, background.
            let fi = ((x + self.field_size_x / 2.0) / self.pixel_size).floor();
            let fj = ((y + self.field_size_y / 2.0) / self.pixel_size).floor();
            if fi < 0.0 || fj < 0.0 {
                return self.background_luminance;
            }
            let (fi, fj) = (fi as usize, fj as usize);
            let (ni, nj) = frame.dim();
            if fi < ni && fj < nj {
                frame[(fi, fj)]
            } else {
                self.background_luminance
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use super::*;

    #[test]
    fn test_uniform_space_view() {
        let space = UniformSpace::new(50.0, 7.0);
        let region = VisualRegion {
            location_x: 0.0,
            location_y: 0.0,
            size_x: 2.0,
            size_y: 2.0,
        };
        let patch = space.view(&region, 0.5);
        assert_eq!(patch.dim(), (4, 4));
        assert!(patch.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_uniform_space_update() {
        let mut space = UniformSpace::new(50.0, 7.0);
        space.set_duration(21.0);
        assert_relative_eq!(space.update(), 7.0);
        assert_relative_eq!(space.update(), 14.0);
        assert_relative_eq!(space.update(), 21.0);
    }

    #[test]
    fn test_image_sequence_space() {
        let bright = Array2::from_elem((8, 8), 100.0);
        let dark = Array2::from_elem((8, 8), 10.0);
        let mut space =
            ImageSequenceSpace::new(vec![bright, dark], 4.0, 4.0, 0.5, 50.0, 7.0).unwrap();
        space.set_duration(14.0);

        let region = VisualRegion {
            location_x: 0.0,
            location_y: 0.0,
            size_x: 2.0,
            size_y: 2.0,
        };

        space.update();
        let patch = space.view(&region, 0.5);
        assert_eq!(patch.dim(), (4, 4));
        assert!(patch.iter().all(|&v| v == 100.0));

        space.update();
        let patch = space.view(&region, 0.5);
        assert!(patch.iter().all(|&v| v == 10.0));

        // Outside the stimulus field the background shows through.
        let far = VisualRegion {
            location_x: 100.0,
            location_y: 100.0,
            size_x: 2.0,
            size_y: 2.0,
        };
        let patch = space.view(&far, 0.5);
        assert!(patch.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_image_sequence_shape_mismatch() {
        let frame = Array2::from_elem((4, 4), 1.0);
        assert!(ImageSequenceSpace::new(vec![frame], 4.0, 4.0, 0.5, 50.0, 7.0).is_err());
    }
}
