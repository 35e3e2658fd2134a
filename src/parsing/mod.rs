use crate::error::{Error, Resource, Result};
use crate::linalg::Matrix;

pub mod bitmap;
pub mod idx;
pub mod mnist;

pub const IMAGE_SIDE: usize = 28;
pub const NUM_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const GREYSCALE_SIZE: f64 = 255f64;

/// Samples as read from disk: `NUM_PIXELS` bytes per image, one label byte each
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    pub images: Vec<u8>,
    pub labels: Vec<u8>,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Keep only the first `samples` samples
    pub fn truncate(&mut self, samples: usize) {
        self.labels.truncate(samples);
        self.images.truncate(samples.saturating_mul(NUM_PIXELS));
    }
}

/// A normalized batch: column `i` of `pixels` is sample `i`, with label `labels[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub pixels: Matrix,
    pub labels: Vec<u8>,
}

impl Batch {
    /// Normalize raw samples to [0, 1] and lay them out one per column
    pub fn from_raw(raw: &RawDataset, resource: Resource) -> Result<Batch> {
        let samples = raw.len();

        if samples == 0 {
            return Err(Error::malformed(resource, "the dataset holds no samples"));
        }
        if raw.images.len() != samples * NUM_PIXELS {
            return Err(Error::malformed(
                resource,
                format!(
                    "{} pixel bytes do not make {} images of {} pixels",
                    raw.images.len(),
                    samples,
                    NUM_PIXELS
                ),
            ));
        }
        if let Some(label) = raw.labels.iter().find(|label| **label > 9) {
            return Err(Error::malformed(resource, format!("label {} is not a digit", label)));
        }

        let mut pixels = Matrix::zeros(NUM_PIXELS, samples)?;

        for (image, sample) in raw.images.chunks_exact(NUM_PIXELS).enumerate() {
            for (pixel, value) in sample.iter().enumerate() {
                // we divide by 255 to normalize
                pixels.set(pixel, image, *value as f64 / GREYSCALE_SIZE);
            }
        }

        Ok(Batch {
            pixels,
            labels: raw.labels.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Build the `(classes, N)` target matrix with a 1 at each sample's label
    pub fn one_hot(&self, classes: usize) -> Result<Matrix> {
        let mut target = Matrix::zeros(classes, self.len())?;

        for (sample, label) in self.labels.iter().enumerate() {
            let label = *label as usize;
            if label >= classes {
                return Err(Error::Architecture(format!(
                    "label {} does not fit an output layer of {} classes",
                    label, classes
                )));
            }
            target.set(label, sample, 1f64);
        }

        Ok(target)
    }
}

/// Turn one dark-on-light greyscale image into a `(NUM_PIXELS, 1)` input column.
/// Intensities are inverted so ink is bright, matching the training data.
pub fn image_input(pixels: &[u8]) -> Result<Matrix> {
    if pixels.len() != NUM_PIXELS {
        return Err(Error::UnsupportedImage(format!(
            "expected {} pixels, found {}",
            NUM_PIXELS,
            pixels.len()
        )));
    }

    let data = pixels
        .iter()
        .map(|x| (GREYSCALE_SIZE - *x as f64) / GREYSCALE_SIZE)
        .collect();

    Ok(Matrix::from_vec(NUM_PIXELS, 1, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(samples: &[(u8, u8)]) -> RawDataset {
        // Every pixel of a sample holds the same byte
        RawDataset {
            images: samples
                .iter()
                .flat_map(|(fill, _)| std::iter::repeat(*fill).take(NUM_PIXELS))
                .collect(),
            labels: samples.iter().map(|(_, label)| *label).collect(),
        }
    }

    #[test]
    fn samples_become_normalized_columns() {
        let batch = Batch::from_raw(&raw(&[(0, 3), (255, 7), (51, 0)]), Resource::TrainingData)
            .unwrap();

        assert_eq!(batch.pixels.rows(), NUM_PIXELS);
        assert_eq!(batch.pixels.cols(), 3);
        assert_eq!(batch.pixels.get(0, 0), 0.0);
        assert_eq!(batch.pixels.get(NUM_PIXELS - 1, 1), 1.0);
        assert!((batch.pixels.get(400, 2) - 0.2).abs() < 1e-12);
        assert_eq!(batch.labels, vec![3, 7, 0]);
    }

    #[test]
    fn pixel_order_within_a_sample_is_kept() {
        let mut images = vec![0u8; NUM_PIXELS];
        images[5] = 255;
        let raw = RawDataset {
            images,
            labels: vec![1],
        };
        let batch = Batch::from_raw(&raw, Resource::TestData).unwrap();
        assert_eq!(batch.pixels.get(5, 0), 1.0);
        assert_eq!(batch.pixels.get(4, 0), 0.0);
    }

    #[test]
    fn rejects_inconsistent_datasets() {
        let mut bad = raw(&[(0, 1)]);
        bad.images.pop();
        assert!(matches!(
            Batch::from_raw(&bad, Resource::TrainingData),
            Err(Error::Malformed {
                resource: Resource::TrainingData,
                ..
            })
        ));

        assert!(Batch::from_raw(&raw(&[(0, 10)]), Resource::TestData).is_err());
        assert!(Batch::from_raw(&RawDataset::default(), Resource::TestData).is_err());
    }

    #[test]
    fn truncate_keeps_leading_samples() {
        let mut data = raw(&[(1, 1), (2, 2), (3, 3)]);
        data.truncate(2);
        assert_eq!(data.len(), 2);
        assert_eq!(data.images.len(), 2 * NUM_PIXELS);
        assert_eq!(data.images[NUM_PIXELS], 2);

        data.truncate(usize::MAX);
        assert_eq!(data.len(), 2);
        assert_eq!(data.images.len(), 2 * NUM_PIXELS);
    }

    #[test]
    fn one_hot_targets() {
        let batch = Batch::from_raw(&raw(&[(0, 2), (0, 0)]), Resource::TrainingData).unwrap();
        let target = batch.one_hot(10).unwrap();

        assert_eq!(target.rows(), 10);
        assert_eq!(target.cols(), 2);
        assert_eq!(target.get(2, 0), 1.0);
        assert_eq!(target.get(0, 1), 1.0);
        assert_eq!(target.row_major().iter().sum::<f64>(), 2.0);

        assert!(batch.one_hot(2).is_err());
    }

    #[test]
    fn image_input_inverts_intensity() {
        let mut pixels = vec![255u8; NUM_PIXELS];
        pixels[0] = 0;
        let input = image_input(&pixels).unwrap();
        assert_eq!(input.cols(), 1);
        assert_eq!(input.get(0, 0), 1.0);
        assert_eq!(input.get(1, 0), 0.0);

        assert!(matches!(image_input(&pixels[1..]), Err(Error::UnsupportedImage(_))));
    }
}
