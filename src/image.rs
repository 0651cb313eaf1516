use thiserror::Error;

/// Side length, in pixels, of the square images the classifier accepts.
pub const IMAGE_SIZE: usize = 28;

/// Largest intensity of an integer-encoded grayscale pixel.
pub const MAX_INTENSITY: i64 = 255;

/// Errors raised while validating an incoming image.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    /// The image does not have exactly [`IMAGE_SIZE`] rows.
    #[error("expected {expected} rows, got {actual}")]
    RowCount { expected: usize, actual: usize },
    /// A row does not have exactly [`IMAGE_SIZE`] columns.
    #[error("row {row}: expected {expected} columns, got {actual}")]
    ColumnCount {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// An integer intensity lies outside `0..=255`.
    #[error("pixel ({row}, {col}): intensity {value} is outside 0..=255")]
    IntensityOutOfRange { row: usize, col: usize, value: i64 },
}

/// How the pixels of a request were encoded on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelEncoding {
    /// Pre-normalized floats, conventionally in `[0.0, 1.0]`.
    Float,
    /// Raw intensities in `0..=255`.
    Int,
}

impl PixelEncoding {
    /// Returns the encoding as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelEncoding::Float => "float",
            PixelEncoding::Int => "int",
        }
    }
}

/// A 28x28 grayscale digit with floating point intensities.
///
/// The background is expected to be dark (close to `0.0`) and the ink of the
/// digit bright (close to `1.0`). Values are only constructed through the
/// validating constructors, so the shape always holds.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitImage {
    pixels: Vec<f32>,
}

impl DigitImage {
    /// Builds an image from pre-normalized rows.
    ///
    /// Float intensities are taken as-is, without clamping.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ImageError> {
        check_shape(rows)?;
        Ok(Self {
            pixels: rows.iter().flatten().copied().collect(),
        })
    }

    /// Builds an image from raw `0..=255` intensities, normalizing each one.
    ///
    /// Intensities outside the range are rejected rather than clamped.
    pub fn from_intensities(rows: &[Vec<i64>]) -> Result<Self, ImageError> {
        check_shape(rows)?;
        for (row, values) in rows.iter().enumerate() {
            if let Some((col, &value)) = values
                .iter()
                .enumerate()
                .find(|(_, v)| !(0..=MAX_INTENSITY).contains(*v))
            {
                return Err(ImageError::IntensityOutOfRange { row, col, value });
            }
        }

        Ok(Self::from_validated(normalize(rows)))
    }

    /// An image where every pixel has the same intensity.
    pub fn filled(value: f32) -> Self {
        Self {
            pixels: vec![value; IMAGE_SIZE * IMAGE_SIZE],
        }
    }

    fn from_validated(rows: Vec<Vec<f32>>) -> Self {
        Self {
            pixels: rows.into_iter().flatten().collect(),
        }
    }

    /// Pixels in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.pixels
    }

    /// Fraction of pixels brighter than half intensity.
    pub fn ink_coverage(&self) -> f32 {
        let inked = self.pixels.iter().filter(|&&p| p > 0.5).count();
        inked as f32 / self.pixels.len() as f32
    }
}

/// Scales integer intensities into floats by dividing each one by 255.
///
/// Dimensions are preserved and no validation happens here; callers check the
/// shape and the range first.
pub fn normalize(rows: &[Vec<i64>]) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|&value| value as f32 / MAX_INTENSITY as f32)
                .collect()
        })
        .collect()
}

fn check_shape<T>(rows: &[Vec<T>]) -> Result<(), ImageError> {
    if rows.len() != IMAGE_SIZE {
        return Err(ImageError::RowCount {
            expected: IMAGE_SIZE,
            actual: rows.len(),
        });
    }

    for (row, values) in rows.iter().enumerate() {
        if values.len() != IMAGE_SIZE {
            return Err(ImageError::ColumnCount {
                row,
                expected: IMAGE_SIZE,
                actual: values.len(),
            });
        }
    }

    Ok(())
}
