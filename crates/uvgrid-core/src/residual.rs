//! Residual Computer
//!
//! `residual = observed - predicted` per sample. Flagged samples get a zero
//! residual and keep their flags. No weighting is applied.

use serde::{Deserialize, Serialize};

use crate::buffer::VisBuffer;
use crate::types::{ResampleError, ResampleResult, Visibility};

/// Column the observed values are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualSource {
    #[default]
    Observed,
    /// Calibrated data; requires `VisBuffer::corrected`.
    Corrected,
}

fn observed(buffer: &VisBuffer, source: ResidualSource) -> ResampleResult<&[Visibility]> {
    match source {
        ResidualSource::Observed => Ok(&buffer.data),
        ResidualSource::Corrected => {
            buffer
                .corrected
                .as_deref()
                .ok_or(ResampleError::BufferShape {
                    field: "corrected",
                    expected: buffer.len(),
                    actual: 0,
                })
        }
    }
}

/// Residuals of `buffer` against `predicted` (buffer storage order).
pub fn compute_residuals(
    buffer: &VisBuffer,
    predicted: &[Visibility],
    source: ResidualSource,
) -> ResampleResult<Vec<Visibility>> {
    buffer.validate_shape()?;
    if predicted.len() != buffer.len() {
        return Err(ResampleError::BufferShape {
            field: "predicted",
            expected: buffer.len(),
            actual: predicted.len(),
        });
    }
    let observed = observed(buffer, source)?;

    let mut residuals = Vec::with_capacity(buffer.len());
    for row in 0..buffer.n_rows() {
        for chan in 0..buffer.n_chan() {
            for pol in 0..buffer.n_pol() {
                let i = buffer.index(row, chan, pol);
                residuals.push(if buffer.is_valid(row, chan, pol) {
                    observed[i] - predicted[i]
                } else {
                    Visibility::new(0.0, 0.0)
                });
            }
        }
    }
    Ok(residuals)
}

/// Replace the model column with `observed - model`.
pub fn apply_residuals(buffer: &mut VisBuffer, source: ResidualSource) -> ResampleResult<()> {
    let residuals = compute_residuals(buffer, &buffer.model, source)?;
    buffer.model = residuals;
    Ok(())
}
