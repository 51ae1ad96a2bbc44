//! Fitted feature scalers.

use ndarray::{Array2, ArrayView2};
use serde::Deserialize;

use super::{check_input, ModelError, Scaler};

const STANDARD: &str = "StandardScaler";
const MIN_MAX: &str = "MinMaxScaler";

/// Zero-variance columns are left unscaled.
fn non_zero(scale: f64) -> f64 {
    if scale == 0.0 {
        1.0
    } else {
        scale
    }
}

/// `x' = (x - mean) / scale`, column by column.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.mean.is_empty() {
            return Err(ModelError::invalid(STANDARD, "mean is empty"));
        }
        if self.mean.len() != self.scale.len() {
            return Err(ModelError::invalid(
                STANDARD,
                format!("mean has {} entries, scale has {}", self.mean.len(), self.scale.len()),
            ));
        }
        Ok(())
    }
}

impl Scaler for StandardScaler {
    fn n_features_in(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        check_input(STANDARD, x, self.n_features_in())?;

        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            for ((v, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
                *v = (*v - mean) / non_zero(*scale);
            }
        }
        Ok(out)
    }
}

/// Rescales each column from its fitted `[data_min, data_max]` into `feature_range`.
#[derive(Debug, Clone, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    pub feature_range: (f64, f64),
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl MinMaxScaler {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.data_min.is_empty() {
            return Err(ModelError::invalid(MIN_MAX, "data_min is empty"));
        }
        if self.data_min.len() != self.data_max.len() {
            return Err(ModelError::invalid(
                MIN_MAX,
                format!(
                    "data_min has {} entries, data_max has {}",
                    self.data_min.len(),
                    self.data_max.len()
                ),
            ));
        }
        if self.feature_range.0 >= self.feature_range.1 {
            return Err(ModelError::invalid(MIN_MAX, "feature_range must be increasing"));
        }
        Ok(())
    }
}

impl Scaler for MinMaxScaler {
    fn n_features_in(&self) -> usize {
        self.data_min.len()
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        check_input(MIN_MAX, x, self.n_features_in())?;

        let (lo, hi) = self.feature_range;
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            for ((v, min), max) in row.iter_mut().zip(&self.data_min).zip(&self.data_max) {
                let scale = (hi - lo) / non_zero(max - min);
                *v = *v * scale + (lo - min * scale);
            }
        }
        Ok(out)
    }
}
