//! Linear classifiers: logistic regression and a linear SVM.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Deserialize;

use super::{argmax_classes, check_input, Classifier, ModelError};

const LOGISTIC: &str = "LogisticRegression";
const SVC: &str = "LinearSVC";

/// Shared weight layout: one coefficient row per class, or a single row for
/// the binary case where it scores `classes[1]`.
fn validate_weights(
    model: &'static str,
    classes: &[i64],
    coef: &[Vec<f64>],
    intercept: &[f64],
) -> Result<(), ModelError> {
    if classes.len() < 2 {
        return Err(ModelError::invalid(model, "at least two classes are required"));
    }
    let expected_rows = if classes.len() == 2 { 1 } else { classes.len() };
    if coef.len() != expected_rows || intercept.len() != expected_rows {
        return Err(ModelError::invalid(
            model,
            format!(
                "{} classes need {expected_rows} coefficient rows, got {} (intercept {})",
                classes.len(),
                coef.len(),
                intercept.len()
            ),
        ));
    }
    let width = coef[0].len();
    if width == 0 || coef.iter().any(|row| row.len() != width) {
        return Err(ModelError::invalid(model, "coefficient rows must share a non-zero width"));
    }
    Ok(())
}

fn decision(coef: &[Vec<f64>], intercept: &[f64], row: ArrayView1<'_, f64>) -> Vec<f64> {
    coef.iter()
        .zip(intercept)
        .map(|(w, b)| w.iter().zip(row.iter()).map(|(w, x)| w * x).sum::<f64>() + b)
        .collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticRegression {
    pub classes: Vec<i64>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LogisticRegression {
    pub fn validate(&self) -> Result<(), ModelError> {
        validate_weights(LOGISTIC, &self.classes, &self.coef, &self.intercept)
    }
}

impl Classifier for LogisticRegression {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features_in(&self) -> usize {
        self.coef[0].len()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        check_input(LOGISTIC, x, self.n_features_in())?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (row, mut out) in x.rows().into_iter().zip(proba.rows_mut()) {
            let scores = decision(&self.coef, &self.intercept, row);
            if let [z] = scores.as_slice() {
                let p1 = sigmoid(*z);
                out[0] = 1.0 - p1;
                out[1] = p1;
            } else {
                let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
                let total: f64 = exp.iter().sum();
                for (slot, e) in out.iter_mut().zip(&exp) {
                    *slot = e / total;
                }
            }
        }

        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::NonFiniteOutput { model: LOGISTIC });
        }
        Ok(proba)
    }
}

/// Linear SVM exposing only a decision function, so no class probabilities.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearSvc {
    pub classes: Vec<i64>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearSvc {
    pub fn validate(&self) -> Result<(), ModelError> {
        validate_weights(SVC, &self.classes, &self.coef, &self.intercept)
    }
}

impl Classifier for LinearSvc {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features_in(&self) -> usize {
        self.coef[0].len()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>, ModelError> {
        check_input(SVC, x, self.n_features_in())?;

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let scores = decision(&self.coef, &self.intercept, row);
                match scores.as_slice() {
                    [z] if *z > 0.0 => self.classes[1],
                    [_] => self.classes[0],
                    _ => {
                        let mut best = 0;
                        for (idx, s) in scores.iter().enumerate() {
                            if *s > scores[best] {
                                best = idx;
                            }
                        }
                        self.classes[best]
                    }
                }
            })
            .collect())
    }

    fn supports_probabilities(&self) -> bool {
        false
    }

    fn predict_proba(&self, _x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        Err(ModelError::ProbabilitiesUnsupported { model: SVC })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binary_logistic_probabilities() {
        let model = LogisticRegression {
            classes: vec![0, 1],
            coef: vec![vec![1.0, 0.0]],
            intercept: vec![0.0],
        };
        model.validate().unwrap();

        let proba = model.predict_proba(array![[0.0, 5.0], [10.0, 0.0]].view()).unwrap();
        assert!((proba[[0, 1]] - 0.5).abs() < 1e-12);
        assert!(proba[[1, 1]] > 0.99);
        assert_eq!(model.predict(array![[10.0, 0.0], [-10.0, 0.0]].view()).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_multiclass_softmax_sums_to_one() {
        let model = LogisticRegression {
            classes: vec![0, 1, 2],
            coef: vec![vec![1.0], vec![0.0], vec![-1.0]],
            intercept: vec![0.0, 0.0, 0.0],
        };
        model.validate().unwrap();
        let proba = model.predict_proba(array![[2.0]].view()).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(array![[2.0]].view()).unwrap(), vec![0]);
    }

    #[test]
    fn test_linear_svc_has_no_probabilities() {
        let model = LinearSvc {
            classes: vec![0, 1],
            coef: vec![vec![1.0]],
            intercept: vec![-1.0],
        };
        assert!(!model.supports_probabilities());
        assert_eq!(model.predict(array![[2.0], [0.5]].view()).unwrap(), vec![1, 0]);
        assert!(model.predict_proba(array![[2.0]].view()).is_err());
    }

    #[test]
    fn test_validate_rejects_row_count() {
        let model = LogisticRegression {
            classes: vec![0, 1],
            coef: vec![vec![1.0], vec![1.0]],
            intercept: vec![0.0, 0.0],
        };
        assert!(model.validate().is_err());
    }
}
