//! Random forest classifier in flat node-array form.
//!
//! Each tree stores parallel arrays indexed by node id. A node is a leaf when
//! `children_left[node] == -1`; otherwise rows go left when
//! `x[feature[node]] <= threshold[node]`. `value[node]` holds per-class
//! weights at that node, normalized into a distribution at prediction time.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Deserialize;

use super::{argmax_classes, check_input, Classifier, ModelError};

const MODEL: &str = "RandomForestClassifier";
const LEAF: i64 = -1;

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    fn validate(&self, index: usize, n_features: usize, n_classes: usize) -> Result<(), ModelError> {
        let n = self.children_left.len();
        let bad = |message: String| ModelError::invalid(MODEL, format!("tree {index}: {message}"));

        if n == 0 {
            return Err(bad("no nodes".into()));
        }
        if [
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err(bad("node arrays differ in length".into()));
        }

        for node in 0..n {
            if self.value[node].len() != n_classes {
                return Err(bad(format!("node {node} has {} class weights", self.value[node].len())));
            }
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                continue;
            }
            // Children always come after their parent, which also rules out cycles.
            for child in [left, right] {
                if child <= node as i64 || child as usize >= n {
                    return Err(bad(format!("node {node} has invalid child {child}")));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(bad(format!("node {node} splits on unknown feature {feature}")));
            }
        }
        Ok(())
    }

    fn leaf(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut node = 0;
        while self.children_left[node] != LEAF {
            let feature = self.feature[node] as usize;
            node = if row[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<i64>,
    pub n_features_in: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.classes.is_empty() {
            return Err(ModelError::invalid(MODEL, "no classes"));
        }
        if self.trees.is_empty() {
            return Err(ModelError::invalid(MODEL, "no trees"));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(index, self.n_features_in, self.classes.len())?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features_in(&self) -> usize {
        self.n_features_in
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        check_input(MODEL, x, self.n_features_in)?;

        let n_classes = self.classes.len();
        let mut proba = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (row, mut out) in x.rows().into_iter().zip(proba.rows_mut()) {
            for tree in &self.trees {
                let weights = &tree.value[tree.leaf(row)];
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    continue;
                }
                for (slot, w) in out.iter_mut().zip(weights) {
                    *slot += w / total;
                }
            }
            out /= self.trees.len() as f64;
        }

        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::NonFiniteOutput { model: MODEL });
        }
        Ok(proba)
    }
}
