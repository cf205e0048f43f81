//! L2-regularised logistic regression over occurrence features.

use anyhow::{anyhow, Context, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::features::{feature_names, occurrence_features, FeatureVector, FEATURE_COUNT};
use crate::occurrence::Occurrence;

/// Solver knobs. `c` is the inverse regularisation strength; the intercept is
/// never penalised.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

/// Binary classifier plus the feature ordering it was trained on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressModel {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub examples: usize,
    pub positive_fraction: f64,
}

impl StressModel {
    /// Fit with Newton iterations (IRLS), backtracking whenever a step fails
    /// to lower the penalised loss.
    pub fn fit(features: &[FeatureVector], labels: &[bool], options: &FitOptions) -> Result<Self> {
        if features.is_empty() {
            return Err(anyhow!("cannot fit a model without examples"));
        }
        if features.len() != labels.len() {
            return Err(anyhow!(
                "feature/label count mismatch: {} vs {}",
                features.len(),
                labels.len()
            ));
        }
        if options.c.is_nan() || options.c <= 0.0 {
            return Err(anyhow!("regularisation C must be positive"));
        }

        let n = features.len();
        let dim = FEATURE_COUNT + 1;
        // Column 0 is the intercept.
        let x = Array2::from_shape_fn((n, dim), |(i, j)| {
            if j == 0 {
                1.0
            } else {
                features[i][j - 1]
            }
        });
        let y = Array1::from_iter(labels.iter().map(|&l| if l { 1.0 } else { 0.0 }));
        let mut penalty = Array1::from_elem(dim, 1.0 / options.c);
        penalty[0] = 1e-10;

        let mut beta = Array1::<f64>::zeros(dim);
        let mut loss = penalised_loss(&x, &y, &beta, &penalty);
        let mut iterations = 0;
        for _ in 0..options.max_iter {
            iterations += 1;
            let p = x.dot(&beta).mapv(sigmoid);
            let gradient = x.t().dot(&(&p - &y)) + &penalty * &beta;
            let s = p.mapv(|v| (v * (1.0 - v)).max(1e-12));
            let weighted = &x * &s.view().insert_axis(Axis(1));
            let mut hessian = x.t().dot(&weighted);
            for j in 0..dim {
                hessian[[j, j]] += penalty[j];
            }
            let step = solve(&hessian, &gradient)?;

            let mut t = 1.0;
            let mut next = &beta - &(&step * t);
            let mut next_loss = penalised_loss(&x, &y, &next, &penalty);
            while next_loss > loss && t > 1e-6 {
                t *= 0.5;
                next = &beta - &(&step * t);
                next_loss = penalised_loss(&x, &y, &next, &penalty);
            }
            let moved = (&next - &beta).iter().fold(0.0f64, |m, v| m.max(v.abs()));
            beta = next;
            loss = next_loss;
            if moved < options.tolerance {
                break;
            }
        }
        log::debug!(
            "logistic fit: {} examples, {} iteration(s), loss {:.4}",
            n,
            iterations,
            loss
        );

        let positives = labels.iter().filter(|&&l| l).count();
        Ok(Self {
            feature_names: feature_names(),
            weights: beta.iter().skip(1).copied().collect(),
            intercept: beta[0],
            examples: n,
            positive_fraction: positives as f64 / n as f64,
        })
    }

    /// Probability of the positive (confirmed) class.
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let z = self.intercept
            + self
                .weights
                .iter()
                .zip(features.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }

    pub fn score(&self, occ: &Occurrence) -> f64 {
        self.predict_proba(&occurrence_features(occ))
    }

    fn check_layout(&self) -> Result<()> {
        let expected = feature_names();
        if self.feature_names != expected {
            return Err(anyhow!(
                "model feature order {:?} does not match extractor order {:?}",
                self.feature_names,
                expected
            ));
        }
        if self.weights.len() != FEATURE_COUNT {
            return Err(anyhow!(
                "model has {} weights, expected {}",
                self.weights.len(),
                FEATURE_COUNT
            ));
        }
        Ok(())
    }

    /// Write the artifact through a temp file so readers never see a partial model.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to replace model at {}", path.display()))?;
        log::info!("model saved to {} ({} examples)", path.display(), self.examples);
        Ok(())
    }

    /// `Ok(None)` when no model has been trained yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let model: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid model artifact {}", path.display()))?;
        model.check_layout()?;
        log::info!(
            "model loaded from {} ({} examples)",
            path.display(),
            model.examples
        );
        Ok(Some(model))
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + e^z) without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn penalised_loss(
    x: &Array2<f64>,
    y: &Array1<f64>,
    beta: &Array1<f64>,
    penalty: &Array1<f64>,
) -> f64 {
    let z = x.dot(beta);
    let data: f64 = z
        .iter()
        .zip(y.iter())
        .map(|(&z, &y)| softplus(z) - y * z)
        .sum();
    let reg: f64 = beta
        .iter()
        .zip(penalty.iter())
        .map(|(b, p)| 0.5 * p * b * b)
        .sum();
    data + reg
}

/// Gaussian elimination with partial pivoting.
fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    let mut m = a.clone();
    let mut v = b.clone();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))
            .unwrap_or(col);
        if m[[pivot, col]].abs() < 1e-14 {
            return Err(anyhow!("singular system in logistic fit"));
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
            }
            v.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            v[row] -= factor * v[col];
        }
    }
    let mut out = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = v[row];
        for k in row + 1..n {
            acc -= m[[row, k]] * out[k];
        }
        out[row] = acc / m[[row, row]];
    }
    Ok(out)
}
