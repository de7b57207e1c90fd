use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::f64::consts::PI;
use tracing::debug;

use crate::ml::RegimeModel;

const COVAR_REGULARIZATION: f64 = 1e-6;

/// Hidden Markov Model with full-covariance Gaussian emissions.
#[derive(Debug, Clone)]
pub struct GaussianHMM {
    /// Number of hidden states
    pub n_states: usize,
    /// Number of features (observation dimensions)
    pub n_features: usize,
    /// State transition matrix (n_states x n_states)
    pub transition: Array2<f64>,
    /// Initial state probabilities
    pub start_prob: Array1<f64>,
    /// Mean vectors for each state (n_states x n_features)
    pub means: Array2<f64>,
    /// Covariance matrix per state (n_features x n_features)
    pub covars: Vec<Array2<f64>>,
    /// Cached inverse of each covariance matrix
    pub covar_invs: Vec<Array2<f64>>,
    /// Cached log-determinant of each covariance matrix
    pub covar_log_dets: Vec<f64>,
    /// Convergence tolerance on the log-likelihood gain
    pub tol: f64,
    /// Maximum EM iterations
    pub max_iter: usize,
}

impl GaussianHMM {
    pub fn new(n_states: usize, n_features: usize) -> Self {
        let start_prob = Array1::from_elem(n_states, 1.0 / n_states as f64);

        // Uniform transitions with a self-persistence bias
        let mut transition = Array2::from_elem((n_states, n_states), 0.0);
        if n_states == 1 {
            transition[[0, 0]] = 1.0;
        } else {
            let off = 0.5 / (n_states - 1) as f64;
            for i in 0..n_states {
                for j in 0..n_states {
                    transition[[i, j]] = if i == j { 0.5 } else { off };
                }
            }
        }

        Self {
            n_states,
            n_features,
            transition,
            start_prob,
            means: Array2::zeros((n_states, n_features)),
            covars: vec![Array2::eye(n_features); n_states],
            covar_invs: vec![Array2::eye(n_features); n_states],
            covar_log_dets: vec![0.0; n_states],
            tol: 1e-2,
            max_iter: 100,
        }
    }

    pub fn with_iterations(mut self, max_iter: usize, tol: f64) -> Self {
        self.max_iter = max_iter;
        self.tol = tol;
        self
    }

    fn check_shape(&self, observations: &Array2<f64>) -> Result<()> {
        if observations.ncols() != self.n_features {
            return Err(anyhow!(
                "Observation features mismatch: expected {}, got {}",
                self.n_features,
                observations.ncols()
            ));
        }
        if observations.nrows() == 0 {
            return Err(anyhow!("No observations"));
        }
        Ok(())
    }

    /// K-means initialization seeded from the rank of the first feature.
    pub fn init_with_kmeans(&mut self, observations: &Array2<f64>) -> Result<()> {
        self.check_shape(observations)?;

        let n_obs = observations.nrows();
        let mut order: Vec<usize> = (0..n_obs).collect();
        order.sort_by(|&a, &b| observations[[a, 0]].total_cmp(&observations[[b, 0]]));

        let mut labels = vec![0; n_obs];
        for (rank, &i) in order.iter().enumerate() {
            labels[i] = (rank * self.n_states) / n_obs;
        }

        for _ in 0..10 {
            // Update means
            self.means.fill(0.0);
            let mut counts = vec![0usize; self.n_states];
            for (i, &label) in labels.iter().enumerate() {
                let mut row = self.means.row_mut(label);
                row += &observations.row(i);
                counts[label] += 1;
            }
            for state in 0..self.n_states {
                if counts[state] > 0 {
                    let mut row = self.means.row_mut(state);
                    row /= counts[state] as f64;
                }
            }

            // Reassign labels
            let mut changed = false;
            for i in 0..n_obs {
                let obs = observations.row(i);
                let best_state = (0..self.n_states)
                    .filter(|&s| counts[s] > 0)
                    .min_by(|&a, &b| {
                        squared_distance(obs, self.means.row(a))
                            .total_cmp(&squared_distance(obs, self.means.row(b)))
                    })
                    .unwrap_or(labels[i]);
                if best_state != labels[i] {
                    labels[i] = best_state;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Covariances from the final clusters; empty clusters keep the pooled covariance
        let overall_mean = observations
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features));
        let pooled = weighted_covariance(observations, &overall_mean, |_| 1.0);
        for state in 0..self.n_states {
            let members = labels.iter().filter(|&&l| l == state).count();
            let cov = if members > 1 {
                let mean = self.means.row(state).to_owned();
                weighted_covariance(observations, &mean, |t| {
                    if labels[t] == state {
                        1.0
                    } else {
                        0.0
                    }
                })
            } else {
                pooled.clone()
            };
            self.set_covariance(state, cov)?;
        }

        Ok(())
    }

    fn set_covariance(&mut self, state: usize, mut cov: Array2<f64>) -> Result<()> {
        for i in 0..self.n_features {
            cov[[i, i]] += COVAR_REGULARIZATION;
        }
        let (inv, det) = invert(&cov)
            .ok_or_else(|| anyhow!("Covariance of state {} is singular", state))?;
        if det <= 0.0 {
            return Err(anyhow!("Covariance of state {} is not positive definite", state));
        }
        self.covars[state] = cov;
        self.covar_invs[state] = inv;
        self.covar_log_dets[state] = det.ln();
        Ok(())
    }

    /// Log density of every observation under every state (n_obs x n_states).
    fn log_emissions(&self, observations: &Array2<f64>) -> Array2<f64> {
        let n_obs = observations.nrows();
        let log_two_pi = self.n_features as f64 * (2.0 * PI).ln();
        let mut out = Array2::zeros((n_obs, self.n_states));

        for state in 0..self.n_states {
            let mean = self.means.row(state);
            let cov_inv = &self.covar_invs[state];
            let log_norm = -0.5 * (log_two_pi + self.covar_log_dets[state]);

            for t in 0..n_obs {
                let diff = &observations.row(t) - &mean;
                let mahal = diff.dot(&cov_inv.dot(&diff));
                out[[t, state]] = log_norm - 0.5 * mahal;
            }
        }

        out
    }

    /// Forward pass in log space; returns alphas and the sequence log-likelihood.
    fn forward(&self, log_b: &Array2<f64>) -> (Array2<f64>, f64) {
        let n_obs = log_b.nrows();
        let mut log_alpha = Array2::from_elem((n_obs, self.n_states), f64::NEG_INFINITY);

        for state in 0..self.n_states {
            log_alpha[[0, state]] = self.start_prob[state].ln() + log_b[[0, state]];
        }

        let mut terms = vec![0.0; self.n_states];
        for t in 1..n_obs {
            for j in 0..self.n_states {
                for i in 0..self.n_states {
                    terms[i] = log_alpha[[t - 1, i]] + self.transition[[i, j]].ln();
                }
                log_alpha[[t, j]] = log_sum_exp(&terms) + log_b[[t, j]];
            }
        }

        let log_prob = log_sum_exp(&log_alpha.row(n_obs - 1).to_vec());
        (log_alpha, log_prob)
    }

    fn backward(&self, log_b: &Array2<f64>) -> Array2<f64> {
        let n_obs = log_b.nrows();
        let mut log_beta = Array2::from_elem((n_obs, self.n_states), f64::NEG_INFINITY);
        log_beta.row_mut(n_obs - 1).fill(0.0);

        let mut terms = vec![0.0; self.n_states];
        for t in (0..n_obs - 1).rev() {
            for i in 0..self.n_states {
                for j in 0..self.n_states {
                    terms[j] =
                        self.transition[[i, j]].ln() + log_b[[t + 1, j]] + log_beta[[t + 1, j]];
                }
                log_beta[[t, i]] = log_sum_exp(&terms);
            }
        }

        log_beta
    }

    /// Baum-Welch EM. Returns (final_log_likelihood, iterations_run).
    pub fn fit(&mut self, observations: &Array2<f64>) -> Result<(f64, usize)> {
        self.check_shape(observations)?;
        let n_obs = observations.nrows();
        if n_obs < 2 {
            return Err(anyhow!("Need at least 2 observations"));
        }

        self.init_with_kmeans(observations)?;

        let mut prev_log_prob = f64::NEG_INFINITY;

        for iteration in 0..self.max_iter {
            // E-step
            let log_b = self.log_emissions(observations);
            let (log_alpha, log_prob) = self.forward(&log_b);
            let log_beta = self.backward(&log_b);

            if !log_prob.is_finite() {
                return Err(anyhow!("Log-likelihood diverged at iteration {}", iteration + 1));
            }
            if (log_prob - prev_log_prob).abs() < self.tol {
                debug!("HMM converged after {} iterations", iteration + 1);
                return Ok((log_prob, iteration + 1));
            }
            prev_log_prob = log_prob;

            // State occupation probabilities
            let mut gamma = &log_alpha + &log_beta;
            for mut row in gamma.rows_mut() {
                let norm = log_sum_exp(&row.to_vec());
                row.mapv_inplace(|v| (v - norm).exp());
            }

            // Expected transition counts
            let mut xi_sum = Array2::<f64>::zeros((self.n_states, self.n_states));
            for t in 0..n_obs - 1 {
                for i in 0..self.n_states {
                    for j in 0..self.n_states {
                        let log_xi = log_alpha[[t, i]]
                            + self.transition[[i, j]].ln()
                            + log_b[[t + 1, j]]
                            + log_beta[[t + 1, j]]
                            - log_prob;
                        xi_sum[[i, j]] += log_xi.exp();
                    }
                }
            }

            // M-step
            self.start_prob.assign(&gamma.row(0));

            for i in 0..self.n_states {
                let row_sum: f64 = xi_sum.row(i).sum();
                if row_sum > 0.0 {
                    for j in 0..self.n_states {
                        self.transition[[i, j]] = xi_sum[[i, j]] / row_sum;
                    }
                }
            }

            for state in 0..self.n_states {
                let weights = gamma.column(state);
                let gamma_sum: f64 = weights.sum();
                if gamma_sum <= f64::EPSILON {
                    continue;
                }

                let mean = weights.dot(observations) / gamma_sum;
                let cov = weighted_covariance(observations, &mean, |t| weights[t]);
                self.means.row_mut(state).assign(&mean);
                self.set_covariance(state, cov)?;
            }
        }

        Ok((prev_log_prob, self.max_iter))
    }

    /// Most likely state sequence (Viterbi).
    pub fn predict(&self, observations: &Array2<f64>) -> Result<Vec<usize>> {
        self.check_shape(observations)?;

        let n_obs = observations.nrows();
        let log_b = self.log_emissions(observations);
        let mut log_delta = Array2::from_elem((n_obs, self.n_states), f64::NEG_INFINITY);
        let mut psi = Array2::<usize>::zeros((n_obs, self.n_states));

        for state in 0..self.n_states {
            log_delta[[0, state]] = self.start_prob[state].ln() + log_b[[0, state]];
        }

        for t in 1..n_obs {
            for j in 0..self.n_states {
                let mut max_val = f64::NEG_INFINITY;
                let mut max_state = 0;
                for i in 0..self.n_states {
                    let val = log_delta[[t - 1, i]] + self.transition[[i, j]].ln();
                    if val > max_val {
                        max_val = val;
                        max_state = i;
                    }
                }
                log_delta[[t, j]] = max_val + log_b[[t, j]];
                psi[[t, j]] = max_state;
            }
        }

        // Backtracking
        let mut states = vec![0; n_obs];
        let mut max_val = f64::NEG_INFINITY;
        for state in 0..self.n_states {
            if log_delta[[n_obs - 1, state]] > max_val {
                max_val = log_delta[[n_obs - 1, state]];
                states[n_obs - 1] = state;
            }
        }
        for t in (0..n_obs - 1).rev() {
            states[t] = psi[[t + 1, states[t + 1]]];
        }

        Ok(states)
    }
}

impl RegimeModel for GaussianHMM {
    fn fit_predict(&mut self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let (log_likelihood, iterations) = self.fit(features)?;
        debug!(
            "Fitted {}-state HMM: log-likelihood {:.2} after {} iterations",
            self.n_states, log_likelihood, iterations
        );
        self.predict(features)
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Covariance of `observations` around `mean` with per-row weights.
fn weighted_covariance<F>(observations: &Array2<f64>, mean: &Array1<f64>, weight: F) -> Array2<f64>
where
    F: Fn(usize) -> f64,
{
    let n_features = observations.ncols();
    let mut cov = Array2::zeros((n_features, n_features));
    let mut total = 0.0;

    for (t, row) in observations.rows().into_iter().enumerate() {
        let w = weight(t);
        if w == 0.0 {
            continue;
        }
        let diff = &row - mean;
        for i in 0..n_features {
            for j in 0..n_features {
                cov[[i, j]] += w * diff[i] * diff[j];
            }
        }
        total += w;
    }

    if total > 0.0 {
        cov /= total;
    }
    cov
}

/// Gauss-Jordan inverse with partial pivoting; also returns the determinant.
fn invert(mat: &Array2<f64>) -> Option<(Array2<f64>, f64)> {
    let n = mat.nrows();
    let mut a = mat.clone();
    let mut inv = Array2::eye(n);
    let mut det = 1.0;

    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| a[[x, col]].abs().total_cmp(&a[[y, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
            det = -det;
        }

        let p = a[[col, col]];
        det *= p;
        for k in 0..n {
            a[[col, k]] /= p;
            inv[[col, k]] /= p;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                let (da, dinv) = (factor * a[[col, k]], factor * inv[[col, k]]);
                a[[row, k]] -= da;
                inv[[row, k]] -= dinv;
            }
        }
    }

    Some((inv, det))
}

/// Log-sum-exp trick for numerical stability
fn log_sum_exp(log_values: &[f64]) -> f64 {
    let max_val = log_values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }

    let sum_exp: f64 = log_values.iter().map(|&v| (v - max_val).exp()).sum();
    max_val + sum_exp.ln()
}
