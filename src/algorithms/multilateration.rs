//! Iterative multilateration by damped Gauss-Newton (Levenberg-Marquardt)
//!
//! Minimizes `Σ wᵢ²(‖p − aᵢ‖ − dᵢ)²` over the planar position `p`, starting
//! from a caller-provided guess. The plain variant uses unit weights.
//!
//! The weighted variant also turns the curvature of the cost at the solution
//! into a confidence weight (inverse standard deviation) for the estimate, so
//! devices can feed it back as the base weight of their next round.

use log::{debug, trace};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::core::{
    Position, RangeReference, WeightedReference, MIN_RANGE_SEPARATION, SINGULAR_HESSIAN_THRESHOLD,
};
use crate::validation::error::LocalizationError;

/// Damped Gauss-Newton parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilaterationConfig {
    /// Iteration cap (accepted and rejected steps both count)
    pub max_iterations: usize,
    /// Initial damping λ
    pub initial_lambda: f64,
    /// λ multiplier after an accepted step
    pub lambda_decrease: f64,
    /// λ multiplier after a rejected step
    pub lambda_increase: f64,
    /// Accepted steps shorter than this end the iteration
    pub step_tolerance: f64,
    /// `|det H|` below this ends the iteration
    pub singular_threshold: f64,
    /// References closer than this to the iterate are left out of H and g
    pub min_separation: f64,
}

impl Default for MultilaterationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_lambda: 1e-3,
            lambda_decrease: 0.3,
            lambda_increase: 2.0,
            step_tolerance: 1e-6,
            singular_threshold: SINGULAR_HESSIAN_THRESHOLD,
            min_separation: MIN_RANGE_SEPARATION,
        }
    }
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// No references: guess returned unchanged
    NoReferences,
    /// One reference: guess projected onto its circle
    SingleReference,
    /// Accepted step below tolerance
    Converged,
    /// Damped Hessian singular: last accepted position returned
    SingularHessian,
    /// Iteration cap reached
    MaxIterations,
}

/// Outcome of one multilateration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultilaterationReport {
    pub position: Position,
    pub iterations: usize,
    /// Final (weighted) sum of squared residuals
    pub cost: f64,
    pub termination: Termination,
}

/// Outcome of one weighted multilateration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedSolution {
    pub report: MultilaterationReport,
    /// Confidence weight to persist as the next round's base weight
    pub weight: f64,
}

/// Nonlinear least squares position solver
#[derive(Debug, Clone, Default)]
pub struct MultilaterationSolver {
    config: MultilaterationConfig,
}

impl MultilaterationSolver {
    pub fn new(config: MultilaterationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MultilaterationConfig {
        &self.config
    }

    /// Refine `guess` against unweighted range references
    pub fn multilaterate(&self, guess: Position, references: &[RangeReference]) -> MultilaterationReport {
        let weighted: Vec<WeightedReference> = references
            .iter()
            .map(|r| WeightedReference {
                reference: *r,
                weight: 1.0,
            })
            .collect();
        self.refine(guess, &weighted, None).0
    }

    /// Refine `guess` against weighted references and derive the output
    /// confidence `1/√(1/base_weight² + σ²)`.
    ///
    /// With fewer than two references, or if no step is ever accepted, the
    /// base weight is returned unchanged.
    pub fn multilaterate_weighted(
        &self,
        guess: Position,
        references: &[WeightedReference],
        base_weight: f64,
    ) -> WeightedSolution {
        let (report, weight) = self.refine(guess, references, Some(base_weight));
        WeightedSolution {
            report,
            weight: weight.unwrap_or(base_weight),
        }
    }

    fn refine(
        &self,
        guess: Position,
        references: &[WeightedReference],
        base_weight: Option<f64>,
    ) -> (MultilaterationReport, Option<f64>) {
        match references {
            [] => {
                let report = MultilaterationReport {
                    position: guess,
                    iterations: 0,
                    cost: 0.0,
                    termination: Termination::NoReferences,
                };
                return (report, base_weight);
            }
            [single] => {
                let position = self.project(guess, &single.reference);
                let report = MultilaterationReport {
                    position,
                    iterations: 0,
                    cost: Self::cost(references, &position.to_vector()),
                    termination: Termination::SingleReference,
                };
                return (report, base_weight);
            }
            _ => {}
        }

        let cfg = &self.config;
        let mut p = guess.to_vector();
        let mut cost = Self::cost(references, &p);
        let mut lambda = cfg.initial_lambda;
        let mut weight = base_weight;
        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        while iterations < cfg.max_iterations {
            iterations += 1;
            let (hessian, gradient) = self.normal_equations(references, &p);

            let mut damped = hessian;
            damped[(0, 0)] += lambda;
            damped[(1, 1)] += lambda;
            let det = damped.determinant();
            if det.abs() < cfg.singular_threshold {
                debug!(
                    "{}",
                    LocalizationError::SingularSystem {
                        determinant: det,
                        iterations,
                    }
                );
                termination = Termination::SingularHessian;
                break;
            }

            // Δp = -H⁻¹g by Cramer's rule
            let step = Vector2::new(
                damped[(0, 1)] * gradient.y - damped[(1, 1)] * gradient.x,
                damped[(1, 0)] * gradient.x - damped[(0, 0)] * gradient.y,
            ) / det;
            let candidate = p + step;
            let candidate_cost = Self::cost(references, &candidate);

            if candidate_cost < cost {
                p = candidate;
                cost = candidate_cost;
                lambda *= cfg.lambda_decrease;
                if let Some(base) = base_weight {
                    if let Some(w) = self.confidence(base, &hessian) {
                        weight = Some(w);
                    }
                }
                if step.norm() < cfg.step_tolerance {
                    termination = Termination::Converged;
                    break;
                }
            } else {
                lambda *= cfg.lambda_increase;
            }
        }

        trace!(
            "multilateration: {} refs, {} iterations, cost {:.3e}, {:?}",
            references.len(),
            iterations,
            cost,
            termination
        );

        let report = MultilaterationReport {
            position: Position::from_vector(&p),
            iterations,
            cost,
            termination,
        };
        (report, weight)
    }

    /// Move the guess radially onto the reference circle
    fn project(&self, guess: Position, reference: &RangeReference) -> Position {
        let anchor = reference.position.to_vector();
        let offset = guess.to_vector() - anchor;
        let length = offset.norm();
        if length < self.config.min_separation {
            return guess;
        }
        Position::from_vector(&(anchor + offset * (reference.distance / length)))
    }

    /// Undamped `H = JᵗWJ` and `g = JᵗWr` at `p`
    fn normal_equations(
        &self,
        references: &[WeightedReference],
        p: &Vector2<f64>,
    ) -> (Matrix2<f64>, Vector2<f64>) {
        let mut hessian = Matrix2::zeros();
        let mut gradient = Vector2::zeros();
        for wr in references {
            let delta = p - wr.reference.position.to_vector();
            let range = delta.norm();
            if range < self.config.min_separation {
                continue;
            }
            let w2 = wr.weight * wr.weight;
            let direction = delta / range;
            let residual = range - wr.reference.distance;
            hessian += direction * direction.transpose() * w2;
            gradient += direction * (residual * w2);
        }
        (hessian, gradient)
    }

    fn cost(references: &[WeightedReference], p: &Vector2<f64>) -> f64 {
        references
            .iter()
            .map(|wr| {
                let residual = (p - wr.reference.position.to_vector()).norm() - wr.reference.distance;
                wr.weight * wr.weight * residual * residual
            })
            .sum()
    }

    /// `1/√(1/base² + σ²)` with `σ² = trace(H⁻¹)/2`, `None` if H is singular
    fn confidence(&self, base_weight: f64, hessian: &Matrix2<f64>) -> Option<f64> {
        let det = hessian.determinant();
        if det.abs() < self.config.singular_threshold {
            return None;
        }
        let variance = hessian.trace() / (2.0 * det);
        let prior_variance = if base_weight > 0.0 {
            1.0 / (base_weight * base_weight)
        } else {
            f64::INFINITY
        };
        Some(1.0 / (prior_variance + variance).sqrt())
    }
}
