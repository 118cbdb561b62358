//! Closed-form trilateration by linearized circle intersection
//!
//! Subtracting the circle equation of a reference anchor from every other
//! anchor's equation gives one linear row per anchor:
//!
//! `2(xᵢ−x_ref)·x + 2(yᵢ−y_ref)·y = r_ref² − rᵢ² + xᵢ² − x_ref² + yᵢ² − y_ref²`
//!
//! The 2×2 normal equations `AᵗA·p = Aᵗb` are solved by Cramer's rule.

use log::{debug, trace};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::core::{
    AnchorRecords, DeviceContext, Position, MIN_TRILATERATION_ANCHORS,
    TRILATERATION_DEGENERACY_THRESHOLD,
};
use crate::validation::error::{LocalizationError, LocalizationResult};

/// Trilateration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrilaterationConfig {
    /// `|det(AᵗA)|` at or below this falls back to the anchor centroid
    pub degeneracy_threshold: f64,
}

impl Default for TrilaterationConfig {
    fn default() -> Self {
        Self {
            degeneracy_threshold: TRILATERATION_DEGENERACY_THRESHOLD,
        }
    }
}

/// Linear least squares position solver
#[derive(Debug, Clone, Default)]
pub struct TrilaterationSolver {
    config: TrilaterationConfig,
}

impl TrilaterationSolver {
    pub fn new(config: TrilaterationConfig) -> Self {
        Self { config }
    }

    /// Solve from the record map, using the lowest anchor id as reference.
    ///
    /// Collinear or coincident anchors yield the centroid of all anchor
    /// positions. Fewer than three records is an error.
    pub fn solve(&self, records: &AnchorRecords) -> LocalizationResult<Position> {
        if records.len() < MIN_TRILATERATION_ANCHORS {
            return Err(LocalizationError::InsufficientAnchors {
                available: records.len(),
                required: MIN_TRILATERATION_ANCHORS,
            });
        }

        let mut anchors = records.values();
        let reference = match anchors.next() {
            Some(record) => record,
            None => {
                return Err(LocalizationError::InsufficientAnchors {
                    available: 0,
                    required: MIN_TRILATERATION_ANCHORS,
                })
            }
        };
        let p_ref = reference.position.to_vector();
        let r_ref = reference.distance;

        let mut ata = Matrix2::<f64>::zeros();
        let mut atb = Vector2::<f64>::zeros();
        for record in anchors {
            let p = record.position.to_vector();
            let row = Vector2::new(2.0 * (p.x - p_ref.x), 2.0 * (p.y - p_ref.y));
            let b = r_ref.powi(2) - record.distance.powi(2) + p.norm_squared() - p_ref.norm_squared();
            ata += row * row.transpose();
            atb += row * b;
        }

        let det = ata.determinant();
        if det.abs() <= self.config.degeneracy_threshold {
            let err = LocalizationError::DegenerateGeometry { determinant: det };
            debug!("{}; using anchor centroid", err);
            return Position::centroid(records.values().map(|r| &r.position)).ok_or(err);
        }

        let x = (atb.x * ata[(1, 1)] - ata[(0, 1)] * atb.y) / det;
        let y = (ata[(0, 0)] * atb.y - ata[(1, 0)] * atb.x) / det;
        Ok(Position::new(x, y))
    }

    /// Position estimate of one round.
    ///
    /// Anchors report their true position. Without enough records the
    /// previous estimate is kept.
    pub fn trilaterate(
        &self,
        ctx: &DeviceContext,
        records: &AnchorRecords,
        previous: Position,
    ) -> Position {
        if let Some(position) = ctx.anchor_position() {
            return position;
        }
        match self.solve(records) {
            Ok(position) => position,
            Err(err) => {
                if err.is_data_issue() {
                    trace!("device {}: keeping previous estimate: {}", ctx.id, err);
                } else {
                    debug!("device {}: keeping previous estimate: {}", ctx.id, err);
                }
                previous
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AnchorRecord, DeviceId};
    use approx::assert_abs_diff_eq;

    fn records(anchors: &[(DeviceId, f64, f64, f64)]) -> AnchorRecords {
        anchors
            .iter()
            .map(|&(id, x, y, distance)| {
                let record = AnchorRecord {
                    metric: distance,
                    position: Position::new(x, y),
                    calibration: 1.0,
                    distance,
                };
                (id, record)
            })
            .collect()
    }

    #[test]
    fn test_exact_trilateration() {
        let solver = TrilaterationSolver::default();
        let map = records(&[
            (1, 0.0, 0.0, 5.0),
            (2, 10.0, 0.0, 65f64.sqrt()),
            (3, 0.0, 10.0, 45f64.sqrt()),
        ]);
        let p = solver.solve(&map).unwrap();
        assert_abs_diff_eq!(p.x, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.y, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inconsistent_ranges_give_linear_solution() {
        // These ranges do not meet in one point; the normal equations still
        // have a unique exact solution
        let solver = TrilaterationSolver::default();
        let map = records(&[
            (1, 0.0, 0.0, 5.0),
            (2, 10.0, 0.0, 74f64.sqrt()),
            (3, 0.0, 10.0, 52f64.sqrt()),
        ]);
        let p = solver.solve(&map).unwrap();
        assert_abs_diff_eq!(p.x, 2.55, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 3.65, epsilon = 1e-9);
    }

    #[test]
    fn test_overdetermined_least_squares() {
        let solver = TrilaterationSolver::default();
        let truth = Position::new(-2.0, 7.5);
        let anchors = [
            Position::new(0.0, 0.0),
            Position::new(20.0, 0.0),
            Position::new(0.0, 20.0),
            Position::new(20.0, 20.0),
            Position::new(10.0, -5.0),
        ];
        let map: AnchorRecords = anchors
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let d = p.distance_to(&truth);
                let record = AnchorRecord {
                    metric: d,
                    position: *p,
                    calibration: 1.0,
                    distance: d,
                };
                (i as DeviceId, record)
            })
            .collect();
        let p = solver.solve(&map).unwrap();
        assert_abs_diff_eq!(p.x, truth.x, epsilon = 1e-6);
        assert_abs_diff_eq!(p.y, truth.y, epsilon = 1e-6);
    }

    #[test]
    fn test_collinear_falls_back_to_centroid() {
        let solver = TrilaterationSolver::default();
        let map = records(&[(1, 0.0, 0.0, 3.0), (2, 5.0, 0.0, 9.0), (3, 10.0, 0.0, 1.0)]);
        let p = solver.solve(&map).unwrap();
        assert_abs_diff_eq!(p.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_insufficient_anchors() {
        let solver = TrilaterationSolver::default();
        let map = records(&[(1, 0.0, 0.0, 3.0), (2, 5.0, 0.0, 4.0)]);
        assert_eq!(
            solver.solve(&map),
            Err(LocalizationError::InsufficientAnchors {
                available: 2,
                required: 3
            })
        );

        assert!(solver.solve(&map).is_err_and(|err| err.is_data_issue()));

        let previous = Position::new(42.0, -1.0);
        let ctx = DeviceContext::device(9);
        assert_eq!(solver.trilaterate(&ctx, &map, previous), previous);
    }

    #[test]
    fn test_anchor_returns_true_position() {
        let solver = TrilaterationSolver::default();
        let truth = Position::new(100.0, 250.0);
        let ctx = DeviceContext::anchor(1, truth);
        let map = records(&[
            (2, 0.0, 0.0, 5.0),
            (3, 10.0, 0.0, 65f64.sqrt()),
            (4, 0.0, 10.0, 45f64.sqrt()),
        ]);
        assert_eq!(solver.trilaterate(&ctx, &map, Position::origin()), truth);
    }
}
