//! Numeric constants shared by the estimators

/// Minimum number of anchor records for a closed-form trilateration fix
pub const MIN_TRILATERATION_ANCHORS: usize = 3;

/// Determinant magnitude below which the trilateration normal equations are degenerate
pub const TRILATERATION_DEGENERACY_THRESHOLD: f64 = 1e-9;

/// Distance below which a reference is considered coincident with the iterate
pub const MIN_RANGE_SEPARATION: f64 = 1e-8;

/// Determinant magnitude below which the damped Hessian is treated as singular
pub const SINGULAR_HESSIAN_THRESHOLD: f64 = 1e-12;

/// Fixed step size of the cooperative gradient correction
pub const COOPERATIVE_STEP_SIZE: f64 = 0.1;

/// Peers closer than this to the own estimate give no usable direction
pub const COOPERATIVE_MIN_SEPARATION: f64 = 1e-6;

/// Default cap on accumulated anchor metrics
pub const DEFAULT_MAX_METRIC: f64 = 1000.0;
