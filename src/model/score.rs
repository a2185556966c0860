use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Final alert/discard decision for a scored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Alert,
    Discard,
}

/// Result of scoring a `TokenRecord` (spec §3 `Score`).
///
/// Invariant: `total` is the weighted sum of `breakdown` entries rescaled to
/// [0,100]; see `Scorer::score` for how that invariant is maintained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub total: f64,
    pub breakdown: HashMap<String, f64>,
    pub risk_factors: Vec<String>,
    pub decision: Decision,
}
