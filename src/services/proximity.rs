//! Proximity evaluation: which entrances did this sample arrive at?
//!
//! Each entrance is judged on its own; there is no cross-entrance or
//! per-tunnel collapsing. The evaluator only reads cooldown state.

use crate::domain::geo::distance_km;
use crate::domain::types::{AlertEvent, Entrance, GeoPoint};
use crate::services::cooldown::{CooldownStore, CooldownTracker};
use smallvec::SmallVec;

/// Alerts produced by one sample; rarely more than a couple
pub type Eligible = SmallVec<[AlertEvent; 4]>;

/// Result of evaluating one sample
#[derive(Debug, Default)]
pub struct Evaluation {
    /// In range and not cooling down, in entrance configuration order
    pub eligible: Eligible,
    /// In range but suppressed by cooldown
    pub suppressed: usize,
}

/// Entrances within `trigger_radius_m` of `location` that are not on cooldown
///
/// Output preserves the order of `entrances`.
pub fn evaluate<S: CooldownStore>(
    location: GeoPoint,
    entrances: &[Entrance],
    cooldown: &CooldownTracker<S>,
    now_ms: u64,
    trigger_radius_m: f64,
) -> Eligible {
    evaluate_detailed(location, entrances, cooldown, now_ms, trigger_radius_m).eligible
}

/// Same as [`evaluate`], also counting in-range entrances held back by cooldown
pub fn evaluate_detailed<S: CooldownStore>(
    location: GeoPoint,
    entrances: &[Entrance],
    cooldown: &CooldownTracker<S>,
    now_ms: u64,
    trigger_radius_m: f64,
) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for entrance in entrances {
        let distance_m = distance_km(location, entrance.location) * 1000.0;
        if distance_m > trigger_radius_m {
            continue;
        }
        if cooldown.is_on_cooldown(&entrance.id, now_ms) {
            evaluation.suppressed += 1;
            continue;
        }
        evaluation.eligible.push(AlertEvent {
            entrance_id: entrance.id.clone(),
            tunnel_id: entrance.tunnel_id.clone(),
            side: entrance.side,
            distance_m,
            timestamp_ms: now_ms,
        });
    }

    evaluation
}
