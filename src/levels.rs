//! Point bonuses and level tiers.
//!
//! Levels are a pure function of cumulative points against fixed thresholds;
//! the dispatcher recomputes them whenever it awards points.

use crate::store::UserRecord;

/// Points awarded to each party when a connection request is accepted.
pub const CONNECTION_BONUS_POINTS: u32 = 10;

/// Minimum cumulative points for each level, starting at level 1.
const LEVEL_THRESHOLDS: [u32; 5] = [0, 100, 250, 500, 1000];

/// Level tier for a cumulative point total.
pub fn level_for_points(points: u32) -> u32 {
    let mut level = 1;
    for (index, threshold) in LEVEL_THRESHOLDS.iter().enumerate() {
        if points >= *threshold {
            level = index as u32 + 1;
        }
    }
    level
}

/// Apply the connection bonus to a record and recompute its level.
pub fn award_connection_bonus(user: &mut UserRecord) {
    user.points = user.points.saturating_add(CONNECTION_BONUS_POINTS);
    user.level = level_for_points(user.points);
}
