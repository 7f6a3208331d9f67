use crate::math::{clamp01, turn_angle, Pose};
use crate::route::Route;
use cgmath::MetricSpace;

/// The distance at which an upcoming turn fully governs the target
/// speed, in m. Further turns blend back towards full speed.
const TURN_DOMINANCE_RANGE: f64 = 30.0; // m

/// Softening added to the turn distance before the range is applied, in m.
const TURN_DISTANCE_PADDING: f64 = 5.0; // m

/// Parameters for the look-ahead speed planner.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpeedControl {
    /// The number of upcoming waypoints examined for turns.
    pub look_ahead: usize,
    /// The turn angle classified as sharp, in degrees.
    pub sharp_angle: f64,
    /// The turn angle classified as medium, in degrees.
    pub medium_angle: f64,
    /// The speed multiplier applied for a sharp turn.
    pub sharp_multiplier: f64,
    /// The speed multiplier applied for a medium turn.
    pub medium_multiplier: f64,
    /// The time over which the working speed limit eases towards the
    /// planned target, in s.
    pub smooth_time: f64,
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self {
            look_ahead: 3,
            sharp_angle: 45.0,
            medium_angle: 20.0,
            sharp_multiplier: 0.4,
            medium_multiplier: 0.7,
            smooth_time: 0.5,
        }
    }
}

/// Plans the target speed for the look-ahead window starting at
/// `waypoint_index`. Each upcoming turn is classified by the angle
/// between its approach and exit segments, the resulting multiplier is
/// blended towards full speed with distance, and the most restrictive
/// candidate in the window wins.
pub(crate) fn plan_target_speed(
    control: &SpeedControl,
    route: &Route,
    waypoint_index: usize,
    pose: &Pose,
    top_speed: f64,
) -> f64 {
    let len = route.len();
    if len == 0 {
        return top_speed;
    }

    let mut min_speed = top_speed;
    for i in 0..control.look_ahead.min(len) {
        let index = (waypoint_index + i) % len;
        let next_index = (waypoint_index + i + 1) % len;
        let (waypoint, next) = match (route.waypoint(index), route.waypoint(next_index)) {
            (Some(waypoint), Some(next)) => (waypoint, next),
            _ => continue,
        };

        let approach = waypoint - pose.position;
        let exit = next - waypoint;
        let angle = turn_angle(approach, exit);

        let multiplier = if angle > control.sharp_angle {
            control.sharp_multiplier
        } else if angle > control.medium_angle {
            control.medium_multiplier
        } else {
            1.0
        };

        let distance = pose.position.distance(waypoint);
        let distance_factor = clamp01(TURN_DOMINANCE_RANGE / (distance + TURN_DISTANCE_PADDING));
        let adjusted = top_speed * (multiplier + (1.0 - multiplier) * (1.0 - distance_factor));
        min_speed = f64::min(min_speed, adjusted);
    }

    min_speed
}
