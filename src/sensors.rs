use crate::math::{rotate_about_up, up, Point3d, Pose, Vector3d};

/// The tag attached to whatever surface a probe hits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HitTag {
    /// An untagged surface, ignored by every probe.
    Untagged,
    /// The body of another vehicle.
    Vehicle,
    /// The rear of another vehicle, directly ahead.
    VehicleRear,
    /// A static obstacle such as a wall or barrier.
    Obstacle,
}

/// The result of a single raycast probe.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    /// The tag of the surface that was hit.
    pub tag: HitTag,
    /// The world space surface normal at the hit point.
    pub normal: Vector3d,
}

/// The raycast service provided by the external physics collaborator.
/// Results must be synchronous within the tick that issues the probe.
pub trait RaycastWorld {
    /// Casts a ray and returns the nearest hit within `max_dist`, if any.
    fn cast(&self, origin: Point3d, direction: Vector3d, max_dist: f64) -> Option<RayHit>;
}

/// The geometry and gains of a vehicle's sensor array.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorConfig {
    /// The range of the angled forward probes in m.
    pub forward_range: f64,
    /// The range of the front centre vehicle probe in m.
    pub front_range: f64,
    /// How far ahead of the vehicle centre the forward probes start, in m.
    pub front_start: f64,
    /// The lateral offset of the angled forward probes in m.
    pub side_offset: f64,
    /// The yaw of the angled fallback probes in degrees.
    pub probe_angle: f64,
    /// The range of the purely lateral probes in m.
    pub lateral_range: f64,
    /// The steering bias contributed by a primary probe hit, in degrees.
    pub avoid_bias: f64,
    /// The height above the vehicle origin that probes are cast from, in m.
    pub mount_height: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            forward_range: 5.0,
            front_range: 10.0,
            front_start: 2.52,
            side_offset: 1.0,
            probe_angle: 8.0,
            lateral_range: 0.5,
            avoid_bias: 2.0,
            mount_height: 1.0,
        }
    }
}

/// The fused result of one sensor sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct SensorReport {
    /// The summed avoidance steering bias in degrees.
    /// Positive steers right, negative steers left.
    pub avoidance_bias: f64,
    /// Whether the front centre probe saw the rear of a vehicle.
    pub vehicle_ahead: bool,
    /// The number of probes that registered an obstacle.
    pub detections: u32,
}

impl SensorReport {
    /// Whether the avoidance bias should override waypoint steering.
    pub fn overrides_steering(&self) -> bool {
        self.detections > 0
    }
}

/// A vehicle's sensor array: two lateral probes, a front centre vehicle
/// probe, two angled forward probe pairs and a front fallback probe.
#[derive(Clone, Copy, Debug, Default)]
pub struct SensorRig {
    config: SensorConfig,
}

/// The bias step contributed by the narrower angled fallback probes.
const ANGLED_BIAS: f64 = 0.5;

impl SensorRig {
    /// Creates a sensor rig with the given configuration.
    pub fn new(config: SensorConfig) -> Self {
        Self { config }
    }

    /// Gets the rig's configuration.
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Sweeps all probes around `pose` and fuses the hits into a report.
    ///
    /// The lateral probes react to anything tagged and bias away from the
    /// hit side. The front centre probe reacts only to [HitTag::VehicleRear]
    /// and is the sole source of `vehicle_ahead`. The forward probes ignore
    /// other vehicles and fall back to a narrower angled probe when the
    /// straight probe misses. The final front fallback only engages when no
    /// bias has accumulated yet, deriving a direction from the hit normal;
    /// it does not count as a detection.
    pub fn scan(&self, pose: &Pose, world: &dyn RaycastWorld) -> SensorReport {
        let cfg = &self.config;
        let mut report = SensorReport::default();

        let base = pose.position + up() * cfg.mount_height;
        let forward = pose.forward;
        let right = pose.right();
        let front = base + forward * cfg.front_start;

        // Lateral probes: anything tagged pushes the vehicle away.
        if let Some(hit) = world.cast(base, right, cfg.lateral_range) {
            if hit.tag != HitTag::Untagged {
                report.detections += 1;
                report.avoidance_bias -= cfg.avoid_bias;
            }
        }
        if let Some(hit) = world.cast(base, -right, cfg.lateral_range) {
            if hit.tag != HitTag::Untagged {
                report.detections += 1;
                report.avoidance_bias += cfg.avoid_bias;
            }
        }

        // Front centre probe: vehicle-ahead detection only.
        if let Some(hit) = world.cast(front, forward, cfg.front_range) {
            if hit.tag == HitTag::VehicleRear {
                report.vehicle_ahead = true;
            }
        }

        let angle = cfg.probe_angle.to_radians();
        let right_angled = rotate_about_up(forward, angle);
        let left_angled = rotate_about_up(forward, -angle);

        // Right forward pair.
        let right_origin = front + right * cfg.side_offset;
        match world.cast(right_origin, forward, cfg.forward_range) {
            Some(hit) if is_obstacle(hit.tag) => {
                report.detections += 1;
                report.avoidance_bias -= cfg.avoid_bias;
            }
            Some(_) => {}
            None => {
                if let Some(hit) = world.cast(right_origin, right_angled, cfg.forward_range) {
                    if is_obstacle(hit.tag) {
                        report.detections += 1;
                        report.avoidance_bias -= ANGLED_BIAS;
                    }
                }
            }
        }

        // Left forward pair.
        let left_origin = front - right * cfg.side_offset;
        match world.cast(left_origin, forward, cfg.forward_range) {
            Some(hit) if is_obstacle(hit.tag) => {
                report.detections += 1;
                report.avoidance_bias += cfg.avoid_bias;
            }
            Some(_) => {}
            None => {
                if let Some(hit) = world.cast(left_origin, left_angled, cfg.forward_range) {
                    if is_obstacle(hit.tag) {
                        report.detections += 1;
                        report.avoidance_bias += ANGLED_BIAS;
                    }
                }
            }
        }

        // Front fallback: only when every other probe left the bias at
        // zero; the hit normal decides which way to steer.
        if report.avoidance_bias == 0.0 {
            if let Some(hit) = world.cast(front, forward, cfg.forward_range) {
                if is_obstacle(hit.tag) {
                    report.avoidance_bias += if hit.normal.x < 0.0 { 1.0 } else { -1.0 };
                }
            }
        }

        report
    }
}

/// Whether a tag should trigger the forward obstacle probes.
/// Other vehicles are handled by the front centre probe alone.
fn is_obstacle(tag: HitTag) -> bool {
    !matches!(tag, HitTag::Untagged | HitTag::Vehicle)
}
