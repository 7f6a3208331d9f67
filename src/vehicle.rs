use crate::math::{clamp01, rotate_about_up, smooth_damp, Pose, Vector3d};
use crate::route::{Route, RouteError, RouteSet};
use crate::sensors::{RaycastWorld, SensorConfig, SensorRig};
use crate::VehicleId;
use cgmath::{InnerSpace, Zero};
pub use speed::SpeedControl;

mod speed;

/// The steering clamp in degrees.
const STEER_CLAMP: f64 = 25.0; // deg

/// Extra steering authority gained at top speed.
const HIGH_SPEED_STEER_GAIN: f64 = 0.2;

/// The brake torque applied while over the working speed limit.
const OVERSPEED_BRAKE: f64 = 200.0;

/// Multiplier on the deceleration magnitude for the hard brake at a stop.
const HARD_BRAKE_FACTOR: f64 = 999.0;

/// The speed below which a vehicle counts as stuck, in m/s.
const STUCK_SPEED: f64 = 2.0; // m/s

/// The rate at which motor torque eases up to its maximum, in 1/s.
const TORQUE_EASE_RATE: f64 = 2.0;

/// The fraction of maximum torque applied immediately on resume.
const RESUME_THROTTLE: f64 = 0.6;

/// The torque fraction applied when the resume check finds the vehicle slow.
const ENSURE_THROTTLE: f64 = 0.9;

/// The forward velocity kick applied on resume, in m/s.
const RESUME_KICK: f64 = 1.0; // m/s

/// The stronger kick applied when the resume check fires, in m/s.
const ENSURE_KICK: f64 = 5.0; // m/s

/// The speed below which the resume check reapplies an impulse, in m/s.
const ENSURE_MIN_SPEED: f64 = 0.5; // m/s

/// The delay before the resume check may first fire, in s.
const ENSURE_DELAY: f64 = 0.05; // s

/// The lifetime of a resume check, in s.
const ENSURE_WINDOW: f64 = 0.25; // s

/// Conversion from motor torque to acceleration, in m/s^2 per unit torque.
const TORQUE_TO_ACC: f64 = 0.02;

/// Conversion from brake torque to deceleration, in m/s^2 per unit torque.
const BRAKE_TO_DEC: f64 = 0.02;

/// The effective wheel base used for yaw integration, in m.
const WHEEL_BASE: f64 = 2.5; // m

/// Per-step retention of lateral velocity, standing in for tyre grip.
const LATERAL_DAMPING: f64 = 0.7;

/// A simulated racing vehicle and its local driving controller.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// The driver's display name.
    name: String,
    /// The maximum speed in m/s.
    top_speed: f64,
    /// The steering gain applied to the lateral offset fraction.
    max_steer: f64,
    /// The maximum motor torque.
    max_torque: f64,
    /// The deceleration authority, a negative number.
    deceleration: f64,
    /// The distance at which a waypoint counts as reached, in m.
    arrive_distance: f64,
    /// How long the vehicle may be near-stationary before it is
    /// teleported back onto its route, in s.
    respawn_wait: f64,
    /// The number of laps required to finish the race.
    lap_target: u32,
    /// Whether external callers may switch this vehicle's route.
    can_switch_routes: bool,
    /// The probability weight for externally driven route switches.
    switch_probability: f64,
    /// The look-ahead speed planner parameters.
    speed_control: SpeedControl,
    /// The sensor array.
    rig: SensorRig,
    /// The pose in world space.
    pose: Pose,
    /// The velocity in m/s.
    velocity: Vector3d,
    /// The index of the assigned route.
    route_index: usize,
    /// The index of the waypoint currently being driven towards.
    waypoint_index: usize,
    /// The number of waypoints left in the current lap.
    remaining: usize,
    /// The number of completed laps.
    laps: u32,
    /// Set once the finish event has been emitted; never cleared.
    finish_notified: bool,
    /// Whether the vehicle is allowed to move.
    can_move: bool,
    /// Whether the vehicle is actively braking to a stop.
    braking: bool,
    /// Whether the current stop was caused by a vehicle ahead.
    stopped_by_vehicle: bool,
    /// Accumulated time spent near-stationary, in s.
    stuck_timer: f64,
    /// The planned target speed for this tick, in m/s.
    target_speed: f64,
    /// The smoothed working speed limit, in m/s.
    working_max_speed: f64,
    /// The rate of change of the working speed limit.
    speed_damp_vel: f64,
    /// The smoothed motor torque.
    torque_smooth: f64,
    /// The most recent drive command.
    command: DriveCommand,
    /// The pending deferred resume check, if any.
    resume_check: Option<ResumeCheck>,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Debug)]
pub struct VehicleAttributes {
    /// The driver's display name.
    pub name: String,
    /// The maximum speed in m/s.
    pub top_speed: f64,
    /// The steering gain applied to the lateral offset fraction.
    pub max_steer: f64,
    /// The maximum motor torque.
    pub max_torque: f64,
    /// The deceleration authority, a negative number.
    pub deceleration: f64,
    /// The distance at which a waypoint counts as reached, in m.
    pub arrive_distance: f64,
    /// How long the vehicle may be near-stationary before recovery, in s.
    pub respawn_wait: f64,
    /// The number of laps required to finish the race.
    pub lap_target: u32,
    /// Whether external callers may switch this vehicle's route.
    pub can_switch_routes: bool,
    /// The probability weight for externally driven route switches.
    pub switch_probability: f64,
    /// The look-ahead speed planner parameters.
    pub speed_control: SpeedControl,
    /// The sensor array configuration.
    pub sensors: SensorConfig,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            name: String::new(),
            top_speed: 150.0,
            max_steer: 10.0,
            max_torque: 500.0,
            deceleration: -55.0,
            arrive_distance: 20.0,
            respawn_wait: 1.5,
            lap_target: 3,
            can_switch_routes: true,
            switch_probability: 0.05,
            speed_control: Default::default(),
            sensors: Default::default(),
        }
    }
}

/// The actuation outputs handed to the external physics collaborator
/// each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriveCommand {
    /// The steering angle in degrees; positive steers right.
    pub steer_angle: f64,
    /// The motor torque to apply.
    pub motor_torque: f64,
    /// The brake torque to apply.
    pub brake_torque: f64,
}

/// The per-tick results of the driving controller.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TickOutput {
    /// The drive command for this tick.
    pub command: DriveCommand,
    /// Whether a lap was completed this tick.
    pub lap_completed: bool,
    /// Whether the one-time finish event fired this tick.
    pub finished: bool,
}

/// The deferred check scheduled by [Vehicle::resume] that reapplies a
/// stronger impulse if the vehicle failed to get going.
#[derive(Clone, Copy, Debug, Default)]
struct ResumeCheck {
    /// Time since the resume, in s.
    elapsed: f64,
    /// Whether the stronger impulse has already been applied.
    fired: bool,
}

impl Vehicle {
    /// Creates a new vehicle. The caller is expected to assign a route
    /// and position the vehicle before the first tick.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes) -> Self {
        Self {
            id,
            name: attributes.name.clone(),
            top_speed: attributes.top_speed,
            max_steer: attributes.max_steer,
            max_torque: attributes.max_torque,
            deceleration: attributes.deceleration,
            arrive_distance: attributes.arrive_distance,
            respawn_wait: attributes.respawn_wait,
            lap_target: attributes.lap_target,
            can_switch_routes: attributes.can_switch_routes,
            switch_probability: attributes.switch_probability,
            speed_control: attributes.speed_control,
            rig: SensorRig::new(attributes.sensors),
            pose: Pose::looking_along(cgmath::Point3::new(0.0, 0.0, 0.0), Vector3d::unit_z()),
            velocity: Vector3d::zero(),
            route_index: 0,
            waypoint_index: 0,
            remaining: 0,
            laps: 0,
            finish_notified: false,
            can_move: true,
            braking: false,
            stopped_by_vehicle: false,
            stuck_timer: 0.0,
            target_speed: attributes.top_speed,
            working_max_speed: attributes.top_speed,
            speed_damp_vel: 0.0,
            torque_smooth: 0.0,
            command: Default::default(),
            resume_check: None,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the driver's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The vehicle's pose in world space.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// The vehicle's velocity in m/s.
    pub fn velocity(&self) -> Vector3d {
        self.velocity
    }

    /// The vehicle's speed in m/s.
    pub fn speed(&self) -> f64 {
        self.velocity.magnitude()
    }

    /// The index of the assigned route.
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    /// The index of the waypoint currently being driven towards.
    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    /// The number of waypoints left in the current lap.
    pub fn remaining_waypoints(&self) -> usize {
        self.remaining
    }

    /// The number of completed laps.
    pub fn laps_completed(&self) -> u32 {
        self.laps
    }

    /// Whether the one-time finish notification has been emitted.
    pub fn has_finished(&self) -> bool {
        self.finish_notified
    }

    /// Whether the vehicle is currently allowed to move.
    pub fn can_move(&self) -> bool {
        self.can_move
    }

    /// Whether the vehicle is braking to a stop.
    pub fn is_braking(&self) -> bool {
        self.braking
    }

    /// The planned target speed for the most recent tick, in m/s.
    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    /// The most recent drive command, for the actuation collaborator.
    pub fn last_command(&self) -> DriveCommand {
        self.command
    }

    /// Whether external callers may switch this vehicle's route.
    pub fn can_switch_routes(&self) -> bool {
        self.can_switch_routes
    }

    /// The probability weight for externally driven route switches.
    /// Carried from configuration; the controller itself never switches.
    pub fn switch_probability(&self) -> f64 {
        self.switch_probability
    }

    /// Scales the vehicle's top speed by the given factor.
    pub(crate) fn scale_top_speed(&mut self, factor: f64) {
        self.top_speed *= factor;
    }

    /// Rebinds the vehicle to a route, resetting its waypoint progress.
    /// Fails without touching the current assignment if the route is
    /// missing or has too few waypoints.
    pub(crate) fn assign_route(
        &mut self,
        routes: &RouteSet,
        route_index: usize,
        start_index: usize,
    ) -> Result<(), RouteError> {
        let route = routes.get(route_index)?;
        if !route.is_valid() {
            return Err(RouteError::TooFewWaypoints(route.name().to_owned()));
        }
        self.route_index = route_index;
        self.waypoint_index = start_index.min(route.len() - 1);
        self.remaining = route.len() - self.waypoint_index;
        Ok(())
    }

    /// Places the vehicle at the start of its route, facing the second
    /// waypoint, with zero velocity.
    pub(crate) fn spawn_at_route_start(&mut self, routes: &RouteSet) {
        let route = match routes.get(self.route_index) {
            Ok(route) if route.is_valid() => route,
            _ => return,
        };
        if let (Some(first), Some(second)) = (route.waypoint(0), route.waypoint(1)) {
            self.pose = Pose::looking_along(first, second - first);
            self.velocity = Vector3d::zero();
            self.waypoint_index = 0;
            self.remaining = route.len();
        }
    }

    /// Brings the vehicle to an immediate halt and holds it there.
    /// Cancels any pending resume check. Clears the follow-stop flag,
    /// so the hold belongs to the caller until it is released; the
    /// follow branch in [Vehicle::tick] re-sets the flag itself.
    pub(crate) fn stop(&mut self) {
        self.can_move = false;
        self.braking = true;
        self.stopped_by_vehicle = false;
        self.command = self.hold_command();
        self.stuck_timer = 0.0;
        self.resume_check = None;
    }

    /// Releases a held vehicle: brakes off, a partial throttle kick and
    /// a forward impulse, plus a deferred check that shoves the vehicle
    /// again if it fails to get going. Calling this while a check is
    /// already pending restarts the check.
    pub(crate) fn resume(&mut self) {
        self.can_move = true;
        self.braking = false;
        self.stopped_by_vehicle = false;
        self.torque_smooth = f64::max(self.torque_smooth, RESUME_THROTTLE * self.max_torque);
        self.command = DriveCommand {
            steer_angle: self.command.steer_angle,
            motor_torque: self.torque_smooth,
            brake_torque: 0.0,
        };
        self.velocity += self.pose.forward * RESUME_KICK;
        self.resume_check = Some(ResumeCheck::default());
    }

    /// Runs one control tick: speed planning, sensing, steering,
    /// waypoint progress and stuck recovery. The returned output carries
    /// the drive command and any lap/finish events from this tick.
    pub(crate) fn tick(
        &mut self,
        dt: f64,
        routes: &RouteSet,
        world: &dyn RaycastWorld,
    ) -> TickOutput {
        let mut output = TickOutput::default();
        let route = routes
            .get(self.route_index)
            .ok()
            .filter(|route| route.is_valid());

        // Speed planning over the look-ahead window. With no usable
        // route the vehicle degrades to driving straight at top speed.
        self.target_speed = match route {
            Some(route) => speed::plan_target_speed(
                &self.speed_control,
                route,
                self.waypoint_index,
                &self.pose,
                self.top_speed,
            ),
            None => self.top_speed,
        };

        // The sensor sweep happens before steering is finalised.
        let report = self.rig.scan(&self.pose, world);

        // Car following: halt behind a vehicle ahead, release once it
        // clears. Only a follow-stop is released here; a signal hold
        // stays in force until the stop zone lifts it, so a vehicle
        // already held never reclassifies its stop as a follow-stop.
        if report.vehicle_ahead && self.can_move && !self.stopped_by_vehicle {
            self.stop();
            self.stopped_by_vehicle = true;
        } else if self.stopped_by_vehicle && !report.vehicle_ahead {
            self.resume();
        }

        if !self.can_move || self.braking {
            self.command = self.hold_command();
            output.command = self.command;
            return output;
        }

        let mut steer = match route {
            Some(route) => self.follow_route(route, &mut output),
            None => 0.0,
        };

        // Any obstacle detection overrides the waypoint steering.
        if report.overrides_steering() {
            steer = report.avoidance_bias;
        }

        // Ease the working speed limit towards the planned target, then
        // drive or brake relative to it.
        self.working_max_speed = smooth_damp(
            self.working_max_speed,
            self.target_speed,
            &mut self.speed_damp_vel,
            self.speed_control.smooth_time,
            dt,
        );
        let speed = self.velocity.magnitude();
        let (motor, brake) = if speed <= self.working_max_speed {
            self.torque_smooth +=
                (self.max_torque - self.torque_smooth) * clamp01(TORQUE_EASE_RATE * dt);
            (self.torque_smooth, 0.0)
        } else {
            (0.0, OVERSPEED_BRAKE)
        };
        self.command = DriveCommand {
            steer_angle: steer,
            motor_torque: motor,
            brake_torque: brake,
        };

        self.poll_resume_check(dt);
        if let Some(route) = route {
            self.recover_if_stuck(dt, route);
        }

        output.command = self.command;
        output
    }

    /// Steers towards the current waypoint and advances the route
    /// progress on arrival, including lap wrap and the finish latch.
    fn follow_route(&mut self, route: &Route, output: &mut TickOutput) -> f64 {
        let target = match route.waypoint(self.waypoint_index) {
            Some(target) => target,
            None => {
                self.waypoint_index = 0;
                return 0.0;
            }
        };

        let local = self.pose.local_offset(target);
        let distance = local.magnitude();

        // A degenerate offset means no steering correction this tick.
        let mut steer = 0.0;
        if distance > 1e-9 {
            steer = ((local.x / distance) * self.max_steer).clamp(-STEER_CLAMP, STEER_CLAMP);
            let speed_fraction = clamp01(self.velocity.magnitude() / self.top_speed);
            steer *= 1.0 + speed_fraction * HIGH_SPEED_STEER_GAIN;
        }

        if distance <= self.arrive_distance {
            self.advance_waypoint(route, output);
        }
        steer
    }

    /// Moves on to the next waypoint, wrapping into a new lap at the end
    /// of the route. The finish latch guarantees the finish event is
    /// emitted at most once regardless of further laps.
    fn advance_waypoint(&mut self, route: &Route, output: &mut TickOutput) {
        self.waypoint_index += 1;
        self.remaining = self.remaining.saturating_sub(1);
        if self.waypoint_index >= route.len() {
            self.waypoint_index = 0;
            self.remaining = route.len();
            self.laps += 1;
            output.lap_completed = true;
            if !self.finish_notified && self.laps >= self.lap_target {
                self.finish_notified = true;
                output.finished = true;
            }
        }
    }

    /// Polls the deferred resume check, shoving the vehicle once more if
    /// it is still crawling shortly after a resume.
    fn poll_resume_check(&mut self, dt: f64) {
        if let Some(check) = self.resume_check.as_mut() {
            check.elapsed += dt;
            if check.elapsed >= ENSURE_DELAY
                && !check.fired
                && self.velocity.magnitude() < ENSURE_MIN_SPEED
            {
                check.fired = true;
                self.torque_smooth =
                    f64::max(self.torque_smooth, ENSURE_THROTTLE * self.max_torque);
                self.command.motor_torque = self.torque_smooth;
                self.velocity += self.pose.forward * ENSURE_KICK;
            }
            if check.elapsed >= ENSURE_WINDOW {
                self.resume_check = None;
            }
        }
    }

    /// Teleports a near-stationary vehicle back onto its route once the
    /// respawn wait elapses: to the waypoint behind its current target,
    /// facing the target, with velocity zeroed.
    fn recover_if_stuck(&mut self, dt: f64, route: &Route) {
        if self.velocity.magnitude() >= STUCK_SPEED {
            self.stuck_timer = 0.0;
            return;
        }
        self.stuck_timer += dt;
        if self.stuck_timer < self.respawn_wait {
            return;
        }

        let len = route.len();
        let target = self.waypoint_index.min(len - 1);
        let behind = if target == 0 { len - 1 } else { target - 1 };
        if let (Some(position), Some(ahead)) = (route.waypoint(behind), route.waypoint(target)) {
            log::debug!(
                "vehicle `{}` stuck; recovering to waypoint {} of route {}",
                self.name,
                behind,
                self.route_index
            );
            self.pose = Pose::looking_along(position, ahead - position);
            self.velocity = Vector3d::zero();
        }
        self.stuck_timer = 0.0;
    }

    /// The command that holds a stopped vehicle in place.
    fn hold_command(&self) -> DriveCommand {
        DriveCommand {
            steer_angle: 0.0,
            motor_torque: 0.0,
            brake_torque: self.deceleration.abs() * HARD_BRAKE_FACTOR,
        }
    }

    /// Integrates the drive command into the vehicle's pose and
    /// velocity. This is a deliberately simple point-mass stand-in for
    /// the external physics collaborator: torque maps linearly to
    /// acceleration, steering yaws the heading at speed, and lateral
    /// velocity decays each step.
    pub(crate) fn integrate(&mut self, dt: f64) {
        if !self.can_move || self.braking {
            let speed = self.velocity.magnitude();
            let decel = self.command.brake_torque * BRAKE_TO_DEC * dt;
            let new_speed = f64::max(speed - decel, 0.0);
            self.velocity = if speed > 1e-9 {
                self.velocity * (new_speed / speed)
            } else {
                Vector3d::zero()
            };
            self.pose.position += self.velocity * dt;
            return;
        }

        let forward_speed = self.velocity.dot(self.pose.forward);
        let yaw = self.command.steer_angle.to_radians() * forward_speed / WHEEL_BASE * dt;
        self.pose.forward = rotate_about_up(self.pose.forward, yaw).normalize();

        let acc = self.command.motor_torque * TORQUE_TO_ACC
            - self.command.brake_torque * BRAKE_TO_DEC;
        let new_speed = f64::max(forward_speed + acc * dt, 0.0);

        let lateral = self.velocity - self.pose.forward * self.velocity.dot(self.pose.forward);
        self.velocity = self.pose.forward * new_speed + lateral * LATERAL_DAMPING;
        self.pose.position += self.velocity * dt;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point3d;
    use crate::route::RouteAttributes;
    use slotmap::Key;

    /// A world with nothing in it.
    struct OpenWorld;

    impl RaycastWorld for OpenWorld {
        fn cast(
            &self,
            _origin: Point3d,
            _direction: Vector3d,
            _max_dist: f64,
        ) -> Option<crate::sensors::RayHit> {
            None
        }
    }

    /// A world where every probe sees the rear of another vehicle.
    struct BlockedRoad;

    impl RaycastWorld for BlockedRoad {
        fn cast(
            &self,
            _origin: Point3d,
            _direction: Vector3d,
            _max_dist: f64,
        ) -> Option<crate::sensors::RayHit> {
            Some(crate::sensors::RayHit {
                tag: crate::sensors::HitTag::VehicleRear,
                normal: -Vector3d::unit_z(),
            })
        }
    }

    fn square_routes() -> RouteSet {
        let mut routes = RouteSet::new();
        routes.add(Route::new(&RouteAttributes {
            name: "square",
            waypoints: &[
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(100.0, 0.0, 0.0),
                Point3d::new(100.0, 0.0, 100.0),
                Point3d::new(0.0, 0.0, 100.0),
            ],
            recommended_speed: None,
            priority: 5,
            tags: &[],
        }));
        routes
    }

    fn vehicle(routes: &RouteSet, lap_target: u32) -> Vehicle {
        let mut vehicle = Vehicle::new(
            VehicleId::null(),
            &VehicleAttributes {
                name: "test".to_owned(),
                lap_target,
                ..Default::default()
            },
        );
        vehicle.assign_route(routes, 0, 0).unwrap();
        vehicle.spawn_at_route_start(routes);
        vehicle
    }

    /// Ticks the vehicle once while parked on top of its current target
    /// waypoint, forcing exactly one waypoint advance.
    fn tick_at_waypoint(vehicle: &mut Vehicle, routes: &RouteSet) -> TickOutput {
        let route = routes.get(0).unwrap();
        let target = route.waypoint(vehicle.waypoint_index).unwrap();
        vehicle.pose = Pose::looking_along(target, Vector3d::unit_z());
        vehicle.stuck_timer = 0.0;
        vehicle.tick(0.02, routes, &OpenWorld)
    }

    #[test]
    fn advancing_through_route_wraps_and_counts_laps() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 5);
        let len = routes.get(0).unwrap().len();

        for expected in 1..len {
            tick_at_waypoint(&mut vehicle, &routes);
            assert_eq!(vehicle.waypoint_index(), expected);
            assert_eq!(vehicle.remaining_waypoints(), len - expected);
        }

        let output = tick_at_waypoint(&mut vehicle, &routes);
        assert!(output.lap_completed);
        assert_eq!(vehicle.waypoint_index(), 0);
        assert_eq!(vehicle.remaining_waypoints(), len);
        assert_eq!(vehicle.laps_completed(), 1);
    }

    #[test]
    fn finish_event_fires_exactly_once() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 1);
        let len = routes.get(0).unwrap().len();

        let mut finish_events = 0;
        for _ in 0..3 * len {
            let output = tick_at_waypoint(&mut vehicle, &routes);
            if output.finished {
                finish_events += 1;
            }
        }

        assert_eq!(finish_events, 1);
        assert!(vehicle.has_finished());
        assert_eq!(vehicle.laps_completed(), 3);
    }

    #[test]
    fn stuck_vehicle_recovers_behind_its_target() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);
        vehicle.waypoint_index = 2;

        // Held stationary past the respawn wait.
        for _ in 0..3 {
            vehicle.tick(0.5, &routes, &OpenWorld);
        }

        let expected = routes.get(0).unwrap().waypoint(1).unwrap();
        assert_eq!(vehicle.pose().position, expected);
        assert_eq!(vehicle.speed(), 0.0);
        assert_eq!(vehicle.stuck_timer, 0.0);
    }

    #[test]
    fn stuck_recovery_from_first_waypoint_uses_last() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);
        // Drop the vehicle far from waypoint 0 so it cannot arrive.
        vehicle.pose = Pose::looking_along(Point3d::new(500.0, 0.0, 500.0), Vector3d::unit_z());

        for _ in 0..4 {
            vehicle.tick(0.5, &routes, &OpenWorld);
        }

        let expected = routes.get(0).unwrap().waypoint(3).unwrap();
        assert_eq!(vehicle.pose().position, expected);
    }

    #[test]
    fn resume_check_shoves_a_vehicle_that_stalls() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);

        vehicle.stop();
        assert!(!vehicle.can_move());

        vehicle.resume();
        // Simulated static friction: the resume kick went nowhere.
        vehicle.velocity = Vector3d::zero();

        vehicle.tick(0.06, &routes, &OpenWorld);
        assert!(vehicle.speed() >= ENSURE_KICK - 1e-9);
        assert!(vehicle.resume_check.map(|c| c.fired).unwrap_or(false));

        // The check expires after its window.
        vehicle.tick(0.25, &routes, &OpenWorld);
        assert!(vehicle.resume_check.is_none());
    }

    #[test]
    fn an_external_hold_outlasts_the_blocking_car() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);

        // Follow-stopped behind another car.
        vehicle.tick(0.02, &routes, &BlockedRoad);
        assert!(vehicle.stopped_by_vehicle);
        assert!(!vehicle.can_move());

        // A signal hold arrives while the car ahead is still there.
        vehicle.stop();

        // The car ahead drives off, but the hold has not been released,
        // so the vehicle must stay put.
        vehicle.tick(0.02, &routes, &OpenWorld);
        assert!(!vehicle.can_move());
        assert!(!vehicle.stopped_by_vehicle);

        vehicle.resume();
        assert!(vehicle.can_move());
    }

    #[test]
    fn stop_cancels_a_pending_resume_check() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);

        vehicle.resume();
        assert!(vehicle.resume_check.is_some());
        vehicle.stop();
        assert!(vehicle.resume_check.is_none());
    }

    #[test]
    fn held_vehicle_outputs_hard_brake_only() {
        let routes = square_routes();
        let mut vehicle = vehicle(&routes, 3);

        vehicle.stop();
        let output = vehicle.tick(0.02, &routes, &OpenWorld);
        assert_eq!(output.command.motor_torque, 0.0);
        assert!(output.command.brake_torque >= 55.0 * 999.0 - 1e-6);
    }

    #[test]
    fn invalid_route_assignment_keeps_previous_route() {
        let mut routes = square_routes();
        routes.add(Route::new(&RouteAttributes {
            name: "stub",
            waypoints: &[Point3d::new(0.0, 0.0, 0.0)],
            recommended_speed: None,
            priority: 5,
            tags: &[],
        }));
        let mut vehicle = vehicle(&routes, 3);
        vehicle.waypoint_index = 2;

        assert!(vehicle.assign_route(&routes, 1, 0).is_err());
        assert_eq!(vehicle.route_index(), 0);
        assert_eq!(vehicle.waypoint_index(), 2);

        assert!(vehicle.assign_route(&routes, 7, 0).is_err());
        assert_eq!(vehicle.route_index(), 0);
    }

    #[test]
    fn missing_route_degrades_to_straight_driving() {
        let routes = RouteSet::new();
        let mut vehicle = Vehicle::new(VehicleId::null(), &Default::default());

        let output = vehicle.tick(0.02, &routes, &OpenWorld);
        assert_eq!(output.command.steer_angle, 0.0);
        assert_eq!(vehicle.target_speed(), 150.0);
    }
}
