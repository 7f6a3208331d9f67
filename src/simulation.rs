use crate::progress::{RaceStanding, RaceTracker};
use crate::route::{AssignmentMode, Route, RouteAssigner, RouteError, RouteSet};
use crate::sensors::RaycastWorld;
use crate::signal::{SignalState, SignalTiming, StopZone, TrafficSignal, ZoneBounds};
use crate::vehicle::{Vehicle, VehicleAttributes};
use crate::{VehicleId, VehicleSet};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// The standard deviation of the random top speed factor.
const SPEED_FACTOR_DEV: f64 = 0.1;

/// The bounds the random top speed factor is clamped to.
const SPEED_FACTOR_MIN: f64 = 0.75;
const SPEED_FACTOR_MAX: f64 = 1.25;

/// A traffic signal paired with the stop zone that feeds it.
struct Intersection {
    signal: TrafficSignal,
    zone: StopZone,
}

/// A racing simulation, which is advanced in time steps of fixed or
/// variable duration.
#[derive(Default)]
pub struct Simulation {
    /// The routes vehicles drive along.
    routes: RouteSet,
    /// The vehicles within the simulation.
    vehicles: VehicleSet,
    /// The signalled intersections on the track.
    intersections: Vec<Intersection>,
    /// The race clock, finish order and leaderboard.
    tracker: RaceTracker,
    /// The policy assigning routes to newly added vehicles.
    assigner: RouteAssigner,
    /// The number of steps taken so far.
    frame: usize,
}

impl Simulation {
    /// Creates a new, empty simulation.
    pub fn new() -> Self {
        Default::default()
    }

    /// The number of steps taken so far.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Sets the policy used to pick routes for newly added vehicles.
    pub fn set_assignment_mode(&mut self, mode: AssignmentMode) {
        self.assigner = RouteAssigner::new(mode);
    }

    /// Registers a route, returning its index.
    pub fn add_route(&mut self, route: Route) -> usize {
        self.routes.add(route)
    }

    /// Loads routes from JSON, replacing any already registered.
    pub fn load_routes(&mut self, json: &str) -> Result<(), RouteError> {
        self.routes = RouteSet::from_json(json)?;
        log::info!("loaded {} route(s)", self.routes.count());
        Ok(())
    }

    /// Gets the registered routes.
    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    /// Adds a vehicle to the simulation, placed at the start of a route
    /// chosen by the assignment policy, and returns its ID.
    pub fn add_vehicle(&mut self, attributes: &VehicleAttributes) -> VehicleId {
        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes));
        let route_index = self
            .assigner
            .next_index(self.routes.count(), &mut rand::thread_rng());

        let vehicle = &mut self.vehicles[id];
        match vehicle.assign_route(&self.routes, route_index, 0) {
            Ok(()) => vehicle.spawn_at_route_start(&self.routes),
            Err(err) => log::warn!("vehicle `{}` has no route: {}", vehicle.name(), err),
        }
        id
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        self.vehicles.remove(id);
    }

    /// Gets the vehicle with the given ID.
    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Adds a signalled intersection, returning its index.
    pub fn add_intersection(&mut self, timing: SignalTiming, bounds: ZoneBounds) -> usize {
        self.intersections.push(Intersection {
            signal: TrafficSignal::new(timing),
            zone: StopZone::new(bounds),
        });
        self.intersections.len() - 1
    }

    /// The phase the given intersection's signal is showing.
    pub fn signal_state(&self, intersection: usize) -> Option<SignalState> {
        self.intersections.get(intersection).map(|i| i.signal.state())
    }

    /// The number of vehicles held at the given intersection.
    pub fn waiting_count(&self, intersection: usize) -> usize {
        self.intersections
            .get(intersection)
            .map(|i| i.zone.waiting_count())
            .unwrap_or(0)
    }

    /// Enables or disables an intersection's stop zone,
    /// releasing any vehicles it was holding.
    pub fn set_intersection_enabled(&mut self, intersection: usize, enabled: bool) {
        if let Some(inter) = self.intersections.get_mut(intersection) {
            let events = inter.zone.set_enabled(enabled);
            for id in events.released {
                if let Some(vehicle) = self.vehicles.get_mut(id) {
                    vehicle.resume();
                }
            }
        }
    }

    /// Gets the race tracker.
    pub fn tracker(&self) -> &RaceTracker {
        &self.tracker
    }

    /// Builds the current leaderboard over the active vehicles.
    pub fn standings(&self) -> Vec<RaceStanding> {
        self.tracker.standings(self.vehicles.values())
    }

    /// The number of vehicles still racing.
    pub fn active_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether every vehicle has finished and the race can be reset.
    pub fn race_complete(&self) -> bool {
        self.vehicles.is_empty() && self.tracker.finished_count() > 0
    }

    /// Moves a vehicle onto the given route at the caller's explicit
    /// request; the switch permission flag only governs the bulk and
    /// random helpers.
    pub fn switch_route(&mut self, id: VehicleId, route_index: usize) -> Result<(), RouteError> {
        match self.vehicles.get_mut(id) {
            Some(vehicle) => vehicle.assign_route(&self.routes, route_index, 0),
            None => Ok(()),
        }
    }

    /// Moves every switchable vehicle onto the given route.
    pub fn switch_all_to_route(&mut self, route_index: usize) -> Result<(), RouteError> {
        self.routes.get(route_index)?;
        for vehicle in self.vehicles.values_mut() {
            if vehicle.can_switch_routes() {
                vehicle.assign_route(&self.routes, route_index, 0)?;
            }
        }
        Ok(())
    }

    /// Moves a vehicle onto a random route other than its current one.
    /// Does nothing for a vehicle that cannot switch routes.
    pub fn switch_to_random_route(&mut self, id: VehicleId) {
        let count = self.routes.count();
        if count <= 1 {
            return;
        }
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            if !vehicle.can_switch_routes() {
                return;
            }
            let mut rng = rand::thread_rng();
            let offset = rng.gen_range(1..count);
            let route_index = (vehicle.route_index() + offset) % count;
            if let Err(err) = vehicle.assign_route(&self.routes, route_index, 0) {
                log::warn!("vehicle `{}` kept its route: {}", vehicle.name(), err);
            }
        }
    }

    /// Scatters every switchable vehicle across the routes at random.
    pub fn redistribute_randomly(&mut self) {
        let count = self.routes.count();
        if count == 0 {
            return;
        }
        let mut rng = rand::thread_rng();
        for vehicle in self.vehicles.values_mut() {
            if !vehicle.can_switch_routes() {
                continue;
            }
            let route_index = rng.gen_range(0..count);
            if let Err(err) = vehicle.assign_route(&self.routes, route_index, 0) {
                log::warn!("vehicle `{}` kept its route: {}", vehicle.name(), err);
            }
        }
    }

    /// Scales every vehicle's top speed by a random factor drawn from a
    /// normal distribution around 1, clamped to a sensible range.
    pub fn randomise_top_speeds(&mut self) {
        let dist = Normal::new(1.0, SPEED_FACTOR_DEV).expect("invalid distribution");
        let mut rng = rand::thread_rng();
        for vehicle in self.vehicles.values_mut() {
            let factor = dist.sample(&mut rng).clamp(SPEED_FACTOR_MIN, SPEED_FACTOR_MAX);
            vehicle.scale_top_speed(factor);
        }
    }

    /// Advances the simulation by `dt` seconds. `world` is the raycast
    /// service the vehicles' sensors probe; it must reflect the state
    /// of the world as of the previous step.
    pub fn step(&mut self, dt: f64, world: &dyn RaycastWorld) {
        self.tracker.step(dt);
        self.step_intersections(dt);
        self.step_vehicles(dt, world);
        self.frame += 1;
    }

    /// Advances signals and maintains their stop zones. A signal turning
    /// green releases every held vehicle and deactivates its zone; the
    /// zone reactivates on yellow, and a vehicle entering it while the
    /// signal shows yellow or red is held. An exit always wins over a
    /// hold, so a vehicle teleported out of a zone is resumed.
    fn step_intersections(&mut self, dt: f64) {
        for inter in &mut self.intersections {
            match inter.signal.step(dt, inter.zone.waiting_count()) {
                Some(SignalState::Green) => {
                    for id in inter.zone.release_all() {
                        if let Some(vehicle) = self.vehicles.get_mut(id) {
                            vehicle.resume();
                        }
                    }
                    inter.zone.set_enabled(false);
                }
                Some(SignalState::Yellow) => {
                    inter.zone.set_enabled(true);
                }
                _ => {}
            }

            let events = inter
                .zone
                .update(self.vehicles.iter().map(|(id, v)| (id, v.pose().position)));
            for id in events.released {
                if let Some(vehicle) = self.vehicles.get_mut(id) {
                    vehicle.resume();
                }
            }
            for id in events.entered {
                if inter.signal.state() == SignalState::Green {
                    if let Some(vehicle) = self.vehicles.get_mut(id) {
                        // A green entry is only resumed if it is stopped;
                        // resuming a moving vehicle would kick it.
                        if !vehicle.can_move() {
                            vehicle.resume();
                        }
                    }
                } else {
                    inter.zone.hold(id);
                    if let Some(vehicle) = self.vehicles.get_mut(id) {
                        vehicle.stop();
                    }
                }
            }
        }
    }

    /// Ticks every vehicle's controller, integrates the resulting drive
    /// commands, then records finishers and retires them from the race.
    fn step_vehicles(&mut self, dt: f64, world: &dyn RaycastWorld) {
        let mut finished = vec![];
        for (id, vehicle) in &mut self.vehicles {
            let output = vehicle.tick(dt, &self.routes, world);
            if output.lap_completed {
                log::debug!(
                    "vehicle `{}` completed lap {}",
                    vehicle.name(),
                    vehicle.laps_completed()
                );
            }
            if output.finished {
                let position = self.tracker.record_finish(id, vehicle.name());
                log::info!(
                    "vehicle `{}` finished in position {} at {:.1} s",
                    vehicle.name(),
                    position,
                    self.tracker.elapsed()
                );
                finished.push(id);
            }
        }
        for vehicle in self.vehicles.values_mut() {
            vehicle.integrate(dt);
        }
        for id in finished {
            self.vehicles.remove(id);
        }
    }
}
