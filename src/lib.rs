pub use cgmath;
pub use progress::{Finish, RaceStanding, RaceTracker};
pub use route::{AssignmentMode, Route, RouteAssigner, RouteAttributes, RouteError, RouteSet};
pub use sensors::{HitTag, RayHit, RaycastWorld, SensorConfig, SensorReport, SensorRig};
pub use signal::{SignalState, SignalTiming, StopZone, TrafficSignal, ZoneBounds, ZoneEvents};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::{DriveCommand, SpeedControl, Vehicle, VehicleAttributes};

pub mod math;
mod progress;
mod route;
mod sensors;
mod signal;
mod simulation;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
