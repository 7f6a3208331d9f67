use crate::math::Point3d;
use crate::VehicleId;
use smallvec::SmallVec;

/// The phase a traffic signal is currently showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalState {
    /// Traffic may proceed.
    Green,
    /// The signal is about to turn red.
    Yellow,
    /// Traffic must stop.
    Red,
}

/// The phase durations of a traffic signal.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalTiming {
    /// The green phase duration in s.
    pub green: f64,
    /// The yellow phase duration in s.
    pub yellow: f64,
    /// The nominal red phase duration in s.
    pub red: f64,
    /// The shortened red phase duration used under congestion, in s.
    pub min_red: f64,
    /// The number of waiting vehicles at which the red phase shortens.
    pub congestion_threshold: usize,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            green: 6.0,
            yellow: 2.0,
            red: 5.0,
            min_red: 2.0,
            congestion_threshold: 5,
        }
    }
}

/// The shortest a signal phase may last, in s. Keeps the phase advance
/// loop finite when a caller configures a zero duration.
const MIN_PHASE: f64 = 1e-3; // s

/// A cycling traffic signal. The red phase duration is chosen afresh on
/// each yellow-to-red transition: the nominal duration normally, the
/// shortened one when enough vehicles are already waiting.
#[derive(Clone, Copy, Debug)]
pub struct TrafficSignal {
    /// The phase durations.
    timing: SignalTiming,
    /// The current phase.
    state: SignalState,
    /// Time spent in the current phase, in s.
    timer: f64,
    /// The duration chosen for the current or upcoming red phase, in s.
    red_duration: f64,
}

impl TrafficSignal {
    /// Creates a signal showing green at the start of its cycle.
    /// Phase durations are floored at a millisecond.
    pub fn new(timing: SignalTiming) -> Self {
        let timing = SignalTiming {
            green: timing.green.max(MIN_PHASE),
            yellow: timing.yellow.max(MIN_PHASE),
            red: timing.red.max(MIN_PHASE),
            min_red: timing.min_red.max(MIN_PHASE),
            ..timing
        };
        Self {
            timing,
            state: SignalState::Green,
            timer: 0.0,
            red_duration: timing.red,
        }
    }

    /// The phase the signal is currently showing.
    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Time remaining in the current phase, in s.
    pub fn time_remaining(&self) -> f64 {
        f64::max(self.phase_duration() - self.timer, 0.0)
    }

    fn phase_duration(&self) -> f64 {
        match self.state {
            SignalState::Green => self.timing.green,
            SignalState::Yellow => self.timing.yellow,
            SignalState::Red => self.red_duration,
        }
    }

    /// Advances the signal by `dt` seconds. `waiting` is the number of
    /// vehicles held at the signal, which decides the red duration when
    /// the red phase begins. Returns the new phase if it changed.
    pub fn step(&mut self, dt: f64, waiting: usize) -> Option<SignalState> {
        let before = self.state;
        self.timer += dt;
        while self.timer >= self.phase_duration() {
            self.timer -= self.phase_duration();
            self.state = match self.state {
                SignalState::Green => SignalState::Yellow,
                SignalState::Yellow => {
                    self.red_duration = if waiting >= self.timing.congestion_threshold {
                        self.timing.min_red
                    } else {
                        self.timing.red
                    };
                    SignalState::Red
                }
                SignalState::Red => SignalState::Green,
            };
        }
        (self.state != before).then_some(self.state)
    }
}

/// An axis-aligned box on the track, used to detect vehicles
/// approaching a signal.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneBounds {
    /// The corner with the smallest coordinates.
    pub min: Point3d,
    /// The corner with the largest coordinates.
    pub max: Point3d,
}

impl ZoneBounds {
    /// Whether the zone contains the given point.
    /// Heights are ignored; the zone extends infinitely up and down.
    pub fn contains(&self, point: Point3d) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

/// The membership changes from one occupancy sweep.
#[derive(Clone, Debug, Default)]
pub struct ZoneEvents {
    /// Vehicles that entered the zone this sweep.
    pub entered: SmallVec<[VehicleId; 8]>,
    /// Vehicles that left the zone this sweep.
    pub departed: SmallVec<[VehicleId; 8]>,
    /// Vehicles that were being held and must now be resumed.
    pub released: SmallVec<[VehicleId; 8]>,
}

/// The stopping area in front of a traffic signal. Tracks which
/// vehicles are inside it and which of those are being held.
#[derive(Clone, Debug)]
pub struct StopZone {
    /// The zone's bounds.
    bounds: ZoneBounds,
    /// Whether the zone is tracking occupancy.
    enabled: bool,
    /// Vehicles currently inside the bounds.
    inside: SmallVec<[VehicleId; 8]>,
    /// Vehicles held at the signal.
    waiting: SmallVec<[VehicleId; 8]>,
}

impl StopZone {
    /// Creates an enabled, empty stop zone.
    pub fn new(bounds: ZoneBounds) -> Self {
        Self {
            bounds,
            enabled: true,
            inside: SmallVec::new(),
            waiting: SmallVec::new(),
        }
    }

    /// Gets the zone's bounds.
    pub fn bounds(&self) -> &ZoneBounds {
        &self.bounds
    }

    /// Whether the zone is tracking occupancy.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The number of vehicles held at the signal.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Whether the given vehicle is held at the signal.
    pub fn is_holding(&self, vehicle: VehicleId) -> bool {
        self.waiting.contains(&vehicle)
    }

    /// Enables or disables occupancy tracking. Disabling reports every
    /// current occupant as departed and every held vehicle as released,
    /// so vehicles are never stranded in a dead zone.
    pub fn set_enabled(&mut self, enabled: bool) -> ZoneEvents {
        let mut events = ZoneEvents::default();
        if self.enabled && !enabled {
            events.departed = std::mem::take(&mut self.inside);
            events.released = std::mem::take(&mut self.waiting);
        }
        self.enabled = enabled;
        events
    }

    /// Sweeps vehicle positions against the bounds, updating membership
    /// and reporting entries and departures. A held vehicle that leaves
    /// the bounds, e.g. by being teleported, is reported as released;
    /// an exit always wins over a hold.
    pub fn update(
        &mut self,
        occupants: impl Iterator<Item = (VehicleId, Point3d)>,
    ) -> ZoneEvents {
        let mut events = ZoneEvents::default();
        if !self.enabled {
            return events;
        }

        let mut inside: SmallVec<[VehicleId; 8]> = SmallVec::new();
        for (id, position) in occupants {
            if self.bounds.contains(position) {
                inside.push(id);
                if !self.inside.contains(&id) {
                    events.entered.push(id);
                }
            }
        }
        for &id in &self.inside {
            if !inside.contains(&id) {
                events.departed.push(id);
                if self.waiting.contains(&id) {
                    self.waiting.retain(|held| *held != id);
                    events.released.push(id);
                }
            }
        }
        self.inside = inside;
        events
    }

    /// Marks a vehicle as held at the signal.
    pub fn hold(&mut self, vehicle: VehicleId) {
        if !self.waiting.contains(&vehicle) {
            self.waiting.push(vehicle);
        }
    }

    /// Releases every held vehicle, returning their IDs.
    pub fn release_all(&mut self) -> SmallVec<[VehicleId; 8]> {
        std::mem::take(&mut self.waiting)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::KeyData;

    fn id(n: u64) -> VehicleId {
        KeyData::from_ffi(n | (1 << 32)).into()
    }

    fn zone() -> StopZone {
        StopZone::new(ZoneBounds {
            min: Point3d::new(0.0, 0.0, 0.0),
            max: Point3d::new(10.0, 0.0, 10.0),
        })
    }

    #[test]
    fn cycle_follows_configured_durations() {
        let mut signal = TrafficSignal::new(Default::default());
        assert_eq!(signal.state(), SignalState::Green);

        // Each transition leaves 0.1 s of residue in the phase timer.
        assert_eq!(signal.step(5.9, 0), None);
        assert_eq!(signal.step(0.2, 0), Some(SignalState::Yellow));
        assert_eq!(signal.step(1.8, 0), None);
        assert_eq!(signal.step(0.2, 0), Some(SignalState::Red));
        assert_eq!(signal.step(4.8, 0), None);
        assert_eq!(signal.step(0.2, 0), Some(SignalState::Green));
    }

    #[test]
    fn congestion_shortens_the_red_phase() {
        let timing = SignalTiming::default();
        let mut signal = TrafficSignal::new(timing);

        // Reach the yellow-to-red edge with a full queue waiting.
        signal.step(timing.green + 0.1, 0);
        assert_eq!(
            signal.step(timing.yellow, timing.congestion_threshold),
            Some(SignalState::Red)
        );

        // Red now lasts min_red rather than the nominal duration;
        // 0.1 s of residue is already on the timer.
        assert_eq!(signal.step(timing.min_red - 0.2, 0), None);
        assert_eq!(signal.step(0.2, 0), Some(SignalState::Green));
    }

    #[test]
    fn zero_durations_are_floored_and_terminate() {
        let mut signal = TrafficSignal::new(SignalTiming {
            green: 0.0,
            yellow: 0.0,
            red: 0.0,
            min_red: 0.0,
            congestion_threshold: 5,
        });

        // Every phase lasts the millisecond floor, so this crosses many
        // full cycles and must still return.
        signal.step(0.5, 0);
        assert!(signal.time_remaining() >= 0.0);
    }

    #[test]
    fn a_large_step_crosses_multiple_phases() {
        let mut signal = TrafficSignal::new(Default::default());
        // 6 + 2 seconds of green and yellow inside a single step.
        assert_eq!(signal.step(8.5, 0), Some(SignalState::Red));
    }

    #[test]
    fn zone_reports_entries_and_departures() {
        let mut zone = zone();

        let events = zone.update([(id(1), Point3d::new(5.0, 0.0, 5.0))].into_iter());
        assert_eq!(events.entered.as_slice(), [id(1)]);
        assert!(events.departed.is_empty());

        // Still inside: no repeated entry event.
        let events = zone.update([(id(1), Point3d::new(6.0, 3.0, 6.0))].into_iter());
        assert!(events.entered.is_empty());
        assert!(events.departed.is_empty());

        let events = zone.update([(id(1), Point3d::new(50.0, 0.0, 5.0))].into_iter());
        assert_eq!(events.departed.as_slice(), [id(1)]);
    }

    #[test]
    fn departing_vehicle_is_released_from_the_waiting_set() {
        let mut zone = zone();
        zone.update([(id(1), Point3d::new(5.0, 0.0, 5.0))].into_iter());
        zone.hold(id(1));
        assert_eq!(zone.waiting_count(), 1);

        // Teleported out of the zone while held.
        let events = zone.update([(id(1), Point3d::new(500.0, 0.0, 5.0))].into_iter());
        assert_eq!(events.released.as_slice(), [id(1)]);
        assert_eq!(zone.waiting_count(), 0);
    }

    #[test]
    fn disabling_reports_occupants_as_departed() {
        let mut zone = zone();
        zone.update(
            [
                (id(1), Point3d::new(1.0, 0.0, 1.0)),
                (id(2), Point3d::new(9.0, 0.0, 9.0)),
            ]
            .into_iter(),
        );
        zone.hold(id(2));

        let events = zone.set_enabled(false);
        assert_eq!(events.departed.len(), 2);
        assert_eq!(events.released.as_slice(), [id(2)]);
        assert_eq!(zone.waiting_count(), 0);

        // A disabled zone ignores sweeps entirely.
        let events = zone.update([(id(1), Point3d::new(5.0, 0.0, 5.0))].into_iter());
        assert!(events.entered.is_empty());
        assert!(!zone.is_holding(id(1)));
    }

    #[test]
    fn release_all_empties_the_waiting_set() {
        let mut zone = zone();
        zone.hold(id(1));
        zone.hold(id(2));
        zone.hold(id(3));

        assert_eq!(zone.release_all().as_slice(), [id(1), id(2), id(3)]);
        assert_eq!(zone.waiting_count(), 0);
        // Releasing again is a no-op.
        assert!(zone.release_all().is_empty());
    }

    #[test]
    fn hold_is_idempotent() {
        let mut zone = zone();
        zone.hold(id(1));
        zone.hold(id(1));
        assert_eq!(zone.waiting_count(), 1);
        assert_eq!(zone.release_all().as_slice(), [id(1)]);
        assert_eq!(zone.waiting_count(), 0);
    }
}
