use crate::{Vehicle, VehicleId};

/// One row of the race leaderboard. Derived afresh on every query,
/// never stored.
#[derive(Clone, Debug)]
pub struct RaceStanding {
    /// The vehicle's ID.
    pub vehicle: VehicleId,
    /// The driver's display name.
    pub name: String,
    /// The number of completed laps.
    pub laps: u32,
    /// The index of the waypoint being driven towards,
    /// measuring progress within the current lap.
    pub waypoint_index: usize,
}

/// Tracks the race clock and finish order, and ranks vehicles into a
/// leaderboard on demand.
#[derive(Clone, Debug, Default)]
pub struct RaceTracker {
    /// The race clock in s.
    clock: f64,
    /// Finishers in the order they crossed the line.
    finishes: Vec<Finish>,
}

/// A record of one vehicle crossing the finish line.
#[derive(Clone, Debug)]
pub struct Finish {
    /// The vehicle's ID.
    pub vehicle: VehicleId,
    /// The driver's display name.
    pub name: String,
    /// The race clock at the crossing, in s.
    pub time: f64,
}

impl RaceTracker {
    /// Creates a tracker with the clock at zero.
    pub fn new() -> Self {
        Default::default()
    }

    /// The race clock in s.
    pub fn elapsed(&self) -> f64 {
        self.clock
    }

    /// Advances the race clock.
    pub(crate) fn step(&mut self, dt: f64) {
        self.clock += dt;
    }

    /// Records a vehicle crossing the finish line, returning its
    /// one-based finishing position. A repeated finish is ignored and
    /// the original position returned.
    pub(crate) fn record_finish(&mut self, vehicle: VehicleId, name: &str) -> usize {
        if let Some(position) = self.finish_position(vehicle) {
            return position;
        }
        self.finishes.push(Finish {
            vehicle,
            name: name.to_owned(),
            time: self.clock,
        });
        self.finishes.len()
    }

    /// The one-based finishing position of a vehicle, if it has finished.
    pub fn finish_position(&self, vehicle: VehicleId) -> Option<usize> {
        self.finishes
            .iter()
            .position(|finish| finish.vehicle == vehicle)
            .map(|index| index + 1)
    }

    /// The race clock at the moment a vehicle finished, in s.
    pub fn finish_time(&self, vehicle: VehicleId) -> Option<f64> {
        self.finishes
            .iter()
            .find(|finish| finish.vehicle == vehicle)
            .map(|finish| finish.time)
    }

    /// The finishers so far, in the order they crossed the line.
    pub fn finish_order(&self) -> &[Finish] {
        &self.finishes
    }

    /// The number of vehicles that have finished.
    pub fn finished_count(&self) -> usize {
        self.finishes.len()
    }

    /// Builds the ranked leaderboard for the given vehicles.
    pub fn standings<'a>(&self, vehicles: impl Iterator<Item = &'a Vehicle>) -> Vec<RaceStanding> {
        let mut standings = vehicles
            .map(|vehicle| RaceStanding {
                vehicle: vehicle.id(),
                name: vehicle.name().to_owned(),
                laps: vehicle.laps_completed(),
                waypoint_index: vehicle.waypoint_index(),
            })
            .collect::<Vec<_>>();
        rank(&mut standings);
        standings
    }
}

/// Sorts standings into leaderboard order: most laps first, ties broken
/// by progress within the lap. The sort is stable, so equal entries
/// keep their input order.
fn rank(standings: &mut [RaceStanding]) {
    standings.sort_by(|a, b| {
        b.laps
            .cmp(&a.laps)
            .then(b.waypoint_index.cmp(&a.waypoint_index))
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use slotmap::KeyData;

    fn id(n: u64) -> VehicleId {
        KeyData::from_ffi(n | (1 << 32)).into()
    }

    fn standing(n: u64, laps: u32, waypoint_index: usize) -> RaceStanding {
        RaceStanding {
            vehicle: id(n),
            name: format!("driver_{}", n),
            laps,
            waypoint_index,
        }
    }

    #[test]
    fn leaderboard_orders_by_laps_then_progress() {
        let mut standings = vec![
            standing(1, 1, 3),
            standing(2, 2, 0),
            standing(3, 1, 7),
            standing(4, 0, 9),
        ];
        rank(&mut standings);

        let order: Vec<_> = standings.iter().map(|s| s.vehicle).collect();
        assert_eq!(order, [id(2), id(3), id(1), id(4)]);
    }

    #[test]
    fn equal_progress_keeps_input_order() {
        let mut standings = vec![standing(1, 2, 4), standing(2, 2, 4)];
        rank(&mut standings);
        assert_eq!(standings[0].vehicle, id(1));
        assert_eq!(standings[1].vehicle, id(2));
    }

    #[test]
    fn finishes_are_recorded_once_in_crossing_order() {
        let mut tracker = RaceTracker::new();
        tracker.step(12.5);
        assert_eq!(tracker.record_finish(id(1), "first"), 1);
        tracker.step(3.0);
        assert_eq!(tracker.record_finish(id(2), "second"), 2);

        // A repeated finish keeps the original position and time.
        assert_eq!(tracker.record_finish(id(1), "first"), 1);
        assert_eq!(tracker.finished_count(), 2);
        assert_eq!(tracker.finish_time(id(1)), Some(12.5));
        assert_eq!(tracker.finish_time(id(2)), Some(15.5));
        assert_eq!(tracker.finish_position(id(3)), None);

        let names: Vec<_> = tracker.finish_order().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }
}
