use race_sim::math::{Point3d, Vector3d};
use race_sim::{
    RayHit, RaycastWorld, Route, RouteAttributes, SignalState, SignalTiming, Simulation,
    VehicleAttributes, ZoneBounds,
};

const DT: f64 = 0.02; // s

/// An empty track with nothing for a probe to hit.
struct OpenRoad;

impl RaycastWorld for OpenRoad {
    fn cast(&self, _origin: Point3d, _direction: Vector3d, _max_dist: f64) -> Option<RayHit> {
        None
    }
}

/// A simulation with one vehicle driving up the z axis towards a
/// signalled zone spanning z 40 to 60, reached roughly 3 s in.
fn signalled_track(timing: SignalTiming) -> (Simulation, race_sim::VehicleId) {
    let mut sim = Simulation::new();
    sim.add_route(Route::new(&RouteAttributes {
        name: "circuit",
        waypoints: &[
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 300.0),
            Point3d::new(300.0, 0.0, 300.0),
            Point3d::new(300.0, 0.0, 0.0),
        ],
        recommended_speed: None,
        priority: 5,
        tags: &[],
    }));
    sim.add_intersection(
        timing,
        ZoneBounds {
            min: Point3d::new(-10.0, 0.0, 40.0),
            max: Point3d::new(10.0, 0.0, 60.0),
        },
    );
    let id = sim.add_vehicle(&VehicleAttributes {
        name: "racer".to_owned(),
        top_speed: 40.0,
        ..Default::default()
    });
    (sim, id)
}

/// A short green so the vehicle arrives at the zone during red.
fn quick_timing() -> SignalTiming {
    SignalTiming {
        green: 1.0,
        yellow: 0.5,
        red: 10.0,
        min_red: 2.0,
        congestion_threshold: 5,
    }
}

fn run(sim: &mut Simulation, steps: usize) {
    for _ in 0..steps {
        sim.step(DT, &OpenRoad);
    }
}

#[test]
fn a_red_signal_holds_arrivals_until_green() {
    let (mut sim, id) = signalled_track(quick_timing());

    run(&mut sim, 55); // 1.1 s
    assert_eq!(sim.signal_state(0), Some(SignalState::Yellow));
    run(&mut sim, 25); // 1.6 s
    assert_eq!(sim.signal_state(0), Some(SignalState::Red));

    // The vehicle reaches the zone during red and is held there.
    run(&mut sim, 170); // 5.0 s
    assert_eq!(sim.waiting_count(0), 1);
    let vehicle = sim.get_vehicle(id).unwrap();
    assert!(!vehicle.can_move());
    assert_eq!(vehicle.speed(), 0.0);
    let z = vehicle.pose().position.z;
    assert!((40.0..=60.0).contains(&z), "held at z = {}", z);

    // Red runs its nominal 10 s; green arrives at 11.5 s.
    run(&mut sim, 350); // 12.0 s
    assert_eq!(sim.signal_state(0), Some(SignalState::Green));
    assert_eq!(sim.waiting_count(0), 0);
    let vehicle = sim.get_vehicle(id).unwrap();
    assert!(vehicle.can_move());
    assert!(vehicle.speed() > 0.5);
}

#[test]
fn a_green_signal_lets_traffic_flow() {
    let (mut sim, id) = signalled_track(SignalTiming {
        green: 100.0,
        ..Default::default()
    });

    run(&mut sim, 300); // 6.0 s
    assert_eq!(sim.waiting_count(0), 0);
    let vehicle = sim.get_vehicle(id).unwrap();
    assert!(vehicle.can_move());
    assert!(vehicle.pose().position.z > 60.0);
}

#[test]
fn a_disabled_zone_never_holds() {
    let (mut sim, id) = signalled_track(quick_timing());

    // Disable during red, before the vehicle reaches the zone.
    run(&mut sim, 100); // 2.0 s
    assert_eq!(sim.signal_state(0), Some(SignalState::Red));
    sim.set_intersection_enabled(0, false);

    run(&mut sim, 200); // 6.0 s
    assert_eq!(sim.waiting_count(0), 0);
    let vehicle = sim.get_vehicle(id).unwrap();
    assert!(vehicle.can_move());
    assert!(vehicle.pose().position.z > 60.0);
}

#[test]
fn disabling_a_zone_releases_held_vehicles() {
    let (mut sim, id) = signalled_track(quick_timing());

    run(&mut sim, 250); // 5.0 s, held at the red signal
    assert_eq!(sim.waiting_count(0), 1);
    assert!(!sim.get_vehicle(id).unwrap().can_move());

    sim.set_intersection_enabled(0, false);
    assert_eq!(sim.waiting_count(0), 0);
    assert!(sim.get_vehicle(id).unwrap().can_move());

    run(&mut sim, 100); // 7.0 s
    assert!(sim.get_vehicle(id).unwrap().speed() > 0.5);
}
