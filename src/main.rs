use race_sim::math::{Point3d, Vector3d};
use race_sim::{
    RayHit, RaycastWorld, Route, RouteAttributes, SignalTiming, Simulation, VehicleAttributes,
    ZoneBounds,
};

/// An empty track: no walls, no obstacles, nothing for a probe to hit.
struct OpenRoad;

impl RaycastWorld for OpenRoad {
    fn cast(&self, _origin: Point3d, _direction: Vector3d, _max_dist: f64) -> Option<RayHit> {
        None
    }
}

fn main() {
    let mut sim = Simulation::new();

    sim.add_route(Route::new(&RouteAttributes {
        name: "circuit",
        waypoints: &[
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(200.0, 0.0, 0.0),
            Point3d::new(200.0, 0.0, 120.0),
            Point3d::new(0.0, 0.0, 120.0),
        ],
        recommended_speed: Some(40.0),
        priority: 5,
        tags: &["circuit"],
    }));

    // A signal guarding the second corner.
    sim.add_intersection(
        SignalTiming::default(),
        ZoneBounds {
            min: Point3d::new(185.0, 0.0, -10.0),
            max: Point3d::new(215.0, 0.0, 20.0),
        },
    );

    for name in ["Alpha", "Bravo", "Charlie", "Delta"] {
        sim.add_vehicle(&VehicleAttributes {
            name: name.to_owned(),
            top_speed: 40.0,
            lap_target: 3,
            ..Default::default()
        });
    }
    sim.randomise_top_speeds();

    println!("Racing...");
    let dt = 0.02;
    for frame in 0..18000 {
        sim.step(dt, &OpenRoad);
        if sim.race_complete() {
            break;
        }
        if frame % 1000 == 999 {
            println!("--- {:.0} s ---", sim.tracker().elapsed());
            for (place, standing) in sim.standings().iter().enumerate() {
                println!(
                    "{}. {} (lap {}, waypoint {})",
                    place + 1,
                    standing.name,
                    standing.laps + 1,
                    standing.waypoint_index,
                );
            }
        }
    }

    println!("--- results ---");
    for (place, finish) in sim.tracker().finish_order().iter().enumerate() {
        println!("{}. {} ({:.1} s)", place + 1, finish.name, finish.time);
    }
}
