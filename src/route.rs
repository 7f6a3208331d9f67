use crate::math::Point3d;
use cgmath::MetricSpace;
use itertools::Itertools;
use rand::Rng;
use thiserror::Error;

/// A named, ordered sequence of waypoints for vehicles to follow.
/// Vehicles loop back to the first waypoint after passing the last one.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    /// The route's unique name.
    name: String,
    /// The waypoint positions, in driving order.
    waypoints: Vec<Point3d>,
    /// The recommended top speed on this route in m/s, if any.
    recommended_speed: Option<f64>,
    /// The priority of this route for selection purposes.
    priority: u8,
    /// Free-form tags categorising the route.
    tags: Vec<String>,
}

/// The attributes of a route.
pub struct RouteAttributes<'a> {
    /// The route's unique name.
    pub name: &'a str,
    /// The waypoint positions, in driving order.
    pub waypoints: &'a [Point3d],
    /// The recommended top speed on this route in m/s, if any.
    pub recommended_speed: Option<f64>,
    /// The priority of this route for selection purposes.
    pub priority: u8,
    /// Free-form tags categorising the route.
    pub tags: &'a [&'a str],
}

/// An error arising from route registry operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The requested route index is out of range.
    #[error("route index {0} is out of range")]
    IndexOutOfRange(usize),
    /// No route has the requested name.
    #[error("no route named `{0}`")]
    NameNotFound(String),
    /// The route cannot be driven because it has too few waypoints.
    #[error("route `{0}` needs at least 2 waypoints")]
    TooFewWaypoints(String),
    /// The route data could not be parsed.
    #[error("malformed route data: {0}")]
    Malformed(String),
}

impl Route {
    /// The minimum number of waypoints for a drivable route.
    pub const MIN_WAYPOINTS: usize = 2;

    /// Creates a new route.
    pub fn new(attributes: &RouteAttributes) -> Self {
        Self {
            name: attributes.name.to_owned(),
            waypoints: attributes.waypoints.to_vec(),
            recommended_speed: attributes.recommended_speed,
            priority: attributes.priority,
            tags: attributes.tags.iter().map(|t| (*t).to_owned()).collect(),
        }
    }

    /// Gets the route's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the number of waypoints on the route.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the route has no waypoints at all.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Whether the route has enough waypoints to be driven.
    pub fn is_valid(&self) -> bool {
        self.waypoints.len() >= Self::MIN_WAYPOINTS
    }

    /// Gets the waypoint at the given index.
    pub fn waypoint(&self, index: usize) -> Option<Point3d> {
        self.waypoints.get(index).copied()
    }

    /// Gets all the waypoints on the route.
    pub fn waypoints(&self) -> &[Point3d] {
        &self.waypoints
    }

    /// Gets the recommended top speed on this route in m/s, if any.
    pub fn recommended_speed(&self) -> Option<f64> {
        self.recommended_speed
    }

    /// Gets the priority of this route.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Gets the tags categorising this route.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The total length of the route in m, excluding the closing
    /// segment back to the first waypoint.
    pub fn total_length(&self) -> f64 {
        self.waypoints
            .iter()
            .tuple_windows()
            .map(|(a, b)| a.distance(*b))
            .sum()
    }
}

/// The registry of routes available to vehicles,
/// indexed densely from zero.
#[derive(Default)]
pub struct RouteSet {
    /// The registered routes.
    routes: Vec<Route>,
}

impl RouteSet {
    /// Creates an empty route set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a route to the set, returning its index.
    pub fn add(&mut self, route: Route) -> usize {
        self.routes.push(route);
        self.routes.len() - 1
    }

    /// Removes routes with too few waypoints, warning for each removal.
    /// Indices remain dense afterwards.
    pub fn validate(&mut self) {
        self.routes.retain(|route| {
            if route.is_valid() {
                true
            } else {
                log::warn!(
                    "removing route `{}`: has {} waypoints, needs at least {}",
                    route.name(),
                    route.len(),
                    Route::MIN_WAYPOINTS
                );
                false
            }
        });
    }

    /// Gets the route at the given index.
    pub fn get(&self, index: usize) -> Result<&Route, RouteError> {
        self.routes
            .get(index)
            .ok_or(RouteError::IndexOutOfRange(index))
    }

    /// Gets the first route with the given name.
    pub fn get_by_name(&self, name: &str) -> Result<&Route, RouteError> {
        self.routes
            .iter()
            .find(|route| route.name() == name)
            .ok_or_else(|| RouteError::NameNotFound(name.to_owned()))
    }

    /// Gets the number of registered routes.
    pub fn count(&self) -> usize {
        self.routes.len()
    }

    /// Returns an iterator over all the routes in the set.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Loads a route set from the JSON produced by the route authoring
    /// collaborator. Malformed waypoint entries are skipped with a
    /// warning; the set is validated before being returned.
    ///
    /// Expected shape:
    /// ```json
    /// { "routes": [ { "name": "outer", "waypoints": [[0, 0, 0], [50, 0, 0]],
    ///                 "recommended_speed": 30.0, "priority": 5,
    ///                 "tags": ["circuit"] } ] }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|err| RouteError::Malformed(err.to_string()))?;
        let routes = value
            .get("routes")
            .and_then(|routes| routes.as_array())
            .ok_or_else(|| RouteError::Malformed("missing `routes` array".to_owned()))?;

        let mut set = Self::new();
        for (index, route) in routes.iter().enumerate() {
            let name = route
                .get("name")
                .and_then(|name| name.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("route_{}", index));

            let mut waypoints = vec![];
            for entry in route
                .get("waypoints")
                .and_then(|wps| wps.as_array())
                .map(Vec::as_slice)
                .unwrap_or(&[])
            {
                match parse_waypoint(entry) {
                    Some(point) => waypoints.push(point),
                    None => {
                        log::warn!("route `{}`: skipping malformed waypoint {}", name, entry)
                    }
                }
            }

            let tags = route
                .get("tags")
                .and_then(|tags| tags.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|tag| tag.as_str())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            set.add(Route::new(&RouteAttributes {
                name: &name,
                waypoints: &waypoints,
                recommended_speed: route.get("recommended_speed").and_then(|s| s.as_f64()),
                priority: route
                    .get("priority")
                    .and_then(|p| p.as_u64())
                    .unwrap_or(5) as u8,
                tags: &tags,
            }));
        }

        set.validate();
        Ok(set)
    }
}

fn parse_waypoint(value: &serde_json::Value) -> Option<Point3d> {
    let coords = value.as_array()?;
    if coords.len() != 3 {
        return None;
    }
    Some(Point3d::new(
        coords[0].as_f64()?,
        coords[1].as_f64()?,
        coords[2].as_f64()?,
    ))
}

/// The policy used to pick a route index for each newly spawned vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssignmentMode {
    /// Cycle through the routes in spawn order.
    Sequential,
    /// Pick a route uniformly at random.
    Random,
    /// Put every vehicle on route 0.
    AllSame,
    /// Advance to the next route on every assignment.
    Alternating,
}

/// Hands out route indices to a spawner according to an [AssignmentMode].
#[derive(Clone, Debug)]
pub struct RouteAssigner {
    /// The assignment policy.
    mode: AssignmentMode,
    /// The number of assignments made so far.
    assigned: usize,
    /// The cursor for the alternating mode.
    cursor: usize,
}

impl Default for RouteAssigner {
    fn default() -> Self {
        Self::new(AssignmentMode::Sequential)
    }
}

impl RouteAssigner {
    /// Creates a new assigner with the given policy.
    pub fn new(mode: AssignmentMode) -> Self {
        Self {
            mode,
            assigned: 0,
            cursor: 0,
        }
    }

    /// Picks a route index for the next vehicle.
    /// Returns 0 when there are no alternatives.
    pub fn next_index(&mut self, route_count: usize, rng: &mut impl Rng) -> usize {
        if route_count <= 1 {
            return 0;
        }
        let index = match self.mode {
            AssignmentMode::Sequential => self.assigned % route_count,
            AssignmentMode::Random => rng.gen_range(0..route_count),
            AssignmentMode::AllSame => 0,
            AssignmentMode::Alternating => {
                self.cursor = (self.cursor + 1) % route_count;
                self.cursor
            }
        };
        self.assigned += 1;
        index
    }
}
