//! Minimal level, vessel and spawn-point model consumed by the respawn cycle
//!
//! Only the geometry and hull state the cycle manager actually inspects is
//! modeled here: level extents for depth and exit checks, the shuttle's
//! position, doors and docking ports, and the spawn points characters and
//! cargo are placed at. Pathfinding and hull simulation live elsewhere.

use shared::SHAFT_HEIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Loaded level geometry. `size.y` is the water surface; world y grows upward.
#[derive(Debug, Clone)]
pub struct Level {
    pub size: Vec2,
    /// Bottom of the entry shaft the shuttle arrives and leaves through
    pub start_position: Vec2,
}

impl Level {
    /// Real-world depth of a vertical world coordinate, in meters below the surface
    pub fn real_world_depth(&self, y: f32) -> f32 {
        self.size.y - y
    }

    /// Point the shuttle is forced to when arriving, just below the shaft
    pub fn shuttle_arrival_position(&self) -> Vec2 {
        Vec2::new(self.start_position.x, self.start_position.y - SHAFT_HEIGHT)
    }

    /// Point the shuttle is forced to when leaving, above the level ceiling
    pub fn shuttle_exit_position(&self) -> Vec2 {
        Vec2::new(self.start_position.x, self.size.y + 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnType {
    Human,
    Cargo,
}

/// A waypoint characters or cargo can be spawned at
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub position: Vec2,
    pub spawn_type: SpawnType,
    /// Preferred job for this berth, if any
    pub job: Option<String>,
    pub id_card_tags: Vec<String>,
    pub id_card_description: String,
}

impl SpawnPoint {
    pub fn human(position: Vec2) -> Self {
        Self {
            position,
            spawn_type: SpawnType::Human,
            job: None,
            id_card_tags: Vec::new(),
            id_card_description: String::new(),
        }
    }

    pub fn cargo(position: Vec2) -> Self {
        Self {
            spawn_type: SpawnType::Cargo,
            ..Self::human(position)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Door {
    pub is_open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DockingPort {
    pub docked: bool,
}

impl DockingPort {
    pub fn undock(&mut self) {
        self.docked = false;
    }
}

/// The crew vessel respawnees would normally serve on
#[derive(Debug, Clone)]
pub struct Submarine {
    pub position: Vec2,
    pub spawn_points: Vec<SpawnPoint>,
}

/// The transport shuttle the respawn cycle dispatches and recalls.
/// An absent shuttle is a valid configuration, not an error; the cycle
/// then respawns everyone in place aboard the main sub.
#[derive(Debug, Clone)]
pub struct Shuttle {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Half-extents of the hull bounding box
    pub extents: Vec2,
    pub doors: Vec<Door>,
    pub docking_ports: Vec<DockingPort>,
    /// Wall breaches accumulated during transport, resealed on reset
    pub hull_breaches: usize,
    pub steering_path_finished: bool,
    pub maintain_position: bool,
    pub neutral_ballast: bool,
    pub spawn_points: Vec<SpawnPoint>,
}

impl Shuttle {
    pub fn new(extents: Vec2, spawn_points: Vec<SpawnPoint>) -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            extents,
            doors: vec![Door::default(), Door::default()],
            docking_ports: vec![DockingPort::default()],
            hull_breaches: 0,
            steering_path_finished: false,
            maintain_position: false,
            neutral_ballast: false,
            spawn_points,
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.velocity = Vec2::ZERO;
    }

    pub fn close_all_doors(&mut self) {
        for door in &mut self.doors {
            door.is_open = false;
        }
    }

    pub fn undock_all(&mut self) {
        for port in &mut self.docking_ports {
            port.undock();
        }
    }

    /// Restores the hull to its pristine state between transport runs
    pub fn reset(&mut self) {
        self.velocity = Vec2::ZERO;
        self.steering_path_finished = false;
        self.maintain_position = false;
        self.neutral_ballast = false;
        self.hull_breaches = 0;
        self.close_all_doors();
    }

    pub fn cargo_spawn_point(&self) -> Option<&SpawnPoint> {
        self.spawn_points
            .iter()
            .find(|sp| sp.spawn_type == SpawnType::Cargo)
    }
}

/// A known spawnable item definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPrefab {
    pub identifier: String,
    pub tags: Vec<String>,
}

impl ItemPrefab {
    pub fn new(identifier: &str, tags: &[&str]) -> Self {
        Self {
            identifier: identifier.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Lookup into the content the server was loaded with. Missing entries are
/// not an error; features relying on them simply degrade.
pub trait ItemCatalog {
    fn find_by_tag(&self, tag: &str) -> Option<&ItemPrefab>;
    fn find_by_identifier(&self, identifier: &str) -> Option<&ItemPrefab>;
}

/// Catalog holding the standard survival gear prefabs
#[derive(Debug, Clone)]
pub struct StandardCatalog {
    prefabs: Vec<ItemPrefab>,
}

impl Default for StandardCatalog {
    fn default() -> Self {
        Self {
            prefabs: vec![
                ItemPrefab::new("divingsuit", &["respawnsuit"]),
                ItemPrefab::new("abyssdivingsuit", &["respawnsuitdeep"]),
                ItemPrefab::new("oxygentank", &[]),
                ItemPrefab::new("underwaterscooter", &[]),
                ItemPrefab::new("batterycell", &[]),
                ItemPrefab::new("idcard", &[]),
            ],
        }
    }
}

impl StandardCatalog {
    /// Catalog with no pressure-rated gear, for setups without diving content
    pub fn empty() -> Self {
        Self {
            prefabs: Vec::new(),
        }
    }
}

impl ItemCatalog for StandardCatalog {
    fn find_by_tag(&self, tag: &str) -> Option<&ItemPrefab> {
        self.prefabs
            .iter()
            .find(|p| p.tags.iter().any(|t| t == tag))
    }

    fn find_by_identifier(&self, identifier: &str) -> Option<&ItemPrefab> {
        self.prefabs.iter().find(|p| p.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_world_depth() {
        let level = Level {
            size: Vec2::new(50_000.0, 20_000.0),
            start_position: Vec2::new(4_000.0, 18_000.0),
        };
        assert_eq!(level.real_world_depth(20_000.0), 0.0);
        assert_eq!(level.real_world_depth(12_000.0), 8_000.0);
    }

    #[test]
    fn test_shuttle_reset_reseals_and_closes() {
        let mut shuttle = Shuttle::new(Vec2::new(300.0, 150.0), Vec::new());
        shuttle.doors[0].is_open = true;
        shuttle.hull_breaches = 3;
        shuttle.steering_path_finished = true;
        shuttle.velocity = Vec2::new(10.0, -5.0);

        shuttle.reset();

        assert!(!shuttle.doors[0].is_open);
        assert_eq!(shuttle.hull_breaches, 0);
        assert!(!shuttle.steering_path_finished);
        assert_eq!(shuttle.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_catalog_tag_lookup() {
        let catalog = StandardCatalog::default();
        assert_eq!(
            catalog.find_by_tag("respawnsuitdeep").unwrap().identifier,
            "abyssdivingsuit"
        );
        assert!(catalog.find_by_tag("nonexistent").is_none());
        assert!(catalog.find_by_identifier("oxygentank").is_some());
    }

    #[test]
    fn test_cargo_spawn_point_lookup() {
        let shuttle = Shuttle::new(
            Vec2::new(300.0, 150.0),
            vec![
                SpawnPoint::human(Vec2::new(10.0, 0.0)),
                SpawnPoint::cargo(Vec2::new(-20.0, 0.0)),
            ],
        );
        let cargo = shuttle.cargo_spawn_point().unwrap();
        assert_eq!(cargo.position.x, -20.0);
    }
}
