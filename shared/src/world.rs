//! Narrow interface between the networking core and the game's entity store.
//!
//! The core never touches engine internals. On the server it asks an
//! [`EntityWorld`] to spawn and steer player entities and to surface the
//! observable facts that go into snapshots; on the client it writes received
//! snapshot fields back into the local mirror through the same interface.
//! Entities are addressed by their stable string names everywhere.

use crate::messages::{Direction, Point};
use std::collections::HashMap;

/// Observable state of one entity, as read for snapshot building.
///
/// A missing position means the entity is not placed in the level and is
/// skipped by the snapshot translator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFacts {
    pub position: Option<Point>,
    pub view_direction: Option<Direction>,
    pub current_health: Option<i32>,
    pub max_health: Option<i32>,
    pub animation: Option<String>,
    pub tint_color: Option<i32>,
    pub texture_path: Option<String>,
}

/// The entity-store collaborator.
///
/// Implementations wrap the real engine (or, for tests and the dev binaries,
/// [`MemoryWorld`]). All methods are forgiving: operations on unknown entity
/// names are no-ops, matching how the engine tolerates late or duplicated
/// network traffic.
pub trait EntityWorld: Send {
    /// Creates a player-controlled entity at `position` and returns its
    /// stable name.
    fn spawn_player(&mut self, player_name: &str, position: Point) -> String;

    /// Removes an entity from the world.
    fn remove_entity(&mut self, entity_name: &str);

    fn contains(&self, entity_name: &str) -> bool;

    fn entity_names(&self) -> Vec<String>;

    /// Reads the observable facts of an entity.
    fn facts(&self, entity_name: &str) -> Option<EntityFacts>;

    fn set_position(&mut self, entity_name: &str, position: Point);

    fn set_view_direction(&mut self, entity_name: &str, direction: Direction);

    fn set_current_health(&mut self, entity_name: &str, health: i32);

    fn set_max_health(&mut self, entity_name: &str, health: i32);

    fn set_animation(&mut self, entity_name: &str, animation: &str);

    fn set_tint(&mut self, entity_name: &str, tint: i32);

    /// Pushes the entity one step along a cardinal direction.
    fn apply_move(&mut self, entity_name: &str, direction: Direction);

    /// Requests path-following toward `target`.
    fn apply_move_path(&mut self, entity_name: &str, target: Point);

    /// Executes the entity's configured skill toward `target`.
    fn apply_skill(&mut self, entity_name: &str, target: Point);

    /// Triggers interaction with the closest interactable at `target`.
    fn apply_interact(&mut self, entity_name: &str, target: Point);
}

/// Distance moved per simulation tick while a move force is applied.
pub const MOVE_STEP: f32 = 0.25;

/// How close a path-following entity must get before the path is done.
const PATH_ARRIVAL_EPSILON: f32 = 0.05;

/// Range within which an interact action finds its target.
const INTERACT_RANGE: f32 = 1.0;

#[derive(Debug, Clone)]
struct Slot {
    position: Point,
    view_direction: Direction,
    velocity: Point,
    path_target: Option<Point>,
    current_health: i32,
    max_health: i32,
    animation: String,
    tint_color: i32,
    texture_path: String,
    skill_casts: u32,
    interactions: u32,
}

impl Slot {
    fn player(position: Point) -> Self {
        Slot {
            position,
            view_direction: Direction::Down,
            velocity: Point::ZERO,
            path_target: None,
            current_health: 20,
            max_health: 20,
            animation: "idle".to_string(),
            tint_color: -1,
            texture_path: "character/hero".to_string(),
            skill_casts: 0,
            interactions: 0,
        }
    }
}

/// In-memory entity store keyed by stable name.
///
/// Used by the dev binaries as the simulation stand-in and by tests as the
/// client-side mirror. Movement semantics are deliberately plain: a move
/// force displaces the entity for one tick, a path target is walked toward in
/// fixed steps.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    entities: HashMap<String, Slot>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        MemoryWorld {
            entities: HashMap::new(),
        }
    }

    /// Adds a non-player entity (scenery, chests, monsters) to the world.
    pub fn insert_entity(&mut self, entity_name: &str, position: Point, texture_path: &str) {
        let mut slot = Slot::player(position);
        slot.texture_path = texture_path.to_string();
        self.entities.insert(entity_name.to_string(), slot);
    }

    /// Advances movement by one tick: applied forces first, then any pending
    /// path target.
    pub fn step_movement(&mut self) {
        for slot in self.entities.values_mut() {
            if slot.velocity != Point::ZERO {
                slot.position.x += slot.velocity.x;
                slot.position.y += slot.velocity.y;
                slot.velocity = Point::ZERO;
                slot.animation = "run".to_string();
                continue;
            }

            if let Some(target) = slot.path_target {
                let to_target = Point::new(target.x - slot.position.x, target.y - slot.position.y);
                let distance = slot.position.distance(target);
                if distance <= MOVE_STEP + PATH_ARRIVAL_EPSILON {
                    slot.position = target;
                    slot.path_target = None;
                    slot.animation = "idle".to_string();
                } else {
                    slot.position.x += to_target.x / distance * MOVE_STEP;
                    slot.position.y += to_target.y / distance * MOVE_STEP;
                    slot.animation = "run".to_string();
                }
                if let Some(direction) = Direction::from_vector(to_target) {
                    slot.view_direction = direction;
                }
            } else if slot.animation == "run" {
                slot.animation = "idle".to_string();
            }
        }
    }

    pub fn position(&self, entity_name: &str) -> Option<Point> {
        self.entities.get(entity_name).map(|s| s.position)
    }

    pub fn skill_casts(&self, entity_name: &str) -> u32 {
        self.entities.get(entity_name).map_or(0, |s| s.skill_casts)
    }

    pub fn interactions(&self, entity_name: &str) -> u32 {
        self.entities.get(entity_name).map_or(0, |s| s.interactions)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityWorld for MemoryWorld {
    fn spawn_player(&mut self, player_name: &str, position: Point) -> String {
        let entity_name = format!("hero-{player_name}");
        self.entities
            .insert(entity_name.clone(), Slot::player(position));
        entity_name
    }

    fn remove_entity(&mut self, entity_name: &str) {
        self.entities.remove(entity_name);
    }

    fn contains(&self, entity_name: &str) -> bool {
        self.entities.contains_key(entity_name)
    }

    fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    fn facts(&self, entity_name: &str) -> Option<EntityFacts> {
        self.entities.get(entity_name).map(|slot| EntityFacts {
            position: Some(slot.position),
            view_direction: Some(slot.view_direction),
            current_health: Some(slot.current_health),
            max_health: Some(slot.max_health),
            animation: Some(slot.animation.clone()),
            tint_color: Some(slot.tint_color),
            texture_path: Some(slot.texture_path.clone()),
        })
    }

    fn set_position(&mut self, entity_name: &str, position: Point) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.position = position;
        }
    }

    fn set_view_direction(&mut self, entity_name: &str, direction: Direction) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.view_direction = direction;
        }
    }

    fn set_current_health(&mut self, entity_name: &str, health: i32) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.current_health = health;
        }
    }

    fn set_max_health(&mut self, entity_name: &str, health: i32) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.max_health = health;
        }
    }

    fn set_animation(&mut self, entity_name: &str, animation: &str) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.animation = animation.to_string();
        }
    }

    fn set_tint(&mut self, entity_name: &str, tint: i32) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.tint_color = tint;
        }
    }

    fn apply_move(&mut self, entity_name: &str, direction: Direction) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            let unit = direction.unit();
            slot.velocity = Point::new(unit.x * MOVE_STEP, unit.y * MOVE_STEP);
            slot.view_direction = direction;
            // A direct move cancels any path in progress.
            slot.path_target = None;
        }
    }

    fn apply_move_path(&mut self, entity_name: &str, target: Point) {
        if let Some(slot) = self.entities.get_mut(entity_name) {
            slot.path_target = Some(target);
        }
    }

    fn apply_skill(&mut self, entity_name: &str, target: Point) {
        let Some(slot) = self.entities.get_mut(entity_name) else {
            return;
        };
        slot.skill_casts += 1;
        slot.animation = "cast".to_string();
        let origin = slot.position;
        if let Some(direction) =
            Direction::from_vector(Point::new(target.x - origin.x, target.y - origin.y))
        {
            slot.view_direction = direction;
        }
    }

    fn apply_interact(&mut self, entity_name: &str, target: Point) {
        let closest = self
            .entities
            .iter()
            .filter(|(name, _)| name.as_str() != entity_name)
            .map(|(name, slot)| (name.clone(), slot.position.distance(target)))
            .filter(|(_, distance)| *distance <= INTERACT_RANGE)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((name, _)) = closest {
            if let Some(slot) = self.entities.get_mut(&name) {
                slot.interactions += 1;
            }
        }
    }
}
