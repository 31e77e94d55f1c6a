//! Wire message set shared by client and server.
//!
//! Every message travelling over either channel is a variant of [`Message`].
//! The set is closed: adding a variant is backward compatible, changing the
//! fields of an existing variant is not. Entities are referenced by stable
//! string names rather than engine-internal handles so a client can resolve
//! them across delayed or reordered snapshot delivery.

use serde::{Deserialize, Serialize};

/// Server-assigned identifier for a connected player.
///
/// Allocated from a monotonic counter starting at 1; zero means "not yet
/// assigned" and never appears on an accepted session. Identifiers are not
/// reused for the lifetime of the server process.
pub type ClientId = u32;

/// A position in level coordinates (tiles, not pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// The origin.
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Cardinal view/movement direction.
///
/// On the wire a direction travels as its name string so that an unknown
/// value can be ignored field-by-field instead of poisoning a whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The wire spelling of this direction.
    pub fn as_wire(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    /// Parses a wire spelling. Returns `None` for anything unknown.
    pub fn from_wire(value: &str) -> Option<Direction> {
        match value {
            "UP" => Some(Direction::Up),
            "DOWN" => Some(Direction::Down),
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            _ => None,
        }
    }

    /// Derives the dominant cardinal direction of a vector.
    ///
    /// Ties favor the horizontal axis; the zero vector has no direction.
    pub fn from_vector(v: Point) -> Option<Direction> {
        if v.x == 0.0 && v.y == 0.0 {
            return None;
        }
        if v.x.abs() >= v.y.abs() {
            if v.x >= 0.0 {
                Some(Direction::Right)
            } else {
                Some(Direction::Left)
            }
        } else if v.y >= 0.0 {
            Some(Direction::Up)
        } else {
            Some(Direction::Down)
        }
    }

    /// Unit vector pointing along this direction.
    pub fn unit(self) -> Point {
        match self {
            Direction::Up => Point::new(0.0, 1.0),
            Direction::Down => Point::new(0.0, -1.0),
            Direction::Left => Point::new(-1.0, 0.0),
            Direction::Right => Point::new(1.0, 0.0),
        }
    }
}

/// Player intent carried by an input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Move one step; the direction is derived from the attached point.
    Move,
    /// Follow a path to the attached point.
    MovePath,
    /// Execute the configured skill toward the attached point.
    CastSkill,
    /// Interact with the closest interactable at the attached point.
    Interact,
}

/// Compact observable state of one entity inside a snapshot.
///
/// The position is always present; every other field is optional and only
/// overwrites the receiver's mirror when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_name: String,
    pub position: Point,
    pub view_direction: Option<String>,
    pub current_health: Option<i32>,
    pub max_health: Option<i32>,
    pub animation: Option<String>,
    pub tint_color: Option<i32>,
}

impl EntityState {
    /// A state record with only the required fields set.
    pub fn at(entity_name: impl Into<String>, position: Point) -> Self {
        EntityState {
            entity_name: entity_name.into(),
            position,
            view_direction: None,
            current_health: None,
            max_health: None,
            animation: None,
            tint_color: None,
        }
    }
}

/// The complete client/server protocol.
///
/// Client→server variants come first, server→client variants after. The
/// handshake runs on the reliable channel; `RegisterUdp`, `Input` and
/// `Snapshot` travel as datagrams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // === Client → Server ===
    /// Handshake: sent on the reliable channel as soon as it becomes active.
    ConnectRequest { player_name: String },

    /// Binds the sender's datagram address to an acknowledged session.
    RegisterUdp { client_id: ClientId },

    /// One unit of player intent, stamped with the assigned client id.
    Input {
        client_id: ClientId,
        action: Action,
        point: Point,
    },

    /// Asks the server to describe an entity the client cannot resolve.
    RequestEntitySpawn { entity_name: String },

    // === Server → Client ===
    /// Handshake acknowledgement carrying the assigned client id.
    ConnectAck { client_id: ClientId },

    /// Handshake rejection; the server closes the channel afterwards.
    ConnectReject { reason: String },

    /// Announces the active level. A missing spawn point means "use the
    /// level's start tile".
    LevelChange {
        level_name: String,
        spawn_point: Option<Point>,
    },

    /// Full description of one entity, answering `RequestEntitySpawn`.
    EntitySpawnEvent {
        entity_name: String,
        position: Point,
        view_direction: Option<String>,
        texture_path: String,
        animation: String,
        tint_color: i32,
    },

    /// Periodic world state broadcast, ordered by a monotonic server tick.
    Snapshot {
        server_tick: u64,
        entities: Vec<EntityState>,
    },

    /// The level pipeline is exhausted; the campaign is over.
    GameOver,
}

/// Discriminant of a [`Message`], used as the dispatcher routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ConnectRequest,
    RegisterUdp,
    Input,
    RequestEntitySpawn,
    ConnectAck,
    ConnectReject,
    LevelChange,
    EntitySpawnEvent,
    Snapshot,
    GameOver,
}

impl Message {
    /// Number of variants in the closed set; the codec uses it to call out
    /// unknown tags explicitly.
    pub(crate) const VARIANT_COUNT: u32 = 10;

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ConnectRequest { .. } => MessageKind::ConnectRequest,
            Message::RegisterUdp { .. } => MessageKind::RegisterUdp,
            Message::Input { .. } => MessageKind::Input,
            Message::RequestEntitySpawn { .. } => MessageKind::RequestEntitySpawn,
            Message::ConnectAck { .. } => MessageKind::ConnectAck,
            Message::ConnectReject { .. } => MessageKind::ConnectReject,
            Message::LevelChange { .. } => MessageKind::LevelChange,
            Message::EntitySpawnEvent { .. } => MessageKind::EntitySpawnEvent,
            Message::Snapshot { .. } => MessageKind::Snapshot,
            Message::GameOver => MessageKind::GameOver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roundtrip_handshake() {
        let messages = vec![
            Message::ConnectRequest {
                player_name: "Alice".to_string(),
            },
            Message::ConnectAck { client_id: 1 },
            Message::ConnectReject {
                reason: "Invalid player name.".to_string(),
            },
            Message::RegisterUdp { client_id: 1 },
            Message::GameOver,
        ];

        for message in messages {
            let bytes = bincode::serialize(&message).unwrap();
            let back: Message = bincode::deserialize(&bytes).unwrap();
            assert_eq!(message, back);
        }
    }

    #[test]
    fn test_message_roundtrip_input() {
        let message = Message::Input {
            client_id: 7,
            action: Action::CastSkill,
            point: Point::new(3.5, -1.25),
        };

        let bytes = bincode::serialize(&message).unwrap();
        let back: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn test_message_roundtrip_snapshot() {
        let mut state = EntityState::at("hero-Alice", Point::new(1.0, 2.0));
        state.view_direction = Some("LEFT".to_string());
        state.current_health = Some(18);
        state.max_health = Some(20);
        state.animation = Some("run".to_string());
        state.tint_color = Some(0x00ff_00ff);

        let message = Message::Snapshot {
            server_tick: 42,
            entities: vec![state, EntityState::at("hero-Bob", Point::ZERO)],
        };

        let bytes = bincode::serialize(&message).unwrap();
        let back: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn test_message_kind_mapping() {
        assert_eq!(
            Message::ConnectRequest {
                player_name: String::new()
            }
            .kind(),
            MessageKind::ConnectRequest
        );
        assert_eq!(
            Message::Snapshot {
                server_tick: 1,
                entities: vec![]
            }
            .kind(),
            MessageKind::Snapshot
        );
        assert_eq!(Message::GameOver.kind(), MessageKind::GameOver);
    }

    #[test]
    fn test_direction_wire_roundtrip() {
        for direction in [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ] {
            assert_eq!(Direction::from_wire(direction.as_wire()), Some(direction));
        }
        assert_eq!(Direction::from_wire("NORTHWEST"), None);
        assert_eq!(Direction::from_wire(""), None);
    }

    #[test]
    fn test_direction_from_vector() {
        assert_eq!(
            Direction::from_vector(Point::new(1.0, 0.0)),
            Some(Direction::Right)
        );
        assert_eq!(
            Direction::from_vector(Point::new(-2.0, 1.0)),
            Some(Direction::Left)
        );
        assert_eq!(
            Direction::from_vector(Point::new(0.5, 3.0)),
            Some(Direction::Up)
        );
        assert_eq!(
            Direction::from_vector(Point::new(0.0, -0.1)),
            Some(Direction::Down)
        );
        assert_eq!(Direction::from_vector(Point::ZERO), None);
    }

    #[test]
    fn test_point_distance() {
        use assert_approx_eq::assert_approx_eq;

        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_approx_eq!(a.distance(b), 5.0, 1e-6);
        assert_approx_eq!(b.distance(b), 0.0, 1e-6);
    }
}
