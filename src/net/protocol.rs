//! Text wire protocol.
//!
//! Every record is a comma-separated list of fields whose first field is
//! the type tag:
//!
//! | Tag         | Direction | Fields after the tag                              |
//! |-------------|-----------|---------------------------------------------------|
//! | `PNO`       | S → C     | slot, rocks, world blocks, timestamp (or `-1,ts`) |
//! | `KEY`       | C → S     | key, DOWN/UP                                      |
//! | `UPD`       | S → C     | world blocks, timestamp                           |
//! | `PING`      | both      | id, optional server timestamp                     |
//! | `CONFIRMED` | C → S     | timestamp                                         |
//!
//! Positions are in pixels and rotations in client degrees.

use std::fmt::Display;
use std::str::FromStr;

use crate::game::constants::arena::MAX_PLAYERS;
use crate::game::state::{
    BubbleId, CollisionTag, FrogState, Key, KeyState, PlayerColor, SlotIndex, TurtleState,
};

const TAG_PLAYER_NUMBER: &str = "PNO";
const TAG_KEY: &str = "KEY";
const TAG_UPDATE: &str = "UPD";
const TAG_PING: &str = "PING";
const TAG_CONFIRMED: &str = "CONFIRMED";

/// Slot number sent when every slot is taken
const FULL_SENTINEL: i64 = -1;

/// Decode failures. Every variant means the record is malformed and
/// should be dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: empty record")]
    Empty,
    #[error("Malformed message: unknown type '{0}'")]
    UnknownType(String),
    #[error("Malformed message: {kind} is missing field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("Malformed message: {kind} has invalid {field} '{value}'")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Malformed message: unknown bubble color '{0}'")]
    UnknownColor(String),
    #[error("Malformed message: {kind} has {count} unexpected trailing field(s)")]
    TrailingFields { kind: &'static str, count: usize },
}

/// Rock as sent once in the join reply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RockSnapshot {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

/// One of the four fixed player blocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub tag: CollisionTag,
    pub health: i32,
    /// Milliseconds played
    pub time: u64,
}

impl PlayerSnapshot {
    /// Block sent for an empty slot: `-1,-1,-1,,0,0`
    pub const VACANT: PlayerSnapshot = PlayerSnapshot {
        x: -1.0,
        y: -1.0,
        rotation: -1.0,
        tag: CollisionTag::None,
        health: 0,
        time: 0,
    };

    pub fn is_vacant(&self) -> bool {
        self.rotation == -1.0
    }
}

/// Frog or turtle block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NpcSnapshot<S> {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub tag: CollisionTag,
    pub state: S,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BubbleSnapshot {
    pub id: BubbleId,
    pub x: f32,
    pub y: f32,
    pub color: PlayerColor,
}

/// The per-tick world portion shared by `PNO` and `UPD`
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSnapshot {
    pub players: [PlayerSnapshot; MAX_PLAYERS],
    pub frog: NpcSnapshot<FrogState>,
    pub turtle: NpcSnapshot<TurtleState>,
    pub bubbles: Vec<BubbleSnapshot>,
}

/// Outcome carried by `PNO`
#[derive(Debug, Clone, PartialEq)]
pub enum JoinReply {
    Assigned {
        slot: SlotIndex,
        rocks: Vec<RockSnapshot>,
        world: WorldSnapshot,
    },
    Full,
}

/// Every record that travels over the wire
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    /// Join reply with the initial world, or the full sentinel
    PlayerNumber { reply: JoinReply, timestamp: u64 },
    /// Client key press or release
    Key { key: Key, state: KeyState },
    /// Per-tick snapshot
    Update { world: WorldSnapshot, timestamp: u64 },
    /// Round-trip probe; the server echo carries its own timestamp
    Ping { id: String, timestamp: Option<u64> },
    /// Client finished loading and wants updates
    Confirmed { timestamp: u64 },
}

impl GameMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            GameMessage::PlayerNumber { .. } => TAG_PLAYER_NUMBER,
            GameMessage::Key { .. } => TAG_KEY,
            GameMessage::Update { .. } => TAG_UPDATE,
            GameMessage::Ping { .. } => TAG_PING,
            GameMessage::Confirmed { .. } => TAG_CONFIRMED,
        }
    }
}

/// Comma-joined record builder
struct RecordBuilder {
    buffer: String,
}

impl RecordBuilder {
    fn new(tag: &str) -> Self {
        let mut buffer = String::with_capacity(256);
        buffer.push_str(tag);
        Self { buffer }
    }

    fn field(mut self, value: impl Display) -> Self {
        use std::fmt::Write;
        self.buffer.push(',');
        // Writing into a String cannot fail
        let _ = write!(self.buffer, "{}", value);
        self
    }

    fn world(self, world: &WorldSnapshot) -> Self {
        let mut record = self;
        for player in &world.players {
            record = record
                .field(player.x)
                .field(player.y)
                .field(player.rotation)
                .field(player.tag.as_str())
                .field(player.health)
                .field(player.time);
        }
        record = record.npc(&world.frog).npc(&world.turtle);
        record = record.field(world.bubbles.len());
        for bubble in &world.bubbles {
            record = record
                .field(bubble.id)
                .field(bubble.x)
                .field(bubble.y)
                .field(bubble.color.code());
        }
        record
    }

    fn npc<S: Display>(self, npc: &NpcSnapshot<S>) -> Self {
        self.field(npc.x)
            .field(npc.y)
            .field(npc.rotation)
            .field(npc.tag.as_str())
            .field(&npc.state)
    }

    fn build(self) -> String {
        self.buffer
    }
}

/// Encode a message into one text record
pub fn encode(message: &GameMessage) -> String {
    match message {
        GameMessage::PlayerNumber { reply, timestamp } => {
            let record = RecordBuilder::new(TAG_PLAYER_NUMBER);
            let record = match reply {
                JoinReply::Full => record.field(FULL_SENTINEL),
                JoinReply::Assigned { slot, rocks, world } => {
                    let mut record = record.field(slot).field(rocks.len());
                    for rock in rocks {
                        record = record.field(rock.x).field(rock.y).field(rock.scale);
                    }
                    record.world(world)
                }
            };
            record.field(timestamp).build()
        }
        GameMessage::Key { key, state } => RecordBuilder::new(TAG_KEY)
            .field(key.as_str())
            .field(state.as_str())
            .build(),
        GameMessage::Update { world, timestamp } => RecordBuilder::new(TAG_UPDATE)
            .world(world)
            .field(timestamp)
            .build(),
        GameMessage::Ping { id, timestamp } => {
            let record = RecordBuilder::new(TAG_PING).field(id);
            match timestamp {
                Some(ts) => record.field(ts).build(),
                None => record.build(),
            }
        }
        GameMessage::Confirmed { timestamp } => RecordBuilder::new(TAG_CONFIRMED)
            .field(timestamp)
            .build(),
    }
}

/// Sequential field reader for one record
struct FieldReader<'a> {
    kind: &'static str,
    fields: std::str::Split<'a, char>,
}

impl<'a> FieldReader<'a> {
    fn new(kind: &'static str, fields: std::str::Split<'a, char>) -> Self {
        Self { kind, fields }
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.fields.next().ok_or(ProtocolError::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let raw = self.next(field)?;
        raw.trim().parse().map_err(|_| self.invalid(field, raw))
    }

    fn invalid(&self, field: &'static str, value: &str) -> ProtocolError {
        ProtocolError::InvalidField {
            kind: self.kind,
            field,
            value: value.to_string(),
        }
    }

    fn tag(&mut self) -> Result<CollisionTag, ProtocolError> {
        let raw = self.next("colorTag")?;
        CollisionTag::parse(raw).ok_or_else(|| self.invalid("colorTag", raw))
    }

    fn count(&mut self, field: &'static str) -> Result<usize, ProtocolError> {
        self.parse(field)
    }

    fn player(&mut self) -> Result<PlayerSnapshot, ProtocolError> {
        Ok(PlayerSnapshot {
            x: self.parse("x")?,
            y: self.parse("y")?,
            rotation: self.parse("rotation")?,
            tag: self.tag()?,
            health: self.parse("health")?,
            time: self.parse("time")?,
        })
    }

    fn npc<S: FromStr>(&mut self) -> Result<NpcSnapshot<S>, ProtocolError> {
        let x = self.parse("x")?;
        let y = self.parse("y")?;
        let rotation = self.parse("rotation")?;
        let tag = self.tag()?;
        let raw = self.next("state")?;
        let state = raw.parse().map_err(|_| self.invalid("state", raw))?;
        Ok(NpcSnapshot {
            x,
            y,
            rotation,
            tag,
            state,
        })
    }

    fn bubble(&mut self) -> Result<BubbleSnapshot, ProtocolError> {
        let id = self.parse("id")?;
        let x = self.parse("x")?;
        let y = self.parse("y")?;
        let raw = self.next("colorChar")?;
        let mut chars = raw.chars();
        let color = match (chars.next(), chars.next()) {
            (Some(code), None) => PlayerColor::from_code(code),
            _ => None,
        }
        .ok_or_else(|| ProtocolError::UnknownColor(raw.to_string()))?;
        Ok(BubbleSnapshot { id, x, y, color })
    }

    fn world(&mut self) -> Result<WorldSnapshot, ProtocolError> {
        let players = [self.player()?, self.player()?, self.player()?, self.player()?];
        let frog = self.npc()?;
        let turtle = self.npc()?;
        let count = self.count("bubbleCount")?;
        let mut bubbles = Vec::new();
        for _ in 0..count {
            bubbles.push(self.bubble()?);
        }
        Ok(WorldSnapshot {
            players,
            frog,
            turtle,
            bubbles,
        })
    }

    fn rocks(&mut self) -> Result<Vec<RockSnapshot>, ProtocolError> {
        let count = self.count("rockCount")?;
        let mut rocks = Vec::new();
        for _ in 0..count {
            rocks.push(RockSnapshot {
                x: self.parse("x")?,
                y: self.parse("y")?,
                scale: self.parse("scale")?,
            });
        }
        Ok(rocks)
    }

    /// Fail if anything is left over
    fn finish(mut self) -> Result<(), ProtocolError> {
        let count = self.fields.by_ref().count();
        if count == 0 {
            Ok(())
        } else {
            Err(ProtocolError::TrailingFields {
                kind: self.kind,
                count,
            })
        }
    }
}

/// Decode one text record
pub fn decode(text: &str) -> Result<GameMessage, ProtocolError> {
    let text = text.trim_end_matches(&['\r', '\n'][..]);
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let mut fields = text.split(',');
    let tag = fields.next().unwrap_or_default();

    let message = match tag {
        TAG_PLAYER_NUMBER => {
            let mut reader = FieldReader::new(TAG_PLAYER_NUMBER, fields);
            let raw = reader.next("playerNumber")?;
            let number: i64 = raw
                .trim()
                .parse()
                .map_err(|_| reader.invalid("playerNumber", raw))?;
            let reply = if number == FULL_SENTINEL {
                JoinReply::Full
            } else if (0..MAX_PLAYERS as i64).contains(&number) {
                let rocks = reader.rocks()?;
                let world = reader.world()?;
                JoinReply::Assigned {
                    slot: number as SlotIndex,
                    rocks,
                    world,
                }
            } else {
                return Err(reader.invalid("playerNumber", raw));
            };
            let timestamp = reader.parse("timestamp")?;
            reader.finish()?;
            GameMessage::PlayerNumber { reply, timestamp }
        }
        TAG_KEY => {
            let mut reader = FieldReader::new(TAG_KEY, fields);
            let raw = reader.next("key")?;
            let key = Key::parse(raw).ok_or_else(|| reader.invalid("key", raw))?;
            let raw = reader.next("keyState")?;
            let state = KeyState::parse(raw).ok_or_else(|| reader.invalid("keyState", raw))?;
            reader.finish()?;
            GameMessage::Key { key, state }
        }
        TAG_UPDATE => {
            let mut reader = FieldReader::new(TAG_UPDATE, fields);
            let world = reader.world()?;
            let timestamp = reader.parse("timestamp")?;
            reader.finish()?;
            GameMessage::Update { world, timestamp }
        }
        TAG_PING => {
            let mut reader = FieldReader::new(TAG_PING, fields);
            let id = reader.next("id")?.to_string();
            let timestamp = match reader.fields.next() {
                Some(raw) => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| reader.invalid("timestamp", raw))?,
                ),
                None => None,
            };
            reader.finish()?;
            GameMessage::Ping { id, timestamp }
        }
        TAG_CONFIRMED => {
            let mut reader = FieldReader::new(TAG_CONFIRMED, fields);
            let timestamp = reader.parse("timestamp")?;
            reader.finish()?;
            GameMessage::Confirmed { timestamp }
        }
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };

    Ok(message)
}
