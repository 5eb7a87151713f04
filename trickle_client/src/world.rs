//! Remote entity reconciliation.
//!
//! [`World`] is the plain state: remote entity snapshots keyed by user id, the
//! local player, and the chat log. Every inbound event goes through
//! [`World::apply`], which is an upsert keyed by user id.
//!
//! [`WorldState`] wires a shared `World` to a [`ConnectionHandle`]: it
//! subscribes the apply functions to the inbound event kinds and routes local
//! input (predicted immediately, then sent) through the same handle.
//!
//! Events about the local player never touch the remote map. Its position is
//! purely predicted; only server-reported health is taken over.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};
use trickle_shared::{
    event::{ChatLine, ClientEvent, Damage, Direction, EventKind, Movement, ServerEvent, MAX_HEALTH},
    math::{Rect, Vec2},
};

use crate::connection::{ConnectionHandle, SendError};

/// Cached state of one remote player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub facing: Direction,
    pub health: i32,
    /// Attacks seen from this player; presentation plays one animation per bump.
    pub attacks: u32,
    /// Highest sequence number applied, when the server sends them.
    pub last_seq: Option<u64>,
}

impl EntitySnapshot {
    fn spawn(id: &str, at: Vec2) -> Self {
        Self {
            id: id.to_string(),
            x: at.x,
            y: at.y,
            facing: Direction::default(),
            health: MAX_HEALTH,
            attacks: 0,
            last_seq: None,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Player-sized box at the current position.
    pub fn bounds(&self) -> Rect {
        Rect::player_at(self.x, self.y)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// The local player. Moves are predicted here before being sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalPlayer {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub facing: Direction,
    pub health: i32,
}

impl LocalPlayer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            x: 0.0,
            y: 0.0,
            facing: Direction::default(),
            health: MAX_HEALTH,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::player_at(self.x, self.y)
    }
}

/// One received chat line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub user_id: Option<String>,
    pub msg: String,
    pub received_at: DateTime<Utc>,
}

/// Everything the mirror holds, as printed by the `dump` console command.
#[derive(Debug, Clone, Serialize)]
pub struct WorldDump {
    pub local: LocalPlayer,
    pub entities: Vec<EntitySnapshot>,
    pub chat: Vec<ChatEntry>,
}

/// What an inbound event did to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new remote entity was created.
    Spawned,
    Updated,
    Removed,
    /// Older than what was already applied; discarded.
    Stale,
    /// Addressed to the local player.
    Local,
    ChatAppended,
    /// Nothing to do (unknown entity for attack/leave).
    Ignored,
}

fn is_stale(last: Option<u64>, seq: Option<u64>) -> bool {
    matches!((last, seq), (Some(last), Some(seq)) if seq <= last)
}

/// Client-side mirror of the game world.
#[derive(Debug, Clone)]
pub struct World {
    local: LocalPlayer,
    entities: BTreeMap<String, EntitySnapshot>,
    chat: Vec<ChatEntry>,
}

impl World {
    pub fn new(local_id: &str) -> Self {
        Self {
            local: LocalPlayer::new(local_id),
            entities: BTreeMap::new(),
            chat: Vec::new(),
        }
    }

    /// Applies one inbound event.
    pub fn apply(&mut self, event: &ServerEvent) -> Applied {
        match event {
            ServerEvent::Move(m) => self.apply_move(m),
            ServerEvent::Attack { user_id } => match user_id {
                Some(id) => self.apply_attack(id),
                None => Applied::Ignored,
            },
            ServerEvent::Damage(d) => self.apply_damage(d),
            ServerEvent::Chat(c) => self.apply_chat(c),
            ServerEvent::Leave { user_id } => self.apply_leave(user_id),
        }
    }

    /// Upserts the mover's position (and facing, when echoed).
    pub fn apply_move(&mut self, m: &Movement) -> Applied {
        if m.user_id == self.local.id {
            return Applied::Local;
        }
        match self.entities.get_mut(&m.user_id) {
            Some(entity) => {
                if is_stale(entity.last_seq, m.seq) {
                    return Applied::Stale;
                }
                entity.x = m.dimensions.x;
                entity.y = m.dimensions.y;
                if let Some(facing) = m.direction {
                    entity.facing = facing;
                }
                entity.last_seq = m.seq.or(entity.last_seq);
                Applied::Updated
            }
            None => {
                let mut entity = EntitySnapshot::spawn(&m.user_id, m.dimensions.origin());
                if let Some(facing) = m.direction {
                    entity.facing = facing;
                }
                entity.last_seq = m.seq;
                self.entities.insert(m.user_id.clone(), entity);
                Applied::Spawned
            }
        }
    }

    /// Same upsert as a move for the position; health is a separate step and
    /// only written when the server sends it.
    pub fn apply_damage(&mut self, d: &Damage) -> Applied {
        if d.user_id == self.local.id {
            if let Some(health) = d.health {
                self.local.health = health;
            }
            return Applied::Local;
        }

        let known = self.entities.contains_key(&d.user_id);
        let entity = self
            .entities
            .entry(d.user_id.clone())
            .or_insert_with(|| {
                let at = d.dimensions.map_or(Vec2::ZERO, |dim| dim.origin());
                EntitySnapshot::spawn(&d.user_id, at)
            });
        if known {
            if is_stale(entity.last_seq, d.seq) {
                return Applied::Stale;
            }
            if let Some(dim) = d.dimensions {
                entity.x = dim.x;
                entity.y = dim.y;
            }
        }
        if let Some(health) = d.health {
            entity.health = health;
        }
        entity.last_seq = d.seq.or(entity.last_seq);
        if known {
            Applied::Updated
        } else {
            Applied::Spawned
        }
    }

    pub fn apply_attack(&mut self, user_id: &str) -> Applied {
        if user_id == self.local.id {
            return Applied::Local;
        }
        match self.entities.get_mut(user_id) {
            Some(entity) => {
                entity.attacks = entity.attacks.wrapping_add(1);
                Applied::Updated
            }
            None => Applied::Ignored,
        }
    }

    /// Appends to the chat log. No dedup, no cap.
    pub fn apply_chat(&mut self, c: &ChatLine) -> Applied {
        self.chat.push(ChatEntry {
            user_id: c.user_id.clone(),
            msg: c.msg.clone(),
            received_at: Utc::now(),
        });
        Applied::ChatAppended
    }

    pub fn apply_leave(&mut self, user_id: &str) -> Applied {
        match self.entities.remove(user_id) {
            Some(_) => Applied::Removed,
            None => Applied::Ignored,
        }
    }

    /// Local prediction: face `direction` and step one unit that way.
    pub fn predict_move(&mut self, direction: Direction) -> &LocalPlayer {
        let (dx, dy) = direction.delta();
        self.local.facing = direction;
        self.local.x += dx;
        self.local.y += dy;
        &self.local
    }

    pub fn entities(&self) -> &BTreeMap<String, EntitySnapshot> {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&EntitySnapshot> {
        self.entities.get(id)
    }

    pub fn local_player(&self) -> &LocalPlayer {
        &self.local
    }

    pub fn chat(&self) -> &[ChatEntry] {
        &self.chat
    }

    /// Remote entities whose box overlaps the local player's.
    pub fn in_reach(&self) -> Vec<&EntitySnapshot> {
        let me = self.local.bounds();
        self.entities
            .values()
            .filter(|e| e.bounds().intersects(&me))
            .collect()
    }
}

/// Reconciler: a shared [`World`] kept in sync with a connection.
#[derive(Clone)]
pub struct WorldState {
    world: Arc<Mutex<World>>,
    conn: ConnectionHandle,
}

impl WorldState {
    /// Kinds the reconciler subscribes to.
    pub const KINDS: [EventKind; 5] = EventKind::ALL;

    /// Creates the mirror for `local_id` and subscribes it to `conn`.
    pub fn attach(conn: ConnectionHandle, local_id: &str) -> Self {
        let world = Arc::new(Mutex::new(World::new(local_id)));
        for kind in Self::KINDS {
            let world = Arc::clone(&world);
            conn.subscribe(kind, move |event| {
                let applied = world.lock().apply(event);
                trace!(kind = %event.kind(), user = ?event.user_id(), ?applied, "Event applied");
                Ok(())
            });
        }
        Self { world, conn }
    }

    pub fn apply_move(&self, m: &Movement) -> Applied {
        self.world.lock().apply_move(m)
    }

    pub fn apply_damage(&self, d: &Damage) -> Applied {
        self.world.lock().apply_damage(d)
    }

    pub fn apply_chat(&self, c: &ChatLine) -> Applied {
        self.world.lock().apply_chat(c)
    }

    /// Predicts the move locally, then sends it. The prediction stands even
    /// if the send is refused.
    pub fn send_local_move(&self, direction: Direction) -> Result<(), SendError> {
        {
            let mut world = self.world.lock();
            let local = world.predict_move(direction);
            trace!(x = local.x, y = local.y, facing = %local.facing, "Predicted move");
        }
        self.conn.send(&ClientEvent::Move { direction }).inspect_err(|e| {
            debug!(error = %e, "Move not sent");
        })
    }

    /// Sends an attack and returns the facing to animate it with. Facing is
    /// unchanged.
    pub fn send_local_attack(&self) -> Result<Direction, SendError> {
        let facing = self.world.lock().local_player().facing;
        self.conn.send(&ClientEvent::Attack).inspect_err(|e| {
            debug!(error = %e, "Attack not sent");
        })?;
        Ok(facing)
    }

    /// Sends a chat line. The log only grows from inbound frames.
    pub fn send_chat(&self, text: &str) -> Result<(), SendError> {
        self.conn.send(&ClientEvent::Chat {
            msg: text.to_string(),
        })
    }

    pub fn entities(&self) -> BTreeMap<String, EntitySnapshot> {
        self.world.lock().entities().clone()
    }

    pub fn entity(&self, id: &str) -> Option<EntitySnapshot> {
        self.world.lock().entity(id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.world.lock().entities().len()
    }

    pub fn local_player(&self) -> LocalPlayer {
        self.world.lock().local_player().clone()
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.world.lock().chat().iter().map(|c| c.msg.clone()).collect()
    }

    pub fn chat_entries(&self) -> Vec<ChatEntry> {
        self.world.lock().chat().to_vec()
    }

    /// Chat entries after the first `seen`.
    pub fn chat_since(&self, seen: usize) -> Vec<ChatEntry> {
        self.world
            .lock()
            .chat()
            .get(seen..)
            .map(<[ChatEntry]>::to_vec)
            .unwrap_or_default()
    }

    /// Consistent copy of the whole mirror, entities ordered by id.
    pub fn dump(&self) -> WorldDump {
        let world = self.world.lock();
        WorldDump {
            local: world.local_player().clone(),
            entities: world.entities().values().cloned().collect(),
            chat: world.chat().to_vec(),
        }
    }

    pub fn in_reach(&self) -> Vec<EntitySnapshot> {
        self.world.lock().in_reach().into_iter().cloned().collect()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        connection::{Connection, ConnectionOptions},
        transport::{MemoryConnector, MemoryPeer},
    };

    fn mv(id: &str, x: f64, y: f64) -> Movement {
        Movement {
            user_id: id.into(),
            dimensions: Rect::new(x, y, 0.0, 0.0),
            direction: None,
            seq: None,
        }
    }

    fn mv_seq(id: &str, x: f64, y: f64, seq: u64) -> Movement {
        Movement {
            seq: Some(seq),
            ..mv(id, x, y)
        }
    }

    // ---- World -------------------------------------------------------------

    #[test]
    fn repeated_moves_leave_the_last_position() {
        let mut world = World::new("me");
        let positions = [(1.0, 1.0), (4.0, 2.0), (-3.0, 8.0), (9.0, 7.0)];
        for (x, y) in positions {
            world.apply_move(&mv("p2", x, y));
        }
        let p2 = world.entity("p2").unwrap();
        assert_eq!((p2.x, p2.y), (9.0, 7.0));
        assert_eq!(world.entities().len(), 1);
    }

    #[test]
    fn first_event_spawns_exactly_one_entity() {
        let mut world = World::new("me");
        assert_eq!(world.apply_move(&mv("p2", 5.0, 7.0)), Applied::Spawned);
        assert_eq!(world.apply_move(&mv("p2", 9.0, 7.0)), Applied::Updated);

        let dmg = Damage {
            user_id: "p3".into(),
            dimensions: Some(Rect::new(2.0, 3.0, 0.0, 0.0)),
            health: None,
            seq: None,
        };
        assert_eq!(world.apply_damage(&dmg), Applied::Spawned);
        assert_eq!(world.apply_damage(&dmg), Applied::Updated);

        assert_eq!(world.entities().len(), 2);
        let p3 = world.entity("p3").unwrap();
        assert_eq!((p3.x, p3.y), (2.0, 3.0));
        assert_eq!(p3.health, MAX_HEALTH);
        assert_eq!(p3.facing, Direction::North);
    }

    #[test]
    fn damage_health_is_written_separately_from_position() {
        let mut world = World::new("me");
        world.apply_move(&mv("p2", 5.0, 7.0));

        let hit = Damage {
            user_id: "p2".into(),
            dimensions: None,
            health: Some(5),
            seq: None,
        };
        assert_eq!(world.apply_damage(&hit), Applied::Updated);
        let p2 = world.entity("p2").unwrap();
        assert_eq!((p2.x, p2.y, p2.health), (5.0, 7.0, 5));

        let fatal = Damage {
            health: Some(0),
            ..hit
        };
        world.apply_damage(&fatal);
        assert!(!world.entity("p2").unwrap().is_alive());
    }

    #[test]
    fn damage_for_unseen_id_without_position_spawns_at_origin() {
        let mut world = World::new("me");
        let hit = Damage {
            user_id: "ghost".into(),
            dimensions: None,
            health: Some(4),
            seq: None,
        };
        assert_eq!(world.apply_damage(&hit), Applied::Spawned);
        let ghost = world.entity("ghost").unwrap();
        assert_eq!(ghost.position(), Vec2::ZERO);
        assert_eq!(ghost.health, 4);
    }

    #[test]
    fn stale_sequence_numbers_are_discarded() {
        let mut world = World::new("me");
        world.apply_move(&mv_seq("p2", 1.0, 1.0, 10));
        assert_eq!(world.apply_move(&mv_seq("p2", 0.0, 0.0, 9)), Applied::Stale);
        assert_eq!(world.apply_move(&mv_seq("p2", 0.0, 0.0, 10)), Applied::Stale);
        assert_eq!(world.entity("p2").unwrap().position(), Vec2::new(1.0, 1.0));

        // Unsequenced frames are always taken and keep the high-water mark.
        assert_eq!(world.apply_move(&mv("p2", 2.0, 2.0)), Applied::Updated);
        assert_eq!(world.entity("p2").unwrap().last_seq, Some(10));
        assert_eq!(world.apply_move(&mv_seq("p2", 3.0, 3.0, 11)), Applied::Updated);
        assert_eq!(world.entity("p2").unwrap().position(), Vec2::new(3.0, 3.0));
    }

    #[test]
    fn stale_damage_leaves_position_and_health() {
        let mut world = World::new("me");
        world.apply_move(&mv_seq("p2", 4.0, 4.0, 7));

        let stale = Damage {
            user_id: "p2".into(),
            dimensions: Some(Rect::new(0.0, 0.0, 0.0, 0.0)),
            health: Some(1),
            seq: Some(7),
        };
        assert_eq!(world.apply_damage(&stale), Applied::Stale);
        assert_eq!(world.apply_damage(&Damage { seq: Some(3), ..stale.clone() }), Applied::Stale);
        let p2 = world.entity("p2").unwrap();
        assert_eq!((p2.x, p2.y, p2.health), (4.0, 4.0, MAX_HEALTH));
        assert_eq!(p2.last_seq, Some(7));

        let fresh = Damage {
            seq: Some(8),
            ..stale
        };
        assert_eq!(world.apply_damage(&fresh), Applied::Updated);
        let p2 = world.entity("p2").unwrap();
        assert_eq!((p2.x, p2.y, p2.health), (0.0, 0.0, 1));
        assert_eq!(p2.last_seq, Some(8));
    }

    #[test]
    fn leave_removes_and_unknown_leave_is_ignored() {
        let mut world = World::new("me");
        world.apply_move(&mv("p2", 1.0, 1.0));
        assert_eq!(world.apply_leave("p2"), Applied::Removed);
        assert!(world.entity("p2").is_none());
        assert_eq!(world.apply_leave("p2"), Applied::Ignored);

        // A later move spawns it again.
        assert_eq!(world.apply_move(&mv("p2", 1.0, 1.0)), Applied::Spawned);
    }

    #[test]
    fn local_player_is_not_mirrored_but_takes_health() {
        let mut world = World::new("me");
        world.predict_move(Direction::South);
        assert_eq!(world.apply_move(&mv("me", 40.0, 40.0)), Applied::Local);
        assert!(world.entities().is_empty());
        assert_eq!(world.local_player().y, 1.0);

        let hit = Damage {
            user_id: "me".into(),
            dimensions: Some(Rect::new(40.0, 40.0, 0.0, 0.0)),
            health: Some(3),
            seq: None,
        };
        assert_eq!(world.apply_damage(&hit), Applied::Local);
        assert_eq!(world.local_player().health, 3);
        assert_eq!(world.local_player().x, 0.0);
    }

    #[test]
    fn attacks_bump_known_entities_only() {
        let mut world = World::new("me");
        assert_eq!(world.apply_attack("p2"), Applied::Ignored);
        world.apply_move(&mv("p2", 0.0, 0.0));
        world.apply_attack("p2");
        world.apply_attack("p2");
        assert_eq!(world.entity("p2").unwrap().attacks, 2);
        assert_eq!(
            world.apply(&ServerEvent::Attack { user_id: None }),
            Applied::Ignored
        );
    }

    #[test]
    fn prediction_steps_one_unit_and_sets_facing() {
        let mut world = World::new("me");
        assert_eq!(world.local_player().facing, Direction::North);
        world.predict_move(Direction::East);
        world.predict_move(Direction::East);
        world.predict_move(Direction::North);
        world.predict_move(Direction::West);
        let me = world.local_player();
        assert_eq!((me.x, me.y), (1.0, -1.0));
        assert_eq!(me.facing, Direction::West);
    }

    #[test]
    fn in_reach_uses_player_boxes() {
        let mut world = World::new("me");
        world.apply_move(&mv("near", 8.0, 8.0));
        world.apply_move(&mv("far", 100.0, 100.0));
        let ids: Vec<_> = world.in_reach().into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
    }

    // ---- WorldState over a connection ---------------------------------------

    async fn attached() -> (WorldState, MemoryPeer, Arc<MemoryConnector>) {
        let connector = Arc::new(MemoryConnector::new());
        let (handle, driver) =
            Connection::open(connector.clone(), "mem://w".into(), ConnectionOptions::default());
        let world = WorldState::attach(handle, "me");
        driver.spawn();
        let peer = connector.next_peer().await.unwrap();
        world.connection().connected().await.unwrap();
        (world, peer, connector)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_move_frames_upsert_entities() {
        let (world, peer, _c) = attached().await;
        assert!(world.entities().is_empty());

        peer.send(r#"{"type":0,"body":{"user_id":"p2","dimensions":{"x":5,"y":7}}}"#);
        settle().await;
        let entities = world.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!((entities["p2"].x, entities["p2"].y), (5.0, 7.0));

        peer.send(r#"{"type":0,"body":{"user_id":"p2","dimensions":{"x":9,"y":7}}}"#);
        settle().await;
        let entities = world.entities();
        assert_eq!(entities.len(), 1);
        assert_eq!((entities["p2"].x, entities["p2"].y), (9.0, 7.0));
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_chat_does_not_self_append() {
        let (world, mut peer, _c) = attached().await;

        world.send_chat("hi").unwrap();
        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"{"type":3,"body":{"msg":"hi"}}"#)
        );
        assert!(world.chat_log().is_empty());

        peer.send(r#"{"type":3,"body":{"msg":"hi"}}"#);
        settle().await;
        assert_eq!(world.chat_log(), vec!["hi"]);

        peer.send(r#"{"type":3,"user_id":"p2","body":{"msg":"hi"}}"#);
        settle().await;
        assert_eq!(world.chat_log(), vec!["hi", "hi"]);
        assert_eq!(world.chat_since(1)[0].user_id.as_deref(), Some("p2"));
        assert!(world.chat_since(5).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn local_move_is_predicted_before_the_round_trip() {
        let (world, mut peer, _c) = attached().await;

        world.send_local_move(Direction::East).unwrap();
        // Applied synchronously, nothing received from the server yet.
        let me = world.local_player();
        assert_eq!(me.facing, Direction::East);
        assert_eq!((me.x, me.y), (1.0, 0.0));

        assert_eq!(
            peer.recv().await.as_deref(),
            Some(r#"{"type":0,"body":{"direction":1}}"#)
        );

        assert_eq!(world.send_local_attack().unwrap(), Direction::East);
        assert_eq!(peer.recv().await.as_deref(), Some(r#"{"type":1}"#));
        assert_eq!(world.local_player().facing, Direction::East);
    }

    #[tokio::test(start_paused = true)]
    async fn prediction_stands_when_disconnected() {
        let (world, peer, _c) = attached().await;
        peer.close();
        settle().await;

        let err = world.send_local_move(Direction::South).unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
        let me = world.local_player();
        assert_eq!((me.x, me.y, me.facing), (0.0, 1.0, Direction::South));
    }

    #[tokio::test(start_paused = true)]
    async fn in_reach_follows_prediction_and_broadcasts() {
        let (world, peer, _c) = attached().await;
        peer.send(r#"{"type":0,"user_id":"p2","body":{"dimensions":{"x":20,"y":0}}}"#);
        peer.send(r#"{"type":0,"user_id":"p3","body":{"dimensions":{"x":200,"y":0}}}"#);
        settle().await;
        assert!(world.in_reach().is_empty());

        // Five steps east put the 16-wide boxes into overlap with p2 only.
        for _ in 0..5 {
            world.send_local_move(Direction::East).unwrap();
        }
        let near: Vec<_> = world.in_reach().into_iter().map(|e| e.id).collect();
        assert_eq!(near, vec!["p2"]);

        peer.send(r#"{"type":4,"user_id":"p2"}"#);
        settle().await;
        assert!(world.in_reach().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leave_frames_despawn_and_state_survives_reconnect() {
        let (world, peer, connector) = attached().await;
        peer.send(r#"{"type":0,"user_id":"p2","body":{"dimensions":{"x":1,"y":1}}}"#);
        peer.send(r#"{"type":0,"user_id":"p3","body":{"dimensions":{"x":2,"y":2}}}"#);
        settle().await;
        peer.close();

        let peer = connector.next_peer().await.unwrap();
        peer.send(r#"{"type":4,"user_id":"p2"}"#);
        peer.send(r#"{"type":2,"user_id":"p3","body":{"health":2}}"#);
        settle().await;

        let entities = world.entities();
        assert_eq!(entities.keys().collect::<Vec<_>>(), vec!["p3"]);
        assert_eq!(entities["p3"].health, 2);
        assert_eq!(world.entity_count(), 1);
    }
}
