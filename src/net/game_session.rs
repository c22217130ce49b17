//! Pond session and the task that drives it.
//!
//! `Session` owns the world, the player slots and the tick counter.
//! `SessionHost` is a single tokio task that owns the optional session
//! and handles transport commands and timer ticks strictly one at a time,
//! so no locking is needed around game state.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::net::COMMAND_QUEUE_DEPTH;
use crate::game::game_loop::{TickLoop, TickOutcome};
use crate::game::snapshot::rock_snapshots;
use crate::game::state::{SlotIndex, WorldState};
use crate::game::systems::input::{self, KeyChange};
use crate::game::systems::physics::RapierWorld;
use crate::metrics::Metrics;
use crate::net::protocol::{decode, encode, GameMessage, JoinReply, ProtocolError, WorldSnapshot};
use crate::net::session::{ConnectionHandle, ConnectionId, Delivery, JoinResult, SessionManager};
use crate::util::clock::{unix_millis, Millis, SessionClock};
use crate::util::rng::{self, RandomSource};

/// Work items for the session host
#[derive(Debug)]
pub enum SessionCommand {
    /// A client opened a stream
    Connect(ConnectionHandle),
    /// One text record from a client
    Inbound { connection: ConnectionId, text: String },
    /// The client's stream closed
    Disconnect(ConnectionId),
}

/// What an inbound record did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Key(KeyChange),
    Pong,
    /// `start_loop` is set when this confirm should start the ticker
    Confirmed { start_loop: bool },
    /// Valid record with nothing to do for this connection
    Ignored,
}

/// One running game
pub struct Session {
    world: WorldState,
    players: SessionManager,
    tick_loop: TickLoop,
    clock: SessionClock,
    rng: Box<dyn RandomSource>,
    running: bool,
    metrics: Arc<Metrics>,
}

impl Session {
    /// Build the pond: rocks, frog and turtle, with no players yet
    pub fn bootstrap(mut rng: Box<dyn RandomSource>, metrics: Arc<Metrics>) -> Self {
        let clock = SessionClock::start();
        let world = WorldState::bootstrap(RapierWorld::new(), rng.as_mut(), clock.now());
        metrics.sessions_started.fetch_add(1, Ordering::Relaxed);
        info!("Session started with {} rocks", world.rocks().len());

        Self {
            world,
            players: SessionManager::new(),
            tick_loop: TickLoop::new(),
            clock,
            rng,
            running: false,
            metrics,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn players(&self) -> &SessionManager {
        &self.players
    }

    pub fn population(&self) -> usize {
        self.players.population()
    }

    /// Tick loop has been started by a confirm
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_loop.tick_count()
    }

    fn send(&self, connection: &ConnectionHandle, message: &GameMessage) {
        self.send_text(connection, encode(message));
    }

    fn send_text(&self, connection: &ConnectionHandle, text: String) {
        let len = text.len();
        match connection.send(text) {
            Delivery::Queued => self.metrics.record_sent(len),
            Delivery::Dropped => {
                debug!("Outbound queue full for {}, dropping record", connection.id);
                self.metrics.record_dropped();
            }
            Delivery::Closed => {}
        }
    }

    /// Give `connection` a slot and a fish, replying with `PNO`
    pub fn join(&mut self, connection: ConnectionHandle) -> JoinResult {
        let result = self.players.join(connection.clone());
        let reply = match result {
            JoinResult::Joined(slot) => {
                self.world.spawn_fish(slot, self.rng.as_mut(), self.clock.now());
                info!("Connection {} joined as slot {}", connection.id, slot);
                JoinReply::Assigned {
                    slot,
                    rocks: rock_snapshots(&self.world),
                    world: WorldSnapshot::from_world(&self.world),
                }
            }
            JoinResult::Full => {
                info!("Connection {} turned away, pond is full", connection.id);
                JoinReply::Full
            }
        };

        self.send(
            &connection,
            &GameMessage::PlayerNumber {
                reply,
                timestamp: unix_millis(),
            },
        );
        self.update_population_metrics();
        result
    }

    /// Decode and apply one inbound record
    pub fn handle_message(&mut self, connection: ConnectionId, text: &str) -> Result<Handled, ProtocolError> {
        let message = decode(text)?;
        let kind = message.kind();
        let Some(slot) = self.players.slot_of(connection) else {
            debug!("Ignoring {} from connection {} without a slot", kind, connection);
            return Ok(Handled::Ignored);
        };

        let handled = match message {
            GameMessage::Key { key, state } => {
                Handled::Key(input::handle_key(&mut self.world, slot, key, state))
            }
            GameMessage::Ping { .. } => {
                // Echo the record exactly as received, with the server time appended
                if let Some(player) = self.players.slot(slot) {
                    self.send_text(&player.connection, format!("{},{}", text, unix_millis()));
                }
                Handled::Pong
            }
            GameMessage::Confirmed { .. } => {
                let first_ready = self.players.confirm(slot);
                let start_loop = first_ready && !self.running;
                if start_loop {
                    self.running = true;
                    let now = self.clock.now();
                    self.world.frog.reanchor(now);
                    self.world.turtle.reanchor(now);
                    info!("First player ready, starting tick loop");
                }
                self.update_population_metrics();
                Handled::Confirmed { start_loop }
            }
            GameMessage::PlayerNumber { .. } | GameMessage::Update { .. } => {
                debug!("Ignoring server-only {} from slot {}", kind, slot);
                Handled::Ignored
            }
        };

        Ok(handled)
    }

    /// Free the connection's slot and remove its fish
    pub fn leave_connection(&mut self, connection: ConnectionId) -> Option<SlotIndex> {
        let slot = self.players.slot_of(connection)?;
        self.players.leave(slot);
        self.world.remove_fish(slot);
        info!("Slot {} left, {} players remain", slot, self.population());
        self.update_population_metrics();
        Some(slot)
    }

    /// Run one tick at the session clock's current time
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Run one tick at session time `now` and broadcast its snapshot
    pub fn tick_at(&mut self, now: Millis) -> TickOutcome {
        let outcome = self.tick_loop.run(&mut self.world, now, self.rng.as_mut());

        let update = encode(&GameMessage::Update {
            world: outcome.snapshot.clone(),
            timestamp: unix_millis(),
        });
        let report = self.players.broadcast(&update);
        for _ in 0..report.queued {
            self.metrics.record_sent(update.len());
        }
        for _ in 0..report.dropped {
            self.metrics.record_dropped();
        }

        for &slot in &outcome.dead_slots {
            if let Some(player) = self.players.leave(slot) {
                info!("Fish in slot {} ran out of health, closing connection", slot);
                player.connection.close();
            }
            self.metrics.fish_deaths.fetch_add(1, Ordering::Relaxed);
        }

        self.metrics
            .bubbles_fired
            .fetch_add(outcome.bubbles_fired as u64, Ordering::Relaxed);
        self.metrics
            .bubbles_popped
            .fetch_add(outcome.collisions.bubbles_popped as u64, Ordering::Relaxed);
        self.metrics
            .bubble_count
            .store(self.world.bubble_count() as u64, Ordering::Relaxed);
        if !outcome.dead_slots.is_empty() {
            self.update_population_metrics();
        }

        outcome
    }

    fn update_population_metrics(&self) {
        self.metrics
            .players
            .store(self.players.population() as u64, Ordering::Relaxed);
        self.metrics
            .confirmed_players
            .store(self.players.confirmed_count() as u64, Ordering::Relaxed);
    }
}

/// Owns the optional session and its ticker
pub struct SessionHost {
    config: ServerConfig,
    metrics: Arc<Metrics>,
    commands: mpsc::Receiver<SessionCommand>,
    session: Option<Session>,
    ticker: Option<Interval>,
    sessions_created: u64,
}

/// Resolves on the next tick, or never when there is no ticker
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl SessionHost {
    pub fn new(
        config: ServerConfig,
        metrics: Arc<Metrics>,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        Self {
            config,
            metrics,
            commands,
            session: None,
            ticker: None,
            sessions_created: 0,
        }
    }

    /// Process commands and ticks until every sender is dropped
    pub async fn run(mut self) {
        info!("Session host ready, tick rate {} Hz", self.config.tick_rate);
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => self.tick(),
            }
        }
        self.teardown();
        info!("Session host stopped");
    }

    fn session_rng(&mut self) -> Box<dyn RandomSource> {
        let created = self.sessions_created;
        self.sessions_created += 1;
        match self.config.rng_seed {
            Some(seed) => rng::seeded(seed.wrapping_add(created)),
            None => rng::entropy(),
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(connection) => {
                if self.session.is_none() {
                    let rng = self.session_rng();
                    self.session = Some(Session::bootstrap(rng, self.metrics.clone()));
                }
                if let Some(session) = self.session.as_mut() {
                    session.join(connection);
                }
            }
            SessionCommand::Inbound { connection, text } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                match session.handle_message(connection, &text) {
                    Ok(Handled::Confirmed { start_loop: true }) => self.start_ticker(),
                    Ok(_) => {}
                    Err(e) => {
                        self.metrics.malformed_messages.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping record from {}: {}", connection, e);
                    }
                }
            }
            SessionCommand::Disconnect(connection) => {
                if let Some(session) = self.session.as_mut() {
                    session.leave_connection(connection);
                }
                self.teardown_if_empty();
            }
        }
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    fn tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.ticker = None;
            return;
        };

        let started = Instant::now();
        let outcome = session.tick();
        self.metrics.record_tick_time(started.elapsed());

        // Periodic summary every 30 seconds of play
        if outcome.tick % (u64::from(self.config.tick_rate) * 30) == 0 {
            info!(
                "Pond: tick {}, {} players, {} bubbles, frog {}, turtle {}",
                outcome.tick,
                session.population(),
                session.world().bubble_count(),
                session.world().frog.state(),
                session.world().turtle.state(),
            );
        }

        self.teardown_if_empty();
    }

    fn teardown_if_empty(&mut self) {
        if self.session.as_ref().is_some_and(|s| s.population() == 0) {
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        self.ticker = None;
        if let Some(session) = self.session.take() {
            info!("Session ended after {} ticks", session.tick_count());
            self.metrics.players.store(0, Ordering::Relaxed);
            self.metrics.confirmed_players.store(0, Ordering::Relaxed);
            self.metrics.bubble_count.store(0, Ordering::Relaxed);
        }
    }
}

/// Spawn the host task and return its command queue
pub fn spawn_session_host(config: ServerConfig, metrics: Arc<Metrics>) -> mpsc::Sender<SessionCommand> {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    tokio::spawn(SessionHost::new(config, metrics, rx).run());
    tx
}
