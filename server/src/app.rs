//! Application facade: players, tokens, sessions, and the per-tick update.
//!
//! This is the layer the HTTP handlers talk to. It owns the complete
//! mutable world (the maps, one session per map, and the player registry)
//! and is driven from a single-writer context: everything touching it runs
//! on one `tokio::sync::Mutex`, so none of the operations here need their
//! own locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::model::{
    Coords, Dog, DogId, Game, GameSession, LostObject, LostObjectId, Map, ModelError, PlayerId,
    SessionId, Velocity,
};
use crate::records::RetiredPlayerInfo;
use crate::snapshot::{self, SnapshotError};

/// Opaque authentication credential issued at join: 32 lowercase hex
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A joined player. The dog itself lives in the session; the player keeps
/// only the handle.
#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    name: String,
    dog_id: DogId,
}

impl Player {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dog_id(&self) -> DogId {
        self.dog_id
    }
}

/// The player/token registry.
///
/// Three maps are kept in step: token to player, session to its tokens (in
/// join order), and token back to session. Every mutation updates all
/// three.
pub struct Players {
    token_to_player: HashMap<Token, Player>,
    session_to_tokens: HashMap<SessionId, Vec<Token>>,
    token_to_session: HashMap<Token, SessionId>,
    next_player_id: PlayerId,
    rng: StdRng,
}

impl Players {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Registry with a caller-provided generator for reproducible tokens.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            token_to_player: HashMap::new(),
            session_to_tokens: HashMap::new(),
            token_to_session: HashMap::new(),
            next_player_id: 0,
            rng,
        }
    }

    /// Two 64-bit random values as hex make up the 32-character token.
    fn generate_token(&mut self) -> Token {
        let high: u64 = self.rng.gen();
        let low: u64 = self.rng.gen();
        Token(format!("{high:016x}{low:016x}"))
    }

    /// Registers a player for the given dog and session. A token is
    /// generated unless a restored one is supplied; player ids are
    /// assigned monotonically.
    pub fn add_player(
        &mut self,
        name: &str,
        dog_id: DogId,
        session_id: SessionId,
        restored_token: Option<Token>,
    ) -> (PlayerId, Token) {
        let player_id = self.next_player_id;
        self.next_player_id += 1;
        let token = restored_token.unwrap_or_else(|| self.generate_token());

        let player = Player { id: player_id, name: name.to_string(), dog_id };
        self.token_to_player.insert(token.clone(), player);
        self.session_to_tokens
            .entry(session_id)
            .or_default()
            .push(token.clone());
        self.token_to_session.insert(token.clone(), session_id);

        (player_id, token)
    }

    pub fn find_by_token(&self, token: &Token) -> Option<&Player> {
        self.token_to_player.get(token)
    }

    pub fn session_id_by_token(&self, token: &Token) -> Option<SessionId> {
        self.token_to_session.get(token).copied()
    }

    /// The session's players in join order.
    pub fn players_in_session(&self, session_id: SessionId) -> Vec<&Player> {
        self.session_to_tokens
            .get(&session_id)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|token| self.token_to_player.get(token))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The session's (player, token) pairs in join order; snapshot input.
    pub fn player_tokens_in_session(&self, session_id: SessionId) -> Vec<(&Player, &Token)> {
        self.session_to_tokens
            .get(&session_id)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|token| {
                        self.token_to_player.get(token).map(|player| (player, token))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops a player from all three maps.
    pub fn erase_by_token(&mut self, token: &Token) {
        if let Some(session_id) = self.token_to_session.remove(token) {
            if let Some(tokens) = self.session_to_tokens.get_mut(&session_id) {
                tokens.retain(|t| t != token);
            }
        }
        self.token_to_player.remove(token);
    }

    /// Retirement scan: accumulates idle time for every stationary dog and
    /// retires those idle for `retirement_ms` or longer. Retired players
    /// are removed from the registry; their dogs are left for the caller
    /// to erase from the sessions.
    pub fn on_tick(
        &mut self,
        sessions: &mut [GameSession],
        delta_ms: u64,
        retirement_ms: u64,
    ) -> Vec<RetiredPlayerInfo> {
        let mut retired = Vec::new();
        let mut tokens_to_remove = Vec::new();

        for (token, player) in &self.token_to_player {
            let Some(&session_id) = self.token_to_session.get(token) else {
                continue;
            };
            let Some(session) = sessions.get_mut(session_id as usize) else {
                continue;
            };
            let Some(dog) = session.dog_mut(player.dog_id) else {
                continue;
            };

            if !dog.velocity().is_zero() {
                continue;
            }

            let inactive_ms = dog.add_inactive_time(delta_ms);
            if inactive_ms >= retirement_ms {
                retired.push(RetiredPlayerInfo {
                    id: Uuid::new_v4(),
                    name: player.name.clone(),
                    score: dog.score(),
                    play_time_ms: (dog.life_time_seconds() * 1000.0) as i64,
                    session_id,
                    dog_id: player.dog_id,
                });
                tokens_to_remove.push(token.clone());
            }
        }

        for token in tokens_to_remove {
            self.erase_by_token(&token);
        }

        retired
    }
}

impl Default for Players {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick listener. There is at most one: the periodic snapshot writer.
pub enum Listener {
    None,
    Snapshot {
        path: PathBuf,
        period_ms: u64,
        elapsed_ms: u64,
    },
}

impl Listener {
    /// Accumulates elapsed time; returns the snapshot path when a save is
    /// due, resetting the accumulator.
    fn on_tick(&mut self, delta_ms: u64) -> Option<PathBuf> {
        match self {
            Listener::None => None,
            Listener::Snapshot { path, period_ms, elapsed_ms } => {
                *elapsed_ms += delta_ms;
                if *elapsed_ms < *period_ms {
                    return None;
                }
                *elapsed_ms = 0;
                Some(path.clone())
            }
        }
    }
}

/// The application: the complete game world plus the registry, composed
/// behind the operations the HTTP layer needs.
pub struct Application {
    game: Game,
    sessions: Vec<GameSession>,
    players: Players,
    manual_tick: bool,
    randomize_spawn: bool,
    dog_retirement_time_ms: u64,
    listener: Listener,
}

impl Application {
    /// Builds the application with one session per map.
    pub fn new(game: Game, manual_tick: bool, randomize_spawn: bool) -> Result<Self, ModelError> {
        if game.maps().is_empty() {
            return Err(ModelError::NoMaps);
        }
        let sessions = game
            .maps()
            .iter()
            .enumerate()
            .map(|(index, map)| GameSession::new(index as SessionId, map))
            .collect();
        let dog_retirement_time_ms = game.maps()[0].dog_retirement_time_ms();

        Ok(Self {
            game,
            sessions,
            players: Players::new(),
            manual_tick,
            randomize_spawn,
            dog_retirement_time_ms,
            listener: Listener::None,
        })
    }

    /// Swaps in a deterministic registry; test support.
    pub fn with_players(mut self, players: Players) -> Self {
        self.players = players;
        self
    }

    pub fn set_snapshot_listener(&mut self, path: PathBuf, period_ms: u64) {
        self.listener = Listener::Snapshot { path, period_ms, elapsed_ms: 0 };
    }

    pub fn is_manual_tick(&self) -> bool {
        self.manual_tick
    }

    pub fn maps(&self) -> &[Map] {
        self.game.maps()
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.game.find_map(id)
    }

    pub fn map_exists(&self, id: &str) -> bool {
        self.game.map_index(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Joins a player to the session of the given map. Returns `None`
    /// when the map id is unknown.
    pub fn join(&mut self, user_name: &str, map_id: &str) -> Option<(PlayerId, Token)> {
        let map_index = self.game.map_index(map_id)?;
        let map = &self.game.maps()[map_index];
        let session = &mut self.sessions[map_index];

        let coords = if self.randomize_spawn {
            session.random_coord_in_roads(map)
        } else {
            Coords::from(map.first_road_start())
        };
        let dog_id = session.add_dog(map, coords);
        let (player_id, token) =
            self.players
                .add_player(user_name, dog_id, map_index as SessionId, None);

        info!("player {player_id} ('{user_name}') joined map '{map_id}' as dog {dog_id}");
        Some((player_id, token))
    }

    pub fn find_player_by_token(&self, token: &Token) -> Option<&Player> {
        self.players.find_by_token(token)
    }

    pub fn session_id_by_token(&self, token: &Token) -> Option<SessionId> {
        self.players.session_id_by_token(token)
    }

    /// The players sharing a session with the token's owner, in join
    /// order.
    pub fn players_in_session_by_token(&self, token: &Token) -> Option<Vec<&Player>> {
        let session_id = self.players.session_id_by_token(token)?;
        Some(self.players.players_in_session(session_id))
    }

    pub fn dog(&self, session_id: SessionId, dog_id: DogId) -> Option<&Dog> {
        self.sessions.get(session_id as usize)?.dog(dog_id)
    }

    pub fn lost_objects_by_token(
        &self,
        token: &Token,
    ) -> Option<&std::collections::BTreeMap<LostObjectId, LostObject>> {
        let session_id = self.players.session_id_by_token(token)?;
        Some(self.sessions.get(session_id as usize)?.lost_objects())
    }

    /// Applies a move command to the token's dog. The command must already
    /// be validated; returns false when the token is unknown.
    pub fn move_dog(&mut self, token: &Token, command: &str) -> bool {
        let Some(session_id) = self.players.session_id_by_token(token) else {
            return false;
        };
        let Some(player) = self.players.find_by_token(token) else {
            return false;
        };
        let dog_id = player.dog_id();
        let speed = self.game.maps()[session_id as usize].dog_speed();
        let Some(dog) = self.sessions[session_id as usize].dog_mut(dog_id) else {
            return false;
        };

        let velocity = match command {
            "U" => Velocity::new(0.0, -speed),
            "D" => Velocity::new(0.0, speed),
            "L" => Velocity::new(-speed, 0.0),
            "R" => Velocity::new(speed, 0.0),
            "" => Velocity::default(),
            _ => return false,
        };
        dog.set_direction(command);
        dog.set_velocity(velocity);
        true
    }

    /// Advances the whole world by `delta_ms`: session updates, the
    /// snapshot listener, then retirement. Retired dogs are erased from
    /// their sessions; the returned records still have to be persisted by
    /// the caller.
    pub fn update_game_state(
        &mut self,
        delta_ms: u64,
    ) -> Result<Vec<RetiredPlayerInfo>, SnapshotError> {
        let delta_seconds = delta_ms as f64 / 1000.0;
        for (index, session) in self.sessions.iter_mut().enumerate() {
            session.update(&self.game.maps()[index], delta_seconds);
        }

        if let Some(path) = self.listener.on_tick(delta_ms) {
            snapshot::save_application(self, &path)?;
            info!("world snapshot saved to {}", path.display());
        }

        let retired =
            self.players
                .on_tick(&mut self.sessions, delta_ms, self.dog_retirement_time_ms);
        for info in &retired {
            if let Some(session) = self.sessions.get_mut(info.session_id as usize) {
                session.erase_dog(info.dog_id);
            }
            info!(
                "player '{}' retired with score {} after {} ms",
                info.name, info.score, info.play_time_ms
            );
        }
        Ok(retired)
    }

    /// Writes a snapshot to `path` immediately; the final-save path used
    /// at shutdown.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), SnapshotError> {
        snapshot::save_application(self, path)
    }

    // Snapshot restore hooks. These mirror the shape of the snapshot file:
    // players arrive with their dogs and tokens, lost objects and the item
    // counter separately, all keyed by session index.

    pub fn session_player_info(&self, session_id: SessionId) -> Vec<(&Player, &Token)> {
        self.players.player_tokens_in_session(session_id)
    }

    pub fn session(&self, session_id: SessionId) -> Option<&GameSession> {
        self.sessions.get(session_id as usize)
    }

    pub fn restore_player(
        &mut self,
        session_id: SessionId,
        name: &str,
        token: Token,
        dog: Dog,
    ) {
        let index = session_id as usize;
        let dog_id = dog.id();
        let map = &self.game.maps()[index];
        self.sessions[index].insert_dog(map, dog);
        self.players.add_player(name, dog_id, session_id, Some(token));
    }

    pub fn restore_lost_object(&mut self, session_id: SessionId, object: LostObject) {
        self.sessions[session_id as usize].add_lost_object(object);
    }

    pub fn set_next_lost_object_id(&mut self, session_id: SessionId, next_id: u32) {
        self.sessions[session_id as usize].set_next_lost_object_id(next_id);
    }
}
