//! Crash-safe world snapshots.
//!
//! The whole live world (players with their dogs and tokens, the loot on
//! the ground, and each session's item-id counter) is captured into a
//! versioned bincode file. Saving writes a temporary file and renames it
//! over the target, so a crash mid-save never corrupts the previous
//! snapshot. Tick timers (life time, idle time) are deliberately not part
//! of the snapshot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{Application, Token};
use crate::model::{Bag, Coords, Dog, LootInBag, LostObject, SessionId, Velocity};

/// Bumped whenever the snapshot layout changes; files with a different
/// version are rejected as corrupt.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("state file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file could not be encoded: {0}")]
    Encode(#[from] bincode::Error),
    #[error("state file is corrupt or has an incompatible version")]
    Corrupt,
}

#[derive(Serialize, Deserialize)]
struct LootInBagRepr {
    id: u32,
    type_index: usize,
    value: i32,
}

#[derive(Serialize, Deserialize)]
struct LostObjectRepr {
    id: u32,
    type_index: usize,
    value: i32,
    x: f64,
    y: f64,
}

#[derive(Serialize, Deserialize)]
struct DogRepr {
    id: u32,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    direction: String,
    bag_capacity: usize,
    bag: Vec<LootInBagRepr>,
    score: i32,
}

impl DogRepr {
    fn capture(dog: &Dog) -> Self {
        Self {
            id: dog.id(),
            x: dog.coords().x,
            y: dog.coords().y,
            vx: dog.velocity().vx,
            vy: dog.velocity().vy,
            direction: dog.direction().to_string(),
            bag_capacity: dog.bag().capacity(),
            bag: dog
                .bag()
                .items()
                .iter()
                .map(|item| LootInBagRepr {
                    id: item.id,
                    type_index: item.type_index,
                    value: item.value,
                })
                .collect(),
            score: dog.score(),
        }
    }

    fn restore(self) -> Dog {
        let mut dog = Dog::new(self.id, Coords::new(self.x, self.y), self.bag_capacity);
        dog.set_bag(Bag::with_items(
            self.bag_capacity,
            self.bag
                .into_iter()
                .map(|item| LootInBag {
                    id: item.id,
                    type_index: item.type_index,
                    value: item.value,
                })
                .collect(),
        ));
        dog.set_score(self.score);
        dog.set_direction(&self.direction);
        dog.set_velocity(Velocity::new(self.vx, self.vy));
        dog
    }
}

#[derive(Serialize, Deserialize)]
struct PlayerRepr {
    name: String,
    dog: DogRepr,
    token: String,
}

#[derive(Serialize, Deserialize)]
struct SessionRepr {
    players: Vec<PlayerRepr>,
    lost_objects: Vec<LostObjectRepr>,
    next_lost_object_id: u32,
}

#[derive(Serialize, Deserialize)]
struct ApplicationRepr {
    version: u32,
    sessions: Vec<SessionRepr>,
}

impl ApplicationRepr {
    fn capture(app: &Application) -> Self {
        let sessions = (0..app.session_count() as SessionId)
            .map(|session_id| {
                let players = app
                    .session_player_info(session_id)
                    .into_iter()
                    .filter_map(|(player, token)| {
                        let dog = app.dog(session_id, player.dog_id())?;
                        Some(PlayerRepr {
                            name: player.name().to_string(),
                            dog: DogRepr::capture(dog),
                            token: token.as_str().to_string(),
                        })
                    })
                    .collect();

                let session = app.session(session_id);
                let lost_objects = session
                    .map(|session| {
                        session
                            .lost_objects()
                            .values()
                            .map(|object| LostObjectRepr {
                                id: object.id(),
                                type_index: object.type_index(),
                                value: object.value(),
                                x: object.pos().x,
                                y: object.pos().y,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let next_lost_object_id = session
                    .map(|session| session.next_lost_object_id())
                    .unwrap_or_default();

                SessionRepr { players, lost_objects, next_lost_object_id }
            })
            .collect();

        Self { version: SNAPSHOT_VERSION, sessions }
    }

    fn apply(self, app: &mut Application) -> Result<(), SnapshotError> {
        // A snapshot taken with a different map set cannot be applied.
        if self.sessions.len() > app.session_count() {
            return Err(SnapshotError::Corrupt);
        }

        for (index, session) in self.sessions.into_iter().enumerate() {
            let session_id = index as SessionId;
            for player in session.players {
                let dog = player.dog.restore();
                app.restore_player(session_id, &player.name, Token::new(player.token), dog);
            }
            for object in session.lost_objects {
                app.restore_lost_object(
                    session_id,
                    LostObject::new(
                        object.id,
                        object.type_index,
                        object.value,
                        Coords::new(object.x, object.y),
                    ),
                );
            }
            app.set_next_lost_object_id(session_id, session.next_lost_object_id);
        }
        Ok(())
    }
}

/// Saves the world to `path` atomically (write temp, then rename).
pub fn save_application(app: &Application, path: &Path) -> Result<(), SnapshotError> {
    let repr = ApplicationRepr::capture(app);
    let bytes = bincode::serialize(&repr)?;

    let mut tmp_path = PathBuf::from(path);
    tmp_path.as_mut_os_string().push(".tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Restores the world from `path` into a freshly built application.
///
/// A missing file is not an error; the server simply starts empty. A file
/// that cannot be decoded, or whose version does not match, surfaces
/// [`SnapshotError::Corrupt`] and the caller aborts startup.
pub fn restore_application(app: &mut Application, path: &Path) -> Result<(), SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error.into()),
    };

    let repr: ApplicationRepr =
        bincode::deserialize(&bytes).map_err(|_| SnapshotError::Corrupt)?;
    if repr.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Corrupt);
    }
    repr.apply(app)
}
