use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::Game;

const SESSION_FILE: &str = "session.json";
const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    game: Option<Game>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
    data: Arc<Mutex<SessionFile>>,
}

impl SessionStore {
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(SESSION_FILE);
        let data = load_session_file(&path);
        Self {
            path: Some(path),
            data: Arc::new(Mutex::new(data)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Arc::new(Mutex::new(SessionFile::default())),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.data
            .lock()
            .expect("session lock poisoned")
            .token
            .clone()
    }

    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.update(|data| data.token = Some(token))
    }

    pub fn game(&self) -> Game {
        self.data
            .lock()
            .expect("session lock poisoned")
            .game
            .unwrap_or_default()
    }

    pub fn set_game(&self, game: Game) -> Result<()> {
        self.update(|data| data.game = Some(game))
    }

    pub fn clear(&self) -> Result<()> {
        self.update(|data| {
            data.token = None;
            data.game = None;
        })
    }

    fn update(&self, apply: impl FnOnce(&mut SessionFile)) -> Result<()> {
        let snapshot = {
            let mut guard = self.data.lock().expect("session lock poisoned");
            apply(&mut guard);
            guard.version = SESSION_VERSION;
            guard.clone()
        };
        match self.path.as_deref() {
            Some(path) => save_session_file(path, &snapshot),
            None => Ok(()),
        }
    }
}

fn load_session_file(path: &Path) -> SessionFile {
    let Ok(raw) = fs::read_to_string(path) else {
        return SessionFile::default();
    };
    match serde_json::from_str::<SessionFile>(&raw) {
        Ok(data) if data.version == SESSION_VERSION => data,
        Ok(_) => SessionFile::default(),
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable session file: {err}");
            SessionFile::default()
        }
    }
}

fn save_session_file(path: &Path, data: &SessionFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("create session dir")?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(data).context("serialize session")?;
    fs::write(&tmp, json).context("write session")?;
    fs::rename(&tmp, path).context("swap session")?;
    Ok(())
}
