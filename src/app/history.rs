use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{KvStore, KvStoreExt, KvWrite};

/// One watched episode. Records carry no id; identity is their position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchedEpisode {
    pub(crate) anime_name: String,
    pub(crate) episode_number: u32,
    pub(crate) date: String,
}

/// Live copy of the persisted log that the panel renders from.
#[derive(Debug, Default)]
pub(crate) struct HistoryMirror {
    episodes: Vec<WatchedEpisode>,
    revision: u64,
}

impl HistoryMirror {
    pub(crate) fn episodes(&self) -> &[WatchedEpisode] {
        &self.episodes
    }

    /// Bumped on every replacement so observers can tell a refresh happened.
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    fn replace(&mut self, episodes: Vec<WatchedEpisode>) {
        self.episodes = episodes;
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Append-only watched-episode log stored under a single key.
///
/// Every mutation is written through before returning and then mirrored.
pub(crate) struct HistoryStore<'a> {
    store: &'a dyn KvStore,
    key: &'a str,
    mirror: &'a mut HistoryMirror,
}

impl<'a> HistoryStore<'a> {
    pub(crate) fn new(store: &'a dyn KvStore, key: &'a str, mirror: &'a mut HistoryMirror) -> Self {
        Self { store, key, mirror }
    }

    pub(crate) fn get_all(&self) -> Result<Vec<WatchedEpisode>> {
        Ok(self
            .store
            .get_json::<Vec<WatchedEpisode>>(self.key)?
            .unwrap_or_default())
    }

    pub(crate) fn is_empty(&self) -> Result<bool> {
        Ok(self.get_all()?.is_empty())
    }

    pub(crate) fn append(&mut self, record: WatchedEpisode) -> Result<()> {
        if record.anime_name.trim().is_empty() {
            bail!("refusing to append an episode without a resolved name");
        }
        if !self.store.has(self.key)? {
            debug!(key = self.key, "creating history collection");
            self.store.set_json(self.key, &Vec::<WatchedEpisode>::new())?;
        }

        let mut episodes = self.get_all()?;
        episodes.push(record);
        self.replace_all(episodes)
    }

    pub(crate) fn replace_all(&mut self, records: Vec<WatchedEpisode>) -> Result<()> {
        self.store.set_json(self.key, &records)?;
        self.mirror.replace(records);
        Ok(())
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.clear_with(Vec::new())
    }

    /// Removes the log in the same batch as `writes`, which are applied first.
    /// The mirror is only emptied once the whole batch is stored.
    pub(crate) fn clear_with(&mut self, mut writes: Vec<KvWrite>) -> Result<()> {
        writes.push(KvWrite::Remove(self.key.to_string()));
        self.store.apply_batch(writes)?;
        self.mirror.replace(Vec::new());
        Ok(())
    }

    /// Reloads the mirror from the persisted log. An unchanged log keeps
    /// the current revision.
    pub(crate) fn refresh_mirror(&mut self) -> Result<()> {
        let episodes = self.get_all()?;
        if episodes != self.mirror.episodes {
            self.mirror.replace(episodes);
        }
        Ok(())
    }
}
