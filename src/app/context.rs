use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::db::KvStore;

use super::error::report_failure;
use super::history::{HistoryMirror, HistoryStore, WatchedEpisode};
use super::metadata::MediaResolver;
use super::notify::Notifier;
use super::settings::{SETUP_WARNING, SettingsStore};

/// Everything a handler needs, passed explicitly instead of through shared globals.
pub(crate) struct AppContext {
    store: Box<dyn KvStore>,
    notifier: Rc<dyn Notifier>,
    resolver: Box<dyn MediaResolver>,
    history_key: String,
    mirror: HistoryMirror,
}

impl AppContext {
    pub(crate) fn new(
        store: Box<dyn KvStore>,
        notifier: Rc<dyn Notifier>,
        resolver: Box<dyn MediaResolver>,
        history_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            resolver,
            history_key: history_key.into(),
            mirror: HistoryMirror::default(),
        }
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn resolver(&self) -> &dyn MediaResolver {
        self.resolver.as_ref()
    }

    pub(crate) fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(self.store.as_ref())
    }

    pub(crate) fn history(&mut self) -> HistoryStore<'_> {
        HistoryStore::new(self.store.as_ref(), &self.history_key, &mut self.mirror)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub(crate) fn mirror(&self) -> &HistoryMirror {
        &self.mirror
    }

    pub(crate) fn episodes(&self) -> &[WatchedEpisode] {
        self.mirror.episodes()
    }
}

/// Prepares persisted state for an activation: writes the settings placeholder,
/// loads the history mirror and optionally reminds the user to finish setup.
pub(crate) fn initialize(ctx: &mut AppContext, announce_setup: bool) {
    if let Err(err) = try_initialize(ctx, announce_setup) {
        report_failure(
            ctx.notifier(),
            "initialize",
            "Could not load the stored history. Check the logs for more information",
            &err,
        );
    }
}

fn try_initialize(ctx: &mut AppContext, announce_setup: bool) -> Result<()> {
    ctx.history().refresh_mirror()?;
    debug!(episodes = ctx.episodes().len(), "history mirror loaded");

    let settings = ctx.settings();
    settings.ensure_initialized()?;
    if announce_setup && !settings.load()?.is_configured() {
        ctx.notifier().warning(SETUP_WARNING);
    }
    Ok(())
}
