use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::db::{KvStore, KvWrite};

use super::context::AppContext;
use super::error::{CoreError, report_failure};
use super::format::{add_days, format_day};

pub(crate) const SETTINGS_KEY: &str = "settings";
pub(crate) const INVALID_CACHE_DAYS: i64 = -1;

pub(crate) const CACHE_DAYS_ADVISORY: &str =
    "Avoid entering values over 365 days if you have limited space";
pub(crate) const CACHE_DAYS_INVALID_HINT: &str = "Insert values >= 0";
pub(crate) const SETUP_WARNING: &str =
    "Not keeping track of the progress. Open the panel and insert the requested values";
const NO_AUTO_DELETE_NOTICE: &str =
    "Data will not be automatically deleted. You can delete the data through the \"Clear\" action";
const SAVE_FAILED_TOAST: &str =
    "An error occurred on saving settings. Check the logs for more information";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageSettings {
    /// Retention window in days; `0` keeps history until cleared by hand.
    pub(crate) cache_for: i64,
    #[serde(default)]
    pub(crate) deleting_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) compact_view: Option<bool>,
}

impl StorageSettings {
    pub(crate) fn with_cache_days(days: i64) -> Self {
        Self {
            cache_for: days,
            deleting_on: None,
            compact_view: None,
        }
    }

    pub(crate) fn compact(&self) -> bool {
        self.compact_view.unwrap_or(false)
    }
}

/// Persisted settings as found in the store. `Empty` is the `{}` placeholder
/// written at first start, before the user completed setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoadedSettings {
    Missing,
    Empty,
    Configured(StorageSettings),
}

impl LoadedSettings {
    pub(crate) fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }

    pub(crate) fn configured(&self) -> Option<&StorageSettings> {
        match self {
            Self::Configured(settings) => Some(settings),
            Self::Missing | Self::Empty => None,
        }
    }
}

pub(crate) struct SettingsStore<'a> {
    store: &'a dyn KvStore,
}

impl<'a> SettingsStore<'a> {
    pub(crate) fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    pub(crate) fn load(&self) -> Result<LoadedSettings> {
        match self.store.get_value(SETTINGS_KEY)? {
            None | Some(Value::Null) => Ok(LoadedSettings::Missing),
            Some(Value::Object(map)) if map.is_empty() => Ok(LoadedSettings::Empty),
            Some(value) => {
                let settings = serde_json::from_value(value)
                    .context("stored settings have an unexpected shape")?;
                Ok(LoadedSettings::Configured(settings))
            }
        }
    }

    pub(crate) fn save(&self, settings: &StorageSettings) -> Result<()> {
        self.store.apply_batch(vec![self.save_write(settings)?])
    }

    /// The write `save` performs, for callers that batch it with other keys.
    pub(crate) fn save_write(&self, settings: &StorageSettings) -> Result<KvWrite> {
        if settings.cache_for < 0 {
            bail!("refusing to persist invalid retention window {}", settings.cache_for);
        }
        let value = serde_json::to_value(settings).context("failed to encode settings")?;
        Ok(KvWrite::Set(SETTINGS_KEY.to_string(), value))
    }

    /// Writes the `{}` placeholder on first start so later reads see "not configured".
    pub(crate) fn ensure_initialized(&self) -> Result<()> {
        if !self.store.has(SETTINGS_KEY)? {
            debug!("initializing empty settings");
            self.store.set_value(SETTINGS_KEY, json!({}))?;
        }
        Ok(())
    }
}

/// Strips everything from the first non-digit on and parses the rest.
///
/// Empty, non-numeric and overflowing input all yield `None`. There is no
/// upper bound; large windows are only discouraged in the form text.
pub(crate) fn parse_cache_input(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok()
}

/// In-progress settings edits. Nothing reaches the store until saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SettingsDraft {
    settings: StorageSettings,
    cache_input: String,
}

impl SettingsDraft {
    pub(crate) fn from_loaded(loaded: &LoadedSettings, default_days: i64) -> Self {
        let settings = loaded
            .configured()
            .cloned()
            .unwrap_or_else(|| StorageSettings::with_cache_days(default_days));
        let cache_input = if settings.cache_for < 0 {
            String::new()
        } else {
            settings.cache_for.to_string()
        };
        Self {
            settings,
            cache_input,
        }
    }

    pub(crate) fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Normalized text for the input field.
    pub(crate) fn cache_input(&self) -> &str {
        &self.cache_input
    }

    pub(crate) fn set_cache_input(&mut self, raw: &str) {
        match parse_cache_input(raw) {
            Some(days) => {
                self.settings.cache_for = days;
                self.cache_input = days.to_string();
            }
            None => {
                self.settings.cache_for = INVALID_CACHE_DAYS;
                self.cache_input.clear();
            }
        }
    }

    pub(crate) fn set_compact_view(&mut self, compact: bool) {
        self.settings.compact_view = Some(compact);
    }

    pub(crate) fn can_save(&self) -> bool {
        self.settings.cache_for >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SaveOutcome {
    Saved(StorageSettings),
    Refused(CoreError),
    Failed(CoreError),
}

/// Persists the draft, rescheduling the purge date when the window changed.
pub(crate) fn save_settings(ctx: &AppContext, draft: &SettingsDraft, today: NaiveDate) -> SaveOutcome {
    if !draft.can_save() {
        debug!(
            method = "saveSettings",
            cache_for = draft.settings().cache_for,
            "save refused for invalid retention input"
        );
        return SaveOutcome::Refused(CoreError::Validation(
            "retention days must be zero or positive".to_string(),
        ));
    }

    match try_save_settings(ctx, draft, today) {
        Ok(outcome) => outcome,
        Err(err) => SaveOutcome::Failed(report_failure(
            ctx.notifier(),
            "saveSettings",
            SAVE_FAILED_TOAST,
            &err,
        )),
    }
}

fn try_save_settings(ctx: &AppContext, draft: &SettingsDraft, today: NaiveDate) -> Result<SaveOutcome> {
    let store = ctx.settings();
    let persisted = store.load()?;
    let persisted = persisted.configured();
    let days = draft.settings().cache_for;
    let window_changed = persisted.map(|settings| settings.cache_for) != Some(days);

    let mut next = draft.settings().clone();
    let mut notice = None;
    if days == 0 {
        next.deleting_on = None;
        if window_changed {
            notice = Some(NO_AUTO_DELETE_NOTICE.to_string());
        }
    } else if window_changed {
        let Some(deleting_on) = add_days(today, days) else {
            warn!(method = "saveSettings", days, "retention window leaves the calendar range");
            ctx.notifier()
                .error("The retention window is too large. Enter a smaller number of days");
            return Ok(SaveOutcome::Refused(CoreError::Validation(format!(
                "retention window of {days} days is out of range"
            ))));
        };
        let formatted = format_day(deleting_on);
        notice = Some(format!("Data will be deleted on {formatted}"));
        next.deleting_on = Some(formatted);
    } else {
        next.deleting_on = persisted.and_then(|settings| settings.deleting_on.clone());
    }

    store.save(&next)?;

    if let Some(notice) = notice {
        ctx.notifier().info(&notice);
    }
    ctx.notifier().success("Settings saved");
    debug!(
        method = "saveSettings",
        cache_for = next.cache_for,
        deleting_on = next.deleting_on.as_deref().unwrap_or("-"),
        "settings saved"
    );
    Ok(SaveOutcome::Saved(next))
}
