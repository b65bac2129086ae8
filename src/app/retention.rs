use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::context::AppContext;
use super::error::{CoreError, report_failure};
use super::format::{add_days, format_day, parse_day};
use super::settings::StorageSettings;

const PURGE_FAILED_TOAST: &str =
    "Error on deleting past data. Check the logs for more information";
const CLEAR_FAILED_TOAST: &str = "Error on clearing the history. Check the logs for more information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PurgeOutcome {
    NotConfigured,
    EmptyHistory,
    NoSchedule,
    NotDue { deleting_on: NaiveDate },
    Purged { next_deleting_on: Option<NaiveDate> },
    Failed(CoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClearOutcome {
    Cleared,
    Failed(CoreError),
}

/// Runs the retention check for one activation.
///
/// Only calendar days are compared, so a second activation on the purge day
/// finds the freshly rescheduled date in the future and leaves history alone.
pub(crate) fn purge_on_activation(ctx: &mut AppContext, today: NaiveDate) -> PurgeOutcome {
    match try_purge(ctx, today) {
        Ok(outcome) => outcome,
        Err(err) => PurgeOutcome::Failed(report_failure(
            ctx.notifier(),
            "purgeOnActivation",
            PURGE_FAILED_TOAST,
            &err,
        )),
    }
}

fn try_purge(ctx: &mut AppContext, today: NaiveDate) -> Result<PurgeOutcome> {
    let loaded = ctx.settings().load()?;
    let Some(settings) = loaded.configured() else {
        return Ok(PurgeOutcome::NotConfigured);
    };
    if ctx.history().is_empty()? {
        return Ok(PurgeOutcome::EmptyHistory);
    }
    let Some(raw_deleting_on) = settings.deleting_on.as_deref() else {
        return Ok(PurgeOutcome::NoSchedule);
    };
    let Some(deleting_on) = parse_day(raw_deleting_on) else {
        warn!(deleting_on = raw_deleting_on, "ignoring unparseable purge date");
        return Ok(PurgeOutcome::NoSchedule);
    };
    if today < deleting_on {
        debug!(%deleting_on, %today, "purge not due yet");
        return Ok(PurgeOutcome::NotDue { deleting_on });
    }

    let next_deleting_on = add_days(today, settings.cache_for).filter(|_| settings.cache_for > 0);
    let rescheduled = StorageSettings {
        cache_for: settings.cache_for,
        deleting_on: next_deleting_on.map(format_day),
        compact_view: settings.compact_view,
    };

    // Rescheduling and removal land together, so a failed purge leaves the
    // old schedule and the old history both in place.
    ctx.notifier().info("Deleting data");
    let reschedule = ctx.settings().save_write(&rescheduled)?;
    ctx.history().clear_with(vec![reschedule])?;
    ctx.notifier().success("Data cleared successfully");

    match next_deleting_on {
        Some(next) => {
            info!(%today, next = %next, "history purged and rescheduled");
            ctx.notifier()
                .info(&format!("The history will be deleted again on {}", format_day(next)));
        }
        None => {
            info!(%today, "history purged; no further purge scheduled");
            ctx.notifier()
                .info("Data will not be automatically deleted again until the settings change");
        }
    }
    Ok(PurgeOutcome::Purged { next_deleting_on })
}

/// User-triggered clear. Ignores the schedule entirely.
pub(crate) fn clear_history(ctx: &mut AppContext) -> ClearOutcome {
    ctx.notifier().info("Deleting data");
    match ctx.history().clear() {
        Ok(()) => {
            info!(method = "clearData", "history cleared by user");
            ctx.notifier().success("Data cleared successfully");
            ClearOutcome::Cleared
        }
        Err(err) => ClearOutcome::Failed(report_failure(
            ctx.notifier(),
            "clearData",
            CLEAR_FAILED_TOAST,
            &err,
        )),
    }
}
