use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use super::context::AppContext;
use super::error::{CoreError, report_failure};
use super::format::format_timestamp;
use super::history::WatchedEpisode;
use super::metadata::display_name;
use super::settings::SETUP_WARNING;

const METHOD: &str = "onPreUpdateEntryProgress";
const RECORD_FAILED_TOAST: &str =
    "Could not record the watched episode. Check the logs for more information";

/// Progress notification as delivered by the host; either field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ProgressEvent {
    pub(crate) media_id: Option<u64>,
    pub(crate) progress: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IngestOutcome {
    Recorded(WatchedEpisode),
    Skipped(CoreError),
}

/// Handles one event, then hands control back to the host through `acknowledge`
/// regardless of how ingestion went.
pub(crate) fn dispatch_progress<F>(
    ctx: &mut AppContext,
    event: ProgressEvent,
    now: NaiveDateTime,
    acknowledge: F,
) -> IngestOutcome
where
    F: FnOnce(),
{
    let outcome = ingest_progress(ctx, event, now);
    acknowledge();
    outcome
}

pub(crate) fn ingest_progress(
    ctx: &mut AppContext,
    event: ProgressEvent,
    now: NaiveDateTime,
) -> IngestOutcome {
    let (Some(media_id), Some(progress)) = (event.media_id, event.progress) else {
        error!(
            method = METHOD,
            media_id_missing = event.media_id.is_none(),
            progress_missing = event.progress.is_none(),
            "progress event is incomplete"
        );
        return IngestOutcome::Skipped(CoreError::Validation(
            "progress event without media id or progress".to_string(),
        ));
    };
    let Ok(episode_number) = u32::try_from(progress) else {
        error!(method = METHOD, media_id, progress, "progress is out of range");
        return IngestOutcome::Skipped(CoreError::Validation(format!(
            "progress {progress} is not a valid episode number"
        )));
    };

    match ctx.settings().load() {
        Ok(loaded) if loaded.is_configured() => {}
        Ok(_) => {
            warn!(
                method = METHOD,
                "settings were never saved; not keeping track of the progress"
            );
            ctx.notifier().warning(SETUP_WARNING);
            return IngestOutcome::Skipped(CoreError::MissingSetup);
        }
        Err(err) => {
            return IngestOutcome::Skipped(report_failure(
                ctx.notifier(),
                METHOD,
                RECORD_FAILED_TOAST,
                &err,
            ));
        }
    }

    debug!(method = METHOD, media_id, "resolving media");
    let title = match ctx.resolver().resolve(media_id) {
        Ok(Some(title)) => title,
        Ok(None) => {
            info!(method = METHOD, media_id, "media is not an anime; history won't be updated");
            return IngestOutcome::Skipped(CoreError::LookupMiss { media_id });
        }
        Err(err) => {
            info!(
                method = METHOD,
                media_id,
                error = %format!("{err:#}"),
                "media lookup failed; history won't be updated"
            );
            return IngestOutcome::Skipped(CoreError::LookupMiss { media_id });
        }
    };
    let Some(anime_name) = display_name(&title) else {
        info!(method = METHOD, media_id, "media has no usable title");
        return IngestOutcome::Skipped(CoreError::LookupMiss { media_id });
    };

    let record = WatchedEpisode {
        anime_name,
        episode_number,
        date: format_timestamp(now),
    };
    match ctx.history().append(record.clone()) {
        Ok(()) => {
            debug!(
                method = METHOD,
                anime = %record.anime_name,
                episode = record.episode_number,
                "added to watched episodes"
            );
            IngestOutcome::Recorded(record)
        }
        Err(err) => IngestOutcome::Skipped(report_failure(
            ctx.notifier(),
            METHOD,
            RECORD_FAILED_TOAST,
            &err,
        )),
    }
}
