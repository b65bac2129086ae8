mod context;
mod error;
mod format;
mod history;
mod ingest;
mod metadata;
mod notify;
mod panel;
mod retention;
mod settings;
mod view;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info};

use crate::cli::{Cli, Command, SortField};
use crate::config::Config;
use crate::db::Database;

pub(crate) use self::settings::SETTINGS_KEY;

use self::context::{AppContext, initialize};
use self::error::report_failure;
use self::format::{display_watched_at, format_day, truncate};
use self::ingest::{IngestOutcome, ProgressEvent, dispatch_progress};
use self::metadata::AnilistResolver;
use self::notify::{ConsoleNotifier, Notifier, ToastQueue};
use self::panel::{PanelOptions, run_panel};
use self::retention::{PurgeOutcome, clear_history, purge_on_activation};
use self::settings::{CACHE_DAYS_INVALID_HINT, SaveOutcome, SettingsDraft, save_settings};
use self::view::{PageState, SortAxis, SortDirection, SortSpec, paginate};

pub fn run(cli: Cli, config: Config) -> Result<()> {
    let db = open_db(&config)?;

    match cli.command.unwrap_or(Command::Panel) {
        Command::Panel => {
            let toasts = Rc::new(ToastQueue::default());
            let mut ctx = build_context(db, toasts.clone(), &config);
            activate(&mut ctx, true);
            run_panel(
                &mut ctx,
                &toasts,
                PanelOptions {
                    items_per_page: config.items_per_page,
                    default_cache_days: config.default_cache_days,
                },
            )?;
        }
        Command::Progress { media_id, progress } => {
            let mut ctx = build_context(db, Rc::new(ConsoleNotifier), &config);
            activate(&mut ctx, false);
            run_progress(&mut ctx, ProgressEvent { media_id, progress });
        }
        Command::Activate => {
            let mut ctx = build_context(db, Rc::new(ConsoleNotifier), &config);
            let outcome = activate(&mut ctx, true);
            print_purge_outcome(&outcome);
        }
        Command::List {
            page,
            per_page,
            sort,
            asc,
            desc: _,
        } => {
            let mut ctx = build_context(db, Rc::new(ConsoleNotifier), &config);
            activate(&mut ctx, true);
            let sort = SortSpec {
                axis: match sort {
                    SortField::Name => SortAxis::Name,
                    SortField::Date => SortAxis::Date,
                },
                direction: if asc {
                    SortDirection::Asc
                } else {
                    SortDirection::Desc
                },
            };
            run_list(&ctx, sort, page, per_page.unwrap_or(config.items_per_page));
        }
        Command::Settings { cache_for, compact } => {
            let mut ctx = build_context(db, Rc::new(ConsoleNotifier), &config);
            activate(&mut ctx, false);
            run_settings(&ctx, cache_for.as_deref(), compact, config.default_cache_days);
        }
        Command::Clear => {
            let mut ctx = build_context(db, Rc::new(ConsoleNotifier), &config);
            activate(&mut ctx, false);
            clear_history(&mut ctx);
        }
    }

    Ok(())
}

fn build_context(db: Database, notifier: Rc<dyn Notifier>, config: &Config) -> AppContext {
    AppContext::new(
        Box::new(db),
        notifier,
        Box::new(AnilistResolver::from_config(config)),
        &config.history_key,
    )
}

/// Work every entry point does first: load state, then run the retention check.
fn activate(ctx: &mut AppContext, announce_setup: bool) -> PurgeOutcome {
    initialize(ctx, announce_setup);
    let outcome = purge_on_activation(ctx, Local::now().date_naive());
    debug!(?outcome, "activation finished");
    outcome
}

fn run_progress(ctx: &mut AppContext, event: ProgressEvent) {
    let outcome = dispatch_progress(ctx, event, Local::now().naive_local(), || {
        debug!("progress event acknowledged");
    });
    match outcome {
        IngestOutcome::Recorded(episode) => println!(
            "Recorded {} episode {} at {}",
            episode.anime_name, episode.episode_number, episode.date
        ),
        IngestOutcome::Skipped(reason) => println!("Nothing recorded: {reason}"),
    }
}

fn print_purge_outcome(outcome: &PurgeOutcome) {
    match outcome {
        PurgeOutcome::NotConfigured => println!("Settings have not been saved yet."),
        PurgeOutcome::EmptyHistory => println!("History is empty. Nothing to delete."),
        PurgeOutcome::NoSchedule => println!("No automatic deletion is scheduled."),
        PurgeOutcome::NotDue { deleting_on } => {
            println!("History will be deleted on {}.", format_day(*deleting_on));
        }
        PurgeOutcome::Purged { .. } | PurgeOutcome::Failed(_) => {}
    }
}

fn run_list(ctx: &AppContext, sort: SortSpec, page: usize, items_per_page: usize) {
    let history = ctx.episodes();
    if history.is_empty() {
        println!("No watched episodes yet.");
        return;
    }

    let mut state = PageState::new(items_per_page);
    state.jump_to(page, history.len());
    let page = paginate(history, sort, state);

    println!("{:<40} {:<8} {:<16}", "NAME", "EPISODE", "WATCHED");
    for episode in &page.rows {
        println!(
            "{:<40} {:<8} {:<16}",
            truncate(&episode.anime_name, 40),
            episode.episode_number,
            display_watched_at(&episode.date, false)
        );
    }
    println!(
        "\nPage {}/{}  showing {}-{} of {}",
        page.current_page,
        page.total_pages,
        page.bounds.start + 1,
        page.bounds.end,
        page.total_items
    );
}

fn run_settings(ctx: &AppContext, cache_for: Option<&str>, compact: Option<bool>, default_days: i64) {
    let loaded = match ctx.settings().load() {
        Ok(loaded) => loaded,
        Err(err) => {
            report_failure(
                ctx.notifier(),
                "saveSettings",
                "Could not load the settings. Check the logs for more information",
                &err,
            );
            return;
        }
    };

    if cache_for.is_none() && compact.is_none() {
        match loaded.configured() {
            Some(settings) => {
                println!("cache_for:    {} days", settings.cache_for);
                println!(
                    "deleting_on:  {}",
                    settings.deleting_on.as_deref().unwrap_or("never")
                );
                println!("compact_view: {}", settings.compact());
            }
            None => println!(
                "Settings have not been saved yet. Run `ephist settings --cache-for <days>`."
            ),
        }
        return;
    }

    let mut draft = SettingsDraft::from_loaded(&loaded, default_days);
    if let Some(raw) = cache_for {
        draft.set_cache_input(raw);
    }
    if let Some(compact) = compact {
        draft.set_compact_view(compact);
    }
    if !draft.can_save() {
        ctx.notifier().error(CACHE_DAYS_INVALID_HINT);
        return;
    }
    if let SaveOutcome::Saved(saved) = save_settings(ctx, &draft, Local::now().date_naive()) {
        info!(cache_for = saved.cache_for, "settings updated from the command line");
    }
}

fn open_db(config: &Config) -> Result<Database> {
    let db_path = config.database_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    debug!(path = %db_path.display(), "database ready");
    Ok(db)
}
