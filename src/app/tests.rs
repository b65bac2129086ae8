use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use crossterm::event::KeyCode;
use serde_json::{Value, json};

use crate::db::{Database, KvStore, KvStoreExt};

use super::context::{AppContext, initialize};
use super::error::CoreError;
use super::history::WatchedEpisode;
use super::ingest::{IngestOutcome, ProgressEvent, dispatch_progress, ingest_progress};
use super::metadata::{MediaResolver, MediaTitle};
use super::notify::{ToastLevel, ToastQueue};
use super::panel::{Flow, PanelAction, PanelOptions, PanelState, Screen};
use super::retention::{ClearOutcome, PurgeOutcome, clear_history, purge_on_activation};
use super::settings::{
    LoadedSettings, SETTINGS_KEY, SETUP_WARNING, SaveOutcome, SettingsDraft, StorageSettings,
    save_settings,
};
use super::view::{PageControl, SortAxis, SortSpec, paginate, sort_history};

const HISTORY_KEY: &str = "episodes";
const PANEL_OPTIONS: PanelOptions = PanelOptions {
    items_per_page: 5,
    default_cache_days: 30,
};

struct FakeResolver {
    titles: HashMap<u64, MediaTitle>,
    fail: bool,
    calls: Rc<Cell<usize>>,
}

impl MediaResolver for FakeResolver {
    fn resolve(&self, media_id: u64) -> Result<Option<MediaTitle>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            bail!("lookup service unavailable");
        }
        Ok(self.titles.get(&media_id).cloned())
    }
}

/// Delegates to SQLite but refuses writes once `fail_writes` is set, or
/// writes to `failing_key` alone when that is set.
struct FlakyStore {
    inner: Database,
    fail_writes: Rc<Cell<bool>>,
    failing_key: Rc<Cell<Option<&'static str>>>,
}

impl FlakyStore {
    fn refuses(&self, key: &str) -> bool {
        self.fail_writes.get() || self.failing_key.get() == Some(key)
    }
}

impl KvStore for FlakyStore {
    fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(key)
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get_value(key)
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        if self.refuses(key) {
            bail!("disk I/O error while writing '{key}'");
        }
        self.inner.set_value(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.refuses(key) {
            bail!("disk I/O error while removing '{key}'");
        }
        self.inner.remove(key)
    }
}

struct Harness {
    ctx: AppContext,
    toasts: Rc<ToastQueue>,
    lookups: Rc<Cell<usize>>,
    fail_writes: Rc<Cell<bool>>,
    failing_key: Rc<Cell<Option<&'static str>>>,
}

fn harness_with_resolver(fail_lookups: bool) -> Harness {
    let titles = HashMap::from([
        (
            1,
            MediaTitle {
                english: Some("Cowboy Bebop".to_string()),
                romaji: Some("Cowboy Bebop".to_string()),
            },
        ),
        (
            2,
            MediaTitle {
                english: None,
                romaji: Some("\"Gintama\"".to_string()),
            },
        ),
        (
            3,
            MediaTitle {
                english: Some("\"\"".to_string()),
                romaji: None,
            },
        ),
    ]);
    let lookups = Rc::new(Cell::new(0));
    let fail_writes = Rc::new(Cell::new(false));
    let failing_key = Rc::new(Cell::new(None));
    let toasts = Rc::new(ToastQueue::default());
    let store = FlakyStore {
        inner: Database::open_in_memory().expect("in-memory db"),
        fail_writes: fail_writes.clone(),
        failing_key: failing_key.clone(),
    };
    let resolver = FakeResolver {
        titles,
        fail: fail_lookups,
        calls: lookups.clone(),
    };
    let ctx = AppContext::new(Box::new(store), toasts.clone(), Box::new(resolver), HISTORY_KEY);
    Harness {
        ctx,
        toasts,
        lookups,
        fail_writes,
        failing_key,
    }
}

fn harness() -> Harness {
    harness_with_resolver(false)
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32, hour: u32, min: u32) -> NaiveDateTime {
    day(y, m, d).and_hms_opt(hour, min, 0).expect("valid time")
}

fn configure(h: &Harness, cache_for: i64, deleting_on: Option<&str>) {
    h.ctx
        .settings()
        .save(&StorageSettings {
            cache_for,
            deleting_on: deleting_on.map(str::to_string),
            compact_view: None,
        })
        .expect("seed settings");
}

fn episode(name: &str, number: u32, date: &str) -> WatchedEpisode {
    WatchedEpisode {
        anime_name: name.to_string(),
        episode_number: number,
        date: date.to_string(),
    }
}

fn seed_history(h: &mut Harness, count: u32) {
    let episodes = (1..=count)
        .map(|n| episode(&format!("Show {n:02}"), n, &format!("2024/01/{n:02} 20:00")))
        .collect();
    h.ctx.history().replace_all(episodes).expect("seed history");
}

fn stored_settings(h: &Harness) -> StorageSettings {
    match h.ctx.settings().load().expect("load settings") {
        LoadedSettings::Configured(settings) => settings,
        other => panic!("expected configured settings, got {other:?}"),
    }
}

fn draft_with_input(h: &Harness, input: &str) -> SettingsDraft {
    let loaded = h.ctx.settings().load().expect("load settings");
    let mut draft = SettingsDraft::from_loaded(&loaded, 30);
    draft.set_cache_input(input);
    draft
}

#[test]
fn initialize_writes_empty_settings_and_warns_once() {
    let mut h = harness();
    initialize(&mut h.ctx, true);

    assert_eq!(
        h.ctx.settings().load().expect("load settings"),
        LoadedSettings::Empty
    );
    assert_eq!(h.toasts.count(ToastLevel::Warning), 1);
    assert_eq!(h.toasts.messages(), [SETUP_WARNING]);

    initialize(&mut h.ctx, false);
    assert_eq!(h.toasts.count(ToastLevel::Warning), 1);
}

#[test]
fn initialize_loads_persisted_history_into_the_mirror() {
    let mut h = harness();
    h.ctx
        .store()
        .set_json(
            HISTORY_KEY,
            &[
                episode("Mushishi", 1, "2024/01/01 20:00"),
                episode("Mushishi", 2, "2024/01/02 20:00"),
            ],
        )
        .expect("seed raw history");
    assert!(h.ctx.episodes().is_empty());
    let revision = h.ctx.mirror().revision();

    initialize(&mut h.ctx, false);
    assert_eq!(h.ctx.episodes().len(), 2);
    assert!(h.ctx.mirror().revision() > revision);
}

#[test]
fn history_key_is_created_lazily_on_first_append() {
    let mut h = harness();
    configure(&h, 30, None);
    assert!(!h.ctx.store().has(HISTORY_KEY).expect("has"));
    assert!(h.ctx.history().get_all().expect("get all").is_empty());

    let outcome = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(4),
        },
        at(2024, 5, 1, 21, 15),
    );
    assert_eq!(
        outcome,
        IngestOutcome::Recorded(episode("Cowboy Bebop", 4, "2024/05/01 21:15"))
    );

    assert!(h.ctx.store().has(HISTORY_KEY).expect("has"));
    let stored = h.ctx.history().get_all().expect("get all");
    assert_eq!(stored.len(), 1);
    assert_eq!(h.ctx.episodes(), stored.as_slice());
}

#[test]
fn persisted_history_uses_camel_case_fields() {
    let mut h = harness();
    configure(&h, 30, None);
    ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(2),
            progress: Some(0),
        },
        at(2024, 5, 1, 8, 5),
    );

    assert_eq!(
        h.ctx.store().get_value(HISTORY_KEY).expect("read history"),
        Some(json!([{"animeName": "Gintama", "episodeNumber": 0, "date": "2024/05/01 08:05"}]))
    );
}

#[test]
fn ingestion_skips_incomplete_events_without_touching_history() {
    let mut h = harness();
    configure(&h, 30, None);

    for event in [
        ProgressEvent {
            media_id: None,
            progress: Some(3),
        },
        ProgressEvent {
            media_id: Some(1),
            progress: None,
        },
        ProgressEvent {
            media_id: Some(1),
            progress: Some(-2),
        },
    ] {
        let outcome = ingest_progress(&mut h.ctx, event, at(2024, 5, 1, 10, 0));
        assert!(matches!(
            outcome,
            IngestOutcome::Skipped(CoreError::Validation(_))
        ));
    }

    assert!(h.ctx.episodes().is_empty());
    assert!(!h.ctx.store().has(HISTORY_KEY).expect("has"));
    assert_eq!(h.lookups.get(), 0);
    assert!(h.toasts.messages().is_empty());
}

#[test]
fn ingestion_with_empty_settings_warns_exactly_once_and_skips() {
    let mut h = harness();
    initialize(&mut h.ctx, false);

    let outcome = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(1),
        },
        at(2024, 5, 1, 10, 0),
    );

    assert_eq!(outcome, IngestOutcome::Skipped(CoreError::MissingSetup));
    assert_eq!(h.toasts.count(ToastLevel::Warning), 1);
    assert_eq!(h.toasts.messages().len(), 1);
    assert!(h.ctx.episodes().is_empty());
    assert_eq!(h.lookups.get(), 0);
}

#[test]
fn ingestion_with_missing_settings_is_also_gated() {
    let mut h = harness();
    let outcome = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(1),
        },
        at(2024, 5, 1, 10, 0),
    );
    assert_eq!(outcome, IngestOutcome::Skipped(CoreError::MissingSetup));
    assert!(!h.ctx.settings().load().expect("load").is_configured());
}

#[test]
fn ingestion_treats_lookup_misses_as_silent_skips() {
    for fail_lookups in [false, true] {
        let mut h = harness_with_resolver(fail_lookups);
        configure(&h, 30, None);

        for media_id in [99, 3] {
            let outcome = ingest_progress(
                &mut h.ctx,
                ProgressEvent {
                    media_id: Some(media_id),
                    progress: Some(5),
                },
                at(2024, 5, 1, 10, 0),
            );
            assert_eq!(
                outcome,
                IngestOutcome::Skipped(CoreError::LookupMiss { media_id })
            );
        }

        assert!(h.ctx.episodes().is_empty());
        assert!(h.toasts.messages().is_empty());
    }
}

#[test]
fn ingestion_strips_quotes_and_falls_back_to_romaji() {
    let mut h = harness();
    configure(&h, 30, None);
    let outcome = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(2),
            progress: Some(12),
        },
        at(2024, 5, 1, 10, 0),
    );
    assert_eq!(
        outcome,
        IngestOutcome::Recorded(episode("Gintama", 12, "2024/05/01 10:00"))
    );
}

#[test]
fn dispatch_always_acknowledges_the_host() {
    let mut h = harness();
    let acknowledged = Cell::new(0);

    dispatch_progress(
        &mut h.ctx,
        ProgressEvent::default(),
        at(2024, 5, 1, 10, 0),
        || acknowledged.set(acknowledged.get() + 1),
    );
    configure(&h, 30, None);
    dispatch_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(1),
        },
        at(2024, 5, 1, 10, 0),
        || acknowledged.set(acknowledged.get() + 1),
    );
    h.fail_writes.set(true);
    dispatch_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(2),
        },
        at(2024, 5, 1, 10, 0),
        || acknowledged.set(acknowledged.get() + 1),
    );

    assert_eq!(acknowledged.get(), 3);
    assert_eq!(h.ctx.episodes().len(), 1);
}

#[test]
fn ingestion_persistence_failure_raises_one_error_toast() {
    let mut h = harness();
    configure(&h, 30, None);
    h.fail_writes.set(true);

    let outcome = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(1),
        },
        at(2024, 5, 1, 10, 0),
    );

    assert!(matches!(
        outcome,
        IngestOutcome::Skipped(CoreError::Persistence(_))
    ));
    assert_eq!(h.toasts.count(ToastLevel::Error), 1);
    assert!(h.ctx.episodes().is_empty());

    h.fail_writes.set(false);
    let next = ingest_progress(
        &mut h.ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(2),
        },
        at(2024, 5, 1, 10, 5),
    );
    assert!(matches!(next, IngestOutcome::Recorded(_)));
}

#[test]
fn saving_a_positive_window_schedules_today_plus_days() {
    let h = harness();
    initialize_quietly(&h);
    let today = day(2024, 12, 25);

    for (input, expected) in [("7", "2025/01/01"), ("1", "2024/12/26"), ("365", "2025/12/25")] {
        let outcome = save_settings(&h.ctx, &draft_with_input(&h, input), today);
        let SaveOutcome::Saved(saved) = outcome else {
            panic!("save should succeed for {input}");
        };
        assert_eq!(saved.deleting_on.as_deref(), Some(expected));
        assert_eq!(stored_settings(&h).deleting_on.as_deref(), Some(expected));
    }
    assert!(
        h.toasts
            .messages()
            .contains(&"Data will be deleted on 2025/01/01".to_string())
    );
    assert_eq!(h.toasts.count(ToastLevel::Success), 3);
}

fn initialize_quietly(h: &Harness) {
    h.ctx
        .settings()
        .ensure_initialized()
        .expect("initialize settings");
}

#[test]
fn saving_zero_days_clears_the_schedule() {
    let h = harness();
    configure(&h, 7, Some("2024/01/08"));

    let outcome = save_settings(&h.ctx, &draft_with_input(&h, "0"), day(2024, 1, 2));
    assert!(matches!(outcome, SaveOutcome::Saved(_)));
    let stored = stored_settings(&h);
    assert_eq!(stored.cache_for, 0);
    assert_eq!(stored.deleting_on, None);
    assert!(
        h.toasts
            .messages()
            .iter()
            .any(|message| message.starts_with("Data will not be automatically deleted"))
    );

    let raw = h
        .ctx
        .settings()
        .load()
        .expect("load")
        .configured()
        .map(|settings| serde_json::to_value(settings).expect("encode"));
    assert_eq!(raw, Some(json!({"cacheFor": 0, "deletingOn": null})));
}

#[test]
fn saving_an_unchanged_window_keeps_the_schedule() {
    let h = harness();
    configure(&h, 7, Some("2024/01/08"));
    let mut draft = draft_with_input(&h, "7");
    draft.set_compact_view(true);

    let outcome = save_settings(&h.ctx, &draft, day(2024, 1, 5));
    assert!(matches!(outcome, SaveOutcome::Saved(_)));
    let stored = stored_settings(&h);
    assert_eq!(stored.deleting_on.as_deref(), Some("2024/01/08"));
    assert_eq!(stored.compact_view, Some(true));
    assert_eq!(h.toasts.messages(), ["Settings saved"]);
}

#[test]
fn saving_invalid_input_is_refused_and_never_persisted() {
    let h = harness();
    configure(&h, 7, Some("2024/01/08"));

    let draft = draft_with_input(&h, "abc");
    assert!(!draft.can_save());
    let outcome = save_settings(&h.ctx, &draft, day(2024, 1, 5));
    assert!(matches!(
        outcome,
        SaveOutcome::Refused(CoreError::Validation(_))
    ));
    assert_eq!(stored_settings(&h).cache_for, 7);
    assert!(h.toasts.messages().is_empty());
}

#[test]
fn saving_a_window_past_the_calendar_is_refused() {
    let h = harness();
    configure(&h, 7, None);
    let outcome = save_settings(
        &h.ctx,
        &draft_with_input(&h, "9000000000000"),
        day(2024, 1, 5),
    );
    assert!(matches!(outcome, SaveOutcome::Refused(_)));
    assert_eq!(h.toasts.count(ToastLevel::Error), 1);
    assert_eq!(stored_settings(&h).cache_for, 7);
}

#[test]
fn settings_persistence_failure_raises_one_error_toast() {
    let h = harness();
    configure(&h, 7, Some("2024/01/08"));
    h.fail_writes.set(true);

    let outcome = save_settings(&h.ctx, &draft_with_input(&h, "14"), day(2024, 1, 5));
    assert!(matches!(
        outcome,
        SaveOutcome::Failed(CoreError::Persistence(_))
    ));
    assert_eq!(h.toasts.count(ToastLevel::Error), 1);
    assert_eq!(h.toasts.count(ToastLevel::Success), 0);
    assert_eq!(stored_settings(&h).cache_for, 7);
}

#[test]
fn purge_does_nothing_until_configured_and_scheduled() {
    let mut h = harness();
    let today = day(2024, 1, 10);
    assert_eq!(purge_on_activation(&mut h.ctx, today), PurgeOutcome::NotConfigured);

    configure(&h, 7, Some("2024/01/01"));
    assert_eq!(purge_on_activation(&mut h.ctx, today), PurgeOutcome::EmptyHistory);

    seed_history(&mut h, 2);
    configure(&h, 0, None);
    assert_eq!(purge_on_activation(&mut h.ctx, today), PurgeOutcome::NoSchedule);

    configure(&h, 7, Some("not a date"));
    assert_eq!(purge_on_activation(&mut h.ctx, today), PurgeOutcome::NoSchedule);
    assert_eq!(h.ctx.episodes().len(), 2);
    assert!(h.toasts.messages().is_empty());
}

#[test]
fn purge_triggers_on_the_scheduled_day_but_not_the_day_before() {
    let mut h = harness();
    configure(&h, 7, Some("2024/01/10"));
    seed_history(&mut h, 3);

    assert_eq!(
        purge_on_activation(&mut h.ctx, day(2024, 1, 9)),
        PurgeOutcome::NotDue {
            deleting_on: day(2024, 1, 10)
        }
    );
    assert_eq!(h.ctx.episodes().len(), 3);

    assert_eq!(
        purge_on_activation(&mut h.ctx, day(2024, 1, 10)),
        PurgeOutcome::Purged {
            next_deleting_on: Some(day(2024, 1, 17))
        }
    );
    assert!(h.ctx.episodes().is_empty());
    assert!(h.ctx.history().get_all().expect("get all").is_empty());
    assert_eq!(
        h.toasts.messages(),
        [
            "Deleting data",
            "Data cleared successfully",
            "The history will be deleted again on 2024/01/17",
        ]
    );
    let stored = stored_settings(&h);
    assert_eq!(stored.cache_for, 7);
    assert_eq!(stored.deleting_on.as_deref(), Some("2024/01/17"));
}

#[test]
fn purge_is_idempotent_within_a_day() {
    let mut h = harness();
    configure(&h, 3, Some("2024/01/10"));
    seed_history(&mut h, 2);

    let today = day(2024, 1, 12);
    assert!(matches!(
        purge_on_activation(&mut h.ctx, today),
        PurgeOutcome::Purged { .. }
    ));

    seed_history(&mut h, 1);
    assert_eq!(
        purge_on_activation(&mut h.ctx, today),
        PurgeOutcome::NotDue {
            deleting_on: day(2024, 1, 15)
        }
    );
    assert_eq!(h.ctx.episodes().len(), 1);
}

#[test]
fn purge_reschedule_preserves_compact_view() {
    let mut h = harness();
    h.ctx
        .settings()
        .save(&StorageSettings {
            cache_for: 2,
            deleting_on: Some("2024/01/10".to_string()),
            compact_view: Some(true),
        })
        .expect("seed settings");
    seed_history(&mut h, 1);

    purge_on_activation(&mut h.ctx, day(2024, 1, 10));
    assert_eq!(
        stored_settings(&h),
        StorageSettings {
            cache_for: 2,
            deleting_on: Some("2024/01/12".to_string()),
            compact_view: Some(true),
        }
    );
}

#[test]
fn purge_accepts_rfc3339_schedules_from_older_stores() {
    let mut h = harness();
    h.ctx
        .store()
        .set_value(
            SETTINGS_KEY,
            json!({"cacheFor": 5, "deletingOn": "2024-01-10T00:00:00Z"}),
        )
        .expect("seed raw settings");
    seed_history(&mut h, 1);

    assert!(matches!(
        purge_on_activation(&mut h.ctx, day(2024, 1, 11)),
        PurgeOutcome::Purged { .. }
    ));
    assert_eq!(
        stored_settings(&h).deleting_on.as_deref(),
        Some("2024/01/16")
    );
}

#[test]
fn purge_persistence_failure_raises_one_error_toast() {
    let mut h = harness();
    configure(&h, 7, Some("2024/01/10"));
    seed_history(&mut h, 2);
    h.fail_writes.set(true);

    let outcome = purge_on_activation(&mut h.ctx, day(2024, 1, 10));
    assert!(matches!(
        outcome,
        PurgeOutcome::Failed(CoreError::Persistence(_))
    ));
    assert_eq!(h.toasts.count(ToastLevel::Error), 1);
    assert_eq!(h.ctx.history().get_all().expect("get all").len(), 2);
}

#[test]
fn failed_reschedule_keeps_history_and_schedule_for_the_day() {
    let mut h = harness();
    configure(&h, 7, Some("2024/01/10"));
    seed_history(&mut h, 2);
    h.failing_key.set(Some(SETTINGS_KEY));

    let today = day(2024, 1, 10);
    assert!(matches!(
        purge_on_activation(&mut h.ctx, today),
        PurgeOutcome::Failed(CoreError::Persistence(_))
    ));
    assert_eq!(h.ctx.history().get_all().expect("get all").len(), 2);
    assert_eq!(h.ctx.episodes().len(), 2);
    assert_eq!(
        stored_settings(&h).deleting_on.as_deref(),
        Some("2024/01/10")
    );

    h.failing_key.set(None);
    assert_eq!(
        purge_on_activation(&mut h.ctx, today),
        PurgeOutcome::Purged {
            next_deleting_on: Some(day(2024, 1, 17))
        }
    );
    h.ctx
        .history()
        .append(episode("Mushishi", 3, "2024/01/10 22:00"))
        .expect("append after purge");
    assert_eq!(
        purge_on_activation(&mut h.ctx, today),
        PurgeOutcome::NotDue {
            deleting_on: day(2024, 1, 17)
        }
    );
    assert_eq!(h.ctx.history().get_all().expect("get all").len(), 1);
}

#[test]
fn explicit_clear_ignores_the_schedule() {
    let mut h = harness();
    configure(&h, 0, None);
    seed_history(&mut h, 4);

    assert_eq!(clear_history(&mut h.ctx), ClearOutcome::Cleared);
    assert!(h.ctx.episodes().is_empty());
    assert!(h.ctx.history().get_all().expect("get all").is_empty());
    assert_eq!(h.toasts.messages(), ["Deleting data", "Data cleared successfully"]);

    assert_eq!(clear_history(&mut h.ctx), ClearOutcome::Cleared);
}

#[test]
fn explicit_clear_reports_persistence_failures() {
    let mut h = harness();
    seed_history(&mut h, 1);
    h.fail_writes.set(true);
    assert!(matches!(clear_history(&mut h.ctx), ClearOutcome::Failed(_)));
    assert_eq!(h.toasts.count(ToastLevel::Error), 1);
    assert_eq!(h.ctx.episodes().len(), 1);
}

#[test]
fn sorting_for_display_never_reorders_the_store() {
    let mut h = harness();
    h.ctx
        .history()
        .replace_all(vec![
            episode("b", 1, "2024/01/01 10:00"),
            episode("a", 1, "2024/03/01 10:00"),
            episode("c", 1, "2024/02/01 10:00"),
        ])
        .expect("seed history");

    let by_name = SortSpec::default().toggled(SortAxis::Name);
    let sorted: Vec<_> = sort_history(h.ctx.episodes(), by_name)
        .into_iter()
        .map(|episode| episode.anime_name.clone())
        .collect();
    assert_eq!(sorted, ["c", "b", "a"]);

    let stored: Vec<_> = h
        .ctx
        .history()
        .get_all()
        .expect("get all")
        .into_iter()
        .map(|episode| episode.anime_name)
        .collect();
    assert_eq!(stored, ["b", "a", "c"]);
}

#[test]
fn panel_opens_setup_until_settings_exist() {
    let mut h = harness();
    initialize(&mut h.ctx, false);

    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    assert_eq!(panel.screen(), Screen::Settings { setup: true });
    assert_eq!(panel.draft().cache_input(), "30");
    assert_eq!(panel.action_for_key(KeyCode::Esc), Some(PanelAction::Quit));

    let today = day(2024, 2, 1);
    panel.apply(&mut h.ctx, PanelAction::EraseCacheInput, today);
    panel.apply(&mut h.ctx, PanelAction::EraseCacheInput, today);
    assert!(!panel.draft().can_save());
    panel.apply(&mut h.ctx, PanelAction::SaveSettings, today);
    assert_eq!(panel.screen(), Screen::Settings { setup: true });
    assert_eq!(
        h.ctx.settings().load().expect("load"),
        LoadedSettings::Empty
    );

    panel.apply(&mut h.ctx, PanelAction::TypeCacheInput('1'), today);
    panel.apply(&mut h.ctx, PanelAction::TypeCacheInput('4'), today);
    panel.apply(&mut h.ctx, PanelAction::TypeCacheInput('x'), today);
    assert_eq!(panel.draft().cache_input(), "14");
    panel.apply(&mut h.ctx, PanelAction::ToggleCompact, today);
    panel.apply(&mut h.ctx, PanelAction::SaveSettings, today);

    assert_eq!(panel.screen(), Screen::History);
    assert!(panel.compact());
    let stored = stored_settings(&h);
    assert_eq!(stored.cache_for, 14);
    assert_eq!(stored.deleting_on.as_deref(), Some("2024/02/15"));

    panel.absorb_toasts(h.toasts.drain());
    assert_eq!(
        panel.status().map(|toast| toast.message.as_str()),
        Some("Settings saved")
    );
}

#[test]
fn panel_cancel_discards_the_settings_draft() {
    let mut h = harness();
    configure(&h, 7, Some("2024/01/08"));
    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    let today = day(2024, 1, 2);

    panel.apply(&mut h.ctx, PanelAction::OpenSettings, today);
    assert_eq!(panel.screen(), Screen::Settings { setup: false });
    assert_eq!(
        panel.action_for_key(KeyCode::Esc),
        Some(PanelAction::CancelSettings)
    );
    panel.apply(&mut h.ctx, PanelAction::TypeCacheInput('0'), today);
    assert_eq!(panel.draft().cache_input(), "70");
    panel.apply(&mut h.ctx, PanelAction::CancelSettings, today);
    assert_eq!(panel.screen(), Screen::History);
    assert_eq!(stored_settings(&h).cache_for, 7);

    panel.apply(&mut h.ctx, PanelAction::OpenSettings, today);
    assert_eq!(panel.draft().cache_input(), "7");
}

#[test]
fn panel_paging_follows_history_and_page_size() {
    let mut h = harness();
    configure(&h, 30, None);
    seed_history(&mut h, 12);
    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    let today = day(2024, 2, 1);

    assert_eq!(
        panel.action_for_key(KeyCode::End),
        Some(PanelAction::Page(PageControl::Last))
    );
    panel.apply(&mut h.ctx, PanelAction::Page(PageControl::Last), today);
    assert_eq!(panel.page().current_page(), 3);
    let page = paginate(h.ctx.episodes(), panel.sort(), panel.page());
    assert_eq!(page.bounds, 10..12);

    panel.apply(&mut h.ctx, PanelAction::CycleItemsPerPage, today);
    assert_eq!(panel.page().items_per_page(), 10);
    assert_eq!(panel.page().current_page(), 1);

    panel.apply(&mut h.ctx, PanelAction::Page(PageControl::Page(2)), today);
    assert_eq!(panel.page().current_page(), 2);

    panel.apply(&mut h.ctx, PanelAction::Sort(SortAxis::Date), today);
    assert_eq!(panel.sort(), SortSpec::default().toggled(SortAxis::Date));
}

#[test]
fn panel_clear_requires_confirmation() {
    let mut h = harness();
    configure(&h, 30, None);
    seed_history(&mut h, 7);
    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    let today = day(2024, 2, 1);

    panel.apply(&mut h.ctx, PanelAction::Page(PageControl::Next), today);
    assert_eq!(panel.action_for_key(KeyCode::Char('c')), Some(PanelAction::RequestClear));
    panel.apply(&mut h.ctx, PanelAction::RequestClear, today);
    assert!(panel.confirm_clear());
    assert_eq!(
        panel.action_for_key(KeyCode::Char('n')),
        Some(PanelAction::CancelClear)
    );
    assert_eq!(panel.action_for_key(KeyCode::Char('q')), None);
    panel.apply(&mut h.ctx, PanelAction::CancelClear, today);
    assert_eq!(h.ctx.episodes().len(), 7);

    panel.apply(&mut h.ctx, PanelAction::RequestClear, today);
    let flow = panel.apply(&mut h.ctx, PanelAction::ConfirmClear, today);
    assert_eq!(flow, Flow::Continue);
    assert!(!panel.confirm_clear());
    assert!(h.ctx.episodes().is_empty());
    assert_eq!(panel.page().current_page(), 1);
}

#[test]
fn panel_picks_up_episodes_recorded_by_another_process() {
    let dir = std::env::temp_dir().join(format!(
        "ephist-sync-test-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let path = dir.join("history.db");
    let open = |toasts: Rc<ToastQueue>| {
        let db = Database::open(&path).expect("open file db");
        db.migrate().expect("migrate");
        let resolver = FakeResolver {
            titles: HashMap::from([(
                1,
                MediaTitle {
                    english: Some("Cowboy Bebop".to_string()),
                    romaji: None,
                },
            )]),
            fail: false,
            calls: Rc::new(Cell::new(0)),
        };
        AppContext::new(Box::new(db), toasts, Box::new(resolver), HISTORY_KEY)
    };

    let mut panel_ctx = open(Rc::new(ToastQueue::default()));
    initialize(&mut panel_ctx, false);
    panel_ctx
        .settings()
        .save(&StorageSettings::with_cache_days(30))
        .expect("seed settings");
    let mut panel = PanelState::new(&panel_ctx, PANEL_OPTIONS);
    assert!(panel_ctx.episodes().is_empty());

    let mut cli_ctx = open(Rc::new(ToastQueue::default()));
    initialize(&mut cli_ctx, false);
    let outcome = ingest_progress(
        &mut cli_ctx,
        ProgressEvent {
            media_id: Some(1),
            progress: Some(5),
        },
        at(2024, 3, 1, 22, 0),
    );
    assert!(matches!(outcome, IngestOutcome::Recorded(_)));

    panel.apply(&mut panel_ctx, PanelAction::Page(PageControl::Last), day(2024, 3, 1));
    assert!(panel_ctx.episodes().is_empty());

    panel.sync_history(&mut panel_ctx);
    assert_eq!(
        panel_ctx.episodes(),
        [episode("Cowboy Bebop", 5, "2024/03/01 22:00")]
    );
    let revision = panel_ctx.mirror().revision();
    panel.sync_history(&mut panel_ctx);
    assert_eq!(panel_ctx.mirror().revision(), revision);

    drop(panel_ctx);
    drop(cli_ctx);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn panel_sync_shrinks_the_page_when_history_is_cleared_elsewhere() {
    let mut h = harness();
    configure(&h, 30, None);
    seed_history(&mut h, 12);
    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    panel.apply(&mut h.ctx, PanelAction::Page(PageControl::Last), day(2024, 2, 1));
    assert_eq!(panel.page().current_page(), 3);

    h.ctx.store().remove(HISTORY_KEY).expect("external clear");
    panel.sync_history(&mut h.ctx);
    assert!(h.ctx.episodes().is_empty());
    assert_eq!(panel.page().current_page(), 1);
}

#[test]
fn panel_quit_ends_the_loop() {
    let mut h = harness();
    configure(&h, 30, None);
    let mut panel = PanelState::new(&h.ctx, PANEL_OPTIONS);
    assert_eq!(panel.action_for_key(KeyCode::Char('q')), Some(PanelAction::Quit));
    assert_eq!(
        panel.apply(&mut h.ctx, PanelAction::Quit, day(2024, 2, 1)),
        Flow::Quit
    );
}
