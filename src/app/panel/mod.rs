mod render;
mod session;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::debug;

use super::context::AppContext;
use super::error::report_failure;
use super::notify::{Toast, ToastQueue};
use super::retention::clear_history;
use super::settings::{LoadedSettings, SaveOutcome, SettingsDraft, save_settings};
use super::view::{PageControl, PageState, SortAxis, SortSpec, total_pages};

use self::render::draw_panel;
use self::session::TerminalSession;

const SETTINGS_LOAD_FAILED_TOAST: &str =
    "Could not load the settings. Check the logs for more information";
const HISTORY_SYNC_FAILED_TOAST: &str =
    "Could not reload the history. Check the logs for more information";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Screen {
    History,
    /// `setup` is the first-run form: it replaces History and cannot be cancelled.
    Settings { setup: bool },
}

/// Every control the panel exposes, addressed structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PanelAction {
    Quit,
    Sort(SortAxis),
    Page(PageControl),
    CycleItemsPerPage,
    OpenSettings,
    RequestClear,
    ConfirmClear,
    CancelClear,
    TypeCacheInput(char),
    EraseCacheInput,
    ToggleCompact,
    SaveSettings,
    CancelSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PanelOptions {
    pub(crate) items_per_page: usize,
    pub(crate) default_cache_days: i64,
}

#[derive(Debug)]
pub(crate) struct PanelState {
    screen: Screen,
    sort: SortSpec,
    page: PageState,
    draft: SettingsDraft,
    compact: bool,
    confirm_clear: bool,
    status: Option<Toast>,
    default_cache_days: i64,
    seen_revision: u64,
    sync_failing: bool,
}

impl PanelState {
    /// Opens on History once settings exist, otherwise on the setup form.
    pub(crate) fn new(ctx: &AppContext, options: PanelOptions) -> Self {
        let loaded = match ctx.settings().load() {
            Ok(loaded) => loaded,
            Err(err) => {
                report_failure(ctx.notifier(), "openPanel", SETTINGS_LOAD_FAILED_TOAST, &err);
                LoadedSettings::Missing
            }
        };
        let configured = loaded.configured();
        let screen = if configured.is_some() {
            Screen::History
        } else {
            Screen::Settings { setup: true }
        };
        Self {
            screen,
            sort: SortSpec::default(),
            page: PageState::new(options.items_per_page),
            compact: configured.is_some_and(|settings| settings.compact()),
            draft: SettingsDraft::from_loaded(&loaded, options.default_cache_days),
            confirm_clear: false,
            status: None,
            default_cache_days: options.default_cache_days,
            seen_revision: ctx.mirror().revision(),
            sync_failing: false,
        }
    }

    /// Reloads the mirror so episodes stored by other processes show up,
    /// keeping the current page in range when the history changed.
    pub(crate) fn sync_history(&mut self, ctx: &mut AppContext) {
        if let Err(err) = ctx.history().refresh_mirror() {
            if !self.sync_failing {
                report_failure(ctx.notifier(), "syncHistory", HISTORY_SYNC_FAILED_TOAST, &err);
            }
            self.sync_failing = true;
            return;
        }
        self.sync_failing = false;

        let revision = ctx.mirror().revision();
        if revision != self.seen_revision {
            debug!(episodes = ctx.episodes().len(), "history changed on disk");
            self.seen_revision = revision;
            self.page.clamp(ctx.episodes().len());
        }
    }

    pub(crate) fn screen(&self) -> Screen {
        self.screen
    }

    pub(crate) fn sort(&self) -> SortSpec {
        self.sort
    }

    pub(crate) fn page(&self) -> PageState {
        self.page
    }

    pub(crate) fn draft(&self) -> &SettingsDraft {
        &self.draft
    }

    pub(crate) fn compact(&self) -> bool {
        self.compact
    }

    pub(crate) fn confirm_clear(&self) -> bool {
        self.confirm_clear
    }

    pub(crate) fn status(&self) -> Option<&Toast> {
        self.status.as_ref()
    }

    /// Shows the most recent toast in the status line.
    pub(crate) fn absorb_toasts(&mut self, toasts: Vec<Toast>) {
        if let Some(last) = toasts.into_iter().last() {
            self.status = Some(last);
        }
    }

    pub(crate) fn action_for_key(&self, code: KeyCode) -> Option<PanelAction> {
        if self.confirm_clear {
            return match code {
                KeyCode::Char('y') | KeyCode::Enter => Some(PanelAction::ConfirmClear),
                KeyCode::Char('n') | KeyCode::Esc => Some(PanelAction::CancelClear),
                _ => None,
            };
        }

        match self.screen {
            Screen::History => match code {
                KeyCode::Char('q') | KeyCode::Esc => Some(PanelAction::Quit),
                KeyCode::Char('n') => Some(PanelAction::Sort(SortAxis::Name)),
                KeyCode::Char('d') => Some(PanelAction::Sort(SortAxis::Date)),
                KeyCode::Home | KeyCode::Char('g') => Some(PanelAction::Page(PageControl::First)),
                KeyCode::Left | KeyCode::Char('h') => {
                    Some(PanelAction::Page(PageControl::Previous))
                }
                KeyCode::Right | KeyCode::Char('l') => Some(PanelAction::Page(PageControl::Next)),
                KeyCode::End | KeyCode::Char('G') => Some(PanelAction::Page(PageControl::Last)),
                KeyCode::Char(digit @ '1'..='9') => digit
                    .to_digit(10)
                    .map(|page| PanelAction::Page(PageControl::Page(page as usize))),
                KeyCode::Char('p') => Some(PanelAction::CycleItemsPerPage),
                KeyCode::Char('s') => Some(PanelAction::OpenSettings),
                KeyCode::Char('c') => Some(PanelAction::RequestClear),
                _ => None,
            },
            Screen::Settings { setup } => match code {
                KeyCode::Enter => Some(PanelAction::SaveSettings),
                KeyCode::Tab => Some(PanelAction::ToggleCompact),
                KeyCode::Backspace => Some(PanelAction::EraseCacheInput),
                KeyCode::Esc if setup => Some(PanelAction::Quit),
                KeyCode::Esc => Some(PanelAction::CancelSettings),
                KeyCode::Char(ch) => Some(PanelAction::TypeCacheInput(ch)),
                _ => None,
            },
        }
    }

    /// Runs one action to completion against the context.
    pub(crate) fn apply(&mut self, ctx: &mut AppContext, action: PanelAction, today: NaiveDate) -> Flow {
        match action {
            PanelAction::Quit => return Flow::Quit,
            PanelAction::Sort(axis) => self.sort = self.sort.toggled(axis),
            PanelAction::Page(control) => {
                let pages = total_pages(ctx.episodes().len(), self.page.items_per_page());
                self.page.navigate(control, pages);
            }
            PanelAction::CycleItemsPerPage => self.page.cycle_items_per_page(),
            PanelAction::OpenSettings => self.open_settings(ctx),
            PanelAction::RequestClear => self.confirm_clear = true,
            PanelAction::CancelClear => self.confirm_clear = false,
            PanelAction::ConfirmClear => {
                self.confirm_clear = false;
                clear_history(ctx);
            }
            PanelAction::TypeCacheInput(ch) => {
                let raw = format!("{}{ch}", self.draft.cache_input());
                self.draft.set_cache_input(&raw);
            }
            PanelAction::EraseCacheInput => {
                let mut raw = self.draft.cache_input().to_string();
                raw.pop();
                self.draft.set_cache_input(&raw);
            }
            PanelAction::ToggleCompact => {
                let compact = self.draft.settings().compact();
                self.draft.set_compact_view(!compact);
            }
            PanelAction::SaveSettings => {
                if self.draft.can_save()
                    && let SaveOutcome::Saved(saved) = save_settings(ctx, &self.draft, today)
                {
                    self.compact = saved.compact();
                    self.screen = Screen::History;
                }
            }
            PanelAction::CancelSettings => {
                if self.screen == (Screen::Settings { setup: false }) {
                    self.screen = Screen::History;
                }
            }
        }
        self.page.clamp(ctx.episodes().len());
        Flow::Continue
    }

    fn open_settings(&mut self, ctx: &AppContext) {
        match ctx.settings().load() {
            Ok(loaded) => {
                self.draft = SettingsDraft::from_loaded(&loaded, self.default_cache_days);
                self.screen = Screen::Settings {
                    setup: !loaded.is_configured(),
                };
            }
            Err(err) => {
                report_failure(ctx.notifier(), "openSettings", SETTINGS_LOAD_FAILED_TOAST, &err);
            }
        }
    }
}

pub(crate) fn run_panel(ctx: &mut AppContext, toasts: &ToastQueue, options: PanelOptions) -> Result<()> {
    let mut session = TerminalSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut state = PanelState::new(ctx, options);
    loop {
        state.absorb_toasts(toasts.drain());
        terminal.draw(|frame| draw_panel(frame, &state, ctx.episodes()))?;

        if !event::poll(Duration::from_millis(200))? {
            state.sync_history(ctx);
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let Some(action) = state.action_for_key(key.code) else {
            continue;
        };
        if state.apply(ctx, action, Local::now().date_naive()) == Flow::Quit {
            break;
        }
    }

    terminal.show_cursor()?;
    session.leave()?;
    Ok(())
}
