use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Padding, Paragraph, Row, Table, Wrap};

use super::super::format::{display_watched_at, truncate};
use super::super::history::WatchedEpisode;
use super::super::notify::{Toast, ToastLevel};
use super::super::settings::{CACHE_DAYS_ADVISORY, CACHE_DAYS_INVALID_HINT};
use super::super::view::{HistoryPage, PageControl, PageState, SortAxis, SortSpec, paginate};
use super::{PanelState, Screen};

const COMPACT_NAME_WIDTH: usize = 32;
const WRAPPED_NAME_WIDTH: usize = 48;

pub(super) fn draw_panel(frame: &mut Frame, state: &PanelState, history: &[WatchedEpisode]) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(header(state, history.len()), chunks[0]);

    match state.screen() {
        Screen::History => {
            let page = paginate(history, state.sort(), state.page());
            draw_history(frame, chunks[1], &page, state.sort(), state.compact());
            let controls = Paragraph::new(page_controls_line(state.page(), &page))
                .alignment(Alignment::Center)
                .block(panel_block("Pages"));
            frame.render_widget(controls, chunks[2]);
        }
        Screen::Settings { setup } => {
            draw_settings_form(frame, chunks[1], state, setup);
            let controls = Paragraph::new(settings_controls_line(state, setup))
                .alignment(Alignment::Center)
                .block(panel_block("Controls"));
            frame.render_widget(controls, chunks[2]);
        }
    }

    let status_widget = Paragraph::new(
        state
            .status()
            .map(Toast::status_line)
            .unwrap_or_else(|| "Ready.".to_string()),
    )
    .style(status_style(state.status()))
    .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);

    if state.confirm_clear() {
        let popup_text = format!(
            "Clear the watched history?\n\n{} episodes will be removed.\n\nThis cannot be undone.\n\n[y / Enter] Clear   [n / Esc] Cancel",
            history.len()
        );
        let popup_area = popup_rect_for_text(frame.area(), &popup_text);
        render_popup_shadow(frame, popup_area);
        frame.render_widget(Clear, popup_area);
        let popup = Paragraph::new(popup_text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(modal_block("Confirm Clear"));
        frame.render_widget(popup, popup_area);
    }
}

fn header(state: &PanelState, total: usize) -> Paragraph<'static> {
    let screen_label = match state.screen() {
        Screen::History => "HISTORY",
        Screen::Settings { setup: true } => "SETUP",
        Screen::Settings { setup: false } => "SETTINGS",
    };
    let muted = Style::default().fg(Color::Rgb(185, 195, 210));
    let mut spans = vec![
        Span::styled(
            "EPISODE HISTORY",
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(format!("{total} episodes"), muted),
        Span::raw("   "),
        Span::styled(screen_label, Style::default().fg(Color::Yellow)),
    ];
    if state.compact() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled("compact", muted));
    }
    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(panel_block("Episode History"))
}

fn draw_history(frame: &mut Frame, area: Rect, page: &HistoryPage<'_>, sort: SortSpec, compact: bool) {
    if page.rows.is_empty() {
        let empty = Paragraph::new(
            "No watched episodes yet.\n\nRun `ephist progress --media-id <id> --progress <n>` to record one.",
        )
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .block(panel_block("Watched"));
        frame.render_widget(empty, area);
        return;
    }

    let rows: Vec<Row> = page
        .rows
        .iter()
        .map(|episode| {
            let name_lines = if compact {
                vec![truncate(&episode.anime_name, COMPACT_NAME_WIDTH)]
            } else {
                wrap_chars(&episode.anime_name, WRAPPED_NAME_WIDTH)
            };
            let height = name_lines.len().max(1) as u16;
            Row::new(vec![
                Cell::from(name_lines.join("\n")),
                Cell::from(episode.episode_number.to_string()),
                Cell::from(display_watched_at(&episode.date, compact)),
            ])
            .height(height)
        })
        .collect();

    let name_width = if compact {
        COMPACT_NAME_WIDTH
    } else {
        WRAPPED_NAME_WIDTH
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(name_width as u16 + 2),
            Constraint::Length(10),
            Constraint::Min(18),
        ],
    )
    .header(
        Row::new(vec![
            sort_label("Name", SortAxis::Name, sort),
            "Episode".to_string(),
            sort_label("Watched", SortAxis::Date, sort),
        ])
        .style(
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(panel_block("Watched"));
    frame.render_widget(table, area);
}

fn sort_label(label: &str, axis: SortAxis, sort: SortSpec) -> String {
    match sort.direction_for(axis) {
        Some(direction) => format!("{label} {}", direction.arrow()),
        None => label.to_string(),
    }
}

fn page_controls_line(state: PageState, page: &HistoryPage<'_>) -> Line<'static> {
    let pill = |label: String, control: PageControl| {
        let style = if control == PageControl::Page(page.current_page) {
            pill_active()
        } else if state.is_disabled(control, page.total_pages) {
            pill_disabled()
        } else {
            pill_inactive()
        };
        Span::styled(format!(" {label} "), style)
    };

    let mut spans = vec![
        pill("«".to_string(), PageControl::First),
        Span::raw(" "),
        pill("‹".to_string(), PageControl::Previous),
        Span::raw(" "),
    ];
    if page.total_pages == 0 {
        spans.push(pill("1".to_string(), PageControl::Page(1)));
        spans.push(Span::raw(" "));
    }
    for number in page.window.clone() {
        spans.push(pill(number.to_string(), PageControl::Page(number)));
        spans.push(Span::raw(" "));
    }
    spans.push(pill("›".to_string(), PageControl::Next));
    spans.push(Span::raw(" "));
    spans.push(pill("»".to_string(), PageControl::Last));
    spans.push(Span::styled(
        format!(
            "   {} per page   n/d sort  ←/→ page  p size  s settings  c clear  q quit",
            state.items_per_page()
        ),
        Style::default().fg(Color::Rgb(185, 195, 210)),
    ));
    Line::from(spans)
}

fn draw_settings_form(frame: &mut Frame, area: Rect, state: &PanelState, setup: bool) {
    let draft = state.draft();
    let label = Style::default().fg(Color::Rgb(185, 195, 210));
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Keep history for (days)  ", label),
            Span::styled(
                format!(" {}_ ", draft.cache_input()),
                Style::default()
                    .bg(Color::Rgb(40, 46, 56))
                    .fg(Color::Rgb(230, 235, 242)),
            ),
        ]),
        Line::from(Span::styled(
            CACHE_DAYS_ADVISORY,
            Style::default().fg(Color::Rgb(150, 160, 175)),
        )),
    ];
    if !draft.can_save() {
        lines.push(Line::from(Span::styled(
            CACHE_DAYS_INVALID_HINT,
            Style::default()
                .fg(Color::Rgb(255, 145, 120))
                .add_modifier(Modifier::BOLD),
        )));
    }
    lines.push(Line::raw(""));
    lines.push(Line::from(vec![
        Span::styled("Compact view             ", label),
        Span::raw(if draft.settings().compact() { "[x]" } else { "[ ]" }),
    ]));
    if let Some(deleting_on) = draft.settings().deleting_on.as_deref() {
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("Next purge               ", label),
            Span::raw(deleting_on.to_string()),
        ]));
    }
    if setup {
        lines.insert(
            0,
            Line::from(Span::styled(
                "Choose how long watched episodes are kept before they are deleted.",
                Style::default().fg(Color::Yellow),
            )),
        );
        lines.insert(1, Line::raw(""));
    }

    let form = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel_block(if setup { "Setup" } else { "Settings" }).padding(Padding::new(2, 2, 1, 1)));
    frame.render_widget(form, area);
}

fn settings_controls_line(state: &PanelState, setup: bool) -> Line<'static> {
    let save_style = if state.draft().can_save() {
        pill_active()
    } else {
        pill_disabled()
    };
    let mut spans = vec![Span::styled(" SAVE ", save_style)];
    if !setup {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(" CANCEL ", pill_inactive()));
    }
    let hints = if setup {
        "   Enter save  Tab compact  Esc quit"
    } else {
        "   Enter save  Tab compact  Esc cancel"
    };
    spans.push(Span::styled(hints, Style::default().fg(Color::Rgb(185, 195, 210))));
    Line::from(spans)
}

fn wrap_chars(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn pill_active() -> Style {
    Style::default()
        .bg(Color::Rgb(110, 170, 255))
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn pill_inactive() -> Style {
    Style::default()
        .bg(Color::Rgb(72, 82, 96))
        .fg(Color::Rgb(230, 235, 242))
}

fn pill_disabled() -> Style {
    Style::default()
        .bg(Color::Rgb(36, 40, 48))
        .fg(Color::Rgb(100, 108, 120))
}

fn status_style(status: Option<&Toast>) -> Style {
    match status.map(|toast| toast.level) {
        Some(ToastLevel::Error) => Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD),
        Some(ToastLevel::Warning) => Style::default().fg(Color::Yellow),
        Some(ToastLevel::Success) => Style::default().fg(Color::Rgb(140, 220, 150)),
        Some(ToastLevel::Info) => Style::default().fg(Color::Rgb(205, 165, 255)),
        None => Style::default().fg(Color::Rgb(230, 235, 242)),
    }
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width.max(1));
    let clamped_height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(clamped_width) / 2;
    let y = area.y + area.height.saturating_sub(clamped_height) / 2;
    Rect::new(x, y, clamped_width, clamped_height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let max_line_width = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let width = max_line_width
        .saturating_add(12)
        .clamp(40.min(available_width), 72.min(available_width));

    let available_height = area.height.saturating_sub(2).max(1);
    let height = line_count
        .saturating_add(6)
        .clamp(8.min(available_height), 16.min(available_height));

    centered_fixed_rect(width, height, area)
}
