use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders};

use shipcheck::pipeline::ProbeStatus;

use crate::app::StageStatus;

// ── Colour constants ──────────────────────────────────────────────────
pub const COLOR_PASS: Color = Color::Green;
pub const COLOR_FAIL: Color = Color::Red;
pub const COLOR_RUNNING: Color = Color::Yellow;
pub const COLOR_PENDING: Color = Color::DarkGray;
pub const COLOR_SELECTED_BG: Color = Color::DarkGray;
pub const COLOR_HEADING: Color = Color::Cyan;

// ── Icon constants ────────────────────────────────────────────────────
pub const ICON_PASS: &str = "✓";
pub const ICON_FAIL: &str = "✗";
pub const ICON_RUNNING: &str = "◉";
pub const ICON_PENDING: &str = "─";

// ── Helpers ───────────────────────────────────────────────────────────

pub fn stage_status_color(status: StageStatus) -> Color {
    match status {
        StageStatus::Pass => COLOR_PASS,
        StageStatus::Fail => COLOR_FAIL,
        StageStatus::Running => COLOR_RUNNING,
        StageStatus::Pending => COLOR_PENDING,
    }
}

pub fn stage_status_icon(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pass => ICON_PASS,
        StageStatus::Fail => ICON_FAIL,
        StageStatus::Running => ICON_RUNNING,
        StageStatus::Pending => ICON_PENDING,
    }
}

pub fn probe_status_style(status: ProbeStatus) -> (&'static str, Color) {
    match status {
        ProbeStatus::Pass => (ICON_PASS, COLOR_PASS),
        ProbeStatus::Fail => (ICON_FAIL, COLOR_FAIL),
    }
}

/// Bordered panel; the focused one is highlighted.
pub fn make_block(title: &str, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default()
            .fg(COLOR_PASS)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(COLOR_PENDING)
    };

    Block::default()
        .title(format!(" {title} "))
        .borders(Borders::ALL)
        .border_style(border)
}
