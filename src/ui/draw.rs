use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::{App, Panel, ScreenMode};

use super::overlay::draw_help_overlay;
use super::panels::{draw_log, draw_probes, draw_report, draw_stages};
use super::style::{COLOR_FAIL, COLOR_PASS, COLOR_RUNNING};

pub fn draw(frame: &mut Frame, app: &App) {
    let size = frame.area();

    // Body | 1-line status bar
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(size);

    // Outer split: left panels | right panels
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(match app.screen_mode {
            ScreenMode::Normal => vec![Constraint::Percentage(30), Constraint::Percentage(70)],
            ScreenMode::Half => vec![Constraint::Percentage(20), Constraint::Percentage(80)],
            ScreenMode::Full => vec![Constraint::Percentage(0), Constraint::Percentage(100)],
        })
        .split(rows[0]);

    // Left column: stages (top) + probes (bottom)
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(horizontal[0]);

    // Right column: log (top) + report (bottom)
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(horizontal[1]);

    draw_stages(frame, app, left[0], app.focused_panel == Panel::Stages);
    draw_probes(frame, app, left[1], app.focused_panel == Panel::Probes);
    draw_log(frame, app, right[0], app.focused_panel == Panel::Log);
    draw_report(frame, app, right[1], app.focused_panel == Panel::Report);
    draw_status_bar(frame, app, rows[1]);

    if app.show_help {
        draw_help_overlay(frame, size);
    }
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (text, color) = if app.deploying {
        ("deploying…".to_string(), COLOR_RUNNING)
    } else if let Some(reason) = &app.aborted {
        (format!("aborted: {reason}"), COLOR_FAIL)
    } else if app.succeeded() {
        ("all probes passed".to_string(), COLOR_PASS)
    } else {
        ("finished with failing probes".to_string(), COLOR_FAIL)
    };

    let mut spans = vec![Span::styled(format!(" {text} "), Style::default().fg(color))];
    if let Some(run) = &app.run_id {
        spans.push(Span::styled(
            format!(" run {run} "),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled(
        " q quit  ? help ",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
