use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use crate::app::App;
use crate::ui::style::{COLOR_FAIL, COLOR_HEADING, COLOR_PENDING, make_block};

/// The rendered deploy report once the run completes; before that, the
/// selected probe's body.
pub fn draw_report(frame: &mut Frame, app: &App, area: Rect, focused: bool) {
    let block = make_block("Report", focused);

    let lines: Vec<Line> = if let Some(report) = &app.report {
        let mut lines: Vec<Line> = report.render().lines().map(styled_line).collect();
        if !report.cross_matches_data() {
            lines.push(Line::raw(""));
            lines.push(Line::from(Span::styled(
                "Proxied response differs from the direct one",
                Style::default().fg(COLOR_FAIL),
            )));
        }
        lines
    } else if let Some(probe) = app.selected_probe() {
        let heading = format!("--- {} ({}) ---", probe.kind.label(), probe.url);
        let mut lines = vec![styled_line(&heading)];
        match &probe.error {
            Some(err) => lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(COLOR_FAIL),
            ))),
            None => lines.extend(probe.body.lines().map(|l| Line::raw(l.to_string()))),
        }
        lines
    } else if let Some(reason) = &app.aborted {
        vec![Line::from(Span::styled(
            reason.clone(),
            Style::default().fg(COLOR_FAIL),
        ))]
    } else {
        vec![Line::from(Span::styled(
            "Report appears when the run completes",
            Style::default().fg(COLOR_PENDING),
        ))]
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.report_scroll, 0));
    frame.render_widget(paragraph, area);
}

fn styled_line(line: &str) -> Line<'static> {
    if line.starts_with("--- ") {
        Line::from(Span::styled(
            line.to_string(),
            Style::default()
                .fg(COLOR_HEADING)
                .add_modifier(Modifier::BOLD),
        ))
    } else if line.starts_with("FAILED: ") {
        Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(COLOR_FAIL),
        ))
    } else {
        Line::raw(line.to_string())
    }
}
