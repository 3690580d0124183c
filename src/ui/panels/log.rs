use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use crate::app::App;
use crate::ui::style::{COLOR_PENDING, make_block};

/// Output of the selected stage. While following, the view keeps the tail
/// of the log in sight.
pub fn draw_log(frame: &mut Frame, app: &App, area: Rect, focused: bool) {
    let Some(entry) = app.selected_stage() else {
        frame.render_widget(make_block("Log", focused), area);
        return;
    };

    let title = format!("Log: {}", entry.stage.label());
    let block = make_block(&title, focused);
    let inner_height = block.inner(area).height;

    if entry.log.is_empty() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "No output",
            Style::default().fg(COLOR_PENDING),
        )))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let lines: Vec<Line> = entry.log.lines().map(Line::raw).collect();
    let scroll = if app.follow && app.deploying {
        (lines.len() as u16).saturating_sub(inner_height)
    } else {
        app.log_scroll
    };

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}
