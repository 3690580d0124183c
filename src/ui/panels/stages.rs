use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState};

use crate::app::{App, StageStatus};
use crate::ui::style::{
    COLOR_PENDING, COLOR_SELECTED_BG, make_block, stage_status_color, stage_status_icon,
};

pub fn draw_stages(frame: &mut Frame, app: &App, area: Rect, focused: bool) {
    let title = if app.follow { "Stages (following)" } else { "Stages" };
    let block = make_block(title, focused);

    let items: Vec<ListItem> = app
        .stages
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let icon_color = stage_status_color(entry.status);
            let icon = stage_status_icon(entry.status);

            let mut spans = vec![
                Span::styled(format!("{icon} "), Style::default().fg(icon_color)),
                Span::raw(entry.stage.label()),
            ];

            let lines = entry.log.lines().count();
            if lines > 0 && entry.status != StageStatus::Pending {
                spans.push(Span::styled(
                    format!(" [{lines} lines]"),
                    Style::default().fg(COLOR_PENDING),
                ));
            }

            let mut style = Style::default();
            if focused && i == app.stage_index {
                style = style.bg(COLOR_SELECTED_BG);
            }

            ListItem::new(Line::from(spans)).style(style)
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.stage_index));

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(COLOR_SELECTED_BG)
            .add_modifier(Modifier::BOLD),
    );

    frame.render_stateful_widget(list, area, &mut state);
}
