use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{List, ListItem, ListState};

use crate::app::App;
use crate::ui::style::{COLOR_PENDING, COLOR_SELECTED_BG, make_block, probe_status_style};

pub fn draw_probes(frame: &mut Frame, app: &App, area: Rect, focused: bool) {
    let block = make_block("Probes", focused);

    if app.probes.is_empty() {
        let item = ListItem::new(Line::from(Span::styled(
            "No probes have run yet",
            Style::default().fg(COLOR_PENDING),
        )));
        frame.render_widget(List::new(vec![item]).block(block), area);
        return;
    }

    let items: Vec<ListItem> = app
        .probes
        .iter()
        .map(|probe| {
            let (icon, color) = probe_status_style(probe.status);
            ListItem::new(Line::from(vec![
                Span::styled(format!("{icon} "), Style::default().fg(color)),
                Span::raw(probe.kind.label()),
                Span::styled(format!("  {}", probe.pod), Style::default().fg(COLOR_PENDING)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    if focused {
        state.select(Some(app.probe_index));
    }

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(COLOR_SELECTED_BG)
            .add_modifier(Modifier::BOLD),
    );

    frame.render_stateful_widget(list, area, &mut state);
}
