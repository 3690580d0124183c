use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

const KEYS: &[(&str, &str)] = &[
    ("j / k", "Move or scroll"),
    ("g / Home", "Back to the top"),
    ("Tab / h / l", "Cycle panels"),
    ("1-4", "Jump to panel"),
    ("f", "Follow the running stage"),
    ("+ / _", "Resize the left column"),
    ("q / Ctrl+C", "Quit"),
];

/// Key reference, drawn over the dashboard until any key is pressed.
pub fn draw_help_overlay(frame: &mut Frame, area: Rect) {
    let height = KEYS.len() as u16 + 4;
    let popup = centre(44, height, area);
    frame.render_widget(Clear, popup);

    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line> = KEYS
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!(" {key:<13}"), key_style),
                Span::raw(*what),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(
        Line::from(Span::styled(
            "any key closes",
            Style::default().fg(Color::DarkGray),
        ))
        .alignment(Alignment::Center),
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Keys ");
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

fn centre(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(
        area.x + (area.width - w) / 2,
        area.y + (area.height - h) / 2,
        w,
        h,
    )
}
