use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: usize, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(action),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key_line("Tab / Shift-Tab", 2, "Move between fields and buttons"),
        key_line("Enter", 12, "Press the focused button"),
        key_line("F5", 15, "Start cycles"),
        key_line("F6", 15, "Stop cycles"),
        key_line("F2", 15, "Copy status log to clipboard"),
        key_line("F1", 15, "Toggle this help"),
        key_line("Esc", 14, "Dismiss a notice / close help"),
        key_line("Ctrl-C", 11, "Quit"),
        Line::from(""),
        Line::from("Start needs both keywords and a target website."),
        Line::from("Cycles and delay are sent to the server as typed numbers."),
        Line::from("Run state changes only when the server acknowledges."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
