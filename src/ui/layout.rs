use {
    super::renderer::{format_clock, format_rssi, format_secs},
    crate::state::Snapshot,
    ratatui::{
        layout::{Constraint, Direction, Layout, Rect},
        style::{Color, Modifier, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Paragraph, Row, Table},
        Frame,
    },
};

/// Render the main UI layout
pub fn render_layout(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Proximity table
            Constraint::Length(3), // Footer/Status
        ])
        .split(area);

    render_header(f, chunks[0]);
    render_proximity_table(f, chunks[1], snapshot);
    render_footer(f, chunks[2], snapshot);
}

fn render_header(f: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(vec![
            Span::styled(
                "proxwatch",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" - Exposure Notification beacons in range"),
        ]),
        Line::from("Press 'q' or Esc to quit"),
    ];

    f.render_widget(Paragraph::new(text).block(Block::default().borders(Borders::ALL)), area);
}

fn rssi_color(rssi: i32) -> Color {
    match rssi {
        r if r >= -60 => Color::Green,
        r if r >= -80 => Color::Yellow,
        _ => Color::Red,
    }
}

fn render_proximity_table(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let header = Row::new(vec!["Proximity ID", "Address", "RSSI", "First Seen", "Active"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = snapshot
        .entries
        .iter()
        .map(|entry| {
            Row::new(vec![
                entry.proximity_id.clone(),
                entry.address.clone(),
                format_rssi(entry.rssi),
                format_clock(entry.first_seen_at),
                format_secs(entry.active_secs),
            ])
            .style(Style::default().fg(rssi_color(entry.rssi)))
        })
        .collect();

    let widths = [
        Constraint::Length(33), // 32 hex chars
        Constraint::Length(18),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Length(8),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Active Proximity IDs"));

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let text = Line::from(vec![
        Span::styled("Active IDs: ", Style::default().fg(Color::Cyan)),
        Span::raw(snapshot.len().to_string()),
        Span::raw(" | "),
        Span::styled("Refreshed: ", Style::default().fg(Color::Cyan)),
        Span::raw(format_clock(snapshot.taken_at)),
    ]);

    let footer = Block::default().borders(Borders::ALL).title("Status");
    f.render_widget(Paragraph::new(text).block(footer), area);
}
