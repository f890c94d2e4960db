use crate::collectors::system::parse_storage_amount;
use crate::collectors::Snapshot;
use crate::state::{Health, State};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Cell, Gauge, Paragraph, Row, Table, Wrap},
    Frame,
};
use std::time::{Duration, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq)]
pub struct UsageBar {
    pub title: &'static str,
    pub label: String,
    /// Always within `0.0..=1.0`.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRow {
    pub name: String,
    pub state: String,
    pub health: Health,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoPanel {
    pub distro: String,
    pub kernel: String,
    pub uptime: String,
}

/// Everything one frame shows, derived from a single snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub bars: [UsageBar; 3],
    pub services: Vec<ServiceRow>,
    pub info: InfoPanel,
}

impl DashboardView {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let ram = UsageBar {
            title: "RAM Usage",
            label: format!("{}/{} MB", snapshot.ram_used, snapshot.ram_total),
            ratio: ratio(snapshot.ram_used as f64, snapshot.ram_total as f64),
        };
        let storage = UsageBar {
            title: "Storage Usage",
            label: format!("{}/{}", snapshot.storage_used, snapshot.storage_total),
            ratio: storage_ratio(&snapshot.storage_used, &snapshot.storage_total),
        };
        let cpu = UsageBar {
            title: "CPU Usage",
            label: format!("{:.1}/100 %", snapshot.cpu_usage),
            ratio: ratio(snapshot.cpu_usage, 100.0),
        };

        let services = snapshot
            .services
            .iter()
            .map(|s| ServiceRow {
                name: s.name.clone(),
                state: s.state.clone(),
                health: s.health(),
            })
            .collect();

        Self {
            bars: [ram, storage, cpu],
            services,
            info: InfoPanel {
                distro: snapshot.distro_name.clone(),
                kernel: snapshot.kernel_version.clone(),
                uptime: snapshot.uptime.clone(),
            },
        }
    }
}

fn ratio(used: f64, total: f64) -> f64 {
    if total > 0.0 && used.is_finite() {
        (used / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn storage_ratio(used: &str, total: &str) -> f64 {
    match (parse_storage_amount(used), parse_storage_amount(total)) {
        (Ok(used), Ok(total)) => ratio(used.bytes(), total.bytes()),
        _ => 0.0,
    }
}

pub fn status_style(health: Health) -> Style {
    match health {
        Health::Healthy => Style::default().fg(Color::Green),
        Health::Unhealthy => Style::default().fg(Color::Red),
    }
}

pub fn draw_dashboard(frame: &mut Frame, view: &DashboardView, state: &State) {
    let table_height = view.services.len() as u16 + 3;
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(table_height),
        Constraint::Length(4),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .split(frame.area());

    for (bar, area) in view.bars.iter().zip(chunks.iter()) {
        draw_bar(frame, bar, *area);
    }
    draw_services(frame, &view.services, chunks[3]);
    draw_info(frame, &view.info, chunks[4]);
    draw_footer(frame, state, chunks[6]);
}

/// Frame for a cycle whose collection failed but the loop keeps going.
pub fn draw_failure(frame: &mut Frame, message: &str, state: &State) {
    let chunks = Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).split(frame.area());

    let text = vec![
        Line::from(Span::styled(
            "Collection failed, retrying on the next cycle",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(format!(
            "consecutive failures: {}",
            state.consecutive_failures
        )),
    ];
    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(Block::bordered().border_style(Style::default().fg(Color::Red)));
    frame.render_widget(paragraph, chunks[0]);
    draw_footer(frame, state, chunks[1]);
}

fn draw_bar(frame: &mut Frame, bar: &UsageBar, area: Rect) {
    let gauge = Gauge::default()
        .block(Block::bordered().title(Span::styled(
            bar.title,
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        )))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(bar.ratio)
        .label(bar.label.clone());
    frame.render_widget(gauge, area);
}

fn draw_services(frame: &mut Frame, services: &[ServiceRow], area: Rect) {
    let header = Row::new(vec![
        Cell::from("Service"),
        Cell::from(Line::from("Status").alignment(Alignment::Right)),
    ])
    .style(
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    );

    let rows = services.iter().map(|s| {
        Row::new(vec![
            Cell::from(s.name.clone()),
            Cell::from(
                Line::from(Span::styled(s.state.clone(), status_style(s.health)))
                    .alignment(Alignment::Right),
            ),
        ])
    });

    let table = Table::new(rows, [Constraint::Min(10), Constraint::Length(12)])
        .header(header)
        .block(Block::bordered().border_style(Style::default().fg(Color::Cyan)));
    frame.render_widget(table, area);
}

fn draw_info(frame: &mut Frame, info: &InfoPanel, area: Rect) {
    let label = Style::default().fg(Color::Magenta);
    let value = Style::default().fg(Color::Cyan);
    let line = Line::from(vec![
        Span::styled("Distro: ", label),
        Span::styled(info.distro.clone(), value),
        Span::raw(", "),
        Span::styled("Kernel: ", label),
        Span::styled(info.kernel.clone(), value),
        Span::raw(", "),
        Span::styled("Uptime: ", label),
        Span::styled(info.uptime.clone(), value),
    ]);
    let paragraph = Paragraph::new(line)
        .wrap(Wrap { trim: true })
        .block(Block::bordered());
    frame.render_widget(paragraph, area);
}

fn draw_footer(frame: &mut Frame, state: &State, area: Rect) {
    let updated = UNIX_EPOCH + Duration::from_secs(state.last_collect_timestamp_seconds.max(0) as u64);
    let running = Duration::from_secs(
        state
            .last_collect_timestamp_seconds
            .saturating_sub(state.started_at_unix)
            .max(0) as u64,
    );
    let text = format!(
        "cycle {} · failed {} · updated {} · running {} · Ctrl+C to quit",
        state.cycles,
        state.failed_cycles,
        humantime::format_rfc3339_seconds(updated),
        humantime::format_duration(running)
    );
    frame.render_widget(
        Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray))),
        area,
    );
}
