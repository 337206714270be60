use std::time::{Duration, Instant};

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::actions::{Notice, Severity};
use crate::api::{Channel, NetworkSession};
use crate::commands::HELP_TEXT;
use crate::status::{format_duration, StatusLabel, StatusView};

// Layout constants for better maintainability
const HEADER_HEIGHT: u16 = 7;
const PROGRESS_HEIGHT: u16 = 3;
const NOTICE_HEIGHT: u16 = 3;
const INPUT_HEIGHT: u16 = 3;
const MARGIN: u16 = 1;

const HIGHLIGHT_WIDTH: usize = 3; // width of highlight symbol " > "

/// How long a notice stays on screen.
pub const NOTICE_TIMEOUT: Duration = Duration::from_secs(10);

/// One network and its channel catalog, in catalog order.
#[derive(Debug, Clone)]
pub struct NetworkTab {
    pub id: u64,
    pub key: String,
    pub name: String,
    pub channels: Vec<Channel>,
}

impl NetworkTab {
    /// Snapshot of an initialized session.
    pub fn from_session(session: &NetworkSession) -> Option<Self> {
        let config = session.config().ok()?;
        Some(Self {
            id: session.network_id().ok()?,
            key: config.network_key.clone(),
            name: session.network_name().unwrap_or_else(|_| config.network_key.clone()),
            channels: config.channels.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Channels,
    Help,
}

#[derive(Debug, Clone)]
pub struct ShownNotice {
    pub notice: Notice,
    pub shown_at: Instant,
}

pub struct UIState {
    pub networks: Vec<NetworkTab>,
    pub current_network: usize,
    pub list_state: ListState,
    pub view: View,
    pub input: String,
    pub notices: Vec<ShownNotice>,
    pub status: StatusView,
    /// `(network id, channel id)` of the channel last tuned by the player.
    pub tuned: Option<(u64, u64)>,
    pub should_quit: bool,
}

impl UIState {
    pub fn new(networks: Vec<NetworkTab>, current_network: usize) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            current_network: current_network.min(networks.len().saturating_sub(1)),
            networks,
            list_state,
            view: View::Channels,
            input: String::new(),
            notices: Vec::new(),
            status: StatusView::default(),
            tuned: None,
            should_quit: false,
        }
    }

    pub fn current_tab(&self) -> Option<&NetworkTab> {
        self.networks.get(self.current_network)
    }

    pub fn channels(&self) -> &[Channel] {
        self.current_tab().map(|t| t.channels.as_slice()).unwrap_or_default()
    }

    pub fn selected_index(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    pub fn selected_channel(&self) -> Option<&Channel> {
        self.channels().get(self.selected_index())
    }

    pub fn select_channel(&mut self, index: usize) {
        if index < self.channels().len() {
            self.list_state.select(Some(index));
        }
    }

    pub fn next_channel(&mut self) {
        let len = self.channels().len();
        if len > 0 {
            self.select_channel((self.selected_index() + 1) % len);
        }
    }

    pub fn previous_channel(&mut self) {
        let len = self.channels().len();
        if len > 0 {
            let current = self.selected_index();
            self.select_channel(if current == 0 { len - 1 } else { current - 1 });
        }
    }

    pub fn select_network(&mut self, index: usize) {
        if index < self.networks.len() {
            self.current_network = index;
            self.list_state.select(Some(0));
            self.view = View::Channels;
        }
    }

    pub fn next_network(&mut self) {
        if !self.networks.is_empty() {
            self.select_network((self.current_network + 1) % self.networks.len());
        }
    }

    pub fn previous_network(&mut self) {
        if !self.networks.is_empty() {
            let len = self.networks.len();
            self.select_network((self.current_network + len - 1) % len);
        }
    }

    pub fn network_index_by_key(&self, key: &str) -> Option<usize> {
        self.networks
            .iter()
            .position(|n| n.key.eq_ignore_ascii_case(key))
    }

    /// Moves the cursor onto a channel, switching network if needed.
    pub fn reveal_channel(&mut self, network_id: u64, channel_id: u64) {
        let Some(network) = self.networks.iter().position(|n| n.id == network_id) else {
            return;
        };
        if network != self.current_network {
            self.select_network(network);
        }
        if let Some(index) = self.channels().iter().position(|c| c.id == channel_id) {
            self.select_channel(index);
        }
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(ShownNotice {
            notice,
            shown_at: Instant::now(),
        });
    }

    pub fn prune_notices(&mut self, now: Instant) {
        self.notices
            .retain(|n| now.saturating_duration_since(n.shown_at) < NOTICE_TIMEOUT);
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.last().map(|n| &n.notice)
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

pub fn render_ui(f: &mut Frame, app: &mut UIState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(MARGIN)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),   // Now playing
            Constraint::Min(8),                  // Channels or help
            Constraint::Length(PROGRESS_HEIGHT), // Track progress
            Constraint::Length(NOTICE_HEIGHT),   // Notices
            Constraint::Length(INPUT_HEIGHT),    // Command line
        ])
        .split(f.area());

    render_header(f, chunks[0], &app.status);

    match app.view {
        View::Channels => render_channel_list(f, chunks[1], app),
        View::Help => render_help(f, chunks[1]),
    }

    render_progress(f, chunks[2], &app.status);
    render_notice(f, chunks[3], app.latest_notice());
    render_input(f, chunks[4], &app.input);
}

fn label_color(label: StatusLabel) -> Color {
    match label {
        StatusLabel::Playing => Color::Green,
        StatusLabel::Paused => Color::Yellow,
        StatusLabel::Ready => Color::Blue,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Warning => Color::Yellow,
        Severity::Danger => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, status: &StatusView) {
    let label = status.label();
    let color = label_color(label);

    let channel = match (&status.channel_name, &status.network_name) {
        (Some(channel), Some(network)) => format!("{channel} • {network}"),
        (Some(channel), None) => channel.clone(),
        _ => "No channel tuned".to_string(),
    };

    let content = vec![
        Line::from(vec![
            Span::styled(
                format!("{} {}", label.emoji(), label.label()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" • ", Style::default().fg(Color::Gray)),
            Span::styled(channel, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Title: ", Style::default()),
            Span::styled(status.title_line(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Artist: ", Style::default()),
            Span::styled(
                status.artist.clone().unwrap_or_default(),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Line::from(vec![
            Span::styled("Cover: ", Style::default()),
            Span::styled(status.cover_url().to_string(), Style::default().fg(Color::DarkGray)),
            Span::styled(" • ", Style::default().fg(Color::Gray)),
            Span::styled(
                status.channel_cover_url().to_string(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ];

    let header = Paragraph::new(Text::from(content)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title("Now Playing"),
    );

    f.render_widget(header, area);
}

fn render_channel_list(f: &mut Frame, area: Rect, app: &mut UIState) {
    // Borders, padding and the highlight column
    let width = (area.width as usize).saturating_sub(4 + HIGHLIGHT_WIDTH);
    let tuned = app.tuned;
    let network_id = app.current_tab().map(|t| t.id);

    let items: Vec<ListItem> = app
        .channels()
        .iter()
        .enumerate()
        .map(|(n, channel)| {
            let item = ListItem::new(truncate_string(&format!("{}. {}", n + 1, channel.name), width));
            if network_id.map(|id| (id, channel.id)) == tuned {
                item.style(Style::default().fg(Color::Green).add_modifier(Modifier::DIM))
            } else {
                item
            }
        })
        .collect();

    let title = match app.current_tab() {
        Some(tab) => format!(
            "{} ({} channels) - network {}/{} [Tab]",
            tab.name,
            tab.channels.len(),
            app.current_network + 1,
            app.networks.len()
        ),
        None => "No networks".to_string(),
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(" > ");

    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(HELP_TEXT)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title("Help - ESC to go back"),
        );

    f.render_widget(help, area);
}

fn render_progress(f: &mut Frame, area: Rect, status: &StatusView) {
    let elapsed = format_duration(status.elapsed().as_secs_f64());
    let (ratio, label) = match status.progress() {
        Some(ratio) => (ratio, format!("{elapsed} / {}", format_duration(status.track_length))),
        None if status.track_id.is_some() => (0.0, elapsed),
        None => (0.0, String::new()),
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue))
                .title("Progress"),
        )
        .gauge_style(Style::default().fg(label_color(status.label())).bg(Color::Black))
        .ratio(ratio)
        .label(label);

    f.render_widget(gauge, area);
}

fn render_notice(f: &mut Frame, area: Rect, notice: Option<&Notice>) {
    let line = match notice {
        Some(notice) => Line::from(Span::styled(
            notice.text.clone(),
            Style::default()
                .fg(severity_color(notice.severity))
                .add_modifier(Modifier::BOLD),
        )),
        None => Line::from(Span::styled(
            "Type `help` or `?` to see list of commands",
            Style::default().fg(Color::DarkGray),
        )),
    };

    let status = Paragraph::new(Text::from(line)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title("Status"),
    );

    f.render_widget(status, area);
}

fn render_input(f: &mut Frame, area: Rect, input: &str) {
    let line = Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Span::styled(input.to_string(), Style::default().fg(Color::White)),
        Span::styled("_", Style::default().fg(Color::Gray)),
    ]);

    let controls = Paragraph::new(Text::from(line))
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray))
                .title("↑/↓ Navigate • ENTER Play/Run • SPACE Pause/Resume • TAB Network • ESC Quit"),
        );

    f.render_widget(controls, area);
}

/// Char-aware truncation with a trailing ellipsis.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }

    let mut truncated: String = s.chars().take(max_len - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use serde_json::json;

    fn channel(id: u64, name: &str) -> Channel {
        serde_json::from_value(json!({ "id": id, "name": name, "network_id": 1 })).unwrap()
    }

    fn tabs() -> Vec<NetworkTab> {
        vec![
            NetworkTab {
                id: 1,
                key: "di".to_string(),
                name: "DI.FM".to_string(),
                channels: vec![channel(5, "Vocal Trance"), channel(7, "Lo-Fi")],
            },
            NetworkTab {
                id: 2,
                key: "rockradio".to_string(),
                name: "ROCKRADIO.COM".to_string(),
                channels: vec![channel(90, "Classic Rock")],
            },
        ]
    }

    fn screen(app: &mut UIState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 32)).unwrap();
        terminal.draw(|f| render_ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_channel_navigation_wraps() {
        let mut app = UIState::new(tabs(), 0);
        app.previous_channel();
        assert_eq!(app.selected_channel().unwrap().id, 7);
        app.next_channel();
        assert_eq!(app.selected_channel().unwrap().id, 5);
    }

    #[test]
    fn test_switching_network_resets_selection() {
        let mut app = UIState::new(tabs(), 0);
        app.next_channel();
        app.next_network();
        assert_eq!(app.current_tab().unwrap().key, "rockradio");
        assert_eq!(app.selected_channel().unwrap().id, 90);
        app.next_network();
        assert_eq!(app.current_network, 0);
        app.previous_network();
        assert_eq!(app.current_network, 1);
    }

    #[test]
    fn test_reveal_channel_switches_network() {
        let mut app = UIState::new(tabs(), 1);
        app.reveal_channel(1, 7);
        assert_eq!(app.current_network, 0);
        assert_eq!(app.selected_channel().unwrap().name, "Lo-Fi");
    }

    #[test]
    fn test_notices_expire() {
        let mut app = UIState::new(tabs(), 0);
        app.push_notice(Notice::info("hello"));
        app.prune_notices(Instant::now());
        assert_eq!(app.latest_notice().unwrap().text, "hello");

        app.prune_notices(Instant::now() + NOTICE_TIMEOUT + Duration::from_secs(1));
        assert!(app.latest_notice().is_none());
    }

    #[test]
    fn test_render_lists_numbered_channels() {
        let mut app = UIState::new(tabs(), 0);
        app.push_notice(Notice::danger("Can't find a channel matches with \"polka\""));
        let text = screen(&mut app);

        assert!(text.contains("1. Vocal Trance"));
        assert!(text.contains("2. Lo-Fi"));
        assert!(text.contains("DI.FM (2 channels)"));
        assert!(text.contains("polka"));
    }

    #[test]
    fn test_render_help_view() {
        let mut app = UIState::new(tabs(), 0);
        app.view = View::Help;
        let text = screen(&mut app);
        assert!(text.contains("Help - ESC to go back"));
        assert!(text.contains("play [channel], p [channel]"));
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Vocal Trance", 20), "Vocal Trance");
        assert_eq!(truncate_string("Vocal Trance", 8), "Vocal...");
        assert_eq!(truncate_string("Lo-Fi", 2), "Lo");
    }
}
