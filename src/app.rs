use std::time::Instant;

use anyhow::{anyhow, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::debug;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::actions::{Notice, Request, Response};
use crate::api::NetworkManager;
use crate::commands::{self, Command, UNKNOWN_COMMAND};
use crate::status::StatusView;
use crate::ui::{NetworkTab, UIState, View};

pub struct AppController {
    pub ui_app: UIState,
    req_tx: UnboundedSender<Request>,
    status_rx: watch::Receiver<StatusView>,
}

impl AppController {
    pub fn new(
        networks: Vec<NetworkTab>,
        browse_network: &str,
        req_tx: UnboundedSender<Request>,
        status_rx: watch::Receiver<StatusView>,
    ) -> Self {
        let current = networks
            .iter()
            .position(|n| n.key.eq_ignore_ascii_case(browse_network))
            .unwrap_or(0);

        Self {
            ui_app: UIState::new(networks, current),
            req_tx,
            status_rx,
        }
    }

    /// One tab per active network, in manager order.
    pub fn tabs(manager: &NetworkManager) -> Vec<NetworkTab> {
        manager
            .active_networks()
            .iter()
            .filter_map(|session| NetworkTab::from_session(session))
            .collect()
    }

    /// Returns `true` once quitting was requested.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.ui_app.quit();
            return Ok(true);
        }

        match key.code {
            KeyCode::Esc => {
                if !self.ui_app.input.is_empty() {
                    self.ui_app.input.clear();
                } else if self.ui_app.view == View::Help {
                    self.ui_app.view = View::Channels;
                } else {
                    self.ui_app.quit();
                }
            }
            KeyCode::Up => self.ui_app.previous_channel(),
            KeyCode::Down => self.ui_app.next_channel(),
            KeyCode::Tab => self.ui_app.next_network(),
            KeyCode::BackTab => self.ui_app.previous_network(),
            KeyCode::Backspace => {
                self.ui_app.input.pop();
            }
            KeyCode::Char(' ') if self.ui_app.input.is_empty() => self.send(Request::Toggle)?,
            KeyCode::Char(c) => self.ui_app.input.push(c),
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.ui_app.input);
                if line.trim().is_empty() {
                    self.play_selected()?;
                } else {
                    self.run_command(&line)?;
                }
            }
            _ => {}
        }

        Ok(self.should_quit())
    }

    fn run_command(&mut self, line: &str) -> Result<()> {
        let Some(command) = commands::parse(line) else {
            return Ok(());
        };
        debug!("Command: {command:?}");

        match command {
            Command::Play(search) => self.send(Request::Play { search })?,
            Command::Pause => self.send(Request::Pause)?,
            Command::Stop => self.send(Request::Stop)?,
            Command::List(None) => self.ui_app.view = View::Channels,
            Command::List(Some(key)) => match self.ui_app.network_index_by_key(&key) {
                Some(index) => self.ui_app.select_network(index),
                None => self
                    .ui_app
                    .push_notice(Notice::warning(format!("Unknown network `{key}`"))),
            },
            Command::Help => self.ui_app.view = View::Help,
            Command::Quit => self.ui_app.quit(),
            Command::Unknown(_) => self.ui_app.push_notice(Notice::danger(UNKNOWN_COMMAND)),
        }
        Ok(())
    }

    fn play_selected(&mut self) -> Result<()> {
        let Some(network_id) = self.ui_app.current_tab().map(|t| t.id) else {
            return Ok(());
        };
        let Some(channel_id) = self.ui_app.selected_channel().map(|c| c.id) else {
            return Ok(());
        };

        self.send(Request::PlayChannel {
            network_id,
            channel_id,
        })
    }

    fn send(&self, request: Request) -> Result<()> {
        self.req_tx
            .send(request)
            .map_err(|_| anyhow!("Player task is gone"))
    }

    pub fn process_response(&mut self, resp: Response) {
        match resp {
            Response::Notice(notice) => self.ui_app.push_notice(notice),
            Response::Tuned {
                network_id,
                channel_id,
            } => {
                self.ui_app.tuned = Some((network_id, channel_id));
                self.ui_app.reveal_channel(network_id, channel_id);
            }
        }
    }

    /// Pulls the latest player status and drops expired notices.
    pub fn tick(&mut self) {
        self.ui_app.status = self.status_rx.borrow().clone();
        self.ui_app.prune_notices(Instant::now());
    }

    pub fn should_quit(&self) -> bool {
        self.ui_app.should_quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Severity;
    use crate::api::Channel;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn channel(id: u64, name: &str, network_id: u64) -> Channel {
        serde_json::from_value(json!({ "id": id, "name": name, "network_id": network_id })).unwrap()
    }

    fn tabs() -> Vec<NetworkTab> {
        vec![
            NetworkTab {
                id: 1,
                key: "di".to_string(),
                name: "DI.FM".to_string(),
                channels: vec![channel(5, "Vocal Trance", 1), channel(7, "Lo-Fi", 1)],
            },
            NetworkTab {
                id: 2,
                key: "rockradio".to_string(),
                name: "ROCKRADIO.COM".to_string(),
                channels: vec![channel(90, "Classic Rock", 2)],
            },
        ]
    }

    fn controller(
        browse: &str,
    ) -> (AppController, UnboundedReceiver<Request>, watch::Sender<StatusView>) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusView::default());
        (AppController::new(tabs(), browse, req_tx, status_rx), req_rx, status_tx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_line(app: &mut AppController, line: &str) {
        for c in line.chars() {
            app.handle_key_event(key(KeyCode::Char(c))).unwrap();
        }
        app.handle_key_event(key(KeyCode::Enter)).unwrap();
    }

    #[test]
    fn test_starts_on_browse_network() {
        let (app, _rx, _status) = controller("ROCKRADIO");
        assert_eq!(app.ui_app.current_tab().unwrap().id, 2);

        let (app, _rx, _status) = controller("nope");
        assert_eq!(app.ui_app.current_tab().unwrap().id, 1);
    }

    #[test]
    fn test_play_command_is_forwarded() {
        let (mut app, mut rx, _status) = controller("di");
        type_line(&mut app, "play lo fi");

        assert_eq!(
            rx.try_recv().unwrap(),
            Request::Play {
                search: Some("lo fi".to_string())
            }
        );
        assert!(app.ui_app.input.is_empty());
    }

    #[test]
    fn test_space_toggles_only_on_empty_input() {
        let (mut app, mut rx, _status) = controller("di");
        app.handle_key_event(key(KeyCode::Char(' '))).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Request::Toggle);

        type_line(&mut app, "p 2");
        assert_eq!(
            rx.try_recv().unwrap(),
            Request::Play {
                search: Some("2".to_string())
            }
        );
    }

    #[test]
    fn test_enter_plays_selected_channel() {
        let (mut app, mut rx, _status) = controller("di");
        app.handle_key_event(key(KeyCode::Down)).unwrap();
        app.handle_key_event(key(KeyCode::Enter)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Request::PlayChannel {
                network_id: 1,
                channel_id: 7
            }
        );
    }

    #[test]
    fn test_unknown_command_shows_notice() {
        let (mut app, mut rx, _status) = controller("di");
        type_line(&mut app, "dance");

        let notice = app.ui_app.latest_notice().unwrap();
        assert_eq!(notice.severity, Severity::Danger);
        assert_eq!(notice.text, UNKNOWN_COMMAND);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_list_switches_network() {
        let (mut app, _rx, _status) = controller("di");
        type_line(&mut app, "list rockradio");
        assert_eq!(app.ui_app.current_tab().unwrap().id, 2);

        type_line(&mut app, "l jazz");
        assert_eq!(app.ui_app.latest_notice().unwrap().severity, Severity::Warning);
        assert_eq!(app.ui_app.current_tab().unwrap().id, 2);
    }

    #[test]
    fn test_help_and_escape() {
        let (mut app, _rx, _status) = controller("di");
        type_line(&mut app, "?");
        assert_eq!(app.ui_app.view, View::Help);

        app.handle_key_event(key(KeyCode::Char('x'))).unwrap();
        assert!(!app.handle_key_event(key(KeyCode::Esc)).unwrap());
        assert!(app.ui_app.input.is_empty());

        assert!(!app.handle_key_event(key(KeyCode::Esc)).unwrap());
        assert_eq!(app.ui_app.view, View::Channels);

        assert!(app.handle_key_event(key(KeyCode::Esc)).unwrap());
    }

    #[test]
    fn test_ctrl_c_quits() {
        let (mut app, _rx, _status) = controller("di");
        let quit = app
            .handle_key_event(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .unwrap();
        assert!(quit);
        assert!(app.should_quit());
    }

    #[test]
    fn test_tuned_response_reveals_channel() {
        let (mut app, _rx, _status) = controller("di");
        app.process_response(Response::Tuned {
            network_id: 2,
            channel_id: 90,
        });

        assert_eq!(app.ui_app.tuned, Some((2, 90)));
        assert_eq!(app.ui_app.current_tab().unwrap().id, 2);
        assert_eq!(app.ui_app.selected_channel().unwrap().name, "Classic Rock");
    }

    #[test]
    fn test_tick_copies_player_status() {
        let (mut app, _rx, status) = controller("di");
        status.send_modify(|view| view.channel_name = Some("Lo-Fi".to_string()));

        app.tick();
        assert_eq!(app.ui_app.status.channel_name.as_deref(), Some("Lo-Fi"));
    }

    #[test]
    fn test_send_fails_when_player_is_gone() {
        let (mut app, rx, _status) = controller("di");
        drop(rx);
        assert!(app.handle_key_event(key(KeyCode::Char(' '))).is_err());
    }
}
