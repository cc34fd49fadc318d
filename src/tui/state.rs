use crate::model::StartForm;
use crate::panel::ControlPanel;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Focusable elements, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Keywords,
    Website,
    Cycles,
    Delay,
    Start,
    Stop,
}

impl Focus {
    const ORDER: [Focus; 6] = [
        Focus::Keywords,
        Focus::Website,
        Focus::Cycles,
        Focus::Delay,
        Focus::Start,
        Focus::Stop,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }
}

pub enum KeyOutcome {
    Continue,
    Quit,
}

pub struct UiState {
    pub panel: ControlPanel,
    pub form: StartForm,
    pub focus: Focus,
    pub show_help: bool,
    /// One-line feedback for local actions (clipboard, channel errors).
    pub info: String,
}

impl UiState {
    pub fn new(panel: ControlPanel, form: StartForm) -> Self {
        Self {
            panel,
            form,
            focus: Focus::Keywords,
            show_help: false,
            info: String::new(),
        }
    }

    pub fn field(&self, focus: Focus) -> Option<&str> {
        match focus {
            Focus::Keywords => Some(&self.form.keywords),
            Focus::Website => Some(&self.form.website),
            Focus::Cycles => Some(&self.form.cycles),
            Focus::Delay => Some(&self.form.delay),
            Focus::Start | Focus::Stop => None,
        }
    }

    fn field_mut(&mut self, focus: Focus) -> Option<&mut String> {
        match focus {
            Focus::Keywords => Some(&mut self.form.keywords),
            Focus::Website => Some(&mut self.form.website),
            Focus::Cycles => Some(&mut self.form.cycles),
            Focus::Delay => Some(&mut self.form.delay),
            Focus::Start | Focus::Stop => None,
        }
    }

    fn enabled(&self, focus: Focus) -> bool {
        let buttons = self.panel.buttons();
        match focus {
            Focus::Start => buttons.start_enabled,
            Focus::Stop => buttons.stop_enabled,
            _ => true,
        }
    }

    /// Move focus, skipping disabled buttons.
    pub fn cycle_focus(&mut self, forward: bool) {
        let n = Focus::ORDER.len();
        let mut i = self.focus.index();
        for _ in 0..n {
            i = if forward { (i + 1) % n } else { (i + n - 1) % n };
            if self.enabled(Focus::ORDER[i]) {
                self.focus = Focus::ORDER[i];
                return;
            }
        }
    }

    pub fn start(&mut self) {
        if !self.panel.buttons().start_enabled {
            return;
        }
        match self.panel.submit_start(&self.form) {
            Ok(()) => self.info = "Start requested".into(),
            // Already surfaced as a notice.
            Err(crate::error::PanelError::Validation(_)) => {}
            Err(e) => self.info = format!("Start failed: {e}"),
        }
    }

    pub fn stop(&mut self) {
        if !self.panel.buttons().stop_enabled {
            return;
        }
        match self.panel.submit_stop() {
            Ok(()) => self.info = "Stop requested".into(),
            Err(e) => self.info = format!("Stop failed: {e}"),
        }
    }

    /// Keep focus off a button that just became disabled.
    pub fn settle_focus(&mut self) {
        if !self.enabled(self.focus) {
            self.cycle_focus(true);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyOutcome::Quit;
        }

        // A notice blocks everything until dismissed.
        if self.panel.notice().is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                self.panel.dismiss_notice();
            }
            return KeyOutcome::Continue;
        }

        match key.code {
            KeyCode::F(1) => self.show_help = !self.show_help,
            KeyCode::Esc if self.show_help => self.show_help = false,
            KeyCode::F(2) => {
                self.info = match super::export::copy_to_clipboard(&self.panel.log().to_plain_text()) {
                    Ok(()) => format!("Copied {} status lines", self.panel.log().len()),
                    Err(e) => format!("Copy failed: {e:#}"),
                };
            }
            KeyCode::F(5) => self.start(),
            KeyCode::F(6) => self.stop(),
            KeyCode::Tab => self.cycle_focus(true),
            KeyCode::BackTab => self.cycle_focus(false),
            KeyCode::Enter => match self.focus {
                Focus::Start => self.start(),
                Focus::Stop => self.stop(),
                _ => self.cycle_focus(true),
            },
            KeyCode::Backspace => {
                if let Some(field) = self.field_mut(self.focus) {
                    field.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(field) = self.field_mut(self.focus) {
                    field.push(c);
                }
            }
            _ => {}
        }
        KeyOutcome::Continue
    }
}
