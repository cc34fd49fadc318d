//! The control panel component.
//!
//! Turns user intent into outbound messages and inbound messages into panel
//! state. Run state changes only when the server acknowledges; requests never
//! flip it optimistically.

use super::state::{
    ButtonStates, ConnectionStatus, CycleProgress, LogLevel, Notice, RunState, StatusLog,
    CONNECTED_LINE,
};
use crate::channel::ChannelEvent;
use crate::error::{PanelError, Result};
use crate::model::{InboundMessage, OutboundMessage, StartForm, StartRequest};
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub struct ControlPanel {
    outbound: Option<UnboundedSender<OutboundMessage>>,
    run_state: RunState,
    buttons: ButtonStates,
    progress: CycleProgress,
    log: StatusLog,
    notices: VecDeque<Notice>,
    connection: ConnectionStatus,
}

impl ControlPanel {
    pub fn new(outbound: UnboundedSender<OutboundMessage>) -> Self {
        Self {
            outbound: Some(outbound),
            run_state: RunState::Idle,
            buttons: ButtonStates::for_state(RunState::Idle),
            progress: CycleProgress::default(),
            log: StatusLog::default(),
            notices: VecDeque::new(),
            connection: ConnectionStatus::Connecting,
        }
    }

    /// Validate the form and emit `start_cycles`. A blank keywords or website
    /// field raises one notice and sends nothing.
    pub fn submit_start(&mut self, form: &StartForm) -> Result<()> {
        let req = match StartRequest::from_form(form) {
            Ok(req) => req,
            Err(e) => {
                debug!("start rejected locally: {e}");
                self.raise_notice(e.to_string());
                return Err(e);
            }
        };
        info!(
            "requesting start: website={} cycles={:?} delay={:?}",
            req.website, req.cycles, req.delay
        );
        self.emit(OutboundMessage::StartCycles(req))
    }

    pub fn submit_stop(&mut self) -> Result<()> {
        info!("requesting stop");
        self.emit(OutboundMessage::StopCycles)
    }

    fn emit(&self, msg: OutboundMessage) -> Result<()> {
        let tx = self.outbound.as_ref().ok_or(PanelError::Disposed)?;
        tx.send(msg)
            .map_err(|_| PanelError::Transport("channel is closed".into()))
    }

    pub fn handle_channel_event(&mut self, ev: ChannelEvent) {
        if self.is_disposed() {
            return;
        }
        match ev {
            ChannelEvent::Inbound(msg) => self.apply(msg),
            ChannelEvent::Disconnected(reason) => {
                self.log
                    .push(format!("Disconnected from server: {reason}"), LogLevel::Error);
                self.connection = ConnectionStatus::Disconnected(reason);
            }
        }
    }

    pub fn apply(&mut self, msg: InboundMessage) {
        match msg {
            InboundMessage::Connected => {
                self.connection = ConnectionStatus::Connected;
                self.log.push(CONNECTED_LINE, LogLevel::Info);
            }
            InboundMessage::StatusUpdate(update) => {
                self.progress = CycleProgress {
                    current: update.cycle,
                    total: update.total_cycles,
                };
                self.log.push(update.message, LogLevel::Info);
            }
            InboundMessage::StartSuccess(ack) => {
                self.set_run_state(RunState::Running);
                self.log.push(ack.message, LogLevel::Info);
            }
            InboundMessage::StopSuccess(ack) => {
                self.set_run_state(RunState::Idle);
                self.log.push(ack.message, LogLevel::Info);
            }
            InboundMessage::Error(err) => {
                // Run state is left alone: only a stop acknowledgement ends a run.
                warn!("{}", PanelError::Server(err.message.clone()));
                self.log
                    .push(format!("ERROR: {}", err.message), LogLevel::Error);
                self.raise_notice(err.message);
            }
        }
    }

    fn set_run_state(&mut self, state: RunState) {
        if self.run_state != state {
            info!("run state {:?} -> {:?}", self.run_state, state);
        }
        self.run_state = state;
        self.buttons = ButtonStates::for_state(state);
    }

    fn raise_notice(&mut self, message: String) {
        self.notices.push_back(Notice { message });
    }

    /// Close the outbound side and stop reacting to channel events.
    pub fn dispose(&mut self) {
        if self.outbound.take().is_some() {
            info!("control panel disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.outbound.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn buttons(&self) -> ButtonStates {
        self.buttons
    }

    pub fn progress(&self) -> CycleProgress {
        self.progress
    }

    pub fn log(&self) -> &StatusLog {
        &self.log
    }

    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// The notice currently blocking input, if any.
    pub fn notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }
}

impl Drop for ControlPanel {
    fn drop(&mut self) {
        self.dispose();
    }
}
