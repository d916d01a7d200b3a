//! Browser speech relayed through the UI host
//!
//! The daemon has no speech engine of its own. The web host that renders the
//! UI runs the browser recognizers on its behalf: start/stop requests go out
//! as [`RecognizerCommand`]s to subscribed IPC clients, and the host feeds
//! recognizer events back with [`RelaySpeechApi::deliver`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::backend::{
    BrowserEvent, BrowserRecognizer, BrowserSpeechApi, EventSink, RecognitionOptions, SpeechError,
};

/// What the host should do with a recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerAction {
    Start,
    Stop,
}

/// Instruction for the UI host to drive one of its recognizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerCommand {
    pub recognizer: u64,
    pub action: RecognizerAction,
    pub options: RecognitionOptions,
}

struct RelayEntry {
    events: EventSink<BrowserEvent>,
    options: RecognitionOptions,
    wants_listening: bool,
}

#[derive(Default)]
struct RelayState {
    next_id: u64,
    recognizers: HashMap<u64, RelayEntry>,
}

type SharedState = Arc<Mutex<RelayState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RelayState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`BrowserSpeechApi`] whose recognizers run in the connected UI host
pub struct RelaySpeechApi {
    state: SharedState,
    command_tx: broadcast::Sender<RecognizerCommand>,
}

impl RelaySpeechApi {
    pub fn new() -> Self {
        let (command_tx, _) = broadcast::channel(32);
        Self {
            state: SharedState::default(),
            command_tx,
        }
    }

    /// Receive commands as recognizers are started and stopped
    pub fn subscribe(&self) -> broadcast::Receiver<RecognizerCommand> {
        self.command_tx.subscribe()
    }

    /// Start commands for every recognizer that currently wants to listen
    ///
    /// Sent to hosts that subscribe after the start was requested.
    pub fn pending_starts(&self) -> Vec<RecognizerCommand> {
        let state = lock(&self.state);
        let mut commands: Vec<_> = state
            .recognizers
            .iter()
            .filter(|(_, entry)| entry.wants_listening)
            .map(|(&recognizer, entry)| RecognizerCommand {
                recognizer,
                action: RecognizerAction::Start,
                options: entry.options.clone(),
            })
            .collect();
        commands.sort_by_key(|command| command.recognizer);
        commands
    }

    /// Feed an event from the host into a recognizer
    ///
    /// Returns `false` if the recognizer is unknown or gone.
    pub fn deliver(&self, recognizer: u64, event: BrowserEvent) -> bool {
        let mut state = lock(&self.state);
        let Some(entry) = state.recognizers.get_mut(&recognizer) else {
            warn!(recognizer, "event for unknown recognizer");
            return false;
        };
        if event == BrowserEvent::End {
            entry.wants_listening = false;
        }
        entry.events.send(event).is_ok()
    }

    pub fn recognizer_count(&self) -> usize {
        lock(&self.state).recognizers.len()
    }
}

impl Default for RelaySpeechApi {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSpeechApi for RelaySpeechApi {
    fn create_recognizer(
        &self,
        options: &RecognitionOptions,
        events: EventSink<BrowserEvent>,
    ) -> Result<Arc<dyn BrowserRecognizer>, SpeechError> {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.recognizers.insert(
            id,
            RelayEntry {
                events,
                options: options.clone(),
                wants_listening: false,
            },
        );
        debug!(recognizer = id, "relay recognizer created");

        Ok(Arc::new(RelayRecognizer {
            id,
            state: Arc::clone(&self.state),
            command_tx: self.command_tx.clone(),
        }))
    }
}

struct RelayRecognizer {
    id: u64,
    state: SharedState,
    command_tx: broadcast::Sender<RecognizerCommand>,
}

impl RelayRecognizer {
    fn dispatch(&self, action: RecognizerAction) -> Result<(), SpeechError> {
        let options = {
            let mut state = lock(&self.state);
            let entry = state
                .recognizers
                .get_mut(&self.id)
                .ok_or_else(|| SpeechError::Backend("recognizer released".into()))?;
            entry.wants_listening = action == RecognizerAction::Start;
            entry.options.clone()
        };

        let command = RecognizerCommand {
            recognizer: self.id,
            action,
            options,
        };
        if self.command_tx.send(command).is_err() {
            debug!(recognizer = self.id, ?action, "no speech host connected, command deferred");
        }
        Ok(())
    }
}

impl BrowserRecognizer for RelayRecognizer {
    fn start(&self) -> Result<(), SpeechError> {
        self.dispatch(RecognizerAction::Start)
    }

    fn stop(&self) -> Result<(), SpeechError> {
        self.dispatch(RecognizerAction::Stop)
    }
}

impl Drop for RelayRecognizer {
    fn drop(&mut self) {
        lock(&self.state).recognizers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_start_and_stop_emit_commands() {
        let relay = RelaySpeechApi::new();
        let mut commands = relay.subscribe();
        let (tx, _rx) = mpsc::unbounded_channel();
        let recognizer = relay
            .create_recognizer(&RecognitionOptions::default(), tx)
            .unwrap();

        recognizer.start().unwrap();
        recognizer.stop().unwrap();

        let start = commands.try_recv().unwrap();
        assert_eq!(start.recognizer, 0);
        assert_eq!(start.action, RecognizerAction::Start);
        assert_eq!(commands.try_recv().unwrap().action, RecognizerAction::Stop);
    }

    #[test]
    fn test_start_without_host_is_deferred() {
        let relay = RelaySpeechApi::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let recognizer = relay
            .create_recognizer(&RecognitionOptions::default(), tx)
            .unwrap();

        recognizer.start().unwrap();

        let pending = relay.pending_starts();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, RecognizerAction::Start);
    }

    #[test]
    fn test_deliver_routes_events() {
        let relay = RelaySpeechApi::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = relay
            .create_recognizer(&RecognitionOptions::default(), tx)
            .unwrap();
        recognizer.start().unwrap();

        assert!(relay.deliver(0, BrowserEvent::End));
        assert_eq!(rx.try_recv().unwrap(), BrowserEvent::End);
        assert!(relay.pending_starts().is_empty());
        assert!(!relay.deliver(7, BrowserEvent::Start));
    }

    #[test]
    fn test_dropped_recognizer_is_released() {
        let relay = RelaySpeechApi::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let recognizer = relay
            .create_recognizer(&RecognitionOptions::default(), tx)
            .unwrap();
        assert_eq!(relay.recognizer_count(), 1);

        drop(recognizer);
        assert_eq!(relay.recognizer_count(), 0);
    }
}
