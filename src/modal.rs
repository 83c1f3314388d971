use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{Alias, Collection, DeveloperApp, OAuthApp, Score};

pub type CloseCallback<R> = Box<dyn FnOnce(Option<R>) + Send>;

pub struct OpenOptions<T, R> {
    pub subject: Option<T>,
    pub on_close: Option<CloseCallback<R>>,
}

impl<T, R> OpenOptions<T, R> {
    pub fn edit(subject: T) -> Self {
        Self {
            subject: Some(subject),
            on_close: None,
        }
    }

    pub fn create() -> Self {
        Self {
            subject: None,
            on_close: None,
        }
    }

    pub fn on_close(mut self, callback: impl FnOnce(Option<R>) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(callback));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalOutcome<R> {
    Closed(Option<R>),
    Dismissed,
}

pub struct ModalTicket<R> {
    rx: Receiver<ModalOutcome<R>>,
    resolved: bool,
}

impl<R> ModalTicket<R> {
    pub fn try_outcome(&mut self) -> Option<ModalOutcome<R>> {
        if self.resolved {
            return None;
        }
        let outcome = match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => ModalOutcome::Dismissed,
        };
        self.resolved = true;
        Some(outcome)
    }

    pub fn wait(self, timeout: Duration) -> Option<ModalOutcome<R>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(ModalOutcome::Dismissed),
        }
    }
}

struct ModalState<T, R> {
    opened: bool,
    subject: Option<T>,
    on_close: Option<CloseCallback<R>>,
    ticket: Option<SyncSender<ModalOutcome<R>>>,
    cycle: u64,
}

pub struct ModalStore<T, R> {
    state: Mutex<ModalState<T, R>>,
}

impl<T, R> Default for ModalStore<T, R> {
    fn default() -> Self {
        Self {
            state: Mutex::new(ModalState {
                opened: false,
                subject: None,
                on_close: None,
                ticket: None,
                cycle: 0,
            }),
        }
    }
}

impl<T: Clone, R: Clone> ModalStore<T, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, options: OpenOptions<T, R>) -> ModalTicket<R> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut state = self.state.lock().expect("modal lock poisoned");
        if let Some(previous) = state.ticket.replace(tx) {
            let _ = previous.try_send(ModalOutcome::Dismissed);
        }
        state.opened = true;
        state.subject = options.subject;
        state.on_close = options.on_close;
        state.cycle += 1;
        ModalTicket { rx, resolved: false }
    }

    /// Runs the stored callback with `result`, then marks the modal closed.
    /// The callback still observes the modal as open. Closing twice runs
    /// nothing the second time.
    pub fn close(&self, result: Option<R>) {
        let (callback, ticket, cycle) = {
            let mut state = self.state.lock().expect("modal lock poisoned");
            (state.on_close.take(), state.ticket.take(), state.cycle)
        };

        if let Some(callback) = callback {
            callback(result.clone());
        }
        if let Some(ticket) = ticket {
            let _ = ticket.try_send(ModalOutcome::Closed(result));
        }

        let mut state = self.state.lock().expect("modal lock poisoned");
        if state.cycle == cycle {
            state.opened = false;
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().expect("modal lock poisoned").opened
    }

    pub fn subject(&self) -> Option<T> {
        self.state
            .lock()
            .expect("modal lock poisoned")
            .subject
            .clone()
    }
}

pub type AliasModal = ModalStore<Alias, Alias>;
pub type ScoreModal = ModalStore<Score, Score>;
pub type CollectionModal = ModalStore<Collection, ()>;
pub type DeveloperAppModal = ModalStore<DeveloperApp, DeveloperApp>;
pub type OAuthAppModal = ModalStore<OAuthApp, OAuthApp>;
