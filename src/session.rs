use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{MediaError, MediaResult, UploadedFile};

/// Unique identifier for an upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("ses_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal emitted by an in-progress upload session.
///
/// Ordering guarantee: zero or more `Progress`, then exactly one of
/// `Complete` / `Error`. Progress percentages never decrease.
#[derive(Debug)]
pub enum UploadEvent {
    /// Whole-session percentage, 0..=100
    Progress(u8),
    /// Terminal failure; remaining parts were not transferred
    Error(MediaError),
    /// Terminal success with one descriptor per transferred part
    Complete(Vec<UploadedFile>),
}

/// Caller-facing handle on one multi-part transfer.
///
/// Consume events with [`next_event`](Self::next_event), or use
/// [`wait`](Self::wait) to drain to the terminal outcome.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    total_parts: usize,
    total_bytes: u64,
    events: mpsc::UnboundedReceiver<UploadEvent>,
}

impl UploadSession {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn total_parts(&self) -> usize {
        self.total_parts
    }

    /// Sum of all part content lengths, fixed before the first part is sent
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Receive the next signal; `None` once the terminal signal was consumed
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Drain events until the terminal signal and return the file list
    pub async fn wait(mut self) -> MediaResult<Vec<UploadedFile>> {
        while let Some(event) = self.events.recv().await {
            match event {
                UploadEvent::Progress(_) => continue,
                UploadEvent::Complete(files) => return Ok(files),
                UploadEvent::Error(err) => return Err(err),
            }
        }
        Err(MediaError::transport(
            self.id.as_str(),
            "session ended without a terminal event",
        ))
    }
}

struct TrackerState {
    done: usize,
    loaded: u64,
    last_pct: u8,
    /// One slot per part, filled at the part's batch index so the terminal
    /// `Complete` list keeps batch order regardless of completion order
    files: Vec<Option<UploadedFile>>,
    terminal: bool,
}

/// Single-writer state machine behind an [`UploadSession`].
///
/// The transfer driver is the only writer; observers see the typed event
/// stream. Terminal states are sticky: after `fail` or the final
/// `part_done`, every further call is ignored.
pub(crate) struct SessionTracker {
    id: SessionId,
    total_parts: usize,
    total_bytes: u64,
    events: mpsc::UnboundedSender<UploadEvent>,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    /// Create the tracker plus the session handle sharing its event channel
    pub(crate) fn channel(total_parts: usize, total_bytes: u64) -> (Arc<Self>, UploadSession) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        let tracker = Arc::new(Self {
            id: id.clone(),
            total_parts,
            total_bytes,
            events: tx,
            state: Mutex::new(TrackerState {
                done: 0,
                loaded: 0,
                last_pct: 0,
                files: vec![None; total_parts],
                terminal: false,
            }),
        });
        let session = UploadSession {
            id,
            total_parts,
            total_bytes,
            events: rx,
        };
        (tracker, session)
    }

    pub(crate) fn id(&self) -> &SessionId {
        &self.id
    }

    /// Record cumulative bytes transferred across the whole session and emit
    /// the floored percentage. Regressions are clamped so observers only ever
    /// see non-decreasing values.
    pub(crate) fn set_loaded(&self, loaded: u64) {
        let mut state = self.state.lock();
        if state.terminal {
            return;
        }
        state.loaded = state.loaded.max(loaded);
        let pct = percentage(state.loaded, self.total_bytes);
        if pct < state.last_pct {
            return;
        }
        state.last_pct = pct;
        let _ = self.events.send(UploadEvent::Progress(pct));
    }

    /// Record one fully transferred part at its batch index. Emits `Complete`
    /// once every slot is filled, listing files in batch order even when
    /// parts finish out of order.
    pub(crate) fn part_done(&self, index: usize, file: UploadedFile) {
        let mut state = self.state.lock();
        if state.terminal || index >= self.total_parts {
            return;
        }
        if state.files[index].replace(file).is_none() {
            state.done += 1;
        }
        if state.done == self.total_parts {
            state.terminal = true;
            let files = state.files.drain(..).flatten().collect();
            let _ = self.events.send(UploadEvent::Complete(files));
        }
    }

    /// Terminal failure; no further signals are emitted for this session
    pub(crate) fn fail(&self, err: MediaError) {
        let mut state = self.state.lock();
        if state.terminal {
            return;
        }
        state.terminal = true;
        let _ = self.events.send(UploadEvent::Error(err));
    }
}

fn percentage(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((loaded.saturating_mul(100) / total).min(100)) as u8
}
