//! Playback controller for one level session.
//!
//! A [`LevelSession`] owns the timeline of a run: the trace returned by the
//! interpreter, the index of the next event to apply, the pause flag and the
//! playback speed. It drives the [`Visualiser`] one event at a time.
//!
//! ## States
//!
//! ```text
//! Idle --start--> Playing <--pause/resume--> Paused
//!                    |
//!                    +--(last event applied)--> Finished (paused at end)
//! ```
//!
//! ## Scheduling
//!
//! Playback is cooperative. The only suspension points are the interpreter
//! call and the wait between steps; each step delivers one event to every
//! module synchronously while holding the visualiser lock. Pausing is
//! observed at the next wait boundary.
//!
//! Calling [`LevelSession::start`] supersedes any earlier run at once: a
//! generation counter is bumped before the returned future is first polled,
//! and a loop from an older generation stops before delivering another event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, instrument, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::events::{state_at, StateMap, TraceEvent};
use crate::interpreter::Interpreter;
use crate::level::Level;
use crate::module::ModuleHandle;
use crate::visualiser::Visualiser;

/// Configuration for playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between steps in milliseconds (0 only yields)
    pub speed_ms: u64,
    /// How often a paused loop checks whether it was resumed, in milliseconds
    pub pause_poll_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed_ms: 200,
            pause_poll_ms: 100,
        }
    }
}

impl PlaybackConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay between steps.
    pub fn with_speed_ms(mut self, speed_ms: u64) -> Self {
        self.speed_ms = speed_ms;
        self
    }

    /// Set the pause polling interval.
    pub fn with_pause_poll_ms(mut self, pause_poll_ms: u64) -> Self {
        self.pause_poll_ms = pause_poll_ms;
        self
    }
}

/// Observable playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No trace loaded
    Idle,
    /// Advancing through the trace
    Playing,
    /// Held at the current index
    Paused,
    /// Every event applied
    Finished,
}

/// Snapshot of a session's timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// The full trace for the current run
    pub events: Arc<Vec<TraceEvent>>,
    /// Number of events applied to the visual state
    pub current_index: usize,
    pub is_paused: bool,
    pub speed_ms: u64,
}

#[derive(Debug)]
struct SessionState {
    events: Arc<Vec<TraceEvent>>,
    loaded: bool,
    current_index: usize,
    is_paused: bool,
    speed_ms: u64,
    code: String,
    generation: u64,
    /// Generation whose playback loop is currently running
    driver: Option<u64>,
}

struct Shared {
    id: Uuid,
    level: Arc<dyn Level>,
    visualiser: Arc<Mutex<Visualiser>>,
    interpreter: Arc<dyn Interpreter>,
    config: PlaybackConfig,
    state: Mutex<SessionState>,
}

impl Shared {
    // Lock order: visualiser before state.
    fn visualiser(&self) -> MutexGuard<'_, Visualiser> {
        self.visualiser.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a playback loop as running for one generation; cleared on drop.
struct DriverGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        if state.driver == Some(self.generation) {
            state.driver = None;
        }
    }
}

/// One learner session on one level.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct LevelSession {
    shared: Arc<Shared>,
}

impl LevelSession {
    /// Create a session. Call [`init`](Self::init) to load the level's modules.
    pub fn new(
        level: Arc<dyn Level>,
        visualiser: Arc<Mutex<Visualiser>>,
        interpreter: Arc<dyn Interpreter>,
        config: PlaybackConfig,
    ) -> Self {
        let state = SessionState {
            events: Arc::new(Vec::new()),
            loaded: false,
            current_index: 0,
            is_paused: true,
            speed_ms: config.speed_ms,
            code: String::new(),
            generation: 0,
            driver: None,
        };
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                level,
                visualiser,
                interpreter,
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The level this session plays.
    pub fn level(&self) -> &Arc<dyn Level> {
        &self.shared.level
    }

    /// The visualiser this session drives.
    pub fn visualiser(&self) -> &Arc<Mutex<Visualiser>> {
        &self.shared.visualiser
    }

    /// Load the level's modules, run the level hook and take its initial code.
    #[instrument(skip(self), fields(session = %self.shared.id))]
    pub fn init(&self) -> Result<Vec<ModuleHandle>> {
        let level = &self.shared.level;
        let mut visualiser = self.shared.visualiser();
        let modules = visualiser.init_level(level.as_ref())?;

        let mut state = self.shared.state();
        state.code = level.config().initial_code.clone();
        info!(level = %level.config().id, "Session initialised");
        Ok(modules)
    }

    /// Code that the next `start` will run.
    pub fn code(&self) -> String {
        self.shared.state().code.clone()
    }

    /// Replace the code that the next `start` will run.
    pub fn set_code(&self, code: impl Into<String>) {
        self.shared.state().code = code.into();
    }

    /// Run the current code and play its trace.
    ///
    /// The session is reset and any earlier run superseded when this is
    /// called; the returned future fetches the trace and drives playback until
    /// the end, or until another `start` supersedes it. If the interpreter
    /// fails, the session is left paused with no trace applied and the error
    /// is returned.
    pub fn start(&self) -> BoxFuture<'static, Result<()>> {
        let shared = Arc::clone(&self.shared);
        let (generation, code) = {
            let mut state = shared.state();
            state.generation += 1;
            state.events = Arc::new(Vec::new());
            state.loaded = false;
            state.current_index = 0;
            state.is_paused = false;
            state.driver = Some(state.generation);
            (state.generation, state.code.clone())
        };
        let guard = DriverGuard {
            shared: Arc::clone(&shared),
            generation,
        };
        let span = info_span!("session_run", session = %shared.id, generation);

        async move {
            let _guard = guard;
            let fetched = shared.interpreter.interpret_code(&code).await;

            {
                let mut visualiser = shared.visualiser();
                let mut state = shared.state();
                if state.generation != generation {
                    debug!("Run superseded while fetching trace");
                    return fetched.map(|_| ());
                }

                let events = match fetched {
                    Ok(events) => events,
                    Err(e) => {
                        error!(error = %e, "Interpreter call failed; session paused");
                        state.is_paused = true;
                        drop(state);
                        visualiser.reset();
                        return Err(e);
                    }
                };

                info!(events = events.len(), "Trace loaded");
                state.events = Arc::new(events);
                state.loaded = true;
                state.current_index = 0;
                drop(state);
                visualiser.reset();
            }

            drive(shared, generation).await;
            Ok(())
        }
        .instrument(span)
        .boxed()
    }

    /// Hold playback at the current index.
    pub fn pause(&self) {
        let mut state = self.shared.state();
        if !state.is_paused {
            debug!(index = state.current_index, "Playback paused");
        }
        state.is_paused = true;
    }

    /// Continue playback from where it was paused.
    ///
    /// If the loop of the current run is still alive it simply picks up again
    /// and the returned future completes immediately. If no loop is running
    /// (its future was dropped), the returned future drives playback to the
    /// end. Resuming an idle or finished session does nothing.
    pub fn resume(&self) -> BoxFuture<'static, ()> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.state();
        if !state.is_paused {
            return future::ready(()).boxed();
        }
        if state.driver.is_some() {
            state.is_paused = false;
            debug!(index = state.current_index, "Playback resumed");
            return future::ready(()).boxed();
        }
        if !state.loaded || state.current_index >= state.events.len() {
            return future::ready(()).boxed();
        }

        state.is_paused = false;
        let generation = state.generation;
        state.driver = Some(generation);
        debug!(index = state.current_index, "Playback resumed with a new loop");
        drop(state);

        let guard = DriverGuard {
            shared: Arc::clone(&shared),
            generation,
        };
        let span = info_span!("session_run", session = %shared.id, generation);
        async move {
            let _guard = guard;
            drive(shared, generation).await;
        }
        .instrument(span)
        .boxed()
    }

    /// Set the delay between steps. Applies from the next wait.
    pub fn set_speed(&self, speed_ms: u64) {
        self.shared.state().speed_ms = speed_ms;
    }

    /// Current playback state.
    pub fn state(&self) -> PlaybackState {
        let state = self.shared.state();
        if !state.loaded {
            PlaybackState::Idle
        } else if state.current_index >= state.events.len() {
            PlaybackState::Finished
        } else if state.is_paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    /// Whether a playback loop is running.
    pub fn is_running(&self) -> bool {
        self.shared.state().driver.is_some()
    }

    /// Snapshot of the timeline.
    pub fn timeline(&self) -> Timeline {
        let state = self.shared.state();
        Timeline {
            events: Arc::clone(&state.events),
            current_index: state.current_index,
            is_paused: state.is_paused,
            speed_ms: state.speed_ms,
        }
    }

    /// Value of every location after the events applied so far.
    pub fn current_state(&self) -> StateMap {
        let timeline = self.timeline();
        state_at(&timeline.events, timeline.current_index)
    }
}

impl std::fmt::Debug for LevelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelSession")
            .field("id", &self.shared.id)
            .field("level", &self.shared.level.config().id)
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish()
    }
}

enum Step {
    Stop,
    Wait(Duration),
}

/// Playback loop for one generation.
async fn drive(shared: Arc<Shared>, generation: u64) {
    let poll = Duration::from_millis(shared.config.pause_poll_ms);
    loop {
        match step(&shared, generation, poll) {
            Step::Stop => return,
            Step::Wait(wait) if wait.is_zero() => tokio::task::yield_now().await,
            Step::Wait(wait) => tokio::time::sleep(wait).await,
        }
    }
}

/// Apply at most one event and decide how long to wait.
fn step(shared: &Shared, generation: u64, poll: Duration) -> Step {
    let visualiser = shared.visualiser();
    let mut state = shared.state();

    if state.generation != generation {
        debug!("Run superseded; stopping playback");
        return Step::Stop;
    }
    if state.current_index >= state.events.len() {
        state.is_paused = true;
        info!(events = state.events.len(), "Playback finished");
        return Step::Stop;
    }
    if state.is_paused {
        return Step::Wait(poll);
    }

    let index = state.current_index;
    let events = Arc::clone(&state.events);
    // Release the state so bus listeners may pause or inspect the session.
    drop(state);

    visualiser.handle_event(&events[index], &events[..=index]);

    let mut state = shared.state();
    if state.generation == generation {
        state.current_index = index + 1;
    }
    Step::Wait(Duration::from_millis(state.speed_ms))
}
