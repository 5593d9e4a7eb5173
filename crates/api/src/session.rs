//! Drive session
//!
//! The game consumer of the control signal. A tokio task polls the tracker at
//! `tick_hz` and advances speed, lateral car position and score.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use head_tracker::{Action, ControlState, Direction};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

const MAX_SPEED: u32 = 100;
const ACCELERATION: u32 = 2;
const DECELERATION: u32 = 1;
/// Fraction of the remaining distance to the lane target covered per tick
const STEERING_EASE: f32 = 0.05;
const START_X: f32 = 50.0;

/// Game state visible to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionState {
    pub speed: u32,
    pub score: u64,
    /// Car position across the road, 0 (left edge) to 100 (right edge)
    pub car_x: f32,
    pub game_active: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            speed: 0,
            score: 0,
            car_x: START_X,
            game_active: false,
        }
    }
}

impl SessionState {
    /// Advance the game by one tick
    pub fn step(&mut self, control: &ControlState) {
        if !self.game_active {
            return;
        }

        self.speed = match control.action {
            Action::Accelerate => (self.speed + ACCELERATION).min(MAX_SPEED),
            Action::Stop => self.speed.saturating_sub(DECELERATION),
        };

        let target = match control.direction {
            Direction::Left => 15.0,
            Direction::Center => 50.0,
            Direction::Right => 85.0,
        };
        self.car_x += (target - self.car_x) * STEERING_EASE;

        self.score += u64::from(self.speed / 20);
    }
}

/// Shared drive session with its ticking task
#[derive(Debug)]
pub struct DriveSession {
    state: Arc<Mutex<SessionState>>,
    task: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DriveSession {
    pub fn new(tick_hz: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            task: Mutex::new(None),
            tick: Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1))),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Reset the game and start ticking against `control`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, control: F)
    where
        F: Fn() -> ControlState + Send + 'static,
    {
        let mut task = lock(&self.task);
        if let Some(previous) = task.take() {
            previous.abort();
        }

        *lock(&self.state) = SessionState {
            game_active: true,
            ..SessionState::default()
        };

        let state = Arc::clone(&self.state);
        let period = self.tick;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let control = control();
                let mut state = lock(&state);
                if !state.game_active {
                    break;
                }
                state.step(&control);
            }
            debug!("Drive session task finished");
        }));
        info!("Drive session started");
    }

    /// End the game, keeping the final speed and score visible
    pub fn stop(&self) {
        lock(&self.state).game_active = false;
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            info!("Drive session stopped");
        }
    }
}
