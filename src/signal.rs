//! Explicit cancellation token replacing module-level signal handlers
//! (spec §9). Three states: `Running` -> `ShuttingDown` (first SIGINT/
//! SIGTERM) -> `Terminated` (second signal, or the main loop finishing
//! its graceful wind-down).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const TERMINATED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationState {
    Running,
    ShuttingDown,
    Terminated,
}

pub struct CancellationToken {
    state: AtomicU8,
}

impl CancellationToken {
    pub fn new() -> Arc<Self> {
        Arc::new(CancellationToken {
            state: AtomicU8::new(RUNNING),
        })
    }

    pub fn state(&self) -> CancellationState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => CancellationState::Running,
            SHUTTING_DOWN => CancellationState::ShuttingDown,
            _ => CancellationState::Terminated,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == CancellationState::Running
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == CancellationState::Terminated
    }

    /// Called on each received signal: first call requests graceful
    /// shutdown, second call requests immediate termination.
    pub fn request_shutdown(&self) {
        match self.state.compare_exchange(
            RUNNING,
            SHUTTING_DOWN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(_) => self.state.store(TERMINATED, Ordering::SeqCst),
        }
    }

    pub fn mark_terminated(&self) {
        self.state.store(TERMINATED, Ordering::SeqCst);
    }

    /// Install SIGINT/SIGTERM handlers that drive this token. Mirrors
    /// `signal_hook::flag`'s boolean-flag idiom, generalized to the
    /// three-state token.
    pub fn install_handlers(self: &Arc<Self>) -> Result<(), std::io::Error> {
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            let token = Arc::clone(self);
            unsafe {
                signal_hook::low_level::register(sig, move || token.request_shutdown())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_requests_graceful_shutdown() {
        let token = CancellationToken::new();
        assert!(token.is_running());
        token.request_shutdown();
        assert_eq!(token.state(), CancellationState::ShuttingDown);
    }

    #[test]
    fn second_signal_forces_termination() {
        let token = CancellationToken::new();
        token.request_shutdown();
        token.request_shutdown();
        assert!(token.is_terminated());
    }
}
