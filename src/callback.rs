//! The per-Task processing callback supplied by the embedding program
//! (spec §6, §9 "duck-typed callback" re-architected as an explicit
//! trait). Returning `Ok(())` settles the Task as DONE; `Err(message)`
//! settles it as FAILED with `message` recorded in the DLQ row.

pub trait Callback: Send + Sync {
    fn call(&self, url: &str) -> Result<(), String>;
}

/// Reference implementation shipped by the binary (spec §10.6): no real
/// downstream processing pipeline is specified, so it just logs receipt
/// and succeeds. An embedding program is expected to supply its own.
pub struct LoggingCallback;

impl Callback for LoggingCallback {
    fn call(&self, url: &str) -> Result<(), String> {
        tracing::info!(url, "callback received video url (reference no-op)");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub struct StubCallback {
    result: Result<(), String>,
}

#[cfg(any(test, feature = "test-util"))]
impl StubCallback {
    pub fn ok() -> Self {
        StubCallback { result: Ok(()) }
    }

    pub fn err(message: impl Into<String>) -> Self {
        StubCallback {
            result: Err(message.into()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Callback for StubCallback {
    fn call(&self, _url: &str) -> Result<(), String> {
        self.result.clone()
    }
}
