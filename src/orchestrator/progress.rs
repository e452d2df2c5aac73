//! Progress reporting at phase boundaries
//!
//! Embedders that don't want the full event stream can observe a session
//! through this trait instead. All methods are no-ops by default via
//! `NoOpProgress`.

/// Hooks invoked at session lifecycle points
pub trait ProgressReporter: Send + Sync {
    /// Payload analysis is starting
    fn report_analyzing(&self) {}

    /// Crawling has begun
    fn report_crawling(&self) {}

    /// A page finished processing
    fn report_page_done(&self, _url: &str) {}

    /// Asset fetching progress: completed of total
    fn report_fetching(&self, _completed: usize, _total: usize) {}

    /// Verification is running
    fn report_verifying(&self) {}

    /// Rewriting and packaging are running
    fn report_processing(&self) {}

    /// The session finished successfully
    fn report_completed(&self) {}

    /// The session failed
    fn report_error(&self, _message: &str) {}
}

/// Reporter that does nothing; the default for headless embedding
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {}

/// Reporter that mirrors lifecycle points into the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report_analyzing(&self) {
        log::info!("phase: analyzing");
    }

    fn report_crawling(&self) {
        log::info!("phase: crawling");
    }

    fn report_page_done(&self, url: &str) {
        log::info!("page done: {url}");
    }

    fn report_fetching(&self, completed: usize, total: usize) {
        log::info!("fetched {completed}/{total} assets");
    }

    fn report_verifying(&self) {
        log::info!("phase: verifying");
    }

    fn report_processing(&self) {
        log::info!("phase: processing");
    }

    fn report_completed(&self) {
        log::info!("session completed");
    }

    fn report_error(&self, message: &str) {
        log::warn!("session error: {message}");
    }
}
