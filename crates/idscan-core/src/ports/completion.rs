//! Execution context on which scan results are delivered.

/// A unit of work handed to a [`CompletionContext`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where completions run, chosen by the caller (for example the UI thread's
/// event loop or a dedicated serial queue).
pub trait CompletionContext: Send + Sync {
    /// Schedules `job` to run on this context.
    fn execute(&self, job: Job);
}
