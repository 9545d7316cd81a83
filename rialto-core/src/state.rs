//! The application state observed by clients.

/// Lifecycle state of the server's media pipeline, as seen by a client.
///
/// `Running` is the only state in which shared memory is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplicationState {
    #[default]
    Unknown,
    Inactive,
    Running,
}
