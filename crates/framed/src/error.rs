use std::io;

/// Errors that can occur while assembling a frame from a connection's byte
/// stream.
///
/// Any variant here is fatal only for the connection it came from; the
/// reactor tears that connection down and keeps serving the rest.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("declared frame length {len} exceeds configured maximum {max}")]
    TooLarge { len: u32, max: u32 },

    #[error("frame body is declared zero-length")]
    EmptyFrame,

    #[error("couldn't grow receive buffer to {0} bytes")]
    Alloc(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can prevent a [`crate::Server`] from starting or keep it from
/// shutting down cleanly.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("on_init rejected startup")]
    InitRejected,

    #[error("couldn't bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("couldn't create mio poll: {0}")]
    Poll(#[source] io::Error),

    #[error("couldn't install signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Maps a startup/runtime failure to a process exit code, the way
    /// `Server::start` surfaces errors to callers that just want an exit
    /// status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::InitRejected => 1,
            ServerError::Bind { .. } => 2,
            ServerError::Poll(_) => 3,
            ServerError::Signal(_) => 4,
            ServerError::Io(_) => 5,
        }
    }
}
