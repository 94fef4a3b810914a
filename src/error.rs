//! Error taxonomy shared by the transport, the engine client and the record parser.

use thiserror::Error;

/// Errors raised while talking to a GTP engine or reading a saved game.
#[derive(Debug, Error)]
pub enum GtpError {
    /// The child process pipes are unusable, or the transport was torn down.
    #[error("transport closed")]
    TransportClosed,

    /// The command is absent from the capability set advertised by the engine.
    #[error("command '{0}' is not supported by the engine")]
    NotSupported(String),

    /// The engine answered with a `?` failure marker.
    #[error("engine rejected '{command}': {message}")]
    EngineError {
        /// Full command line that failed.
        command: String,
        /// Payload of the failure response.
        message: String,
    },

    /// The engine lacks commands required for its role.
    #[error("engine '{engine}' is missing required commands: {}", missing.join(", "))]
    IncompatibleEngine {
        /// Launch command or name of the engine.
        engine: String,
        /// Required commands not present in `list_commands`.
        missing: Vec<String>,
    },

    /// A saved game record could not be parsed or does not fit the run.
    #[error("invalid game record: {0}")]
    InvalidRecord(String),

    /// Text that is not a vertex.
    #[error("invalid vertex '{0}'")]
    InvalidVertex(String),

    /// Text that is not a color.
    #[error("invalid color '{0}'")]
    InvalidColor(String),

    /// The launch command could not be spawned.
    #[error("could not launch '{command}'")]
    Spawn {
        /// Command line that failed.
        command: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
