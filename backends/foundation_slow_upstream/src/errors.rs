use derive_more::From;

// -- Errors

/// Errors that stop the service itself: binding, listener set-up and accepting.
#[derive(Debug)]
pub enum ServiceError {
    BindFailed(std::io::Error),
    ListenerSetup(std::io::Error),
    AcceptFailed(std::io::Error),
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BindFailed(err) | Self::ListenerSetup(err) | Self::AcceptFailed(err) => {
                Some(err)
            }
        }
    }
}

impl core::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors confined to a single connection's handler.
#[derive(Debug, From)]
pub enum ConnectionError {
    Io(std::io::Error),

    /// The peer went away while headers were still being read.
    #[from(ignore)]
    ConnectionClosed,

    /// Request line without method, path and protocol.
    #[from(ignore)]
    MalformedRequestLine(String),

    Encoding(serde_json::Error),
}

impl std::error::Error for ConnectionError {}

impl core::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;
