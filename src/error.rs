use thiserror::Error;

/// Failure of a single asset transfer.
///
/// Cloneable so that progress sinks can keep a copy of the terminal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("stream ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },
    #[error("stream delivered {received} bytes but announced {expected}")]
    Overrun { expected: u64, received: u64 },
    #[error("transfer cancelled")]
    Cancelled,
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("transfer is {0}, expected idle")]
    InvalidState(&'static str),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}

/// Finalization of a blob that never received a complete stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("no stream was started for this blob")]
    NotStarted,
    #[error("stream has not reached its end")]
    Incomplete,
}

/// Scene import/export failures.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("malformed scene JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scene IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage provider (vault) failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}")]
    Http { status: u16 },
    #[error("provider unreachable: {0}")]
    Network(String),
    #[error("unexpected provider response: {0}")]
    Decode(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failure to bring an asset from the provider into the scene.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Failure to open the scene a player was pointed at.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("failed to fetch scene: {0}")]
    Transfer(#[from] TransferError),
    #[error("scene is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Why a single object of a played scene could not be loaded.
#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("invalid model: {0:#}")]
    InvalidModel(anyhow::Error),
}

/// Failures while pinning a scene for publication.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("pinning service returned HTTP {status}")]
    Http { status: u16 },
    #[error("pinning service unreachable: {0}")]
    Network(String),
    #[error("pinning response did not contain an IPFS hash")]
    MissingHash,
    #[error("missing credentials: pinata jwt")]
    MissingCredentials,
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
            },
            None => Self::Network(err.to_string()),
        }
    }
}
