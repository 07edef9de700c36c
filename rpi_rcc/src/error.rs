//! Control core errors.

use std::path::PathBuf;

use rpi_common::config::ConfigError;
use rpi_common::device::DeviceError;
use rpi_net::error::{CodecError, FragmentError, LinkError, NetError};
use thiserror::Error;

/// Errors raised while bringing up the control core or loading nets.
#[derive(Debug, Error)]
pub enum RccError {
    /// Configuration could not be loaded or is invalid.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Device table could not be built.
    #[error("device: {0}")]
    Device(#[from] DeviceError),

    /// A net file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Net file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A net file is not a valid net document.
    #[error("cannot parse {path}: {source}")]
    Codec {
        /// Net file.
        path: PathBuf,
        /// Underlying error.
        source: CodecError,
    },

    /// Boundary links of a net could not be resolved.
    #[error("net '{net}': {source}")]
    Fragment {
        /// Net id.
        net: String,
        /// Underlying error.
        source: FragmentError,
    },

    /// A net failed to link.
    #[error("net '{net}' failed to link: {source}")]
    Link {
        /// Net id.
        net: String,
        /// Underlying error.
        source: LinkError,
    },

    /// Scheduler rejected an operation.
    #[error(transparent)]
    Net(#[from] NetError),

    /// Real-time setup failed.
    #[error("RT setup failed: {0}")]
    RtSetup(String),
}
