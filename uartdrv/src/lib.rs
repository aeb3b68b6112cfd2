use dataport::DataportError;
use thiserror::Error;

pub mod backup;
pub mod config;
pub mod context;
pub mod device;
pub mod drain;
pub mod notify;
pub mod outbound;
pub mod stats;
#[cfg(test)]
pub(crate) mod testing;

pub use backup::BackupQueue;
pub use config::{Config, DrainMode, DriverConfig, OverflowPolicy, WritePolicy};
pub use context::DriverContext;
pub use device::{Device, FdDevice};
pub use drain::{DrainEngine, DrainState};
pub use notify::Notify;
pub use outbound::OutboundWriter;
pub use stats::DrainStats;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("device I/O error: {0}")]
    DeviceIo(#[source] std::io::Error),
    #[error("device reported {returned} bytes for a transfer of at most {requested}")]
    ConsistencyViolation { returned: usize, requested: usize },
    #[error("driver context is not initialized")]
    NotInitialized,
    #[error("write length {requested} exceeds outbound port size {capacity}")]
    WriteTooLong { requested: usize, capacity: usize },
    #[error("short write, could only write {written} of {requested} bytes")]
    ShortWrite { written: usize, requested: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("dataport error: {0}")]
    Dataport(#[from] DataportError),
}

pub type Result<T> = std::result::Result<T, DriverError>;
