use nix::errno::Errno;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataportError {
    #[error("region of {size} bytes is too small, at least {required} bytes are required")]
    RegionTooSmall { size: usize, required: usize },

    #[error("region base address {0:#x} is not aligned for the ring header")]
    Misaligned(usize),

    #[error("shared memory setup failed: {0}")]
    Memory(String),

    #[error("commit of {requested} bytes exceeds the contiguous free window of {available} bytes")]
    CommitOverrun { requested: usize, available: usize },

    #[error("consume of {requested} bytes exceeds the {available} readable bytes")]
    ConsumeOverrun { requested: usize, available: usize },

    #[error("overflow flag is not stored in the shared region")]
    OverflowNotShared,

    #[error("no notification attached to this endpoint")]
    NoNotification,

    #[error("eventfd creation failed: {0}")]
    EventfdCreation(Errno),

    #[error("eventfd write failed: {0}")]
    EventfdWrite(Errno),

    #[error("eventfd read failed: {0}")]
    EventfdRead(Errno),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<eyre::Report> for DataportError {
    fn from(report: eyre::Report) -> Self {
        match report.downcast::<DataportError>() {
            Ok(err) => err,
            Err(report) => DataportError::Memory(format!("{report:#}")),
        }
    }
}
