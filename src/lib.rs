pub mod algorithms;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod utils;
pub mod visualization;

pub use config::{AlignmentConfig, Config};
pub use error::{AlignmentError, ConfigurationError};
pub use pipeline::{
    AlignmentEngine, AlignmentMethod, AlignmentResult, AlignmentStatus, BatchProcessor, BatchReport,
    PreparedReference, ReferenceFormSpec,
};
pub use utils::*;

pub type Result<T> = anyhow::Result<T>;
