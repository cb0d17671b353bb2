/// Problems with the reference template itself.
///
/// These are setup defects: the template must be fixed before any captured
/// image is aligned against it again.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("reference template contains {found} alignment marks, expected {expected}")]
    MarkCountMismatch { found: usize, expected: usize },
    #[error("fiducial alignment requires a positive expected mark count")]
    MissingMarkCount,
    #[error("invalid reference template: {0}")]
    InvalidTemplate(String),
}

/// Errors surfaced by the alignment engine.
///
/// A document that cannot be aligned is not an error: it is reported as
/// `AlignmentStatus::Failed` inside the returned result.
#[derive(thiserror::Error, Debug)]
pub enum AlignmentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("invalid captured image: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl AlignmentError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AlignmentError::Configuration(_))
    }
}

impl From<opencv::Error> for AlignmentError {
    fn from(err: opencv::Error) -> Self {
        AlignmentError::Fault(err.into())
    }
}

impl From<image::ImageError> for AlignmentError {
    fn from(err: image::ImageError) -> Self {
        AlignmentError::Fault(err.into())
    }
}

impl From<std::io::Error> for AlignmentError {
    fn from(err: std::io::Error) -> Self {
        AlignmentError::Fault(err.into())
    }
}
