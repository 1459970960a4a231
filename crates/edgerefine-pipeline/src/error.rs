use crate::render::RenderError;
use crate::ModelId;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that abort the refinement of a model.
///
/// Insufficient data (no visible frame, no correspondence) is not an error;
/// it is reported through [`crate::Termination`].
#[derive(Debug, thiserror::Error)]
pub enum RefineError {
    #[error("failed to load frame {index}")]
    Frame {
        index: usize,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("frame {index}: measured image is {found:?} but renderings are {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("pose update failed for model {model_id}")]
    Optimizer {
        model_id: ModelId,
        #[source]
        source: BoxError,
    },
}

impl RefineError {
    pub(crate) fn frame(index: usize, err: anyhow::Error) -> Self {
        Self::Frame {
            index,
            source: err.into(),
        }
    }
}
