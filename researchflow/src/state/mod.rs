//! Pipeline state model: the versioned envelope persisted by the
//! checkpoint store and the partial updates steps return.

mod envelope;
mod result;

pub use envelope::{PipelineState, SearchResult, SourceDocument, SCHEMA_VERSION};
pub use result::{StepResult, StepStatus, StepUpdate};
