use std::fmt;

/// Stages of one indexing run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    Discovering,
    Compiling,
    Persisting,
    MappingUpdate,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Initializing => "initializing",
            PipelineState::Discovering => "discovering",
            PipelineState::Compiling => "compiling",
            PipelineState::Persisting => "persisting",
            PipelineState::MappingUpdate => "mapping_update",
            PipelineState::Done => "done",
        };
        write!(f, "{s}")
    }
}
