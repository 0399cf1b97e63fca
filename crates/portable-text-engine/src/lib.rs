pub mod editing;
pub mod models;
pub mod patch;
pub mod tree;

// Re-export key types for easier usage
pub use editing::{
    ApplyMode, ChangeBus, Editor, EditorChange, EditorError, EditorOptions, EditorSelection,
    Operation, RemoteBatchOutcome, RemotePatchBatch,
};
pub use models::{Block, Child, Path, PathSegment, Schema};
pub use patch::{InsertPosition, Origin, Patch, PatchOp};
