pub mod block;
pub mod path;
pub mod schema;

pub use block::{
    Block, BlockContent, Child, ChildContent, ModelError, blocks_from_value, blocks_to_value,
};
pub use path::{KeySegment, Path, PathSegment};
pub use schema::Schema;
