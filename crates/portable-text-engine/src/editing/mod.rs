/*!
 * # Editing Core
 *
 * Everything between the text-editing surface and the collaborative store.
 *
 * ## Local edits
 *
 * The surface applies [`Operation`]s through [`Editor::apply`]. Each one is
 * applied to a copy of the current [`crate::tree::Snapshot`], translated into
 * keyed patches by comparing the tree before and after it
 * ([`to_patches::operation_to_patches`]), and the patches go out on the
 * [`ChangeBus`] stamped `origin: local`. A call is atomic: if any operation
 * fails, nothing is committed and nothing is emitted.
 *
 * ## Remote patches
 *
 * [`Editor::handle_remote_batch`] drops local echoes, turns each remaining
 * patch into operations ([`from_patches::patch_to_operations`]) and applies
 * them in [`ApplyMode::REMOTE`]: no patches, no history, no selection
 * transform. The selection is then adjusted per patch
 * ([`selection::adjust_selection`]) and clamped once per batch.
 *
 * ## Module Structure
 *
 * - **`operations`**: the closed set of tree operations and their inverses
 * - **`keys`**: key generation for inserted and split nodes
 * - **`to_patches`** / **`from_patches`**: the two translation directions
 * - **`selection`**: selection adjustment after remote patches
 * - **`ranges`**: keyed selections for collaborators
 * - **`history`**: undo/redo stacks
 * - **`changes`**: the change bus
 * - **`editor`**: the `Editor` tying it together
 */

pub mod changes;
pub mod editor;
pub mod from_patches;
pub mod history;
pub mod keys;
pub mod operations;
pub mod ranges;
pub mod selection;
pub mod to_patches;

pub use changes::{ChangeBus, EditorChange, SequencedChange, SubscriptionId};
pub use editor::{
    ApplyMode, Editor, EditorError, EditorOptions, RemoteBatchOutcome, RemotePatchBatch,
};
pub use from_patches::{RemotePatchError, patch_to_operations};
pub use history::History;
pub use keys::{KeyGenerator, RandomKeys};
pub use operations::{Operation, Properties};
pub use ranges::{EditorSelection, EditorSelectionPoint};
pub use selection::{adjust_selection, resolve_selection};
pub use to_patches::{TranslateError, Translated, operation_to_patches};
