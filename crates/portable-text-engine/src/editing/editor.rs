use std::sync::mpsc::Receiver;

use log::{debug, warn};
use portable_text_config::Config;
use serde_json::Value;

use super::changes::{ChangeBus, EditorChange};
use super::from_patches::patch_to_operations;
use super::keys::{KeyGenerator, RandomKeys, assign_keys};
use super::selection::{adjust_selection, resolve_selection};
use super::to_patches::{TranslateError, operation_to_patches};
use super::{EditorSelection, History, Operation};
use crate::models::{Block, ModelError, Schema, blocks_from_value, blocks_to_value};
use crate::patch::Patch;
use crate::tree::{
    Node, Point, Range, Snapshot, TreeError, apply_operation, convert::block_to_node, from_tree,
    is_empty_document, placeholder_block, to_tree,
};

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("The editor is read-only")]
    ReadOnly,
    #[error("The document already has the maximum of {max} blocks")]
    MaxBlocks { max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorOptions {
    pub schema: Schema,
    pub max_blocks: Option<usize>,
    pub read_only: bool,
    pub history_limit: usize,
    pub replay_capacity: usize,
}

impl EditorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema: Schema::from(&config.schema),
            max_blocks: config.editor.max_blocks,
            read_only: config.editor.read_only,
            history_limit: config.editor.history_limit,
            replay_capacity: config.editor.replay_capacity,
        }
    }
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What an apply call does besides changing the tree.
///
/// Passed down explicitly so a remote apply nested in anything else can never
/// leave patching or recording switched off afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyMode {
    /// Translate operations into patches on the change bus
    pub patching: bool,
    /// Record the operations as an undo step
    pub saving: bool,
    /// Give inserted and split nodes fresh keys where needed
    pub assign_keys: bool,
    /// Move the selection along with the operations
    pub transform_selection: bool,
}

impl ApplyMode {
    pub const LOCAL: ApplyMode = ApplyMode {
        patching: true,
        saving: true,
        assign_keys: true,
        transform_selection: true,
    };

    /// Undo and redo: patched, never recorded again, keys kept as they were
    pub const HISTORY: ApplyMode = ApplyMode {
        patching: true,
        saving: false,
        assign_keys: false,
        transform_selection: true,
    };

    /// Operations derived from remote patches
    pub const REMOTE: ApplyMode = ApplyMode {
        patching: false,
        saving: false,
        assign_keys: false,
        transform_selection: false,
    };
}

/// Patches from collaborators, with the store value they lead to when known
///
/// `snapshot` is compared with the editor value after the batch and sets
/// [`RemoteBatchOutcome::diverged`]. `previous_snapshot` is informational:
/// a mismatch with the value before the batch is only logged at debug level
/// and the patches are applied regardless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePatchBatch {
    pub patches: Vec<Patch>,
    pub snapshot: Option<Vec<Block>>,
    pub previous_snapshot: Option<Vec<Block>>,
}

impl RemotePatchBatch {
    pub fn new(patches: Vec<Patch>) -> Self {
        Self {
            patches,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteBatchOutcome {
    pub applied: usize,
    pub skipped: usize,
    /// Echoes of this editor's own patches
    pub ignored_local: usize,
    /// The editor value differs from the snapshot the batch carried
    pub diverged: bool,
}

impl RemoteBatchOutcome {
    fn merge(&mut self, other: RemoteBatchOutcome) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.ignored_local += other.ignored_local;
        self.diverged |= other.diverged;
    }
}

/// The editing core: one document tree, its selection, history and change bus.
///
/// Local operations go through [`Editor::apply`], which translates each one
/// into patches against the tree it was applied to. Remote patches go through
/// [`Editor::handle_remote_batch`], which applies them without emitting
/// patches or recording history and then reconciles the selection.
pub struct Editor {
    options: EditorOptions,
    snapshot: Snapshot,
    selection: Option<Range>,
    history: History,
    changes: ChangeBus,
    keys: Box<dyn KeyGenerator>,
    version: u64,
}

impl Editor {
    pub fn new(options: EditorOptions) -> Self {
        Self::with_key_generator(options, RandomKeys)
    }

    pub fn with_key_generator(options: EditorOptions, keys: impl KeyGenerator + 'static) -> Self {
        let mut keys: Box<dyn KeyGenerator> = Box::new(keys);
        let placeholder = placeholder_node(&options.schema, keys.as_mut());
        Self {
            history: History::new(options.history_limit),
            changes: ChangeBus::new(options.replay_capacity),
            snapshot: Snapshot::new(vec![placeholder]),
            selection: None,
            keys,
            version: 0,
            options,
        }
    }

    pub fn from_value(value: &Value, options: EditorOptions) -> Result<Self, EditorError> {
        let mut editor = Self::new(options);
        editor.reset(value)?;
        Ok(editor)
    }

    /// Replace the document without emitting patches; history and selection are cleared
    pub fn reset(&mut self, value: &Value) -> Result<(), EditorError> {
        let blocks = blocks_from_value(value, &self.options.schema)?;
        let nodes = if blocks.is_empty() {
            vec![placeholder_node(&self.options.schema, self.keys.as_mut())]
        } else {
            to_tree(&blocks, &self.options.schema)
        };
        self.snapshot = Snapshot::new(nodes);
        self.selection = None;
        self.history.clear();
        self.version += 1;
        Ok(())
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    /// The selection with keyed paths, as collaborators see it
    pub fn editor_selection(&self) -> Option<EditorSelection> {
        EditorSelection::from_range(self.selection.as_ref()?, &self.snapshot)
    }

    /// The document value; `None` while the editor only shows its placeholder
    pub fn value(&self) -> Result<Option<Vec<Block>>, EditorError> {
        if is_empty_document(&self.snapshot, &self.options.schema) {
            return Ok(None);
        }
        Ok(Some(from_tree(&self.snapshot)?))
    }

    /// The document value as JSON; `null` when empty
    pub fn value_json(&self) -> Result<Value, EditorError> {
        Ok(self
            .value()?
            .map_or(Value::Null, |blocks| blocks_to_value(&blocks)))
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }

    pub fn changes_mut(&mut self) -> &mut ChangeBus {
        &mut self.changes
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn apply(&mut self, op: Operation) -> Result<(), EditorError> {
        self.apply_all(vec![op])
    }

    /// Apply local operations as one undo step; nothing changes unless all of them apply
    pub fn apply_all(&mut self, ops: Vec<Operation>) -> Result<(), EditorError> {
        self.apply_with_mode(ops, ApplyMode::LOCAL).map(|_| ())
    }

    pub fn select(&mut self, selection: Option<Range>) -> Result<(), EditorError> {
        self.apply(Operation::SetSelection {
            properties: self.selection.clone(),
            new_properties: selection,
        })
    }

    /// Select by keyed paths; returns false when they do not resolve
    pub fn select_keyed(&mut self, selection: &EditorSelection) -> Result<bool, EditorError> {
        let Some(range) = selection.to_range(&self.snapshot) else {
            return Ok(false);
        };
        self.select(Some(range))?;
        Ok(true)
    }

    fn check_allowed(&self, op: &Operation, tree: &Snapshot, mode: ApplyMode) -> Result<(), EditorError> {
        if !mode.patching || op.is_selection() {
            return Ok(());
        }
        if self.options.read_only {
            return Err(EditorError::ReadOnly);
        }
        let adds_block = matches!(
            op,
            Operation::InsertNode { path, .. } | Operation::SplitNode { path, .. } if path.len() == 1
        );
        if let Some(max) = self.options.max_blocks
            && adds_block
            && tree.len() >= max
        {
            return Err(EditorError::MaxBlocks { max });
        }
        Ok(())
    }

    /// Apply operations on a working copy and commit tree, selection, history
    /// and change events together once all of them went through.
    ///
    /// Returns the operations as applied, keys filled in.
    pub fn apply_with_mode(
        &mut self,
        ops: Vec<Operation>,
        mode: ApplyMode,
    ) -> Result<Vec<Operation>, EditorError> {
        let mut snapshot = self.snapshot.clone();
        let mut selection = self.selection.clone();
        let mut events = Vec::new();
        let mut applied = Vec::with_capacity(ops.len());

        for op in ops {
            self.check_allowed(&op, &snapshot, mode)?;

            let op = if mode.assign_keys {
                assign_keys(op, &snapshot, self.keys.as_mut())
            } else {
                op
            };

            if let Operation::SetSelection { new_properties, .. } = &op {
                selection = new_properties.clone();
                applied.push(op);
                continue;
            }

            // Apply to the tree
            let mut nodes = snapshot.to_vec();
            apply_operation(&mut nodes, &op)?;
            let next = Snapshot::new(nodes);

            // Translate against the tree the operation was applied to
            if mode.patching {
                let translated = operation_to_patches(&op, &snapshot, &next, &self.options.schema)?;
                events.extend(
                    translated
                        .patches
                        .into_iter()
                        .map(|patch| EditorChange::Patch { patch }),
                );
                if let Some(previous_value) = translated.unset_value {
                    events.push(EditorChange::Unset { previous_value });
                }
            }

            // Transform selection through the operation
            if mode.transform_selection {
                selection = selection.and_then(|range| range.transform(&op, &next));
            }

            snapshot = next;
            applied.push(op);
        }

        // A tree with no blocks at all shows a placeholder; it is not stored
        if snapshot.is_empty() {
            let op = Operation::InsertNode {
                path: vec![0],
                node: placeholder_node(&self.options.schema, self.keys.as_mut()),
            };
            let mut nodes = Vec::new();
            apply_operation(&mut nodes, &op)?;
            snapshot = Snapshot::new(nodes);
            if mode.transform_selection && self.selection.is_some() {
                selection = Some(Range::collapsed(Point::new(vec![0, 0], 0)));
            }
            applied.push(op);
        }

        // Commit
        let selection_changed = selection != self.selection;
        let tree_changed = !snapshot.ptr_eq(&self.snapshot);
        self.snapshot = snapshot;
        self.selection = selection;
        if tree_changed {
            self.version += 1;
        }
        if mode.saving {
            self.history.record(&applied);
        }
        for event in events {
            self.changes.emit(event);
        }
        if mode.patching && selection_changed {
            let selection = self.editor_selection();
            self.changes.emit(EditorChange::Selection {
                selection,
                adjusted: false,
            });
        }

        debug!(
            "Applied {} operation(s), version {}",
            applied.len(),
            self.version
        );
        Ok(applied)
    }

    /// Undo the last local step; `false` when there is nothing to undo.
    ///
    /// A step that no longer applies to the tree is dropped from the history
    /// with a warning and its error is returned; nothing is changed or emitted.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(step) = self.history.pop_undo() else {
            return Ok(false);
        };
        let inverse: Vec<Operation> = step.iter().rev().map(Operation::inverse).collect();
        if let Err(error) = self.apply_with_mode(inverse, ApplyMode::HISTORY) {
            warn!("Dropping undo step that no longer applies: {error}");
            return Err(error);
        }
        self.history.push_redo(step);
        Ok(true)
    }

    /// Redo the last undone step; `false` when there is nothing to redo.
    ///
    /// Like [`Editor::undo`], a step that no longer applies is dropped and
    /// reported as an error.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(step) = self.history.pop_redo() else {
            return Ok(false);
        };
        if let Err(error) = self.apply_with_mode(step.clone(), ApplyMode::HISTORY) {
            warn!("Dropping redo step that no longer applies: {error}");
            return Err(error);
        }
        self.history.push_undo(step);
        Ok(true)
    }

    /// Apply a batch of remote patches in order.
    ///
    /// Patches this editor produced itself are dropped. A patch that cannot be
    /// translated or applied is skipped and the rest of the batch still goes
    /// in. The selection is adjusted after every patch and clamped onto the
    /// final tree once at the end.
    pub fn handle_remote_batch(&mut self, batch: RemotePatchBatch) -> RemoteBatchOutcome {
        let mut outcome = RemoteBatchOutcome::default();
        let selection_before = self.selection.clone();
        let mut selection = self.selection.clone();

        if let Some(previous) = &batch.previous_snapshot
            && let Ok(current) = self.value()
            && current.as_deref().unwrap_or_default() != previous.as_slice()
        {
            debug!("Remote batch was made against a different value; local edits are in flight");
        }

        for patch in batch.patches {
            if patch.is_local() {
                outcome.ignored_local += 1;
                continue;
            }

            let previous = self.snapshot.clone();
            let ops = match patch_to_operations(
                &patch.op,
                &previous,
                &self.options.schema,
                self.keys.as_mut(),
            ) {
                Ok(ops) => ops,
                Err(error) => {
                    warn!("Skipping remote {patch}: {error}");
                    outcome.skipped += 1;
                    continue;
                }
            };

            let applied = match self.apply_with_mode(ops, ApplyMode::REMOTE) {
                Ok(applied) => applied,
                Err(error) => {
                    warn!("Skipping remote {patch}: {error}");
                    outcome.skipped += 1;
                    continue;
                }
            };

            // Adjust selection for what the patch did
            if let Some(range) = &selection
                && let Some(adjusted) = adjust_selection(range, &patch.op, &previous, &self.snapshot)
            {
                selection = Some(adjusted);
            }

            self.history.rebase(&applied);
            outcome.applied += 1;
        }

        self.selection = selection.and_then(|range| resolve_selection(&range, &self.snapshot));
        if self.selection != selection_before {
            let selection = self.editor_selection();
            self.changes.emit(EditorChange::Selection {
                selection,
                adjusted: true,
            });
        }

        if let Some(expected) = &batch.snapshot {
            let current = self.value().ok().flatten().unwrap_or_default();
            if &current != expected {
                warn!(
                    "Editor value diverged from the remote snapshot ({} vs {} blocks)",
                    current.len(),
                    expected.len()
                );
                outcome.diverged = true;
            }
        }

        debug!(
            "Remote batch: {} applied, {} skipped, {} local echoes ignored",
            outcome.applied, outcome.skipped, outcome.ignored_local
        );
        outcome
    }

    /// Handle every batch waiting on `receiver`, in arrival order
    pub fn drain_remote(&mut self, receiver: &Receiver<RemotePatchBatch>) -> RemoteBatchOutcome {
        let mut total = RemoteBatchOutcome::default();
        for batch in receiver.try_iter() {
            total.merge(self.handle_remote_batch(batch));
        }
        total
    }
}

fn placeholder_node(schema: &Schema, keys: &mut dyn KeyGenerator) -> Node {
    let block_key = keys.next_key();
    let span_key = keys.next_key();
    block_to_node(&placeholder_block(schema, &block_key, &span_key), schema)
}
