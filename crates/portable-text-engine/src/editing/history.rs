//! Undo/redo stacks of local operation groups.

use std::collections::VecDeque;

use log::{debug, warn};

use super::Operation;

/// Undo and redo stacks. Each step is the operations of one local apply.
#[derive(Debug, Clone)]
pub struct History {
    undos: VecDeque<Vec<Operation>>,
    redos: Vec<Vec<Operation>>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Carry an undo step over `over`, an operation applied after it.
///
/// The step is walked newest operation first. Each inverse is rebased over
/// `over`, which is then moved back through that inverse so it reads against
/// the tree before the operation. `over` becomes `None` once it only touched
/// nodes the step created; older operations are untouched by it. Returns
/// `None` when an operation of the step lost its target.
fn rebase_undo_step(step: Vec<Operation>, over: &mut Option<Operation>) -> Option<Vec<Operation>> {
    let mut rebased = Vec::with_capacity(step.len());
    for op in step.into_iter().rev() {
        let Some(current) = over.take() else {
            rebased.push(op);
            continue;
        };
        let inverse = op.inverse();
        rebased.push(inverse.rebase(&current)?.inverse());
        *over = current.rebase(&inverse);
    }
    rebased.reverse();
    Some(rebased)
}

/// Carry a redo step over `over`; the step applies to the tree `over` was
/// applied to, so `over` moves forward through each operation.
fn rebase_redo_step(step: Vec<Operation>, over: &mut Option<Operation>) -> Option<Vec<Operation>> {
    let mut rebased = Vec::with_capacity(step.len());
    for op in step {
        let Some(current) = over.take() else {
            rebased.push(op);
            continue;
        };
        rebased.push(op.rebase(&current)?);
        *over = current.rebase(&op);
    }
    Some(rebased)
}

type StepRebase = fn(Vec<Operation>, &mut Option<Operation>) -> Option<Vec<Operation>>;

/// Rebase a stack, given oldest step first, over `over`. Steps are visited
/// from the top; a step that no longer applies is dropped together with
/// every step beneath it.
fn rebase_stack(
    steps: Vec<Vec<Operation>>,
    over: &Operation,
    kind: &str,
    rebase_step: StepRebase,
) -> Vec<Vec<Operation>> {
    let total = steps.len();
    let mut over = Some(over.clone());
    let mut kept = Vec::with_capacity(total);
    for step in steps.into_iter().rev() {
        match rebase_step(step, &mut over) {
            Some(step) => kept.push(step),
            None => {
                warn!(
                    "Dropping {} of {total} {kind} step(s): a remote change removed what they edit",
                    total - kept.len()
                );
                break;
            }
        }
    }
    kept.reverse();
    kept
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undos: VecDeque::new(),
            redos: Vec::new(),
            limit,
        }
    }

    /// Record a new local step; selection changes are not undoable and a new
    /// step makes the redo stack meaningless
    pub fn record(&mut self, ops: &[Operation]) {
        let step: Vec<Operation> = ops.iter().filter(|op| !op.is_selection()).cloned().collect();
        if step.is_empty() || self.limit == 0 {
            return;
        }
        self.undos.push_back(step);
        while self.undos.len() > self.limit {
            self.undos.pop_front();
        }
        self.redos.clear();
    }

    pub fn pop_undo(&mut self) -> Option<Vec<Operation>> {
        self.undos.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<Vec<Operation>> {
        self.redos.pop()
    }

    /// Put back a step that was just undone, so it can be redone
    pub fn push_redo(&mut self, step: Vec<Operation>) {
        self.redos.push(step);
    }

    /// Put back a step that was just redone, keeping the rest of the redo stack
    pub fn push_undo(&mut self, step: Vec<Operation>) {
        self.undos.push_back(step);
    }

    pub fn can_undo(&self) -> bool {
        !self.undos.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redos.is_empty()
    }

    pub fn clear(&mut self) {
        self.undos.clear();
        self.redos.clear();
    }

    /// Carry both stacks over operations applied by someone else
    pub fn rebase(&mut self, remote: &[Operation]) {
        if remote.is_empty() || (self.undos.is_empty() && self.redos.is_empty()) {
            return;
        }
        for over in remote.iter().filter(|op| !op.is_selection()) {
            let undos = std::mem::take(&mut self.undos).into_iter().collect();
            self.undos = rebase_stack(undos, over, "undo", rebase_undo_step).into();
            let redos = std::mem::take(&mut self.redos);
            self.redos = rebase_stack(redos, over, "redo", rebase_redo_step);
        }
        debug!(
            "Rebased history over {} remote operation(s): {} undo, {} redo step(s) left",
            remote.len(),
            self.undos.len(),
            self.redos.len()
        );
    }
}
