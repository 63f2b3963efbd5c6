use crate::block::{Block, BlockId, BlockKind, Input, InputKind, Mutation, ParentLink, Shape, Slot};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("block '{0}' not found")]
    BlockNotFound(BlockId),
    #[error("block '{0}' already exists")]
    DuplicateBlock(BlockId),
    #[error("block '{block}' ({kind}) has no field '{field}'")]
    InvalidField {
        block: BlockId,
        kind: String,
        field: String,
    },
    #[error("block '{block}' ({kind}) has no input '{input}'")]
    InvalidInput {
        block: BlockId,
        kind: String,
        input: String,
    },
    #[error("malformed mutation for block '{block}': {reason}")]
    MalformedMutation { block: BlockId, reason: String },
    #[error("malformed block '{block}': {reason}")]
    MalformedBlock { block: BlockId, reason: String },
    #[error("connecting '{child}' under '{parent}' would create a cycle")]
    CycleDetected { parent: BlockId, child: BlockId },
    #[error("cannot connect '{child}' to the {slot} of '{parent}': {reason}")]
    IncompatibleConnection {
        parent: BlockId,
        child: BlockId,
        slot: Slot,
        reason: String,
    },
}

/// Blocks removed by [`BlockGraph::remove_block`], root first.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub removed: Vec<Block>,
    pub healed: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationChange {
    pub previous: Mutation,
    pub detached: Vec<BlockId>,
    pub removed_names: Vec<String>,
    pub added_names: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    blocks: HashMap<BlockId, Block>,
    order: Vec<BlockId>,
    id_counter: usize,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn get_block(&self, id: &BlockId) -> Result<&Block, GraphError> {
        self.blocks
            .get(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))
    }

    /// Blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.order.iter().filter_map(|id| self.blocks.get(id))
    }

    pub fn fresh_id(&mut self) -> BlockId {
        loop {
            self.id_counter += 1;
            let candidate = BlockId::new(format!("block_{}", self.id_counter));
            if !self.blocks.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = self.fresh_id();
        let block = Block::new(id.clone(), kind);
        self.order.push(id.clone());
        self.blocks.insert(id.clone(), block);
        id
    }

    pub fn add_block_with_mutation(
        &mut self,
        kind: BlockKind,
        mutation: Mutation,
    ) -> Result<BlockId, GraphError> {
        let id = self.fresh_id();
        kind.validate_mutation(&mutation)
            .map_err(|reason| GraphError::MalformedMutation {
                block: id.clone(),
                reason,
            })?;
        let block = Block::with_mutation(id.clone(), kind, mutation);
        self.order.push(id.clone());
        self.blocks.insert(id.clone(), block);
        Ok(id)
    }

    /// Adds a fully built, unlinked block under its own id.
    pub fn insert_block(&mut self, block: Block) -> Result<(), GraphError> {
        if self.blocks.contains_key(&block.id) {
            return Err(GraphError::DuplicateBlock(block.id));
        }
        if block.parent.is_some() || block.next.is_some() || block.children().next().is_some() {
            return Err(GraphError::MalformedBlock {
                block: block.id,
                reason: "blocks must be inserted unlinked and connected afterwards".to_string(),
            });
        }
        block
            .kind
            .validate_mutation(&block.mutation)
            .map_err(|reason| GraphError::MalformedMutation {
                block: block.id.clone(),
                reason,
            })?;
        if !matches!(block.kind, BlockKind::Undefined(_)) {
            let layout = block.kind.input_layout(&block.mutation);
            let matches_layout = layout.len() == block.inputs.len()
                && layout
                    .iter()
                    .zip(&block.inputs)
                    .all(|((name, kind), input)| *name == input.name && *kind == input.kind);
            if !matches_layout {
                return Err(GraphError::MalformedBlock {
                    block: block.id,
                    reason: "inputs do not match the block's mutation".to_string(),
                });
            }
        }
        if let Some(field) = block
            .fields
            .keys()
            .find(|field| !block.kind.accepts_field(field, &block.mutation))
        {
            return Err(GraphError::InvalidField {
                block: block.id.clone(),
                kind: block.kind.type_name().to_string(),
                field: field.clone(),
            });
        }
        self.order.push(block.id.clone());
        self.blocks.insert(block.id.clone(), block);
        Ok(())
    }

    pub fn set_position(&mut self, id: &BlockId, x: i64, y: i64) -> Result<(), GraphError> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))?;
        block.position = Some((x, y));
        Ok(())
    }

    /// Sets a field and returns its previous value. Declared-name fields keep
    /// the block's mutation in step.
    pub fn set_field(
        &mut self,
        id: &BlockId,
        name: &str,
        value: &str,
    ) -> Result<Option<String>, GraphError> {
        let block = self.get_block(id)?;
        if !block.kind.accepts_field(name, &block.mutation) {
            return Err(GraphError::InvalidField {
                block: id.clone(),
                kind: block.kind.type_name().to_string(),
                field: name.to_string(),
            });
        }
        let mut mutation = block.mutation.clone();
        match &mut mutation {
            Mutation::Procedure { params: names, .. } | Mutation::Locals { names } => {
                if let Some(index) = crate::block::indexed(name, "VAR") {
                    if let Some(slot) = names.get_mut(index) {
                        *slot = value.to_string();
                    }
                }
            }
            Mutation::Call { name: target, .. } if name == "PROCNAME" => {
                *target = value.to_string();
            }
            _ => {}
        }
        if mutation != block.mutation {
            block
                .kind
                .validate_mutation(&mutation)
                .map_err(|reason| GraphError::MalformedMutation {
                    block: id.clone(),
                    reason,
                })?;
        }
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))?;
        block.mutation = mutation;
        Ok(block.fields.insert(name.to_string(), value.to_string()))
    }

    /// Replaces a block's mutation and reshapes its fields and inputs to match.
    /// Children of inputs that no longer exist become top-level blocks.
    pub fn set_mutation(
        &mut self,
        id: &BlockId,
        mutation: Mutation,
    ) -> Result<MutationChange, GraphError> {
        let block = self.get_block(id)?;
        block
            .kind
            .validate_mutation(&mutation)
            .map_err(|reason| GraphError::MalformedMutation {
                block: id.clone(),
                reason,
            })?;

        let inputs = if let BlockKind::Undefined(_) = block.kind {
            block.inputs.clone()
        } else {
            block
                .kind
                .input_layout(&mutation)
                .into_iter()
                .map(|(name, kind)| {
                    let child = block
                        .input(&name)
                        .filter(|input| input.kind == kind)
                        .and_then(|input| input.block.clone());
                    Input { name, kind, block: child }
                })
                .collect::<Vec<_>>()
        };
        let detached = block
            .children()
            .filter(|child| !inputs.iter().any(|input| input.block.as_ref() == Some(*child)))
            .cloned()
            .collect::<Vec<_>>();

        let old_names = block.mutation.declared_names();
        let new_names = mutation.declared_names();
        let removed_names = old_names
            .iter()
            .filter(|name| !new_names.contains(*name))
            .cloned()
            .collect::<Vec<_>>();
        let added_names = new_names
            .iter()
            .filter(|name| !old_names.contains(*name))
            .cloned()
            .collect::<Vec<_>>();

        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))?;
        block
            .fields
            .retain(|field, _| crate::block::indexed(field, "VAR").is_none());
        for (index, name) in mutation.declared_names().iter().enumerate() {
            block.fields.insert(format!("VAR{}", index), name.clone());
        }
        if let Mutation::Call { name, .. } = &mutation {
            block.fields.insert("PROCNAME".to_string(), name.clone());
        }
        block.inputs = inputs;
        let previous = std::mem::replace(&mut block.mutation, mutation);
        for child in &detached {
            if let Some(child) = self.blocks.get_mut(child) {
                child.parent = None;
            }
        }
        Ok(MutationChange {
            previous,
            detached,
            removed_names,
            added_names,
        })
    }

    /// Plugs `child` into `slot` of `parent`. A statement already in the slot
    /// is appended after the end of `child`'s chain; a value already in the
    /// slot is bumped to top level and returned.
    pub fn connect(
        &mut self,
        parent: &BlockId,
        slot: Slot,
        child: &BlockId,
    ) -> Result<Option<BlockId>, GraphError> {
        let parent_block = self.get_block(parent)?;
        let child_block = self.get_block(child)?;
        let incompatible = |reason: &str| GraphError::IncompatibleConnection {
            parent: parent.clone(),
            child: child.clone(),
            slot: slot.clone(),
            reason: reason.to_string(),
        };
        let expected = match &slot {
            Slot::Next => {
                if !matches!(parent_block.kind.shape(), Shape::Statement | Shape::Unknown) {
                    return Err(incompatible("only statements chain to a next block"));
                }
                InputKind::Statement
            }
            Slot::Input(name) => parent_block
                .input(name)
                .map(|input| input.kind)
                .ok_or_else(|| GraphError::InvalidInput {
                    block: parent.clone(),
                    kind: parent_block.kind.type_name().to_string(),
                    input: name.clone(),
                })?,
        };
        match (expected, child_block.kind.shape()) {
            (_, Shape::Unknown)
            | (InputKind::Value, Shape::Value)
            | (InputKind::Statement, Shape::Statement) => {}
            (InputKind::Value, _) => return Err(incompatible("a value input needs a value block")),
            (InputKind::Statement, _) => {
                return Err(incompatible("a statement input needs a statement block"))
            }
        }
        if parent == child || self.ancestors(parent).iter().any(|link| &link.block == child) {
            return Err(GraphError::CycleDetected {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        self.detach(child);
        let occupant = self.slot_occupant(parent, &slot);
        if let Some(occupant) = &occupant {
            self.detach(occupant);
        }
        self.attach(parent, slot, child);
        match occupant {
            Some(old) if expected == InputKind::Statement => {
                let tail = self.chain(child).last().cloned().unwrap_or_else(|| child.clone());
                self.attach(&tail, Slot::Next, &old);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Unplugs `child` from its parent, returning the link it had.
    pub fn disconnect(&mut self, child: &BlockId) -> Result<Option<ParentLink>, GraphError> {
        let link = self.get_block(child)?.parent.clone();
        self.detach(child);
        Ok(link)
    }

    /// Deletes a block together with everything plugged into its inputs. The
    /// rest of its statement chain takes its place in the parent slot.
    pub fn remove_block(&mut self, id: &BlockId) -> Result<Removal, GraphError> {
        let block = self.get_block(id)?;
        let link = block.parent.clone();
        let next = block.next.clone();
        let mut doomed = vec![id.clone()];
        doomed.extend(self.descendants(id));

        if let Some(next) = &next {
            self.detach(next);
        }
        self.detach(id);
        let healed = match (link, next) {
            (Some(link), Some(next)) => {
                self.attach(&link.block, link.slot, &next);
                Some(next)
            }
            _ => None,
        };

        let doomed_set = doomed.iter().collect::<HashSet<_>>();
        self.order.retain(|id| !doomed_set.contains(&id));
        let removed = doomed
            .iter()
            .filter_map(|id| self.blocks.remove(id))
            .collect();
        Ok(Removal { removed, healed })
    }

    /// Statement chain starting at `start`, following `next` links.
    pub fn chain(&self, start: &BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(start.clone());
        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                warn!(block = %id, "statement chain loops back on itself");
                break;
            }
            let Some(block) = self.blocks.get(&id) else {
                break;
            };
            cursor = block.next.clone();
            out.push(id);
        }
        out
    }

    /// Every block nested in `id`'s inputs, in pre-order. `id`'s own `next`
    /// chain is not included.
    pub fn descendants(&self, id: &BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id.clone()]);
        let mut stack = self
            .blocks
            .get(id)
            .map(|block| block.children().rev().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(block) = self.blocks.get(&current) else {
                continue;
            };
            out.push(current.clone());
            if let Some(next) = &block.next {
                stack.push(next.clone());
            }
            stack.extend(block.children().rev().cloned());
        }
        out
    }

    /// Parent links from `id` up to its root, nearest first.
    pub fn ancestors(&self, id: &BlockId) -> Vec<ParentLink> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id.clone()]);
        let mut cursor = self.blocks.get(id).and_then(|block| block.parent.clone());
        while let Some(link) = cursor {
            if !visited.insert(link.block.clone()) {
                warn!(block = %id, "parent links loop back on themselves");
                break;
            }
            cursor = self
                .blocks
                .get(&link.block)
                .and_then(|block| block.parent.clone());
            out.push(link);
        }
        out
    }

    pub fn root_of(&self, id: &BlockId) -> BlockId {
        self.ancestors(id)
            .last()
            .map(|link| link.block.clone())
            .unwrap_or_else(|| id.clone())
    }

    /// Blocks without a parent, in insertion order.
    pub fn top_level(&self) -> Vec<BlockId> {
        self.blocks()
            .filter(|block| block.parent.is_none())
            .map(|block| block.id.clone())
            .collect()
    }

    fn slot_occupant(&self, parent: &BlockId, slot: &Slot) -> Option<BlockId> {
        let block = self.blocks.get(parent)?;
        match slot {
            Slot::Next => block.next.clone(),
            Slot::Input(name) => block.input_block(name).cloned(),
        }
    }

    fn attach(&mut self, parent: &BlockId, slot: Slot, child: &BlockId) {
        if let Some(block) = self.blocks.get_mut(parent) {
            match &slot {
                Slot::Next => block.next = Some(child.clone()),
                Slot::Input(name) => {
                    if let Some(input) = block.inputs.iter_mut().find(|i| &i.name == name) {
                        input.block = Some(child.clone());
                    }
                }
            }
        }
        if let Some(block) = self.blocks.get_mut(child) {
            block.parent = Some(ParentLink {
                block: parent.clone(),
                slot,
            });
        }
    }

    fn detach(&mut self, child: &BlockId) {
        let Some(link) = self.blocks.get_mut(child).and_then(|block| block.parent.take()) else {
            return;
        };
        if let Some(parent) = self.blocks.get_mut(&link.block) {
            match &link.slot {
                Slot::Next => {
                    if parent.next.as_ref() == Some(child) {
                        parent.next = None;
                    }
                }
                Slot::Input(name) => {
                    if let Some(input) = parent
                        .inputs
                        .iter_mut()
                        .find(|i| &i.name == name && i.block.as_ref() == Some(child))
                    {
                        input.block = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(graph: &mut BlockGraph) -> BlockId {
        graph.add_block(BlockKind::Break)
    }

    #[test]
    fn value_occupant_is_bumped_to_top_level() {
        let mut graph = BlockGraph::new();
        let set = graph.add_block(BlockKind::LexicalVariableSet);
        let one = graph.add_block(BlockKind::MathNumber);
        let two = graph.add_block(BlockKind::MathNumber);
        let value = Slot::Input("VALUE".to_string());
        assert_eq!(graph.connect(&set, value.clone(), &one).unwrap(), None);
        assert_eq!(graph.connect(&set, value, &two).unwrap(), Some(one.clone()));
        assert!(graph.get_block(&one).unwrap().parent.is_none());
        assert_eq!(graph.top_level(), vec![set, one]);
    }

    #[test]
    fn statement_occupant_is_spliced_after_new_chain() {
        let mut graph = BlockGraph::new();
        let def = graph.add_block(BlockKind::ProcedureDefNoReturn);
        let first = statement(&mut graph);
        let second = statement(&mut graph);
        let third = statement(&mut graph);
        let stack = Slot::Input("STACK".to_string());
        graph.connect(&def, stack.clone(), &first).unwrap();
        graph.connect(&second, Slot::Next, &third).unwrap();
        graph.connect(&def, stack, &second).unwrap();
        assert_eq!(graph.chain(&second), vec![second.clone(), third.clone(), first]);
        assert_eq!(graph.descendants(&def).len(), 3);
    }

    #[test]
    fn descendants_walk_inputs_left_to_right() {
        let mut graph = BlockGraph::new();
        let compare = graph.add_block(BlockKind::MathCompare);
        let left = graph.add_block(BlockKind::MathSubtract);
        let right = graph.add_block(BlockKind::MathNumber);
        let inner = graph.add_block(BlockKind::MathNumber);
        graph.connect(&compare, Slot::Input("A".to_string()), &left).unwrap();
        graph.connect(&compare, Slot::Input("B".to_string()), &right).unwrap();
        graph.connect(&left, Slot::Input("A".to_string()), &inner).unwrap();
        assert_eq!(graph.descendants(&compare), vec![left, inner, right]);
    }

    #[test]
    fn rejects_cycles_and_mismatched_shapes() {
        let mut graph = BlockGraph::new();
        let outer = graph.add_block(BlockKind::While);
        let inner = graph.add_block(BlockKind::While);
        let number = graph.add_block(BlockKind::MathNumber);
        let body = Slot::Input("DO".to_string());
        graph.connect(&outer, body.clone(), &inner).unwrap();
        assert!(matches!(
            graph.connect(&inner, body.clone(), &outer),
            Err(GraphError::CycleDetected { .. })
        ));
        assert!(matches!(
            graph.connect(&inner, body, &number),
            Err(GraphError::IncompatibleConnection { .. })
        ));
        assert!(matches!(
            graph.connect(&inner, Slot::Input("NOPE".to_string()), &number),
            Err(GraphError::InvalidInput { .. })
        ));
        assert_eq!(graph.top_level(), vec![outer, number]);
    }

    #[test]
    fn removing_a_statement_heals_the_chain() {
        let mut graph = BlockGraph::new();
        let def = graph.add_block(BlockKind::ProcedureDefNoReturn);
        let first = graph.add_block(BlockKind::LexicalVariableSet);
        let value = graph.add_block(BlockKind::MathNumber);
        let second = statement(&mut graph);
        graph
            .connect(&def, Slot::Input("STACK".to_string()), &first)
            .unwrap();
        graph
            .connect(&first, Slot::Input("VALUE".to_string()), &value)
            .unwrap();
        graph.connect(&first, Slot::Next, &second).unwrap();

        let removal = graph.remove_block(&first).unwrap();
        let removed = removal.removed.iter().map(|b| b.id.clone()).collect::<Vec<_>>();
        assert_eq!(removed, vec![first, value]);
        assert_eq!(removal.healed, Some(second.clone()));
        assert_eq!(
            graph.get_block(&def).unwrap().input_block("STACK"),
            Some(&second)
        );
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn shrinking_a_mutation_detaches_surplus_children() {
        let mut graph = BlockGraph::new();
        let join = graph.add_block(BlockKind::TextJoin);
        let a = graph.add_block(BlockKind::Text);
        let b = graph.add_block(BlockKind::Text);
        graph.connect(&join, Slot::Input("ADD0".to_string()), &a).unwrap();
        graph.connect(&join, Slot::Input("ADD1".to_string()), &b).unwrap();

        let change = graph.set_mutation(&join, Mutation::Items { count: 1 }).unwrap();
        assert_eq!(change.detached, vec![b.clone()]);
        assert!(graph.get_block(&b).unwrap().parent.is_none());
        assert_eq!(graph.get_block(&join).unwrap().inputs.len(), 1);
    }

    #[test]
    fn parameter_mutation_rewrites_var_fields() {
        let mut graph = BlockGraph::new();
        let def = graph
            .add_block_with_mutation(
                BlockKind::ProcedureDefReturn,
                Mutation::Procedure {
                    params: vec!["a".to_string(), "b".to_string()],
                    horizontal: false,
                },
            )
            .unwrap();
        let change = graph
            .set_mutation(
                &def,
                Mutation::Procedure {
                    params: vec!["b".to_string()],
                    horizontal: false,
                },
            )
            .unwrap();
        assert_eq!(change.removed_names, vec!["a".to_string()]);
        let block = graph.get_block(&def).unwrap();
        assert_eq!(block.field("VAR0"), Some("b"));
        assert_eq!(block.field("VAR1"), None);
    }

    #[test]
    fn rejected_edits_leave_the_block_unchanged() {
        let mut graph = BlockGraph::new();
        let local = graph.add_block(BlockKind::LocalDeclarationStatement);
        let before = graph.get_block(&local).unwrap().clone();
        assert!(matches!(
            graph.set_field(&local, "VAR3", "x"),
            Err(GraphError::InvalidField { .. })
        ));
        assert!(matches!(
            graph.set_field(&local, "VAR0", ""),
            Err(GraphError::MalformedMutation { .. })
        ));
        assert!(matches!(
            graph.set_mutation(&local, Mutation::Items { count: 2 }),
            Err(GraphError::MalformedMutation { .. })
        ));
        assert_eq!(graph.get_block(&local).unwrap(), &before);
    }

    #[test]
    fn insert_rejects_duplicates_and_linked_blocks() {
        let mut graph = BlockGraph::new();
        let id = BlockId::from("fixed");
        graph
            .insert_block(Block::new(id.clone(), BlockKind::Text))
            .unwrap();
        assert!(matches!(
            graph.insert_block(Block::new(id.clone(), BlockKind::Text)),
            Err(GraphError::DuplicateBlock(_))
        ));
        let mut linked = Block::new(BlockId::from("other"), BlockKind::Break);
        linked.next = Some(id);
        assert!(matches!(
            graph.insert_block(linked),
            Err(GraphError::MalformedBlock { .. })
        ));
    }
}
