use crate::block::{indexed, Binding, BindingKind, Block, BlockId, BlockKind, Mutation, Slot};
use crate::codegen::{self, GenerateOptions, Generation};
use crate::graph::{BlockGraph, GraphError, MutationChange};
use crate::scope::{self, Resolution, ScopeResolver, GLOBAL_PREFIX};
use crate::symbols::{validate_identifier, SymbolError, SymbolTable};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error("block '{block}' does not declare '{name}'")]
    BindingNotFound { block: BlockId, name: String },
    #[error("block '{0}' is not a procedure definition")]
    NotAProcedure(BlockId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Rename,
    Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Unchanged,
    Applied { name: String, updated: Vec<BlockId> },
    /// The same rename was already running further up the stack.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied(MutationChange),
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEvent {
    pub block: BlockId,
    pub kind: BindingKind,
    pub old: String,
    pub new: String,
    pub updated: Vec<BlockId>,
}

pub type RenameListener = Box<dyn FnMut(&mut Workspace, &RenameEvent)>;

/// Operations currently running, keyed by kind and target block.
#[derive(Debug, Default)]
struct ReentrancyGuard {
    active: HashSet<(Operation, BlockId)>,
}

impl ReentrancyGuard {
    fn enter(&mut self, operation: Operation, target: &BlockId) -> bool {
        self.active.insert((operation, target.clone()))
    }

    fn exit(&mut self, operation: Operation, target: &BlockId) {
        self.active.remove(&(operation, target.clone()));
    }
}

/// Read-only view handed to the generator.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub graph: &'a BlockGraph,
    pub symbols: &'a SymbolTable,
    resolver: Option<&'a ScopeResolver>,
}

impl<'a> Snapshot<'a> {
    pub fn new(graph: &'a BlockGraph, symbols: &'a SymbolTable) -> Self {
        Self {
            graph,
            symbols,
            resolver: None,
        }
    }

    pub fn resolve(&self, id: &BlockId) -> Option<Resolution> {
        self.resolver
            .and_then(|resolver| resolver.cached(id).cloned())
            .or_else(|| scope::resolve_reference(self.graph, self.symbols, id))
    }
}

/// One editable document: blocks, symbols and resolution cache kept in step.
pub struct Workspace {
    graph: BlockGraph,
    symbols: SymbolTable,
    resolver: ScopeResolver,
    guard: ReentrancyGuard,
    propagation: bool,
    listeners: Vec<RenameListener>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            graph: BlockGraph::new(),
            symbols: SymbolTable::default(),
            resolver: ScopeResolver::new(),
            guard: ReentrancyGuard::default(),
            propagation: true,
            listeners: Vec::new(),
        }
    }

    /// Adopts a loaded graph. Procedures and globals register in document
    /// order; a later block reusing a taken name stays unregistered.
    pub fn from_graph(graph: BlockGraph) -> Self {
        let mut workspace = Self::new();
        workspace.graph = graph;
        workspace.claim_free_names();
        let references = workspace
            .resolver
            .resolve_all(&workspace.graph, &workspace.symbols);
        for id in &references {
            workspace.sync_caller(id);
        }
        workspace
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            graph: &self.graph,
            symbols: &self.symbols,
            resolver: Some(&self.resolver),
        }
    }

    pub fn generate(&self, options: &GenerateOptions) -> Generation {
        codegen::generate(&self.snapshot(), options)
    }

    pub fn on_rename(&mut self, listener: impl FnMut(&mut Workspace, &RenameEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Runs `f` with rename propagation switched off, then restores the
    /// previous setting.
    pub fn without_rename_propagation<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.propagation, false);
        let result = f(self);
        self.propagation = previous;
        result
    }

    pub fn add_block(&mut self, kind: BlockKind) -> Result<BlockId, WorkspaceError> {
        let mutation = kind.default_mutation();
        self.add_block_with_mutation(kind, mutation)
    }

    /// Creates a top-level block. New procedures and globals get the first
    /// free name (`procedure`, `procedure2`, ...).
    pub fn add_block_with_mutation(
        &mut self,
        kind: BlockKind,
        mutation: Mutation,
    ) -> Result<BlockId, WorkspaceError> {
        let id = self.graph.add_block_with_mutation(kind.clone(), mutation)?;
        match kind {
            BlockKind::ProcedureDefNoReturn | BlockKind::ProcedureDefReturn => {
                let name = first_free_name("procedure", |name| {
                    self.symbols.procedures.lookup(name).is_some()
                });
                self.graph.set_field(&id, "NAME", &name)?;
                self.symbols.procedures.add_procedure(&name, &id)?;
                self.sync_signature(&id)?;
                self.refresh_waiting(&name);
                if self.propagation {
                    for caller in self.symbols.procedures.callers(&id) {
                        self.sync_call_arguments(&caller)?;
                    }
                }
            }
            BlockKind::GlobalDeclaration => {
                let name = first_free_name("name", |name| self.symbols.globals.owner(name).is_some());
                self.graph.set_field(&id, "NAME", &name)?;
                self.symbols.globals.declare(&name, &id)?;
                self.refresh_waiting(&name);
            }
            _ => self.refresh(&id),
        }
        Ok(id)
    }

    pub fn remove_block(&mut self, id: &BlockId) -> Result<Vec<BlockId>, WorkspaceError> {
        let removal = self.graph.remove_block(id)?;
        let mut stale = Vec::new();
        for block in &removal.removed {
            self.resolver.forget(&block.id);
            self.symbols.procedures.detach_caller(&block.id);
            for binding in block.declared_bindings() {
                stale.extend(self.resolver.dependents_of(&block.id, &binding.name));
            }
            if block.kind.is_procedure_definition() {
                stale.extend(self.symbols.procedures.remove_procedure(&block.id));
            }
            if block.kind == BlockKind::GlobalDeclaration {
                self.symbols.globals.remove(&block.id);
            }
        }
        let removed = removal
            .removed
            .iter()
            .map(|block| block.id.clone())
            .collect::<Vec<_>>();
        stale.retain(|id| self.graph.contains(id));
        self.claim_free_names();
        for id in &stale {
            self.refresh(id);
        }
        for id in self.resolver.unresolved() {
            self.refresh(&id);
        }
        if let Some(healed) = &removal.healed {
            self.refresh_subtree(healed);
        }
        debug!(block = %id, removed = removed.len(), "removed block");
        Ok(removed)
    }

    /// Plugs `child` into `parent` and re-resolves everything that moved.
    pub fn connect(
        &mut self,
        parent: &BlockId,
        slot: Slot,
        child: &BlockId,
    ) -> Result<Option<BlockId>, WorkspaceError> {
        let bumped = self.graph.connect(parent, slot, child)?;
        self.refresh_subtree(child);
        if let Some(bumped) = &bumped {
            self.refresh_subtree(bumped);
        }
        Ok(bumped)
    }

    pub fn disconnect(&mut self, child: &BlockId) -> Result<(), WorkspaceError> {
        self.graph.disconnect(child)?;
        self.refresh_subtree(child);
        Ok(())
    }

    /// Editor-facing field edit. Name fields of declarations route through the
    /// rename machinery; reference fields rebind the reference.
    pub fn set_field(
        &mut self,
        id: &BlockId,
        name: &str,
        value: &str,
    ) -> Result<RenameOutcome, WorkspaceError> {
        let block = self.graph.get_block(id)?;
        if block.kind.is_procedure_definition() && name == "NAME" {
            return self.rename_procedure(id, value);
        }
        if let Some(old) = declared_name_in_field(block, name) {
            return self.rename_field(id, name, &old, value);
        }
        let previous = self.graph.set_field(id, name, value)?;
        if previous.as_deref() == Some(value) {
            return Ok(RenameOutcome::Unchanged);
        }
        if self.graph.get_block(id)?.kind.is_reference() {
            self.refresh(id);
            if self.graph.get_block(id)?.kind.is_procedure_call() {
                self.sync_call_arguments(id)?;
            }
        }
        Ok(RenameOutcome::Applied {
            name: value.to_string(),
            updated: Vec::new(),
        })
    }

    pub fn rename_procedure(
        &mut self,
        id: &BlockId,
        new: &str,
    ) -> Result<RenameOutcome, WorkspaceError> {
        let block = self.graph.get_block(id)?;
        if !block.kind.is_procedure_definition() {
            return Err(WorkspaceError::NotAProcedure(id.clone()));
        }
        let old = block.field("NAME").unwrap_or_default().to_string();
        let registered = self
            .symbols
            .procedures
            .entry(id)
            .is_some_and(|entry| entry.name == new);
        if old == new && registered {
            return Ok(RenameOutcome::Unchanged);
        }
        validate_identifier(new)?;

        let outcome = self.guarded(Operation::Rename, id, |ws| {
            let callers = ws.symbols.procedures.rename_procedure(id, &old, new)?;
            ws.graph.set_field(id, "NAME", new)?;
            ws.sync_signature(id)?;
            ws.claim_free_names();
            let mut updated = Vec::new();
            if ws.propagation {
                for caller in &callers {
                    ws.graph.set_field(caller, "PROCNAME", new)?;
                    updated.push(caller.clone());
                }
            }
            for caller in &callers {
                ws.refresh(caller);
            }
            ws.refresh_waiting(new);
            ws.refresh_waiting(&old);
            debug!(procedure = %id, old = %old, new, updated = updated.len(), "renamed procedure");
            ws.notify(RenameEvent {
                block: id.clone(),
                kind: BindingKind::Procedure,
                old: old.clone(),
                new: new.to_string(),
                updated: updated.clone(),
            });
            Ok(RenameOutcome::Applied {
                name: new.to_string(),
                updated,
            })
        })?;
        Ok(outcome.unwrap_or(RenameOutcome::Suppressed))
    }

    /// Renames a parameter, local, loop variable or global declared by `id`.
    pub fn rename_binding(
        &mut self,
        id: &BlockId,
        old: &str,
        new: &str,
    ) -> Result<RenameOutcome, WorkspaceError> {
        let field = self
            .graph
            .get_block(id)?
            .declaration_field(old)
            .ok_or_else(|| WorkspaceError::BindingNotFound {
                block: id.clone(),
                name: old.to_string(),
            })?;
        self.rename_field(id, &field, old, new)
    }

    fn rename_field(
        &mut self,
        id: &BlockId,
        field: &str,
        old: &str,
        new: &str,
    ) -> Result<RenameOutcome, WorkspaceError> {
        if old == new {
            return Ok(RenameOutcome::Unchanged);
        }
        validate_identifier(new)?;
        let block = self.graph.get_block(id)?;
        let kind = block
            .declared_bindings()
            .into_iter()
            .find(|binding| binding.name == old)
            .map(|binding| binding.kind)
            .ok_or_else(|| WorkspaceError::BindingNotFound {
                block: id.clone(),
                name: old.to_string(),
            })?;
        if block.mutation.declared_names().iter().any(|name| name == new) {
            return Err(SymbolError::DuplicateBinding {
                name: new.to_string(),
                scope: id.clone(),
            }
            .into());
        }
        let new = if kind.is_lexical() && self.would_capture(id, old, new) {
            let declared = self.declared_names();
            let fresh = first_free_name(new, |name| {
                declared.contains(name) || self.would_capture(id, old, name)
            });
            debug!(block = %id, wanted = new, to = %fresh, "rename would capture free references");
            fresh
        } else {
            new.to_string()
        };
        let new = new.as_str();

        let outcome = self.guarded(Operation::Rename, id, |ws| {
            if kind == BindingKind::GlobalVariable {
                ws.symbols.globals.rename(id, old, new)?;
            }
            let dependents = ws.resolver.dependents_of(id, old);
            if ws.propagation {
                ws.avoid_capture(id, kind, &dependents, new)?;
            }
            ws.graph.set_field(id, field, new)?;
            if kind == BindingKind::GlobalVariable {
                ws.claim_free_names();
            }
            if ws.graph.get_block(id)?.kind.is_procedure_definition() {
                ws.sync_signature(id)?;
                if ws.propagation {
                    for caller in ws.symbols.procedures.callers(id) {
                        ws.sync_call_arguments(&caller)?;
                    }
                }
            }

            let mut updated = Vec::new();
            if ws.propagation {
                for reference in &dependents {
                    let spelled_global = ws
                        .graph
                        .get_block(reference)?
                        .field("VAR")
                        .is_some_and(|var| var.starts_with(GLOBAL_PREFIX));
                    let replacement = if spelled_global {
                        format!("{}{}", GLOBAL_PREFIX, new)
                    } else {
                        new.to_string()
                    };
                    ws.graph.set_field(reference, "VAR", &replacement)?;
                    updated.push(reference.clone());
                }
            }
            for reference in &dependents {
                ws.refresh(reference);
            }
            let mut sweep = ws.resolver.unresolved_named(&ws.graph, new);
            sweep.extend(ws.graph.descendants(id).into_iter().filter(|inner| {
                ws.graph
                    .block(inner)
                    .and_then(Block::referenced_name)
                    .is_some_and(|name| name == new)
            }));
            for reference in &sweep {
                ws.refresh(reference);
            }
            if kind == BindingKind::GlobalVariable {
                ws.refresh_waiting(old);
            }
            debug!(block = %id, old, new, updated = updated.len(), "renamed binding");
            ws.notify(RenameEvent {
                block: id.clone(),
                kind,
                old: old.to_string(),
                new: new.to_string(),
                updated: updated.clone(),
            });
            Ok(RenameOutcome::Applied {
                name: new.to_string(),
                updated,
            })
        })?;
        Ok(outcome.unwrap_or(RenameOutcome::Suppressed))
    }

    /// Renames inner declarations of `new` that sit between a dependent
    /// reference and its binding, so the reference is not captured.
    fn avoid_capture(
        &mut self,
        id: &BlockId,
        kind: BindingKind,
        dependents: &[BlockId],
        new: &str,
    ) -> Result<(), WorkspaceError> {
        let until = kind.is_lexical().then_some(id);
        let mut captors = Vec::<Binding>::new();
        for reference in dependents {
            let spelled_global = self
                .graph
                .block(reference)
                .and_then(|block| block.field("VAR"))
                .is_some_and(|var| var.starts_with(GLOBAL_PREFIX));
            if spelled_global {
                continue;
            }
            for binding in scope::visible_bindings(&self.graph, reference, until) {
                if binding.name == new && binding.block != *id && !captors.contains(&binding) {
                    captors.push(binding);
                }
            }
        }
        for captor in captors {
            let fresh = self.fresh_variable_name(new);
            debug!(block = %captor.block, from = new, to = %fresh, "renaming captured declaration");
            self.rename_binding(&captor.block, new, &fresh)?;
        }
        Ok(())
    }

    /// Replaces a block's mutation. References to names the mutation drops
    /// become unresolved; they are never deleted.
    pub fn set_mutation(
        &mut self,
        id: &BlockId,
        mutation: Mutation,
    ) -> Result<MutationOutcome, WorkspaceError> {
        let current = self.graph.get_block(id)?.mutation.clone();
        for name in mutation.declared_names() {
            if !current.declared_names().contains(name) {
                validate_identifier(name)?;
            }
        }
        let outcome = self.guarded(Operation::Mutation, id, |ws| {
            let change = ws.graph.set_mutation(id, mutation)?;
            for name in &change.removed_names {
                for reference in ws.resolver.dependents_of(id, name) {
                    ws.refresh(&reference);
                }
            }
            for name in &change.added_names {
                let mut waiting = ws.resolver.unresolved_named(&ws.graph, name);
                waiting.extend(ws.graph.descendants(id).into_iter().filter(|inner| {
                    ws.graph
                        .block(inner)
                        .and_then(Block::referenced_name)
                        .is_some_and(|field| field == name.as_str())
                }));
                for reference in waiting {
                    ws.refresh(&reference);
                }
            }
            for child in &change.detached {
                ws.refresh_subtree(child);
            }
            let kind = ws.graph.get_block(id)?.kind.clone();
            if kind.is_procedure_definition() {
                ws.sync_signature(id)?;
                if ws.propagation {
                    for caller in ws.symbols.procedures.callers(id) {
                        ws.sync_call_arguments(&caller)?;
                    }
                }
            } else if kind.is_procedure_call() {
                ws.refresh(id);
            }
            debug!(
                block = %id,
                removed = change.removed_names.len(),
                detached = change.detached.len(),
                "applied mutation"
            );
            Ok(change)
        })?;
        Ok(match outcome {
            Some(change) => MutationOutcome::Applied(change),
            None => MutationOutcome::Suppressed,
        })
    }

    /// Current resolution of a reference, computing it if it is not cached.
    pub fn resolve(&mut self, id: &BlockId) -> Option<Resolution> {
        if let Some(cached) = self.resolver.cached(id) {
            return Some(cached.clone());
        }
        let resolution = self.resolver.resolve(&self.graph, &self.symbols, id);
        self.sync_caller(id);
        resolution
    }

    pub fn resolution(&self, id: &BlockId) -> Option<&Resolution> {
        self.resolver.cached(id)
    }

    pub fn get_procedure(&self, id: &BlockId) -> Result<Binding, WorkspaceError> {
        self.symbols
            .procedures
            .get_procedure(id)
            .ok_or_else(|| SymbolError::ProcedureNotFound(id.clone()).into())
    }

    /// Getter and setter for `name`, as offered by a parameter's flydown.
    pub fn flydown_blocks(&mut self, name: &str) -> Result<[BlockId; 2], WorkspaceError> {
        let getter = self.graph.add_block(BlockKind::LexicalVariableGet);
        let setter = self.graph.add_block(BlockKind::LexicalVariableSet);
        for id in [&getter, &setter] {
            self.graph.set_field(id, "VAR", name)?;
            self.refresh(id);
        }
        Ok([getter, setter])
    }

    fn guarded<T>(
        &mut self,
        operation: Operation,
        target: &BlockId,
        f: impl FnOnce(&mut Self) -> Result<T, WorkspaceError>,
    ) -> Result<Option<T>, WorkspaceError> {
        if !self.guard.enter(operation, target) {
            warn!(?operation, block = %target, "suppressed re-entrant operation");
            return Ok(None);
        }
        let result = f(self);
        self.guard.exit(operation, target);
        result.map(Some)
    }

    fn notify(&mut self, event: RenameEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.iter_mut() {
            listener(self, &event);
        }
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    fn refresh(&mut self, id: &BlockId) {
        self.resolver.resolve(&self.graph, &self.symbols, id);
        self.sync_caller(id);
    }

    fn refresh_subtree(&mut self, root: &BlockId) {
        for id in self
            .resolver
            .resolve_subtree(&self.graph, &self.symbols, root)
        {
            self.sync_caller(&id);
        }
    }

    fn sync_caller(&mut self, id: &BlockId) {
        let target = match self.resolver.cached(id).and_then(Resolution::binding) {
            Some(binding) if binding.kind == BindingKind::Procedure => Some(binding.block.clone()),
            _ => None,
        };
        match target {
            Some(procedure) => self.symbols.procedures.attach_caller(id, &procedure),
            None => self.symbols.procedures.detach_caller(id),
        }
    }

    fn sync_signature(&mut self, id: &BlockId) -> Result<(), WorkspaceError> {
        let block = self.graph.get_block(id)?;
        let params = block.mutation.declared_names().to_vec();
        let returns = block.kind == BlockKind::ProcedureDefReturn;
        if self.symbols.procedures.entry(id).is_some() {
            self.symbols.procedures.set_signature(id, params, returns)?;
        }
        Ok(())
    }

    /// Gives a call block one argument socket per parameter of its target.
    fn sync_call_arguments(&mut self, caller: &BlockId) -> Result<(), WorkspaceError> {
        let Some(target) = self
            .resolver
            .cached(caller)
            .and_then(Resolution::binding)
            .map(|binding| binding.block.clone())
        else {
            return Ok(());
        };
        let Some(entry) = self.symbols.procedures.entry(&target) else {
            return Ok(());
        };
        let wanted = Mutation::Call {
            name: entry.name.clone(),
            args: entry.params.clone(),
        };
        if self.graph.get_block(caller)?.mutation != wanted {
            self.set_mutation(caller, wanted)?;
        }
        Ok(())
    }

    /// Registers unregistered procedure and global declarations whose names
    /// are free, in document order.
    fn claim_free_names(&mut self) {
        let declarations = self
            .graph
            .blocks()
            .filter(|block| {
                block.kind.is_procedure_definition() || block.kind == BlockKind::GlobalDeclaration
            })
            .map(|block| {
                (
                    block.id.clone(),
                    block.kind.clone(),
                    block.field("NAME").unwrap_or_default().to_string(),
                )
            })
            .collect::<Vec<_>>();
        for (id, kind, name) in declarations {
            if kind == BlockKind::GlobalDeclaration {
                if self.symbols.globals.owner(&name).is_none() {
                    let _ = self.symbols.globals.declare(&name, &id);
                }
                continue;
            }
            if self.symbols.procedures.entry(&id).is_some() {
                continue;
            }
            match self.symbols.procedures.add_procedure(&name, &id) {
                Ok(()) => {
                    if let Err(err) = self.sync_signature(&id) {
                        warn!(block = %id, %err, "could not record procedure signature");
                    }
                }
                Err(err) => debug!(block = %id, %err, "procedure left unregistered"),
            }
        }
    }

    fn declared_names(&self) -> HashSet<String> {
        self.graph
            .blocks()
            .flat_map(|block| block.declared_bindings())
            .map(|binding| binding.name)
            .collect()
    }

    fn fresh_variable_name(&self, base: &str) -> String {
        let declared = self.declared_names();
        first_free_name(base, |name| declared.contains(name))
    }

    /// Whether renaming `old` declared by `id` to `name` would bind some
    /// variable reference in its scope that currently means something else.
    fn would_capture(&self, id: &BlockId, old: &str, name: &str) -> bool {
        self.graph.descendants(id).iter().any(|inner| {
            let spelled = self.graph.block(inner).is_some_and(|block| {
                block.kind.is_variable_reference() && block.field("VAR") == Some(name)
            });
            spelled
                && scope::visible_bindings(&self.graph, inner, None)
                    .into_iter()
                    .find(|binding| {
                        binding.name == name || (binding.block == *id && binding.name == old)
                    })
                    .is_some_and(|binding| binding.block == *id && binding.name == old)
        })
    }

    /// Re-resolves references still waiting on `name`.
    fn refresh_waiting(&mut self, name: &str) {
        for waiting in self.resolver.unresolved_named(&self.graph, name) {
            self.refresh(&waiting);
        }
    }
}

/// `base`, or `base2`, `base3`, ... whichever is free first.
fn first_free_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Name declared through field `field` of `block`, if that field declares one.
fn declared_name_in_field(block: &Block, field: &str) -> Option<String> {
    match block.kind {
        BlockKind::ProcedureDefNoReturn
        | BlockKind::ProcedureDefReturn
        | BlockKind::LocalDeclarationStatement
        | BlockKind::LocalDeclarationExpression => indexed(field, "VAR")
            .and_then(|index| block.mutation.declared_names().get(index).cloned()),
        BlockKind::ForRange | BlockKind::ForEach if field == "VAR" => {
            block.field("VAR").map(str::to_string)
        }
        BlockKind::GlobalDeclaration if field == "NAME" => {
            block.field("NAME").map(str::to_string)
        }
        _ => None,
    }
}
