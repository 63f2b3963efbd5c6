use crate::block::{Binding, BindingKind, BlockId, Slot};
use crate::graph::BlockGraph;
use crate::symbols::SymbolTable;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// `VAR` prefix that makes a getter or setter skip lexical scopes.
pub const GLOBAL_PREFIX: &str = "global ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Bound(Binding),
    Unresolved { name: String },
}

impl Resolution {
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Resolution::Bound(binding) => Some(binding),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Resolution::Bound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub block: BlockId,
    pub name: String,
}

impl From<&Binding> for BindingKey {
    fn from(binding: &Binding) -> Self {
        Self {
            block: binding.block.clone(),
            name: binding.name.clone(),
        }
    }
}

/// Resolves one getter, setter or call without touching any cache. Returns
/// `None` for blocks that are not references.
pub fn resolve_reference(
    graph: &BlockGraph,
    symbols: &SymbolTable,
    id: &BlockId,
) -> Option<Resolution> {
    let block = graph.block(id)?;
    let name = block.referenced_name()?;
    if block.kind.is_procedure_call() {
        return Some(match symbols.procedures.lookup(name) {
            Some(entry) => Resolution::Bound(Binding {
                name: entry.name.clone(),
                block: entry.id.clone(),
                kind: BindingKind::Procedure,
            }),
            None => Resolution::Unresolved {
                name: name.to_string(),
            },
        });
    }
    let found = match name.strip_prefix(GLOBAL_PREFIX) {
        Some(global) => symbols.globals.lookup(global),
        None => lexical_lookup(graph, id, name).or_else(|| symbols.globals.lookup(name)),
    };
    Some(match found {
        Some(binding) => Resolution::Bound(binding),
        None => Resolution::Unresolved {
            name: name.to_string(),
        },
    })
}

/// Innermost binding of `name` visible at `from`, walking parent links and
/// only counting bindings exposed through the slot we came up through.
pub fn lexical_lookup(graph: &BlockGraph, from: &BlockId, name: &str) -> Option<Binding> {
    visible_bindings(graph, from, None)
        .into_iter()
        .find(|binding| binding.name == name)
}

/// Lexical bindings visible at `from`, innermost first. With `until`, the
/// walk stops before reaching that block.
pub fn visible_bindings(
    graph: &BlockGraph,
    from: &BlockId,
    until: Option<&BlockId>,
) -> Vec<Binding> {
    let mut out = Vec::new();
    for link in graph.ancestors(from) {
        if Some(&link.block) == until {
            break;
        }
        let Slot::Input(slot) = &link.slot else {
            continue;
        };
        if let Some(block) = graph.block(&link.block) {
            out.extend(block.bindings_visible_in(slot));
        }
    }
    out
}

/// Cached resolutions with a reverse index from bindings to the references
/// that currently resolve to them.
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    cache: HashMap<BlockId, Resolution>,
    dependents: HashMap<BindingKey, BTreeSet<BlockId>>,
    unresolved: BTreeSet<BlockId>,
}

impl ScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        graph: &BlockGraph,
        symbols: &SymbolTable,
        id: &BlockId,
    ) -> Option<Resolution> {
        let Some(resolution) = resolve_reference(graph, symbols, id) else {
            self.forget(id);
            return None;
        };
        self.record(id, resolution.clone());
        Some(resolution)
    }

    pub fn cached(&self, id: &BlockId) -> Option<&Resolution> {
        self.cache.get(id)
    }

    pub fn forget(&mut self, id: &BlockId) {
        if let Some(Resolution::Bound(binding)) = self.cache.remove(id) {
            let key = BindingKey::from(&binding);
            if let Some(set) = self.dependents.get_mut(&key) {
                set.remove(id);
                if set.is_empty() {
                    self.dependents.remove(&key);
                }
            }
        }
        self.unresolved.remove(id);
    }

    fn record(&mut self, id: &BlockId, resolution: Resolution) {
        self.forget(id);
        match &resolution {
            Resolution::Bound(binding) => {
                self.dependents
                    .entry(BindingKey::from(binding))
                    .or_default()
                    .insert(id.clone());
            }
            Resolution::Unresolved { .. } => {
                self.unresolved.insert(id.clone());
            }
        }
        self.cache.insert(id.clone(), resolution);
    }

    /// References that resolved to the binding `name` introduced by `block`.
    pub fn dependents_of(&self, block: &BlockId, name: &str) -> Vec<BlockId> {
        self.dependents
            .get(&BindingKey {
                block: block.clone(),
                name: name.to_string(),
            })
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unresolved(&self) -> Vec<BlockId> {
        self.unresolved.iter().cloned().collect()
    }

    /// Unresolved references whose field currently spells `name`.
    pub fn unresolved_named(&self, graph: &BlockGraph, name: &str) -> Vec<BlockId> {
        self.unresolved
            .iter()
            .filter(|id| {
                graph
                    .block(id)
                    .and_then(|block| block.referenced_name())
                    .is_some_and(|field| field == name || field.strip_prefix(GLOBAL_PREFIX) == Some(name))
            })
            .cloned()
            .collect()
    }

    /// Re-resolves every reference in `root`'s subtree and the rest of its
    /// chain, returning the references visited.
    pub fn resolve_subtree(
        &mut self,
        graph: &BlockGraph,
        symbols: &SymbolTable,
        root: &BlockId,
    ) -> Vec<BlockId> {
        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for head in graph.chain(root) {
            let ids = std::iter::once(head.clone()).chain(graph.descendants(&head));
            for id in ids {
                if seen.insert(id.clone()) && self.resolve(graph, symbols, &id).is_some() {
                    references.push(id);
                }
            }
        }
        references
    }

    pub fn resolve_all(&mut self, graph: &BlockGraph, symbols: &SymbolTable) -> Vec<BlockId> {
        self.cache.clear();
        self.dependents.clear();
        self.unresolved.clear();
        let ids = graph
            .blocks()
            .filter(|block| block.kind.is_reference())
            .map(|block| block.id.clone())
            .collect::<Vec<_>>();
        for id in &ids {
            self.resolve(graph, symbols, id);
        }
        debug!(
            references = ids.len(),
            unresolved = self.unresolved.len(),
            "resolved workspace"
        );
        ids
    }
}
