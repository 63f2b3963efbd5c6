use crate::block::{BlockId, BindingKind};
pub use crate::block::Binding;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"^[^-0-9!&%^/>=<`'"#:;,\\*+.()|{}\[\]\s][^-!&%^/>=<`'"#:;,\\*+.()|{}\[\]\s]*$"##)
        .expect("identifier pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("procedure name '{name}' is already used by block '{existing}'")]
    DuplicateProcedure { name: String, existing: BlockId },
    #[error("global '{name}' is already declared by block '{existing}'")]
    DuplicateGlobal { name: String, existing: BlockId },
    #[error("'{name}' is already bound in the scope of block '{scope}'")]
    DuplicateBinding { name: String, scope: BlockId },
    #[error("'{0}' is not a legal name")]
    InvalidName(String),
    #[error("no procedure is defined by block '{0}'")]
    ProcedureNotFound(BlockId),
}

/// Checks a name against the characters Yail reserves.
pub fn validate_identifier(name: &str) -> Result<(), SymbolError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SymbolError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureEntry {
    pub id: BlockId,
    pub name: String,
    pub params: Vec<String>,
    pub returns: bool,
}

/// Procedures keyed both ways, plus which call blocks currently target each one.
#[derive(Debug, Clone, Default)]
pub struct ProcedureDatabase {
    by_id: HashMap<BlockId, ProcedureEntry>,
    by_name: HashMap<String, BlockId>,
    callers: HashMap<BlockId, BTreeSet<BlockId>>,
    call_targets: HashMap<BlockId, BlockId>,
}

impl ProcedureDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn add_procedure(&mut self, name: &str, id: &BlockId) -> Result<(), SymbolError> {
        if let Some(existing) = self.by_name.get(name) {
            if existing == id {
                return Ok(());
            }
            return Err(SymbolError::DuplicateProcedure {
                name: name.to_string(),
                existing: existing.clone(),
            });
        }
        if let Some(previous) = self.by_id.get(id).map(|entry| entry.name.clone()) {
            self.by_name.remove(&previous);
        }
        let entry = self.by_id.entry(id.clone()).or_insert_with(|| ProcedureEntry {
            id: id.clone(),
            name: String::new(),
            params: Vec::new(),
            returns: false,
        });
        entry.name = name.to_string();
        self.by_name.insert(name.to_string(), id.clone());
        debug!(procedure = %id, name, "registered procedure");
        Ok(())
    }

    /// Moves procedure `id` from `old` to `new` and returns the callers that
    /// must have their `PROCNAME` rewritten.
    pub fn rename_procedure(
        &mut self,
        id: &BlockId,
        old: &str,
        new: &str,
    ) -> Result<Vec<BlockId>, SymbolError> {
        if !self.by_id.contains_key(id) {
            self.add_procedure(new, id)?;
            return Ok(Vec::new());
        }
        if old == new {
            return Ok(Vec::new());
        }
        if let Some(existing) = self.by_name.get(new) {
            if existing != id {
                return Err(SymbolError::DuplicateProcedure {
                    name: new.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        let Some(entry) = self.by_id.get_mut(id) else {
            return Err(SymbolError::ProcedureNotFound(id.clone()));
        };
        if self.by_name.get(&entry.name) == Some(id) {
            self.by_name.remove(&entry.name);
        }
        entry.name = new.to_string();
        self.by_name.insert(new.to_string(), id.clone());
        let callers = self.callers(id);
        debug!(procedure = %id, old, new, callers = callers.len(), "renamed procedure");
        Ok(callers)
    }

    pub fn get_procedure(&self, id: &BlockId) -> Option<Binding> {
        self.by_id.get(id).map(|entry| Binding {
            name: entry.name.clone(),
            block: id.clone(),
            kind: BindingKind::Procedure,
        })
    }

    pub fn entry(&self, id: &BlockId) -> Option<&ProcedureEntry> {
        self.by_id.get(id)
    }

    pub fn lookup(&self, name: &str) -> Option<&ProcedureEntry> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn set_signature(
        &mut self,
        id: &BlockId,
        params: Vec<String>,
        returns: bool,
    ) -> Result<(), SymbolError> {
        let entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| SymbolError::ProcedureNotFound(id.clone()))?;
        entry.params = params;
        entry.returns = returns;
        Ok(())
    }

    /// Drops the procedure and returns the callers that pointed at it.
    pub fn remove_procedure(&mut self, id: &BlockId) -> Vec<BlockId> {
        let Some(entry) = self.by_id.remove(id) else {
            return Vec::new();
        };
        if self.by_name.get(&entry.name) == Some(id) {
            self.by_name.remove(&entry.name);
        }
        let orphans = self
            .callers
            .remove(id)
            .map(|set| set.into_iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for caller in &orphans {
            self.call_targets.remove(caller);
        }
        orphans
    }

    pub fn attach_caller(&mut self, caller: &BlockId, procedure: &BlockId) {
        self.detach_caller(caller);
        self.callers
            .entry(procedure.clone())
            .or_default()
            .insert(caller.clone());
        self.call_targets.insert(caller.clone(), procedure.clone());
    }

    pub fn detach_caller(&mut self, caller: &BlockId) {
        if let Some(previous) = self.call_targets.remove(caller) {
            if let Some(set) = self.callers.get_mut(&previous) {
                set.remove(caller);
            }
        }
    }

    pub fn callers(&self, id: &BlockId) -> Vec<BlockId> {
        self.callers
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.by_name.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Global variable declarations. The first block to claim a name keeps it.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    by_name: BTreeMap<String, BlockId>,
}

impl GlobalTable {
    pub fn declare(&mut self, name: &str, id: &BlockId) -> Result<(), SymbolError> {
        match self.by_name.get(name) {
            Some(existing) if existing == id => Ok(()),
            Some(existing) => Err(SymbolError::DuplicateGlobal {
                name: name.to_string(),
                existing: existing.clone(),
            }),
            None => {
                self.by_name.insert(name.to_string(), id.clone());
                Ok(())
            }
        }
    }

    pub fn rename(&mut self, id: &BlockId, old: &str, new: &str) -> Result<(), SymbolError> {
        if old == new {
            return Ok(());
        }
        if let Some(existing) = self.by_name.get(new) {
            if existing != id {
                return Err(SymbolError::DuplicateGlobal {
                    name: new.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        if self.by_name.get(old) == Some(id) {
            self.by_name.remove(old);
        }
        self.by_name.insert(new.to_string(), id.clone());
        Ok(())
    }

    pub fn remove(&mut self, id: &BlockId) {
        self.by_name.retain(|_, owner| owner != id);
    }

    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.by_name.get(name).map(|id| Binding {
            name: name.to_string(),
            block: id.clone(),
            kind: BindingKind::GlobalVariable,
        })
    }

    pub fn owner(&self, name: &str) -> Option<&BlockId> {
        self.by_name.get(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub procedures: ProcedureDatabase,
    pub globals: GlobalTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> BlockId {
        BlockId::from(raw)
    }

    #[test]
    fn renaming_moves_the_name_and_reports_callers() {
        let mut db = ProcedureDatabase::new();
        db.add_procedure("foo", &id("P1")).unwrap();
        db.attach_caller(&id("C1"), &id("P1"));
        db.attach_caller(&id("C2"), &id("P1"));

        let callers = db.rename_procedure(&id("P1"), "foo", "bar").unwrap();
        assert_eq!(callers, vec![id("C1"), id("C2")]);
        assert!(db.lookup("foo").is_none());
        assert_eq!(db.lookup("bar").map(|e| e.id.clone()), Some(id("P1")));
        assert_eq!(db.get_procedure(&id("P1")).unwrap().name, "bar");
    }

    #[test]
    fn rename_is_idempotent_and_registers_unknown_blocks() {
        let mut db = ProcedureDatabase::new();
        assert!(db.rename_procedure(&id("P1"), "", "foo").unwrap().is_empty());
        assert_eq!(db.names(), vec!["foo".to_string()]);
        assert!(db.rename_procedure(&id("P1"), "foo", "foo").unwrap().is_empty());
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn rename_onto_a_taken_name_fails() {
        let mut db = ProcedureDatabase::new();
        db.add_procedure("foo", &id("P1")).unwrap();
        db.add_procedure("bar", &id("P2")).unwrap();
        let err = db.rename_procedure(&id("P1"), "foo", "bar").unwrap_err();
        assert_eq!(
            err,
            SymbolError::DuplicateProcedure {
                name: "bar".to_string(),
                existing: id("P2"),
            }
        );
        assert_eq!(db.get_procedure(&id("P1")).unwrap().name, "foo");
        assert!(db.add_procedure("foo", &id("P3")).is_err());
    }

    #[test]
    fn removing_a_procedure_orphans_its_callers() {
        let mut db = ProcedureDatabase::new();
        db.add_procedure("foo", &id("P1")).unwrap();
        db.attach_caller(&id("C1"), &id("P1"));
        assert_eq!(db.remove_procedure(&id("P1")), vec![id("C1")]);
        assert!(db.lookup("foo").is_none());
        assert!(db.get_procedure(&id("P1")).is_none());
    }

    #[test]
    fn first_global_wins() {
        let mut globals = GlobalTable::default();
        globals.declare("count", &id("G1")).unwrap();
        assert!(globals.declare("count", &id("G2")).is_err());
        assert_eq!(globals.owner("count"), Some(&id("G1")));
        globals.remove(&id("G1"));
        globals.declare("count", &id("G2")).unwrap();
        assert_eq!(globals.lookup("count").map(|b| b.block), Some(id("G2")));
    }

    #[test]
    fn identifier_rules() {
        for good in ["x", "total2", "é_name", "camelCase", "x?"] {
            assert!(validate_identifier(good).is_ok(), "{good}");
        }
        for bad in ["", "2x", "-x", "x-y", "a b", "a.b", "a(b", "say\"hi", "x;"] {
            assert!(validate_identifier(bad).is_err(), "{bad}");
        }
    }
}
