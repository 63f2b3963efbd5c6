use crate::block::BlockId;
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    DuplicateProcedure,
    DuplicateParameter,
    DuplicateLocal,
    DuplicateGlobal,
    UnresolvedVariable,
    UnresolvedProcedure,
    ArityMismatch,
    BreakOutsideLoop,
    UndefinedBlock,
    EmptySocket,
    InvalidName,
    InvalidLiteral,
    OrphanedBlock,
}

impl DiagnosticKind {
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::DuplicateProcedure => "duplicate-procedure",
            DiagnosticKind::DuplicateParameter => "duplicate-parameter",
            DiagnosticKind::DuplicateLocal => "duplicate-local",
            DiagnosticKind::DuplicateGlobal => "duplicate-global",
            DiagnosticKind::UnresolvedVariable => "unresolved-variable",
            DiagnosticKind::UnresolvedProcedure => "unresolved-procedure",
            DiagnosticKind::ArityMismatch => "arity-mismatch",
            DiagnosticKind::BreakOutsideLoop => "break-outside-loop",
            DiagnosticKind::UndefinedBlock => "undefined-block",
            DiagnosticKind::EmptySocket => "empty-socket",
            DiagnosticKind::InvalidName => "invalid-name",
            DiagnosticKind::InvalidLiteral => "invalid-literal",
            DiagnosticKind::OrphanedBlock => "orphaned-block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub block: BlockId,
}

impl Diagnostic {
    pub fn to_json(&self) -> Value {
        json!({
            "severity": self.severity.as_str(),
            "kind": self.kind.code(),
            "message": self.message,
            "block": self.block.as_str(),
        })
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity.as_str(),
            self.kind.code(),
            self.block,
            self.message
        )
    }
}

/// Ordered, append-only list of findings for one generation run.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollector {
    items: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        severity: Severity,
        kind: DiagnosticKind,
        block: &BlockId,
        message: impl Into<String>,
    ) {
        self.items.push(Diagnostic {
            severity,
            kind,
            message: message.into(),
            block: block.clone(),
        });
    }

    pub fn warning(&mut self, kind: DiagnosticKind, block: &BlockId, message: impl Into<String>) {
        self.push(Severity::Warning, kind, block, message);
    }

    pub fn error(&mut self, kind: DiagnosticKind, block: &BlockId, message: impl Into<String>) {
        self.push(Severity::Error, kind, block, message);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn collect(self) -> Vec<Diagnostic> {
        self.items
    }
}

pub fn diagnostics_to_json(diagnostics: &[Diagnostic]) -> Value {
    Value::Array(diagnostics.iter().map(Diagnostic::to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_without_deduplication() {
        let block = BlockId::from("b1");
        let mut collector = DiagnosticCollector::new();
        collector.error(DiagnosticKind::UnresolvedVariable, &block, "no binding for 'x'");
        collector.warning(DiagnosticKind::DuplicateParameter, &block, "'a' repeated");
        collector.error(DiagnosticKind::UnresolvedVariable, &block, "no binding for 'x'");
        assert!(collector.has_errors());
        let items = collector.collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].kind, DiagnosticKind::DuplicateParameter);
        assert_eq!(items[0], items[2]);
    }

    #[test]
    fn renders_text_and_json() {
        let mut collector = DiagnosticCollector::new();
        collector.warning(
            DiagnosticKind::DuplicateParameter,
            &BlockId::from("block_3"),
            "parameter 'a' is declared twice",
        );
        let items = collector.collect();
        assert_eq!(
            items[0].to_string(),
            "warning[duplicate-parameter] block_3: parameter 'a' is declared twice"
        );
        assert_eq!(
            diagnostics_to_json(&items),
            json!([{
                "severity": "warning",
                "kind": "duplicate-parameter",
                "message": "parameter 'a' is declared twice",
                "block": "block_3",
            }])
        );
    }
}
