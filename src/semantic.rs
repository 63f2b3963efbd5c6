use crate::block::{Block, BlockKind, Shape, Slot};
use crate::diagnostics::{DiagnosticCollector, DiagnosticKind};
use crate::symbols::validate_identifier;
use crate::workspace::Snapshot;
use std::collections::HashSet;

/// Structural checks that run before emission. Everything found here is a
/// diagnostic; nothing stops generation.
pub fn analyze(snapshot: &Snapshot<'_>, diagnostics: &mut DiagnosticCollector) {
    for block in snapshot.graph.blocks() {
        let root = snapshot.graph.root_of(&block.id);
        let in_definition = snapshot
            .graph
            .block(&root)
            .is_some_and(|root| root.kind.shape() == Shape::Definition);
        if !in_definition {
            continue;
        }
        check_declarations(snapshot, block, diagnostics);
        match block.kind {
            BlockKind::Break => check_break(snapshot, block, diagnostics),
            BlockKind::ProcedureCallNoReturn | BlockKind::ProcedureCallReturn => {
                check_arity(snapshot, block, diagnostics)
            }
            BlockKind::MathNumber => check_number(block, diagnostics),
            BlockKind::Colour(_) => check_colour(block, diagnostics),
            _ => {}
        }
    }
}

fn check_declarations(snapshot: &Snapshot<'_>, block: &Block, diagnostics: &mut DiagnosticCollector) {
    match block.kind {
        BlockKind::ProcedureDefNoReturn | BlockKind::ProcedureDefReturn => {
            let name = block.field("NAME").unwrap_or_default();
            ensure_identifier(block, "procedure", name, diagnostics);
            let owner = snapshot.symbols.procedures.lookup(name).map(|e| &e.id);
            if owner.is_some_and(|owner| *owner != block.id) {
                diagnostics.warning(
                    DiagnosticKind::DuplicateProcedure,
                    &block.id,
                    format!(
                        "procedure '{}' is already defined by block '{}'; this definition is ignored",
                        name,
                        owner.map(|o| o.as_str()).unwrap_or_default()
                    ),
                );
            }
            ensure_unique_names(block, "parameter", DiagnosticKind::DuplicateParameter, diagnostics);
        }
        BlockKind::LocalDeclarationStatement | BlockKind::LocalDeclarationExpression => {
            ensure_unique_names(block, "local", DiagnosticKind::DuplicateLocal, diagnostics);
        }
        BlockKind::ForRange | BlockKind::ForEach => {
            let name = block.field("VAR").unwrap_or_default();
            ensure_identifier(block, "loop variable", name, diagnostics);
        }
        BlockKind::GlobalDeclaration => {
            let name = block.field("NAME").unwrap_or_default();
            ensure_identifier(block, "global", name, diagnostics);
            if let Some(owner) = snapshot.symbols.globals.owner(name) {
                if *owner != block.id {
                    diagnostics.warning(
                        DiagnosticKind::DuplicateGlobal,
                        &block.id,
                        format!(
                            "global '{}' is already declared by block '{}'; this declaration is ignored",
                            name, owner
                        ),
                    );
                }
            }
        }
        _ => {}
    }
}

fn ensure_unique_names(
    block: &Block,
    what: &str,
    kind: DiagnosticKind,
    diagnostics: &mut DiagnosticCollector,
) {
    let mut seen = HashSet::new();
    for name in block.mutation.declared_names() {
        ensure_identifier(block, what, name, diagnostics);
        if !seen.insert(name.as_str()) {
            diagnostics.warning(
                kind,
                &block.id,
                format!("{} '{}' is declared more than once", what, name),
            );
        }
    }
}

fn ensure_identifier(block: &Block, what: &str, name: &str, diagnostics: &mut DiagnosticCollector) {
    if validate_identifier(name).is_err() {
        diagnostics.error(
            DiagnosticKind::InvalidName,
            &block.id,
            format!("'{}' is not a legal {} name", name, what),
        );
    }
}

fn check_break(snapshot: &Snapshot<'_>, block: &Block, diagnostics: &mut DiagnosticCollector) {
    for link in snapshot.graph.ancestors(&block.id) {
        let Some(parent) = snapshot.graph.block(&link.block) else {
            break;
        };
        if parent.kind.is_loop() && link.slot == Slot::Input("DO".to_string()) {
            return;
        }
        if parent.kind.shape() == Shape::Definition {
            break;
        }
    }
    diagnostics.error(
        DiagnosticKind::BreakOutsideLoop,
        &block.id,
        "break is only allowed inside a loop body",
    );
}

fn check_arity(snapshot: &Snapshot<'_>, block: &Block, diagnostics: &mut DiagnosticCollector) {
    let Some(binding) = snapshot.resolve(&block.id).and_then(|r| r.binding().cloned()) else {
        return;
    };
    let Some(entry) = snapshot.symbols.procedures.entry(&binding.block) else {
        return;
    };
    let given = block.mutation.arity();
    if given != entry.params.len() {
        diagnostics.error(
            DiagnosticKind::ArityMismatch,
            &block.id,
            format!(
                "'{}' takes {} argument(s) but this call supplies {}",
                entry.name,
                entry.params.len(),
                given
            ),
        );
    }
}

fn check_number(block: &Block, diagnostics: &mut DiagnosticCollector) {
    let raw = block.field("NUM").unwrap_or_default();
    if raw.trim().parse::<f64>().is_err() {
        diagnostics.error(
            DiagnosticKind::InvalidLiteral,
            &block.id,
            format!("'{}' is not a number", raw),
        );
    }
}

fn check_colour(block: &Block, diagnostics: &mut DiagnosticCollector) {
    let raw = block.field("COLOUR").unwrap_or_default();
    if parse_hex_colour(raw).is_none() {
        diagnostics.error(
            DiagnosticKind::InvalidLiteral,
            &block.id,
            format!("'{}' is not a #rrggbb colour", raw),
        );
    }
}

/// `#rrggbb` as an opaque ARGB value.
pub fn parse_hex_colour(raw: &str) -> Option<i32> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let rgb = u32::from_str_radix(hex, 16).ok()?;
    Some((0xFF00_0000 | rgb) as i32)
}
