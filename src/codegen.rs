use crate::block::{Binding, BindingKind, Block, BlockId, BlockKind, Shape};
use crate::diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticKind, Severity};
use crate::graph::BlockGraph;
use crate::scope::Resolution;
use crate::semantic::{self, parse_hex_colour};
use crate::workspace::Snapshot;
use crate::yail::Yail;
use std::collections::HashSet;
use tracing::debug;

const RENDER_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Report top-level blocks that sit outside any definition.
    pub warn_orphans: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { warn_orphans: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelForm {
    pub block: BlockId,
    pub code: Yail,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub forms: Vec<TopLevelForm>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Generation {
    pub fn render(&self) -> String {
        let mut out = self
            .forms
            .iter()
            .map(|form| form.code.pretty(RENDER_WIDTH))
            .collect::<Vec<_>>()
            .join("\n\n");
        out.push('\n');
        out
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Emits one Yail form per live definition, in document order. Problems
/// become placeholders plus diagnostics; generation always finishes.
pub fn generate(snapshot: &Snapshot<'_>, options: &GenerateOptions) -> Generation {
    let mut diagnostics = DiagnosticCollector::new();
    semantic::analyze(snapshot, &mut diagnostics);
    let mut emitter = Emitter {
        snapshot: *snapshot,
        diagnostics,
    };
    let mut forms = Vec::new();
    for root in snapshot.graph.top_level() {
        let Some(block) = snapshot.graph.block(&root) else {
            continue;
        };
        if block.kind.shape() == Shape::Definition {
            if let Some(code) = emitter.emit_definition(block) {
                forms.push(TopLevelForm { block: root, code });
            }
        } else if options.warn_orphans {
            emitter.diagnostics.warning(
                DiagnosticKind::OrphanedBlock,
                &root,
                format!(
                    "'{}' is not inside a definition and will not be compiled",
                    block.kind.type_name()
                ),
            );
        }
    }
    let diagnostics = emitter.diagnostics.collect();
    debug!(
        forms = forms.len(),
        diagnostics = diagnostics.len(),
        "generated yail"
    );
    Generation { forms, diagnostics }
}

struct Emitter<'a> {
    snapshot: Snapshot<'a>,
    diagnostics: DiagnosticCollector,
}

impl<'a> Emitter<'a> {
    fn graph(&self) -> &'a BlockGraph {
        self.snapshot.graph
    }

    fn emit_definition(&mut self, block: &'a Block) -> Option<Yail> {
        match block.kind {
            BlockKind::ProcedureDefNoReturn | BlockKind::ProcedureDefReturn => {
                let entry = self.snapshot.symbols.procedures.entry(&block.id)?;
                let mut header = vec![Yail::sym(procedure_symbol(&entry.name))];
                header.extend(declared_symbols(&entry.params));
                let mut form = vec![Yail::sym("def"), Yail::List(header)];
                if block.kind == BlockKind::ProcedureDefReturn {
                    form.push(self.value_input(block, "RETURN"));
                } else {
                    let body = self.emit_chain(block.input_block("STACK"));
                    if body.is_empty() {
                        form.push(Yail::begin(Vec::new()));
                    } else {
                        form.extend(body);
                    }
                }
                Some(Yail::List(form))
            }
            BlockKind::GlobalDeclaration => {
                let name = block.field("NAME").unwrap_or_default();
                if self.snapshot.symbols.globals.owner(name) != Some(&block.id) {
                    return None;
                }
                let value = self.value_input(block, "VALUE");
                Some(Yail::call("def", vec![Yail::sym(global_symbol(name)), value]))
            }
            _ => None,
        }
    }

    fn emit_chain(&mut self, start: Option<&BlockId>) -> Vec<Yail> {
        let Some(start) = start else {
            return Vec::new();
        };
        self.graph()
            .chain(start)
            .iter()
            .map(|id| self.emit_statement(id))
            .collect()
    }

    fn emit_body(&mut self, block: &'a Block, input: &str) -> Yail {
        Yail::begin(self.emit_chain(block.input_block(input)))
    }

    fn emit_statement(&mut self, id: &BlockId) -> Yail {
        let Some(block) = self.graph().block(id) else {
            return missing(id);
        };
        match &block.kind {
            BlockKind::LexicalVariableSet => {
                let value = self.value_input(block, "VALUE");
                match self.resolve_variable(block) {
                    Ok(binding) if binding.kind == BindingKind::GlobalVariable => Yail::call(
                        "set-var!",
                        vec![Yail::sym(global_symbol(&binding.name)), value],
                    ),
                    Ok(binding) => Yail::call(
                        "set-lexical!",
                        vec![Yail::sym(lexical_symbol(&binding.name)), value],
                    ),
                    Err(placeholder) => Yail::call("set-lexical!", vec![placeholder, value]),
                }
            }
            BlockKind::ProcedureCallNoReturn => self.emit_call(block),
            BlockKind::LocalDeclarationStatement => {
                let bindings = self.emit_local_bindings(block);
                let mut form = vec![Yail::sym("let"), bindings];
                let body = self.emit_chain(block.input_block("STACK"));
                if body.is_empty() {
                    form.push(Yail::begin(Vec::new()));
                } else {
                    form.extend(body);
                }
                Yail::List(form)
            }
            BlockKind::ForRange => {
                let var = Yail::sym(lexical_symbol(block.field("VAR").unwrap_or_default()));
                let start = self.value_input(block, "START");
                let end = self.value_input(block, "END");
                let step = self.value_input(block, "STEP");
                let body = self.emit_body(block, "DO");
                Yail::call("forrange", vec![var, body, start, end, step])
            }
            BlockKind::ForEach => {
                let var = Yail::sym(lexical_symbol(block.field("VAR").unwrap_or_default()));
                let list = self.value_input(block, "LIST");
                let body = self.emit_body(block, "DO");
                Yail::call("foreach", vec![var, body, list])
            }
            BlockKind::While => {
                let test = self.value_input(block, "TEST");
                let body = self.emit_body(block, "DO");
                Yail::call("while", vec![test, body])
            }
            BlockKind::If => self.emit_if(block),
            BlockKind::Break => Yail::call("break", vec![Yail::Bool(false)]),
            BlockKind::Undefined(ty) => self.undefined(block, ty),
            other => {
                self.diagnostics.error(
                    DiagnosticKind::UndefinedBlock,
                    &block.id,
                    format!("'{}' cannot be used as a statement", other.type_name()),
                );
                hole(&block.id, "value block in statement position")
            }
        }
    }

    fn emit_if(&mut self, block: &'a Block) -> Yail {
        let mut arms = Vec::new();
        let mut index = 0;
        while block.input(&format!("IF{}", index)).is_some() {
            let test = self.value_input(block, &format!("IF{}", index));
            let body = self.emit_body(block, &format!("DO{}", index));
            arms.push((test, body));
            index += 1;
        }
        let mut tail = block
            .input("ELSE")
            .map(|_| self.emit_body(block, "ELSE"));
        for (test, body) in arms.into_iter().rev() {
            let mut form = vec![Yail::sym("if"), test, body];
            form.extend(tail.take());
            tail = Some(Yail::List(form));
        }
        tail.unwrap_or_else(|| Yail::begin(Vec::new()))
    }

    fn emit_local_bindings(&mut self, block: &'a Block) -> Yail {
        let names = block.mutation.declared_names();
        let pairs = declared_symbols(names)
            .into_iter()
            .enumerate()
            .map(|(index, symbol)| {
                let init = self.value_input(block, &format!("DECL{}", index));
                Yail::List(vec![symbol, init])
            })
            .collect();
        Yail::List(pairs)
    }

    fn emit_call(&mut self, block: &'a Block) -> Yail {
        let args = (0..block.mutation.arity())
            .map(|index| self.value_input(block, &format!("ARG{}", index)))
            .collect::<Vec<_>>();
        match self.snapshot.resolve(&block.id) {
            Some(Resolution::Bound(binding)) => {
                let mut form = vec![Yail::call(
                    "get-var",
                    vec![Yail::sym(procedure_symbol(&binding.name))],
                )];
                form.extend(args);
                Yail::List(form)
            }
            _ => {
                let name = block.field("PROCNAME").unwrap_or_default();
                self.diagnostics.error(
                    DiagnosticKind::UnresolvedProcedure,
                    &block.id,
                    format!("no procedure named '{}'", name),
                );
                let mut form = vec![hole(&block.id, &format!("unresolved procedure {}", name))];
                form.extend(args);
                Yail::List(form)
            }
        }
    }

    fn emit_value(&mut self, id: &BlockId) -> Yail {
        let Some(block) = self.graph().block(id) else {
            return missing(id);
        };
        match &block.kind {
            BlockKind::LexicalVariableGet => match self.resolve_variable(block) {
                Ok(binding) if binding.kind == BindingKind::GlobalVariable => Yail::call(
                    "get-var",
                    vec![Yail::sym(global_symbol(&binding.name))],
                ),
                Ok(binding) => Yail::call(
                    "lexical-value",
                    vec![Yail::sym(lexical_symbol(&binding.name))],
                ),
                Err(placeholder) => placeholder,
            },
            BlockKind::ProcedureCallReturn => self.emit_call(block),
            BlockKind::LocalDeclarationExpression => {
                let bindings = self.emit_local_bindings(block);
                let body = self.value_input(block, "RETURN");
                Yail::call("let", vec![bindings, body])
            }
            BlockKind::LogicBoolean => Yail::Bool(block.field("BOOL") == Some("TRUE")),
            BlockKind::LogicNegate => {
                let value = self.value_input(block, "BOOL");
                Yail::primitive("yail-not", vec![value])
            }
            BlockKind::LogicCompare => {
                let op = match block.field("OP") {
                    Some("NEQ") => "yail-not-equal?",
                    _ => "yail-equal?",
                };
                let args = self.value_inputs(block, &["A", "B"]);
                Yail::primitive(op, args)
            }
            BlockKind::LogicOperation => {
                let head = match block.field("OP") {
                    Some("OR") => "or-delayed",
                    _ => "and-delayed",
                };
                let args = self.value_inputs(block, &["A", "B"]);
                Yail::call(head, args)
            }
            BlockKind::MathNumber => {
                let raw = block.field("NUM").unwrap_or_default().trim();
                if raw.parse::<f64>().is_ok() {
                    Yail::Num(raw.to_string())
                } else {
                    hole(&block.id, "invalid number")
                }
            }
            BlockKind::MathAdd | BlockKind::MathMultiply => {
                let op = if block.kind == BlockKind::MathAdd { "+" } else { "*" };
                let args = self.variadic_inputs(block, "NUM");
                Yail::primitive(op, args)
            }
            BlockKind::MathSubtract => {
                let args = self.value_inputs(block, &["A", "B"]);
                Yail::primitive("-", args)
            }
            BlockKind::MathDivision => {
                let args = self.value_inputs(block, &["A", "B"]);
                Yail::primitive("yail-divide", args)
            }
            BlockKind::MathCompare => {
                let op = match block.field("OP") {
                    Some("NEQ") => "yail-not-equal?",
                    Some("LT") => "<",
                    Some("LTE") => "<=",
                    Some("GT") => ">",
                    Some("GTE") => ">=",
                    _ => "=",
                };
                let args = self.value_inputs(block, &["A", "B"]);
                Yail::primitive(op, args)
            }
            BlockKind::Text => Yail::Str(block.field("TEXT").unwrap_or_default().to_string()),
            BlockKind::TextJoin => {
                let args = self.variadic_inputs(block, "ADD");
                Yail::primitive("string-append", args)
            }
            BlockKind::ListsCreateWith => {
                let args = self.variadic_inputs(block, "ADD");
                Yail::primitive("make-yail-list", args)
            }
            BlockKind::Colour(_) => match parse_hex_colour(block.field("COLOUR").unwrap_or_default()) {
                Some(argb) => Yail::Num(argb.to_string()),
                None => hole(&block.id, "invalid colour"),
            },
            BlockKind::ColourRandom => Yail::primitive("make-random-color", Vec::new()),
            BlockKind::ColourRgb => {
                let channels = self.value_inputs(block, &["RED", "GREEN", "BLUE"]);
                Yail::primitive(
                    "make-color",
                    vec![Yail::primitive("make-yail-list", channels)],
                )
            }
            BlockKind::ColourBlend => {
                let args = self.value_inputs(block, &["COLOUR1", "COLOUR2", "RATIO"]);
                Yail::primitive("blend-colors", args)
            }
            BlockKind::ColourMake => {
                let list = self.value_input(block, "COLORLIST");
                Yail::primitive("make-color", vec![list])
            }
            BlockKind::ColourSplit => {
                let colour = self.value_input(block, "COLOR");
                Yail::primitive("split-color", vec![colour])
            }
            BlockKind::Undefined(ty) => self.undefined(block, ty),
            other => {
                self.diagnostics.error(
                    DiagnosticKind::UndefinedBlock,
                    &block.id,
                    format!("'{}' does not produce a value", other.type_name()),
                );
                hole(&block.id, "statement block in value position")
            }
        }
    }

    fn value_input(&mut self, block: &'a Block, input: &str) -> Yail {
        match block.input_block(input) {
            Some(child) => self.emit_value(child),
            None => {
                self.diagnostics.error(
                    DiagnosticKind::EmptySocket,
                    &block.id,
                    format!(
                        "input '{}' of '{}' needs a block",
                        input,
                        block.kind.type_name()
                    ),
                );
                hole(&block.id, &format!("empty socket {}", input))
            }
        }
    }

    fn value_inputs(&mut self, block: &'a Block, inputs: &[&str]) -> Vec<Yail> {
        inputs
            .iter()
            .map(|input| self.value_input(block, input))
            .collect()
    }

    /// One argument per configured item, left to right.
    fn variadic_inputs(&mut self, block: &'a Block, prefix: &str) -> Vec<Yail> {
        (0..block.mutation.arity())
            .map(|index| self.value_input(block, &format!("{}{}", prefix, index)))
            .collect()
    }

    fn resolve_variable(&mut self, block: &Block) -> Result<Binding, Yail> {
        match self.snapshot.resolve(&block.id) {
            Some(Resolution::Bound(binding)) => Ok(binding),
            _ => {
                let name = block.field("VAR").unwrap_or_default();
                self.diagnostics.error(
                    DiagnosticKind::UnresolvedVariable,
                    &block.id,
                    format!("no variable named '{}' is in scope here", name),
                );
                Err(hole(&block.id, &format!("unresolved variable {}", name)))
            }
        }
    }

    fn undefined(&mut self, block: &Block, ty: &str) -> Yail {
        self.diagnostics.error(
            DiagnosticKind::UndefinedBlock,
            &block.id,
            format!("unknown block type '{}'", ty),
        );
        hole(&block.id, &format!("undefined block {}", ty))
    }
}

fn hole(block: &BlockId, reason: &str) -> Yail {
    Yail::Placeholder {
        block: block.clone(),
        reason: reason.to_string(),
    }
}

fn missing(id: &BlockId) -> Yail {
    hole(id, "missing block")
}

fn procedure_symbol(name: &str) -> String {
    format!("p${}", name)
}

fn global_symbol(name: &str) -> String {
    format!("g${}", name.strip_prefix(crate::scope::GLOBAL_PREFIX).unwrap_or(name))
}

fn lexical_symbol(name: &str) -> String {
    format!("${}", name)
}

/// Declared names as symbols. A repeated name keeps its first symbol and
/// later copies get `-<index>` appended so the emitted list stays distinct.
fn declared_symbols(names: &[String]) -> Vec<Yail> {
    let mut seen = HashSet::new();
    names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            if seen.insert(name.as_str()) {
                Yail::sym(lexical_symbol(name))
            } else {
                Yail::sym(format!("{}-{}", lexical_symbol(name), index))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Mutation, Slot};
    use crate::workspace::Workspace;
    use pretty_assertions::assert_eq;

    fn plug(workspace: &mut Workspace, parent: &BlockId, slot: &str, child: &BlockId) {
        workspace
            .connect(parent, Slot::Input(slot.to_string()), child)
            .unwrap();
    }

    fn number(workspace: &mut Workspace, value: &str) -> BlockId {
        let id = workspace.add_block(BlockKind::MathNumber).unwrap();
        workspace.set_field(&id, "NUM", value).unwrap();
        id
    }

    fn getter(workspace: &mut Workspace, name: &str) -> BlockId {
        let id = workspace.add_block(BlockKind::LexicalVariableGet).unwrap();
        workspace.set_field(&id, "VAR", name).unwrap();
        id
    }

    #[test]
    fn returning_procedure_with_shadowing_local() {
        let mut workspace = Workspace::new();
        let def = workspace
            .add_block_with_mutation(
                BlockKind::ProcedureDefReturn,
                Mutation::Procedure {
                    params: vec!["x".to_string()],
                    horizontal: false,
                },
            )
            .unwrap();
        workspace.rename_procedure(&def, "twice").unwrap();
        let local = workspace
            .add_block_with_mutation(
                BlockKind::LocalDeclarationExpression,
                Mutation::Locals {
                    names: vec!["x".to_string()],
                },
            )
            .unwrap();
        let init = getter(&mut workspace, "x");
        let add = workspace.add_block(BlockKind::MathAdd).unwrap();
        let left = getter(&mut workspace, "x");
        let right = number(&mut workspace, "1");
        plug(&mut workspace, &def, "RETURN", &local);
        plug(&mut workspace, &local, "DECL0", &init);
        plug(&mut workspace, &local, "RETURN", &add);
        plug(&mut workspace, &add, "NUM0", &left);
        plug(&mut workspace, &add, "NUM1", &right);

        let generation = workspace.generate(&GenerateOptions::default());
        assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
        assert_eq!(
            generation.forms[0].code.to_string(),
            "(def (p$twice $x) (let (($x (lexical-value $x))) \
             (call-yail-primitive + (*list-for-runtime* (lexical-value $x) 1))))"
        );
    }

    #[test]
    fn if_chain_and_globals() {
        let mut workspace = Workspace::new();
        let global = workspace.add_block(BlockKind::GlobalDeclaration).unwrap();
        workspace.set_field(&global, "NAME", "count").unwrap();
        let zero = number(&mut workspace, "0");
        plug(&mut workspace, &global, "VALUE", &zero);

        let def = workspace.add_block(BlockKind::ProcedureDefNoReturn).unwrap();
        let branch = workspace.add_block(BlockKind::If).unwrap();
        workspace
            .set_mutation(
                &branch,
                Mutation::If {
                    else_if: 1,
                    has_else: true,
                },
            )
            .unwrap();
        let yes = workspace.add_block(BlockKind::LogicBoolean).unwrap();
        let no = workspace.add_block(BlockKind::LogicBoolean).unwrap();
        workspace.set_field(&no, "BOOL", "FALSE").unwrap();
        let set = workspace.add_block(BlockKind::LexicalVariableSet).unwrap();
        workspace.set_field(&set, "VAR", "global count").unwrap();
        let value = getter(&mut workspace, "count");
        plug(&mut workspace, &def, "STACK", &branch);
        plug(&mut workspace, &branch, "IF0", &yes);
        plug(&mut workspace, &branch, "IF1", &no);
        plug(&mut workspace, &branch, "ELSE", &set);
        plug(&mut workspace, &set, "VALUE", &value);

        let generation = workspace.generate(&GenerateOptions::default());
        assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
        let text = generation
            .forms
            .iter()
            .map(|f| f.code.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            text,
            vec![
                "(def g$count 0)".to_string(),
                "(def (p$procedure) (if #t (begin) (if #f (begin) \
                 (begin (set-var! g$count (get-var g$count))))))"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn problems_become_placeholders() {
        let mut workspace = Workspace::new();
        let def = workspace.add_block(BlockKind::ProcedureDefNoReturn).unwrap();
        let set = workspace.add_block(BlockKind::LexicalVariableSet).unwrap();
        workspace.set_field(&set, "VAR", "ghost").unwrap();
        let join = workspace.add_block(BlockKind::TextJoin).unwrap();
        let hello = workspace.add_block(BlockKind::Text).unwrap();
        workspace.set_field(&hello, "TEXT", "hi").unwrap();
        plug(&mut workspace, &def, "STACK", &set);
        plug(&mut workspace, &set, "VALUE", &join);
        plug(&mut workspace, &join, "ADD0", &hello);
        workspace.add_block(BlockKind::Text).unwrap();

        let generation = workspace.generate(&GenerateOptions::default());
        let kinds = generation
            .diagnostics
            .iter()
            .map(|d| d.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::EmptySocket,
                DiagnosticKind::UnresolvedVariable,
                DiagnosticKind::OrphanedBlock,
            ]
        );
        let code = generation.forms[0].code.to_string();
        assert!(code.contains(&format!(
            "(set-lexical! (*unresolved* \"unresolved variable ghost\" \"{}\") (",
            set
        )));
        assert!(code.contains("\"hi\""));

        let quiet = workspace.generate(&GenerateOptions {
            warn_orphans: false,
        });
        assert_eq!(quiet.diagnostics.len(), 2);
    }

    #[test]
    fn duplicate_parameters_get_distinct_symbols() {
        let names = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let rendered = declared_symbols(&names)
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        assert_eq!(rendered, vec!["$a", "$b", "$a-2"]);
    }
}
