use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Colour swatch block types and the hex value their `COLOUR` field starts with.
pub const COLOUR_SWATCHES: &[(&str, &str)] = &[
    ("colour_black", "#000000"),
    ("colour_white", "#ffffff"),
    ("colour_red", "#ff0000"),
    ("colour_pink", "#ffafaf"),
    ("colour_orange", "#ffc800"),
    ("colour_yellow", "#ffff00"),
    ("colour_green", "#00ff00"),
    ("colour_cyan", "#00ffff"),
    ("colour_blue", "#0000ff"),
    ("colour_magenta", "#ff00ff"),
    ("colour_light_gray", "#cccccc"),
    ("colour_gray", "#888888"),
    ("colour_dark_gray", "#444444"),
    ("colour_picker", "#ff0000"),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    ProcedureDefNoReturn,
    ProcedureDefReturn,
    ProcedureCallNoReturn,
    ProcedureCallReturn,
    GlobalDeclaration,
    LexicalVariableGet,
    LexicalVariableSet,
    LocalDeclarationStatement,
    LocalDeclarationExpression,
    ForRange,
    ForEach,
    While,
    If,
    Break,
    LogicBoolean,
    LogicNegate,
    LogicCompare,
    LogicOperation,
    MathNumber,
    MathAdd,
    MathSubtract,
    MathMultiply,
    MathDivision,
    MathCompare,
    Text,
    TextJoin,
    ListsCreateWith,
    Colour(&'static str),
    ColourRandom,
    ColourRgb,
    ColourBlend,
    ColourMake,
    ColourSplit,
    Undefined(String),
}

/// Where a block may sit in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Definition,
    Statement,
    Value,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Value,
    Statement,
}

impl BlockKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "procedures_defnoreturn" => Self::ProcedureDefNoReturn,
            "procedures_defreturn" => Self::ProcedureDefReturn,
            "procedures_callnoreturn" => Self::ProcedureCallNoReturn,
            "procedures_callreturn" => Self::ProcedureCallReturn,
            "global_declaration" => Self::GlobalDeclaration,
            "lexical_variable_get" => Self::LexicalVariableGet,
            "lexical_variable_set" => Self::LexicalVariableSet,
            "local_declaration_statement" => Self::LocalDeclarationStatement,
            "local_declaration_expression" => Self::LocalDeclarationExpression,
            "controls_forRange" => Self::ForRange,
            "controls_forEach" => Self::ForEach,
            "controls_while" => Self::While,
            "controls_if" => Self::If,
            "controls_break" => Self::Break,
            "logic_boolean" => Self::LogicBoolean,
            "logic_negate" => Self::LogicNegate,
            "logic_compare" => Self::LogicCompare,
            "logic_operation" => Self::LogicOperation,
            "math_number" => Self::MathNumber,
            "math_add" => Self::MathAdd,
            "math_subtract" => Self::MathSubtract,
            "math_multiply" => Self::MathMultiply,
            "math_division" => Self::MathDivision,
            "math_compare" => Self::MathCompare,
            "text" => Self::Text,
            "text_join" => Self::TextJoin,
            "lists_create_with" => Self::ListsCreateWith,
            "colour_random" => Self::ColourRandom,
            "colour_rgb" => Self::ColourRgb,
            "colour_blend" => Self::ColourBlend,
            "color_make_color" => Self::ColourMake,
            "color_split_color" => Self::ColourSplit,
            other => match COLOUR_SWATCHES.iter().find(|(ty, _)| *ty == other) {
                Some((ty, _)) => Self::Colour(*ty),
                None => Self::Undefined(other.to_string()),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::ProcedureDefNoReturn => "procedures_defnoreturn",
            Self::ProcedureDefReturn => "procedures_defreturn",
            Self::ProcedureCallNoReturn => "procedures_callnoreturn",
            Self::ProcedureCallReturn => "procedures_callreturn",
            Self::GlobalDeclaration => "global_declaration",
            Self::LexicalVariableGet => "lexical_variable_get",
            Self::LexicalVariableSet => "lexical_variable_set",
            Self::LocalDeclarationStatement => "local_declaration_statement",
            Self::LocalDeclarationExpression => "local_declaration_expression",
            Self::ForRange => "controls_forRange",
            Self::ForEach => "controls_forEach",
            Self::While => "controls_while",
            Self::If => "controls_if",
            Self::Break => "controls_break",
            Self::LogicBoolean => "logic_boolean",
            Self::LogicNegate => "logic_negate",
            Self::LogicCompare => "logic_compare",
            Self::LogicOperation => "logic_operation",
            Self::MathNumber => "math_number",
            Self::MathAdd => "math_add",
            Self::MathSubtract => "math_subtract",
            Self::MathMultiply => "math_multiply",
            Self::MathDivision => "math_division",
            Self::MathCompare => "math_compare",
            Self::Text => "text",
            Self::TextJoin => "text_join",
            Self::ListsCreateWith => "lists_create_with",
            Self::Colour(ty) => *ty,
            Self::ColourRandom => "colour_random",
            Self::ColourRgb => "colour_rgb",
            Self::ColourBlend => "colour_blend",
            Self::ColourMake => "color_make_color",
            Self::ColourSplit => "color_split_color",
            Self::Undefined(ty) => ty.as_str(),
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::ProcedureDefNoReturn | Self::ProcedureDefReturn | Self::GlobalDeclaration => {
                Shape::Definition
            }
            Self::ProcedureCallNoReturn
            | Self::LexicalVariableSet
            | Self::LocalDeclarationStatement
            | Self::ForRange
            | Self::ForEach
            | Self::While
            | Self::If
            | Self::Break => Shape::Statement,
            Self::Undefined(_) => Shape::Unknown,
            _ => Shape::Value,
        }
    }

    pub fn is_procedure_definition(&self) -> bool {
        matches!(self, Self::ProcedureDefNoReturn | Self::ProcedureDefReturn)
    }

    pub fn is_procedure_call(&self) -> bool {
        matches!(self, Self::ProcedureCallNoReturn | Self::ProcedureCallReturn)
    }

    pub fn is_variable_reference(&self) -> bool {
        matches!(self, Self::LexicalVariableGet | Self::LexicalVariableSet)
    }

    pub fn is_reference(&self) -> bool {
        self.is_variable_reference() || self.is_procedure_call()
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Self::ForRange | Self::ForEach | Self::While)
    }

    pub fn default_mutation(&self) -> Mutation {
        match self {
            Self::ProcedureDefNoReturn | Self::ProcedureDefReturn => Mutation::Procedure {
                params: Vec::new(),
                horizontal: true,
            },
            Self::ProcedureCallNoReturn | Self::ProcedureCallReturn => Mutation::Call {
                name: String::new(),
                args: Vec::new(),
            },
            Self::LocalDeclarationStatement | Self::LocalDeclarationExpression => {
                Mutation::Locals {
                    names: vec!["name".to_string()],
                }
            }
            Self::MathAdd | Self::MathMultiply | Self::TextJoin | Self::ListsCreateWith => {
                Mutation::Items { count: 2 }
            }
            Self::If => Mutation::If {
                else_if: 0,
                has_else: false,
            },
            _ => Mutation::None,
        }
    }

    fn default_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ProcedureDefNoReturn | Self::ProcedureDefReturn => {
                vec![("NAME", "procedure".to_string())]
            }
            Self::ProcedureCallNoReturn | Self::ProcedureCallReturn => {
                vec![("PROCNAME", String::new())]
            }
            Self::GlobalDeclaration => vec![("NAME", "name".to_string())],
            Self::LexicalVariableGet | Self::LexicalVariableSet => vec![("VAR", String::new())],
            Self::ForRange => vec![("VAR", "number".to_string())],
            Self::ForEach => vec![("VAR", "item".to_string())],
            Self::LogicBoolean => vec![("BOOL", "TRUE".to_string())],
            Self::LogicCompare | Self::MathCompare => vec![("OP", "EQ".to_string())],
            Self::LogicOperation => vec![("OP", "AND".to_string())],
            Self::MathNumber => vec![("NUM", "0".to_string())],
            Self::Text => vec![("TEXT", String::new())],
            Self::Colour(ty) => {
                let hex = COLOUR_SWATCHES
                    .iter()
                    .find(|(name, _)| name == ty)
                    .map(|(_, hex)| *hex)
                    .unwrap_or("#000000");
                vec![("COLOUR", hex.to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Fixed (non-indexed) field names for the kind.
    fn fixed_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ProcedureDefNoReturn | Self::ProcedureDefReturn | Self::GlobalDeclaration => {
                &["NAME"]
            }
            Self::ProcedureCallNoReturn | Self::ProcedureCallReturn => &["PROCNAME"],
            Self::LexicalVariableGet
            | Self::LexicalVariableSet
            | Self::ForRange
            | Self::ForEach => &["VAR"],
            Self::LogicBoolean => &["BOOL"],
            Self::LogicCompare | Self::LogicOperation | Self::MathCompare => &["OP"],
            Self::MathNumber => &["NUM"],
            Self::Text => &["TEXT"],
            Self::Colour(_) => &["COLOUR"],
            _ => &[],
        }
    }

    pub fn accepts_field(&self, name: &str, mutation: &Mutation) -> bool {
        if let Self::Undefined(_) = self {
            return true;
        }
        if self.fixed_fields().contains(&name) {
            return true;
        }
        match mutation {
            Mutation::Procedure { params: names, .. } | Mutation::Locals { names } => {
                indexed(name, "VAR").is_some_and(|index| index < names.len())
            }
            _ => false,
        }
    }

    /// Inputs a block of this kind carries for the given mutation, in display order.
    pub fn input_layout(&self, mutation: &Mutation) -> Vec<(String, InputKind)> {
        let value = |name: &str| (name.to_string(), InputKind::Value);
        let statement = |name: &str| (name.to_string(), InputKind::Statement);
        match self {
            Self::ProcedureDefNoReturn => vec![statement("STACK")],
            Self::ProcedureDefReturn => vec![value("RETURN")],
            Self::ProcedureCallNoReturn | Self::ProcedureCallReturn => (0..mutation.arity())
                .map(|i| value(&format!("ARG{}", i)))
                .collect(),
            Self::GlobalDeclaration | Self::LexicalVariableSet => vec![value("VALUE")],
            Self::LocalDeclarationStatement | Self::LocalDeclarationExpression => {
                let mut layout = (0..mutation.arity())
                    .map(|i| value(&format!("DECL{}", i)))
                    .collect::<Vec<_>>();
                if *self == Self::LocalDeclarationStatement {
                    layout.push(statement("STACK"));
                } else {
                    layout.push(value("RETURN"));
                }
                layout
            }
            Self::ForRange => vec![value("START"), value("END"), value("STEP"), statement("DO")],
            Self::ForEach => vec![value("LIST"), statement("DO")],
            Self::While => vec![value("TEST"), statement("DO")],
            Self::If => {
                let (else_if, has_else) = match mutation {
                    Mutation::If { else_if, has_else } => (*else_if, *has_else),
                    _ => (0, false),
                };
                let mut layout = Vec::new();
                for i in 0..=else_if {
                    layout.push(value(&format!("IF{}", i)));
                    layout.push(statement(&format!("DO{}", i)));
                }
                if has_else {
                    layout.push(statement("ELSE"));
                }
                layout
            }
            Self::LogicNegate => vec![value("BOOL")],
            Self::LogicCompare
            | Self::LogicOperation
            | Self::MathSubtract
            | Self::MathDivision
            | Self::MathCompare => vec![value("A"), value("B")],
            Self::MathAdd | Self::MathMultiply => (0..mutation.arity())
                .map(|i| value(&format!("NUM{}", i)))
                .collect(),
            Self::TextJoin | Self::ListsCreateWith => (0..mutation.arity())
                .map(|i| value(&format!("ADD{}", i)))
                .collect(),
            Self::ColourRgb => vec![value("RED"), value("GREEN"), value("BLUE")],
            Self::ColourBlend => vec![value("COLOUR1"), value("COLOUR2"), value("RATIO")],
            Self::ColourMake => vec![value("COLORLIST")],
            Self::ColourSplit => vec![value("COLOR")],
            _ => Vec::new(),
        }
    }

    pub fn validate_mutation(&self, mutation: &Mutation) -> Result<(), String> {
        let expected = self.default_mutation();
        if let Self::Undefined(_) = self {
            return Ok(());
        }
        if std::mem::discriminant(&expected) != std::mem::discriminant(mutation) {
            return Err(format!(
                "'{}' blocks do not take a {} mutation",
                self.type_name(),
                mutation.describe()
            ));
        }
        match mutation {
            Mutation::Procedure { params: names, .. } | Mutation::Locals { names } => {
                if let Some(index) = names.iter().position(|n| n.trim().is_empty()) {
                    return Err(format!("name #{} is empty", index));
                }
                if matches!(mutation, Mutation::Locals { .. }) && names.is_empty() {
                    return Err("a local declaration needs at least one name".to_string());
                }
            }
            Mutation::Call { args, .. } => {
                if args.iter().any(|a| a.trim().is_empty()) {
                    return Err("argument names cannot be empty".to_string());
                }
            }
            Mutation::Items { .. } | Mutation::If { .. } | Mutation::None => {}
        }
        Ok(())
    }
}

/// Parses `PREFIX<n>` into `n`.
pub fn indexed(name: &str, prefix: &str) -> Option<usize> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    None,
    Procedure { params: Vec<String>, horizontal: bool },
    Call { name: String, args: Vec<String> },
    Locals { names: Vec<String> },
    Items { count: usize },
    If { else_if: usize, has_else: bool },
}

impl Mutation {
    /// Number of indexed slots the mutation asks for.
    pub fn arity(&self) -> usize {
        match self {
            Mutation::Procedure { params, .. } => params.len(),
            Mutation::Call { args, .. } => args.len(),
            Mutation::Locals { names } => names.len(),
            Mutation::Items { count } => *count,
            Mutation::If { else_if, .. } => else_if + 1,
            Mutation::None => 0,
        }
    }

    pub fn declared_names(&self) -> &[String] {
        match self {
            Mutation::Procedure { params, .. } => params,
            Mutation::Locals { names } => names,
            _ => &[],
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Mutation::None => "empty",
            Mutation::Procedure { .. } => "parameter",
            Mutation::Call { .. } => "call",
            Mutation::Locals { .. } => "local-name",
            Mutation::Items { .. } => "item-count",
            Mutation::If { .. } => "if-shape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub name: String,
    pub kind: InputKind,
    pub block: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Input(String),
    Next,
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Input(name) => write!(f, "input '{}'", name),
            Slot::Next => f.write_str("next"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub block: BlockId,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Parameter,
    LocalVariable,
    LoopVariable,
    GlobalVariable,
    Procedure,
}

impl BindingKind {
    pub fn is_lexical(self) -> bool {
        matches!(
            self,
            BindingKind::Parameter | BindingKind::LocalVariable | BindingKind::LoopVariable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub name: String,
    pub block: BlockId,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub fields: BTreeMap<String, String>,
    pub inputs: Vec<Input>,
    pub next: Option<BlockId>,
    pub parent: Option<ParentLink>,
    pub mutation: Mutation,
    pub position: Option<(i64, i64)>,
}

impl Block {
    pub fn new(id: BlockId, kind: BlockKind) -> Self {
        let mutation = kind.default_mutation();
        Self::with_mutation(id, kind, mutation)
    }

    pub fn with_mutation(id: BlockId, kind: BlockKind, mutation: Mutation) -> Self {
        let mut fields = kind
            .default_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>();
        for (index, name) in mutation.declared_names().iter().enumerate() {
            fields.insert(format!("VAR{}", index), name.clone());
        }
        if let Mutation::Call { name, .. } = &mutation {
            fields.insert("PROCNAME".to_string(), name.clone());
        }
        let inputs = kind
            .input_layout(&mutation)
            .into_iter()
            .map(|(name, kind)| Input {
                name,
                kind,
                block: None,
            })
            .collect();
        Self {
            id,
            kind,
            fields,
            inputs,
            next: None,
            parent: None,
            mutation,
            position: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|input| input.name == name)
    }

    pub fn input_block(&self, name: &str) -> Option<&BlockId> {
        self.input(name).and_then(|input| input.block.as_ref())
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = &BlockId> {
        self.inputs.iter().filter_map(|input| input.block.as_ref())
    }

    /// Name this reference block refers to, if it is a reference.
    pub fn referenced_name(&self) -> Option<&str> {
        if self.kind.is_variable_reference() {
            self.field("VAR")
        } else if self.kind.is_procedure_call() {
            self.field("PROCNAME")
        } else {
            None
        }
    }

    /// Field that holds the declared name at `index` of this block.
    pub fn declaration_field(&self, name: &str) -> Option<String> {
        match self.kind {
            BlockKind::ProcedureDefNoReturn
            | BlockKind::ProcedureDefReturn
            | BlockKind::LocalDeclarationStatement
            | BlockKind::LocalDeclarationExpression => self
                .mutation
                .declared_names()
                .iter()
                .position(|n| n == name)
                .map(|index| format!("VAR{}", index)),
            BlockKind::ForRange | BlockKind::ForEach => {
                (self.field("VAR") == Some(name)).then(|| "VAR".to_string())
            }
            BlockKind::GlobalDeclaration => {
                (self.field("NAME") == Some(name)).then(|| "NAME".to_string())
            }
            _ => None,
        }
    }

    /// All variable bindings this block introduces, regardless of slot.
    pub fn declared_bindings(&self) -> Vec<Binding> {
        let make = |name: &str, kind| Binding {
            name: name.to_string(),
            block: self.id.clone(),
            kind,
        };
        match self.kind {
            BlockKind::ProcedureDefNoReturn | BlockKind::ProcedureDefReturn => self
                .mutation
                .declared_names()
                .iter()
                .map(|n| make(n, BindingKind::Parameter))
                .collect(),
            BlockKind::LocalDeclarationStatement | BlockKind::LocalDeclarationExpression => self
                .mutation
                .declared_names()
                .iter()
                .map(|n| make(n, BindingKind::LocalVariable))
                .collect(),
            BlockKind::ForRange | BlockKind::ForEach => self
                .field("VAR")
                .map(|n| vec![make(n, BindingKind::LoopVariable)])
                .unwrap_or_default(),
            BlockKind::GlobalDeclaration => self
                .field("NAME")
                .map(|n| vec![make(n, BindingKind::GlobalVariable)])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Bindings visible to a block plugged into `slot` of this block, first declared first.
    pub fn bindings_visible_in(&self, slot: &str) -> Vec<Binding> {
        let visible = match self.kind {
            BlockKind::ProcedureDefNoReturn
            | BlockKind::LocalDeclarationStatement => slot == "STACK",
            BlockKind::ProcedureDefReturn | BlockKind::LocalDeclarationExpression => {
                slot == "RETURN"
            }
            BlockKind::ForRange | BlockKind::ForEach => slot == "DO",
            _ => false,
        };
        if visible {
            self.declared_bindings()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip_through_the_vocabulary() {
        for name in [
            "procedures_defnoreturn",
            "controls_forRange",
            "lists_create_with",
            "colour_dark_gray",
            "color_make_color",
        ] {
            assert_eq!(BlockKind::from_type_name(name).type_name(), name);
        }
        let unknown = BlockKind::from_type_name("component_event");
        assert_eq!(unknown, BlockKind::Undefined("component_event".to_string()));
        assert_eq!(unknown.shape(), Shape::Unknown);
    }

    #[test]
    fn procedure_fields_follow_parameter_mutation() {
        let mutation = Mutation::Procedure {
            params: vec!["a".to_string(), "b".to_string()],
            horizontal: true,
        };
        let kind = BlockKind::ProcedureDefNoReturn;
        assert!(kind.accepts_field("VAR1", &mutation));
        assert!(!kind.accepts_field("VAR2", &mutation));
        assert!(!kind.accepts_field("VAR", &mutation));
        let block = Block::with_mutation(BlockId::from("p"), kind, mutation);
        assert_eq!(block.field("VAR0"), Some("a"));
        assert_eq!(block.declaration_field("b").as_deref(), Some("VAR1"));
    }

    #[test]
    fn loop_variable_is_visible_only_in_the_body() {
        let block = Block::new(BlockId::from("loop"), BlockKind::ForRange);
        assert_eq!(block.bindings_visible_in("DO").len(), 1);
        assert!(block.bindings_visible_in("START").is_empty());
        assert_eq!(block.bindings_visible_in("DO")[0].name, "number");
    }

    #[test]
    fn if_layout_tracks_else_if_and_else() {
        let layout = BlockKind::If.input_layout(&Mutation::If {
            else_if: 1,
            has_else: true,
        });
        let names = layout.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["IF0", "DO0", "IF1", "DO1", "ELSE"]);
    }

    #[test]
    fn rejects_mismatched_mutations() {
        let err = BlockKind::Text
            .validate_mutation(&Mutation::Items { count: 3 })
            .unwrap_err();
        assert!(err.contains("item-count"));
        assert!(BlockKind::LocalDeclarationStatement
            .validate_mutation(&Mutation::Locals { names: vec![] })
            .is_err());
        assert!(BlockKind::ProcedureDefReturn
            .validate_mutation(&Mutation::Procedure {
                params: vec![" ".to_string()],
                horizontal: false,
            })
            .is_err());
    }
}
