use blockyail_core::block::{BlockId, BlockKind, Mutation, Slot};
use blockyail_core::diagnostics::{DiagnosticKind, Severity};
use blockyail_core::loader::load_bky;
use blockyail_core::workspace::Workspace;
use blockyail_core::{compile_bky_source, GenerateOptions};
use pretty_assertions::assert_eq;

fn plug(workspace: &mut Workspace, parent: &BlockId, slot: &str, child: &BlockId) {
    workspace
        .connect(parent, Slot::Input(slot.to_string()), child)
        .unwrap();
}

fn with_var(workspace: &mut Workspace, kind: BlockKind, name: &str) -> BlockId {
    let id = workspace.add_block(kind).unwrap();
    workspace.set_field(&id, "VAR", name).unwrap();
    id
}

#[test]
fn one_bad_reference_costs_one_diagnostic() {
    let mut workspace = Workspace::new();
    let broken = workspace
        .add_block_with_mutation(
            BlockKind::ProcedureDefNoReturn,
            Mutation::Procedure {
                params: vec!["x".to_string()],
                horizontal: false,
            },
        )
        .unwrap();
    let set = with_var(&mut workspace, BlockKind::LexicalVariableSet, "x");
    let ghost = with_var(&mut workspace, BlockKind::LexicalVariableGet, "ghost");
    plug(&mut workspace, &broken, "STACK", &set);
    plug(&mut workspace, &set, "VALUE", &ghost);
    let healthy = workspace.add_block(BlockKind::ProcedureDefNoReturn).unwrap();

    let generation = workspace.generate(&GenerateOptions::default());
    assert_eq!(generation.diagnostics.len(), 1);
    let diagnostic = &generation.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::UnresolvedVariable);
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.block, ghost);

    let forms = generation
        .forms
        .iter()
        .map(|form| (form.block.clone(), form.code.to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        forms,
        vec![
            (
                broken,
                format!(
                    "(def (p$procedure $x) (set-lexical! $x (*unresolved* \"unresolved variable ghost\" \"{}\")))",
                    ghost
                )
            ),
            (healthy, "(def (p$procedure2) (begin))".to_string()),
        ]
    );
}

#[test]
fn duplicate_parameters_still_generate() {
    let mut workspace = Workspace::new();
    let def = workspace
        .add_block_with_mutation(
            BlockKind::ProcedureDefNoReturn,
            Mutation::Procedure {
                params: vec!["a".to_string(), "a".to_string()],
                horizontal: false,
            },
        )
        .unwrap();
    let set = with_var(&mut workspace, BlockKind::LexicalVariableSet, "a");
    let one = workspace.add_block(BlockKind::MathNumber).unwrap();
    workspace.set_field(&one, "NUM", "1").unwrap();
    plug(&mut workspace, &def, "STACK", &set);
    plug(&mut workspace, &set, "VALUE", &one);

    let generation = workspace.generate(&GenerateOptions::default());
    let kinds = generation
        .diagnostics
        .iter()
        .map(|d| (d.kind, d.severity))
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![(DiagnosticKind::DuplicateParameter, Severity::Warning)]);
    assert_eq!(
        generation.forms[0].code.to_string(),
        "(def (p$procedure $a $a-1) (set-lexical! $a 1))"
    );
}

const DUPLICATE_PROCEDURES: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <block type="procedures_defnoreturn" id="first">
    <field name="NAME">tick</field>
  </block>
  <block type="procedures_defreturn" id="second">
    <field name="NAME">tick</field>
    <value name="RETURN">
      <block type="math_number" id="seven"><field name="NUM">7</field></block>
    </value>
  </block>
  <block type="procedures_defnoreturn" id="user">
    <field name="NAME">run</field>
    <statement name="STACK">
      <block type="procedures_callnoreturn" id="call">
        <mutation name="tick"></mutation>
        <field name="PROCNAME">tick</field>
      </block>
    </statement>
  </block>
</xml>"#;

#[test]
fn first_definition_of_a_name_wins() {
    let generation = compile_bky_source(DUPLICATE_PROCEDURES, &GenerateOptions::default()).unwrap();
    assert_eq!(generation.diagnostics.len(), 1);
    assert_eq!(generation.diagnostics[0].kind, DiagnosticKind::DuplicateProcedure);
    assert_eq!(generation.diagnostics[0].block, BlockId::from("second"));
    assert_eq!(
        generation.render(),
        "(def (p$tick) (begin))\n\n(def (p$run) ((get-var p$tick)))\n"
    );

    let mut workspace = Workspace::from_graph(load_bky(DUPLICATE_PROCEDURES).unwrap());
    workspace.remove_block(&BlockId::from("first")).unwrap();
    let call = BlockId::from("call");
    let binding = workspace.resolve(&call).and_then(|r| r.binding().cloned()).unwrap();
    assert_eq!(binding.block, BlockId::from("second"));
    let generation = workspace.generate(&GenerateOptions::default());
    assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
    assert_eq!(generation.forms[0].code.to_string(), "(def (p$tick) 7)");
}

#[test]
fn renaming_the_owner_hands_its_name_to_the_duplicate() {
    let mut workspace = Workspace::from_graph(load_bky(DUPLICATE_PROCEDURES).unwrap());
    let second = BlockId::from("second");
    workspace
        .rename_procedure(&BlockId::from("first"), "tock")
        .unwrap();
    assert_eq!(workspace.get_procedure(&second).unwrap().name, "tick");
    let generation = workspace.generate(&GenerateOptions::default());
    assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
    assert_eq!(
        generation.render(),
        "(def (p$tock) (begin))\n\n(def (p$tick) 7)\n\n(def (p$run) ((get-var p$tock)))\n"
    );

    let globals = r#"<xml>
  <block type="global_declaration" id="a">
    <field name="NAME">score</field>
    <value name="VALUE"><block type="math_number" id="one"><field name="NUM">1</field></block></value>
  </block>
  <block type="global_declaration" id="b">
    <field name="NAME">score</field>
    <value name="VALUE"><block type="math_number" id="two"><field name="NUM">2</field></block></value>
  </block>
</xml>"#;
    let mut workspace = Workspace::from_graph(load_bky(globals).unwrap());
    workspace
        .rename_binding(&BlockId::from("a"), "score", "best")
        .unwrap();
    assert_eq!(
        workspace.symbols().globals.owner("score"),
        Some(&BlockId::from("b"))
    );
    let generation = workspace.generate(&GenerateOptions::default());
    assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
    assert_eq!(generation.render(), "(def g$best 1)\n\n(def g$score 2)\n");
}

#[test]
fn loops_break_and_colours() {
    let source = r#"<xml>
  <block type="procedures_defnoreturn" id="def">
    <mutation><arg name="items"></arg></mutation>
    <field name="NAME">paint</field>
    <statement name="STACK">
      <block type="controls_forEach" id="each">
        <field name="VAR">item</field>
        <value name="LIST">
          <block type="lexical_variable_get" id="list"><field name="VAR">items</field></block>
        </value>
        <statement name="DO">
          <block type="lexical_variable_set" id="set">
            <field name="VAR">item</field>
            <value name="VALUE">
              <block type="colour_red" id="red"><field name="COLOUR">#ff0000</field></block>
            </value>
            <next>
              <block type="controls_break" id="stop"></block>
            </next>
          </block>
        </statement>
      </block>
    </statement>
  </block>
</xml>"#;
    let generation = compile_bky_source(source, &GenerateOptions::default()).unwrap();
    assert!(generation.diagnostics.is_empty(), "{:?}", generation.diagnostics);
    assert_eq!(
        generation.forms[0].code.to_string(),
        "(def (p$paint $items) (foreach $item (begin (set-lexical! $item -65536) (break #f)) \
         (lexical-value $items)))"
    );
}

#[test]
fn unresolved_calls_keep_their_arguments() {
    let source = r#"<xml>
  <block type="procedures_defnoreturn" id="def">
    <field name="NAME">main</field>
    <statement name="STACK">
      <block type="procedures_callnoreturn" id="call">
        <mutation name="nowhere"><arg name="n"></arg></mutation>
        <field name="PROCNAME">nowhere</field>
        <value name="ARG0">
          <block type="math_number" id="five"><field name="NUM">5</field></block>
        </value>
      </block>
    </statement>
  </block>
</xml>"#;
    let generation = compile_bky_source(source, &GenerateOptions::default()).unwrap();
    let kinds = generation
        .diagnostics
        .iter()
        .map(|d| d.kind)
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![DiagnosticKind::UnresolvedProcedure]);
    assert_eq!(
        generation.forms[0].code.to_string(),
        "(def (p$main) ((*unresolved* \"unresolved procedure nowhere\" \"call\") 5))"
    );
}
