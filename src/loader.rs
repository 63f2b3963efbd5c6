use crate::block::{indexed, Block, BlockId, BlockKind, Input, InputKind, Mutation, Slot};
use crate::graph::BlockGraph;
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::io::Cursor;
use tracing::{debug, warn};
use xmltree::{Element, EmitterConfig, XMLNode};

const BLOCKLY_XMLNS: &str = "https://developers.google.com/blockly/xml";

/// Reads a Blockly `.bky` document into a block graph.
///
/// Every `<block>` becomes a graph block under its `id` attribute (blocks
/// without one get a fresh id). Children are inserted before they are
/// connected, so a connection the graph rejects leaves the child as a
/// top-level block and the load carries on.
pub fn load_bky(source: &str) -> Result<BlockGraph> {
    let root = Element::parse(Cursor::new(source.as_bytes()))
        .map_err(|e| anyhow!("Invalid Blockly XML: {}.", e))?;
    if root.name != "xml" {
        return Err(anyhow!(
            "Invalid Blockly XML: expected an <xml> root, found <{}>.",
            root.name
        ));
    }
    let mut reader = Reader {
        graph: BlockGraph::new(),
        taken: HashSet::new(),
    };
    collect_ids(&root, &mut reader.taken);
    for element in child_elements(&root) {
        match element.name.as_str() {
            "block" | "shadow" => {
                reader.read_block(element)?;
            }
            other => debug!(element = other, "skipping top-level element"),
        }
    }
    Ok(reader.graph)
}

/// Writes the graph back as a `.bky` document, top-level stacks in graph order.
pub fn save_bky(graph: &BlockGraph) -> Result<String> {
    let mut root = Element::new("xml");
    root.attributes
        .insert("xmlns".to_string(), BLOCKLY_XMLNS.to_string());
    for id in graph.top_level() {
        root.children
            .push(XMLNode::Element(write_block(graph, &id)?));
    }
    let mut out = Vec::new();
    root.write_with_config(&mut out, EmitterConfig::new().perform_indent(true))
        .map_err(|e| anyhow!("Failed to write Blockly XML: {}.", e))?;
    String::from_utf8(out).context("Blockly XML output was not UTF-8.")
}

struct Reader {
    graph: BlockGraph,
    taken: HashSet<String>,
}

impl Reader {
    fn read_block(&mut self, element: &Element) -> Result<BlockId> {
        let type_name = element
            .attributes
            .get("type")
            .ok_or_else(|| anyhow!("<{}> element without a type attribute.", element.name))?;
        let kind = BlockKind::from_type_name(type_name);
        let id = match element.attributes.get("id") {
            Some(id) => BlockId::new(id.clone()),
            None => self.fresh_id(),
        };
        let mutation = match find_child(element, "mutation") {
            Some(node) => read_mutation(&kind, node)
                .with_context(|| format!("Invalid mutation on block '{}'.", id))?,
            None => names_from_fields(kind.default_mutation(), element),
        };
        let mut block = Block::with_mutation(id.clone(), kind, mutation);
        block.position = read_position(element);

        for field in child_elements(element).filter(|e| e.name == "field") {
            let Some(name) = field.attributes.get("name") else {
                continue;
            };
            let value = field.get_text().map(|t| t.into_owned()).unwrap_or_default();
            // Declared names come from the mutation; the VARi fields only mirror it.
            if indexed(name, "VAR").is_some() && !block.mutation.declared_names().is_empty() {
                continue;
            }
            if block.kind.accepts_field(name, &block.mutation) {
                block.fields.insert(name.clone(), value);
            } else {
                debug!(block = %id, field = %name, "skipping unknown field");
            }
        }
        if let Mutation::Call { name, .. } = &mut block.mutation {
            if let Some(procname) = block.fields.get("PROCNAME") {
                *name = procname.clone();
            }
        }
        if let BlockKind::Undefined(_) = block.kind {
            for input in child_elements(element) {
                let kind = match input.name.as_str() {
                    "value" => InputKind::Value,
                    "statement" => InputKind::Statement,
                    _ => continue,
                };
                if let Some(name) = input.attributes.get("name") {
                    block.inputs.push(Input {
                        name: name.clone(),
                        kind,
                        block: None,
                    });
                }
            }
        }

        self.graph
            .insert_block(block)
            .with_context(|| format!("Invalid block '{}'.", id))?;

        for child in child_elements(element) {
            let slot = match child.name.as_str() {
                "value" | "statement" => match child.attributes.get("name") {
                    Some(name) => Slot::Input(name.clone()),
                    None => continue,
                },
                "next" => Slot::Next,
                _ => continue,
            };
            let Some(inner) = child_elements(child)
                .find(|e| e.name == "block")
                .or_else(|| find_child(child, "shadow"))
            else {
                continue;
            };
            let child_id = self.read_block(inner)?;
            if let Err(err) = self.graph.connect(&id, slot.clone(), &child_id) {
                warn!(parent = %id, child = %child_id, %slot, %err, "left block unattached");
            }
        }
        Ok(id)
    }

    fn fresh_id(&mut self) -> BlockId {
        loop {
            let id = self.graph.fresh_id();
            if self.taken.insert(id.as_str().to_string()) {
                return id;
            }
        }
    }
}

fn read_mutation(kind: &BlockKind, element: &Element) -> Result<Mutation> {
    let attr = |name: &str| element.attributes.get(name).map(String::as_str);
    let names = |tag: &str| {
        child_elements(element)
            .filter(|e| e.name == tag)
            .map(|e| e.attributes.get("name").cloned().unwrap_or_default())
            .collect::<Vec<_>>()
    };
    let count = |name: &str| -> Result<usize> {
        match attr(name) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("'{}' is not a valid {} count.", raw, name)),
            None => Ok(0),
        }
    };
    Ok(match kind.default_mutation() {
        Mutation::None => Mutation::None,
        Mutation::Procedure { horizontal, .. } => Mutation::Procedure {
            params: names("arg"),
            horizontal: attr("horizontal_parameters").map_or(horizontal, |v| v != "false"),
        },
        Mutation::Call { .. } => Mutation::Call {
            name: attr("name").unwrap_or_default().to_string(),
            args: names("arg"),
        },
        Mutation::Locals { .. } => Mutation::Locals {
            names: names("localname"),
        },
        Mutation::Items { count: default } => Mutation::Items {
            count: match attr("items") {
                Some(_) => count("items")?,
                None => default,
            },
        },
        Mutation::If { .. } => Mutation::If {
            else_if: count("elseif")?,
            has_else: attr("else").is_some_and(|v| v == "1" || v == "true"),
        },
    })
}

/// Documents without a `<mutation>` carry declared names only in their
/// `VARi` fields.
fn names_from_fields(mutation: Mutation, element: &Element) -> Mutation {
    let mut fields = child_elements(element)
        .filter(|e| e.name == "field")
        .filter_map(|e| {
            let index = indexed(e.attributes.get("name")?, "VAR")?;
            Some((index, e.get_text().map(|t| t.into_owned()).unwrap_or_default()))
        })
        .collect::<Vec<_>>();
    if fields.is_empty() {
        return mutation;
    }
    fields.sort_by_key(|(index, _)| *index);
    let found = fields.into_iter().map(|(_, name)| name).collect();
    match mutation {
        Mutation::Procedure { horizontal, .. } => Mutation::Procedure {
            params: found,
            horizontal,
        },
        Mutation::Locals { .. } => Mutation::Locals { names: found },
        other => other,
    }
}

fn write_block(graph: &BlockGraph, id: &BlockId) -> Result<Element> {
    let block = graph.get_block(id)?;
    let mut element = Element::new("block");
    element
        .attributes
        .insert("type".to_string(), block.kind.type_name().to_string());
    element
        .attributes
        .insert("id".to_string(), block.id.as_str().to_string());
    if let Some((x, y)) = block.position {
        element.attributes.insert("x".to_string(), x.to_string());
        element.attributes.insert("y".to_string(), y.to_string());
    }
    if let Some(mutation) = write_mutation(&block.mutation) {
        element.children.push(XMLNode::Element(mutation));
    }
    for (name, value) in &block.fields {
        let mut field = named("field", name);
        field.children.push(XMLNode::Text(value.clone()));
        element.children.push(XMLNode::Element(field));
    }
    for input in &block.inputs {
        let Some(child) = &input.block else {
            continue;
        };
        let tag = match input.kind {
            InputKind::Value => "value",
            InputKind::Statement => "statement",
        };
        let mut wrapper = named(tag, &input.name);
        wrapper
            .children
            .push(XMLNode::Element(write_block(graph, child)?));
        element.children.push(XMLNode::Element(wrapper));
    }
    if let Some(next) = &block.next {
        let mut wrapper = Element::new("next");
        wrapper
            .children
            .push(XMLNode::Element(write_block(graph, next)?));
        element.children.push(XMLNode::Element(wrapper));
    }
    Ok(element)
}

fn write_mutation(mutation: &Mutation) -> Option<Element> {
    let mut element = Element::new("mutation");
    match mutation {
        Mutation::None => return None,
        Mutation::Procedure { params, horizontal } => {
            element
                .attributes
                .insert("horizontal_parameters".to_string(), horizontal.to_string());
            push_names(&mut element, "arg", params);
        }
        Mutation::Call { name, args } => {
            element.attributes.insert("name".to_string(), name.clone());
            push_names(&mut element, "arg", args);
        }
        Mutation::Locals { names } => push_names(&mut element, "localname", names),
        Mutation::Items { count } => {
            element
                .attributes
                .insert("items".to_string(), count.to_string());
        }
        Mutation::If { else_if, has_else } => {
            if *else_if > 0 {
                element
                    .attributes
                    .insert("elseif".to_string(), else_if.to_string());
            }
            if *has_else {
                element.attributes.insert("else".to_string(), "1".to_string());
            }
        }
    }
    Some(element)
}

fn push_names(element: &mut Element, tag: &str, names: &[String]) {
    for name in names {
        element.children.push(XMLNode::Element(named(tag, name)));
    }
}

fn named(tag: &str, name: &str) -> Element {
    let mut element = Element::new(tag);
    element
        .attributes
        .insert("name".to_string(), name.to_string());
    element
}

fn read_position(element: &Element) -> Option<(i64, i64)> {
    let coord = |name: &str| {
        element
            .attributes
            .get(name)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .map(|v| v.round() as i64)
    };
    Some((coord("x")?, coord("y")?))
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

fn find_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    child_elements(element).find(|e| e.name == name)
}

fn collect_ids(element: &Element, taken: &mut HashSet<String>) {
    if element.name == "block" || element.name == "shadow" {
        if let Some(id) = element.attributes.get("id") {
            taken.insert(id.clone());
        }
    }
    for child in child_elements(element) {
        collect_ids(child, taken);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<xml xmlns="https://developers.google.com/blockly/xml">
  <block type="procedures_defnoreturn" id="def" x="10" y="20.4">
    <mutation horizontal_parameters="false"><arg name="n"></arg></mutation>
    <field name="NAME">countdown</field>
    <field name="VAR0">n</field>
    <statement name="STACK">
      <block type="procedures_callnoreturn" id="call">
        <mutation name="countdown"><arg name="n"></arg></mutation>
        <field name="PROCNAME">countdown</field>
        <value name="ARG0">
          <block type="lexical_variable_get" id="get">
            <field name="VAR">n</field>
          </block>
        </value>
      </block>
    </statement>
  </block>
  <block type="math_number" x="300" y="40">
    <field name="NUM">7</field>
  </block>
  <yacodeblocks ya-version="208" language-version="33"></yacodeblocks>
</xml>"#;

    #[test]
    fn loads_structure_mutations_and_fields() {
        let graph = load_bky(SAMPLE).unwrap();
        assert_eq!(graph.len(), 4);

        let def = graph.block(&BlockId::from("def")).unwrap();
        assert_eq!(def.field("NAME"), Some("countdown"));
        assert_eq!(def.field("VAR0"), Some("n"));
        assert_eq!(def.position, Some((10, 20)));
        assert_eq!(
            def.mutation,
            Mutation::Procedure {
                params: vec!["n".to_string()],
                horizontal: false
            }
        );
        assert_eq!(def.input_block("STACK"), Some(&BlockId::from("call")));

        let call = graph.block(&BlockId::from("call")).unwrap();
        assert_eq!(call.mutation.arity(), 1);
        assert_eq!(call.input_block("ARG0"), Some(&BlockId::from("get")));

        let top = graph.top_level();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0], BlockId::from("def"));
    }

    #[test]
    fn save_then_load_preserves_the_graph() {
        let graph = load_bky(SAMPLE).unwrap();
        let saved = save_bky(&graph).unwrap();
        let reloaded = load_bky(&saved).unwrap();
        assert_eq!(reloaded.len(), graph.len());
        for block in graph.blocks() {
            let other = reloaded.block(&block.id).unwrap();
            assert_eq!(other, block);
        }
    }

    #[test]
    fn declared_names_fall_back_to_var_fields() {
        let source = r#"<xml>
  <block type="local_declaration_statement" id="locals">
    <field name="VAR1">total</field>
    <field name="VAR0">count</field>
    <value name="DECL1">
      <block type="math_number" id="zero"><field name="NUM">0</field></block>
    </value>
  </block>
</xml>"#;
        let graph = load_bky(source).unwrap();
        let locals = graph.block(&BlockId::from("locals")).unwrap();
        assert_eq!(
            locals.mutation,
            Mutation::Locals {
                names: vec!["count".to_string(), "total".to_string()]
            }
        );
        assert_eq!(locals.field("VAR0"), Some("count"));
        assert_eq!(locals.field("VAR1"), Some("total"));
        assert_eq!(locals.input_block("DECL1"), Some(&BlockId::from("zero")));
    }

    #[test]
    fn unknown_types_keep_their_inputs() {
        let source = r#"<xml>
  <block type="Button_Click" id="evt">
    <field name="COMPONENT_SELECTOR">Button1</field>
    <statement name="DO">
      <block type="controls_break" id="brk"></block>
    </statement>
  </block>
</xml>"#;
        let graph = load_bky(source).unwrap();
        let event = graph.block(&BlockId::from("evt")).unwrap();
        assert_eq!(
            event.kind,
            BlockKind::Undefined("Button_Click".to_string())
        );
        assert_eq!(event.field("COMPONENT_SELECTOR"), Some("Button1"));
        assert_eq!(event.input_block("DO"), Some(&BlockId::from("brk")));
    }

    #[test]
    fn rejected_connections_leave_children_top_level() {
        let source = r#"<xml>
  <block type="controls_while" id="loop">
    <value name="NOPE">
      <block type="logic_boolean" id="flag"><field name="BOOL">TRUE</field></block>
    </value>
  </block>
</xml>"#;
        let graph = load_bky(source).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.block(&BlockId::from("flag")).unwrap().parent.is_none());
    }

    #[test]
    fn rejects_documents_without_an_xml_root() {
        assert!(load_bky("<blocks/>").is_err());
        assert!(load_bky("not xml").is_err());
    }
}
