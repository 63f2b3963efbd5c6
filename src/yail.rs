use crate::block::BlockId;
use std::fmt::{Display, Formatter};

/// Yail S-expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Yail {
    Symbol(String),
    Str(String),
    /// Numeric literal, kept verbatim.
    Num(String),
    Bool(bool),
    List(Vec<Yail>),
    Placeholder { block: BlockId, reason: String },
}

impl Yail {
    pub fn sym(name: impl Into<String>) -> Self {
        Yail::Symbol(name.into())
    }

    pub fn call(head: &str, args: Vec<Yail>) -> Self {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Yail::sym(head));
        items.extend(args);
        Yail::List(items)
    }

    /// `(call-yail-primitive name (*list-for-runtime* args...))`
    pub fn primitive(name: &str, args: Vec<Yail>) -> Self {
        Yail::call(
            "call-yail-primitive",
            vec![Yail::sym(name), Yail::call("*list-for-runtime*", args)],
        )
    }

    /// `(begin ...)`
    pub fn begin(body: Vec<Yail>) -> Self {
        Yail::call("begin", body)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Yail::Placeholder { .. })
    }

    /// Renders with line breaks wherever a form would run past `width` columns.
    pub fn pretty(&self, width: usize) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0, width);
        out
    }

    fn write_pretty(&self, out: &mut String, indent: usize, width: usize) {
        let flat = self.to_string();
        let items = match self {
            Yail::List(items) if indent + flat.len() > width && items.len() > 1 => items,
            _ => {
                out.push_str(&flat);
                return;
            }
        };
        out.push('(');
        items[0].write_pretty(out, indent + 1, width);
        for item in &items[1..] {
            out.push('\n');
            out.push_str(&spaces(indent + 2));
            item.write_pretty(out, indent + 2, width);
        }
        out.push(')');
    }
}

impl Display for Yail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Yail::Symbol(name) => f.write_str(name),
            Yail::Str(text) => f.write_str(&quote_str(text)),
            Yail::Num(raw) => f.write_str(raw),
            Yail::Bool(true) => f.write_str("#t"),
            Yail::Bool(false) => f.write_str("#f"),
            Yail::List(items) => {
                f.write_str("(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Yail::Placeholder { block, reason } => write!(
                f,
                "(*unresolved* {} {})",
                quote_str(reason),
                quote_str(block.as_str())
            ),
        }
    }
}

pub fn quote_str(s: &str) -> String {
    format!(
        "\"{}\"",
        s.replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t")
    )
}

fn spaces(n: usize) -> String {
    " ".repeat(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_compact_forms() {
        let form = Yail::primitive(
            "string-append",
            vec![Yail::Str("say \"hi\"".to_string()), Yail::Num("1.5".to_string())],
        );
        assert_eq!(
            form.to_string(),
            r#"(call-yail-primitive string-append (*list-for-runtime* "say \"hi\"" 1.5))"#
        );
        let hole = Yail::Placeholder {
            block: BlockId::from("b7"),
            reason: "no binding for x".to_string(),
        };
        assert_eq!(hole.to_string(), r#"(*unresolved* "no binding for x" "b7")"#);
    }

    #[test]
    fn pretty_breaks_long_forms() {
        let form = Yail::call(
            "def",
            vec![
                Yail::List(vec![Yail::sym("p$go"), Yail::sym("$a")]),
                Yail::call("set-lexical!", vec![Yail::sym("$a"), Yail::Bool(true)]),
            ],
        );
        assert_eq!(form.pretty(80), form.to_string());
        assert_eq!(
            form.pretty(24),
            "(def\n  (p$go $a)\n  (set-lexical! $a #t))"
        );
    }
}
