//! Mustache-style rendering for templated shaders.
//!
//! Supported tags: `{{name}}` (escaped), `{{{name}}}` and `{{& name}}` (raw),
//! `{{#section}}`/`{{^inverted}}` blocks over booleans, lists and tables,
//! `{{.}}`, dotted names and `{{! comments}}`. Partials and delimiter changes
//! are rejected.
//!
//! Helpers are sections whose name is reserved. `{{#nc}}expr ? fallback{{/nc}}`
//! renders `expr` and falls back to `fallback` when the result is blank.
use shadeconfig::{reserved_collisions, Variable, VariableSet, RESERVED_NAMES};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

type Helper = fn(&mut Renderer<'_>, &str, &mut String) -> Result<(), TemplateError>;

/// Helper sections keyed by name. Every name here is in `RESERVED_NAMES`.
const HELPERS: &[(&str, Helper)] = &[("nc", nullish_coalesce)];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error(
        "variable names {} are reserved; offending keys: {}",
        quoted(RESERVED_NAMES.iter().copied()),
        quoted(.offending.iter().map(String::as_str))
    )]
    ReservedVariables { offending: Vec<String> },
    #[error("malformed nullish-coalesce body '{body}': expected exactly one '?'")]
    MalformedNullish { body: String },
    #[error("tag opened at byte {0} is never closed")]
    UnclosedTag(usize),
    #[error("section '{0}' is never closed")]
    UnclosedSection(String),
    #[error("closing tag '{found}' does not match open section {expected:?}")]
    MismatchedClose {
        expected: Option<String>,
        found: String,
    },
    #[error("unsupported tag '{{{{{0}}}}}'")]
    UnsupportedTag(String),
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders `template` against `variables`.
pub fn render(template: &str, variables: &VariableSet) -> Result<String, TemplateError> {
    let offending = reserved_collisions(variables);
    if !offending.is_empty() {
        return Err(TemplateError::ReservedVariables { offending });
    }

    let mut renderer = Renderer {
        scopes: vec![Scope::Set(variables)],
    };
    renderer.render_str(template)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Variable {
        name: String,
        escape: bool,
    },
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
        body: String,
    },
}

struct Frame {
    name: String,
    inverted: bool,
    body_start: usize,
    nodes: Vec<Node>,
}

fn current<'s>(stack: &'s mut [Frame], root: &'s mut Vec<Node>) -> &'s mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.nodes,
        None => root,
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn parse(template: &str) -> Result<Vec<Node>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = template[cursor..].find(OPEN) {
        let tag_start = cursor + offset;
        push_text(current(&mut stack, &mut root), &template[cursor..tag_start]);

        let inner_start = tag_start + OPEN.len();
        let rest = &template[inner_start..];
        if let Some(raw) = rest.strip_prefix('{') {
            let close = raw.find("}}}").ok_or(TemplateError::UnclosedTag(tag_start))?;
            current(&mut stack, &mut root).push(Node::Variable {
                name: raw[..close].trim().to_string(),
                escape: false,
            });
            cursor = inner_start + 1 + close + 3;
            continue;
        }

        let close = rest.find(CLOSE).ok_or(TemplateError::UnclosedTag(tag_start))?;
        let content = rest[..close].trim();
        let tag_end = inner_start + close + CLOSE.len();
        cursor = tag_end;

        let mut chars = content.chars();
        match chars.next() {
            Some('!') => {}
            Some('&') => current(&mut stack, &mut root).push(Node::Variable {
                name: chars.as_str().trim().to_string(),
                escape: false,
            }),
            Some(sigil @ ('#' | '^')) => stack.push(Frame {
                name: chars.as_str().trim().to_string(),
                inverted: sigil == '^',
                body_start: tag_end,
                nodes: Vec::new(),
            }),
            Some('/') => {
                let found = chars.as_str().trim().to_string();
                let frame = match stack.pop() {
                    Some(frame) if frame.name == found => frame,
                    other => {
                        return Err(TemplateError::MismatchedClose {
                            expected: other.map(|frame| frame.name),
                            found,
                        })
                    }
                };
                let section = Node::Section {
                    body: template[frame.body_start..tag_start].to_string(),
                    name: frame.name,
                    inverted: frame.inverted,
                    children: frame.nodes,
                };
                current(&mut stack, &mut root).push(section);
            }
            Some('>' | '=') | None => {
                return Err(TemplateError::UnsupportedTag(content.to_string()));
            }
            Some(_) => current(&mut stack, &mut root).push(Node::Variable {
                name: content.to_string(),
                escape: true,
            }),
        }
    }

    push_text(current(&mut stack, &mut root), &template[cursor..]);
    if let Some(frame) = stack.pop() {
        return Err(TemplateError::UnclosedSection(frame.name));
    }
    Ok(root)
}

#[derive(Clone, Copy)]
enum Scope<'v> {
    Set(&'v VariableSet),
    Value(&'v Variable),
}

struct Renderer<'v> {
    scopes: Vec<Scope<'v>>,
}

impl<'v> Renderer<'v> {
    fn render_str(&mut self, template: &str) -> Result<String, TemplateError> {
        let nodes = parse(template)?;
        let mut out = String::with_capacity(template.len());
        self.render_nodes(&nodes, &mut out)?;
        Ok(out)
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Variable { name, escape } => {
                    if let Some(value) = self.lookup(name) {
                        let rendered = value.to_string();
                        if *escape {
                            push_escaped(out, &rendered);
                        } else {
                            out.push_str(&rendered);
                        }
                    }
                }
                Node::Section {
                    name,
                    inverted: false,
                    body,
                    ..
                } if helper(name).is_some() => {
                    if let Some(helper) = helper(name) {
                        helper(self, body, out)?;
                    }
                }
                Node::Section {
                    name,
                    inverted,
                    children,
                    ..
                } => self.render_section(name, *inverted, children, out)?,
            }
        }
        Ok(())
    }

    fn render_section(
        &mut self,
        name: &str,
        inverted: bool,
        children: &[Node],
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let value = self.lookup(name).filter(|value| value.is_truthy());
        match (value, inverted) {
            (None, true) => self.render_nodes(children, out),
            (Some(_), true) | (None, false) => Ok(()),
            (Some(Variable::List(items)), false) => {
                for item in items {
                    self.with_scope(Scope::Value(item), children, out)?;
                }
                Ok(())
            }
            (Some(value), false) => self.with_scope(Scope::Value(value), children, out),
        }
    }

    fn with_scope(
        &mut self,
        scope: Scope<'v>,
        children: &[Node],
        out: &mut String,
    ) -> Result<(), TemplateError> {
        self.scopes.push(scope);
        let result = self.render_nodes(children, out);
        self.scopes.pop();
        result
    }

    fn lookup(&self, name: &str) -> Option<&'v Variable> {
        if name == "." {
            return match self.scopes.last() {
                Some(Scope::Value(value)) => Some(*value),
                _ => None,
            };
        }

        let mut parts = name.split('.');
        let first = parts.next()?;
        let found = self.scopes.iter().rev().find_map(|scope| {
            let table = match scope {
                Scope::Set(set) => Some(*set),
                Scope::Value(value) => value.as_table(),
            };
            table.and_then(|table| table.get(first))
        })?;
        parts.try_fold(found, |value, part| value.as_table()?.get(part))
    }
}

fn helper(name: &str) -> Option<Helper> {
    HELPERS
        .iter()
        .find(|(helper_name, _)| *helper_name == name)
        .map(|(_, helper)| *helper)
}

fn nullish_coalesce(
    renderer: &mut Renderer<'_>,
    body: &str,
    out: &mut String,
) -> Result<(), TemplateError> {
    let mut parts = body.split('?');
    let (Some(expr), Some(fallback), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TemplateError::MalformedNullish {
            body: body.to_string(),
        });
    };

    let primary = renderer.render_str(expr.trim_end())?;
    if primary.trim().is_empty() {
        let fallback = renderer.render_str(fallback.trim_start())?;
        out.push_str(&fallback);
    } else {
        out.push_str(&primary);
    }
    Ok(())
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}
