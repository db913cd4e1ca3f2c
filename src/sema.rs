//! Static analysis of formula syntax trees.

use crate::parser::Node;

/// Pre-order traversal; `f` returns false to skip a node's children.
pub fn walk<'n, F: FnMut(&'n Node) -> bool>(node: &'n Node, f: &mut F) {
    if !f(node) {
        return;
    }
    match node {
        Node::Array(items) => {
            for item in items {
                walk(item, f);
            }
        }
        Node::Object(props) => {
            for (_, value) in props {
                walk(value, f);
            }
        }
        Node::Member { object, property, .. } => {
            walk(object, f);
            walk(property, f);
        }
        Node::Call { callee, args } => {
            walk(callee, f);
            for arg in args {
                walk(arg, f);
            }
        }
        Node::Unary { expr, .. } => walk(expr, f),
        Node::Binary { lhs, rhs, .. } | Node::Logical { lhs, rhs, .. } => {
            walk(lhs, f);
            walk(rhs, f);
        }
        Node::Conditional {
            test,
            consequent,
            alternate,
        } => {
            walk(test, f);
            walk(consequent, f);
            walk(alternate, f);
        }
        Node::Function { body, .. } => walk(body, f),
        _ => {}
    }
}

fn is_document(node: &Node, document_key: &str) -> bool {
    match node {
        Node::This => true,
        Node::Identifier(name) => name.as_ref() == document_key,
        _ => false,
    }
}

// Key of a member access when it is known without evaluation.
fn static_key(property: &Node, computed: bool) -> Option<String> {
    match property {
        Node::StringLiteral(s) => Some(s.to_string()),
        Node::Number(n) if computed => Some(crate::value::format_number(*n)),
        _ => None,
    }
}

/// Root and keys of a member chain whose every key is static.
fn member_chain(node: &Node) -> Option<(&Node, Vec<String>)> {
    match node {
        Node::Member {
            object,
            property,
            computed,
            ..
        } => {
            let key = static_key(property, *computed)?;
            let (root, mut keys) = member_chain(object)?;
            keys.push(key);
            Some((root, keys))
        }
        other => Some((other, Vec::new())),
    }
}

/// Document paths read by a formula: the longest static member chains
/// rooted at the document binding (or `this`). A bare reference to the
/// document reads nothing in particular and is not reported.
pub fn document_reads(ast: &Node, document_key: &str) -> Vec<Vec<String>> {
    let mut reads = Vec::new();
    walk(ast, &mut |node| {
        if !matches!(node, Node::Member { .. }) {
            return true;
        }
        match member_chain(node) {
            Some((root, keys)) => {
                if is_document(root, document_key) {
                    reads.push(keys);
                }
                // a fully static chain has nothing left to look at
                false
            }
            None => true,
        }
    });
    reads
}

/// A `<document>.links["<verb>"]` access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    pub verb: String,
    /// Spelled with `this` instead of the document binding.
    pub via_this: bool,
}

pub fn link_references(ast: &Node, document_key: &str) -> Vec<LinkReference> {
    let mut refs = Vec::new();
    walk(ast, &mut |node| {
        if let Node::Member {
            object,
            property,
            computed: true,
            ..
        } = node
        {
            if let (
                Some(verb),
                Node::Member {
                    object: root,
                    property: links,
                    computed: false,
                    ..
                },
            ) = (property.as_str(), object.as_ref())
            {
                if links.as_str() == Some("links") && is_document(root, document_key) {
                    refs.push(LinkReference {
                        verb: verb.to_string(),
                        via_this: matches!(root.as_ref(), Node::This),
                    });
                }
            }
        }
        true
    });
    refs
}

/// Identifier the events special case reads from.
pub const EVENTS: &str = "$events";

/// Source path of an events aggregation: `AGGREGATE($events, "<path>")` or
/// `UNIQUE(FLATMAP($events, "<path>"))`.
pub fn events_source(ast: &Node) -> Option<&str> {
    fn events_call<'n>(node: &'n Node, function: &str) -> Option<&'n str> {
        let Node::Call { callee, args } = node else {
            return None;
        };
        if callee.as_identifier() != Some(function) || args.len() < 2 {
            return None;
        }
        if args[0].as_identifier() != Some(EVENTS) {
            return None;
        }
        args[1].as_str()
    }

    if let Some(path) = events_call(ast, "AGGREGATE") {
        return Some(path);
    }
    match ast {
        Node::Call { callee, args } if callee.as_identifier() == Some("UNIQUE") && args.len() == 1 => {
            events_call(&args[0], "FLATMAP")
        }
        _ => None,
    }
}

/// Names of every function called by name.
pub fn called_functions(ast: &Node) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    walk(ast, &mut |node| {
        if let Node::Call { callee, .. } = node {
            if let Some(name) = callee.as_identifier() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        true
    });
    names
}
