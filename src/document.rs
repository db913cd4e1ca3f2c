//! Path access on JSON documents.

use serde_json::{Map, Value as Json};

/// Splits a property path such as `data.items[0]["a key"]` into its keys.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => keys.push(std::mem::take(&mut current)),
            '[' => {
                if !current.is_empty() {
                    keys.push(std::mem::take(&mut current));
                }
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut key = String::new();
                while let Some(c) = chars.next() {
                    match (quote, c) {
                        (Some(q), c) if c == q && chars.peek() == Some(&']') => {
                            chars.next();
                            break;
                        }
                        (Some(_), '\\') => {
                            if let Some(escaped) = chars.next() {
                                key.push(escaped);
                            }
                        }
                        (None, ']') => break,
                        (_, c) => key.push(c),
                    }
                }
                keys.push(key);
                if chars.peek() == Some(&'.') {
                    chars.next();
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || keys.is_empty() {
        keys.push(current);
    }
    keys
}

pub fn get<'d, S: AsRef<str>>(document: &'d Json, path: &[S]) -> Option<&'d Json> {
    path.iter().try_fold(document, |node, key| match node {
        Json::Object(map) => map.get(key.as_ref()),
        Json::Array(items) => key.as_ref().parse::<usize>().ok().and_then(|n| items.get(n)),
        _ => None,
    })
}

/// Writes `value` at `path`, creating intermediate objects and replacing
/// any non-container found on the way. Arrays only grow by appending: an
/// index past the end leaves the document untouched and returns false.
pub fn set<S: AsRef<str>>(document: &mut Json, path: &[S], value: Json) -> bool {
    let mut node = document;
    for key in path {
        match slot(node, key.as_ref()) {
            Some(next) => node = next,
            None => return false,
        }
    }
    *node = value;
    true
}

fn slot<'d>(node: &'d mut Json, key: &str) -> Option<&'d mut Json> {
    let index = match node {
        Json::Array(_) => key.parse::<usize>().ok(),
        _ => None,
    };
    match (node, index) {
        (Json::Array(items), Some(index)) => {
            if index == items.len() {
                items.push(Json::Null);
            }
            items.get_mut(index)
        }
        (node, _) => {
            if !node.is_object() {
                *node = Json::Object(Map::new());
            }
            match node {
                Json::Object(map) => Some(map.entry(key).or_insert(Json::Null)),
                _ => None,
            }
        }
    }
}

/// Empty in the lodash sense: null, scalars, and empty containers.
pub fn is_empty(document: &Json) -> bool {
    match document {
        Json::Object(map) => map.is_empty(),
        Json::Array(items) => items.is_empty(),
        Json::String(s) => s.is_empty(),
        _ => true,
    }
}
