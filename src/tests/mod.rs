use serde_json::{json, Value as Json};

use crate::Engine;

mod library;
mod object;
mod schema;
mod triggers;

// Evaluate `formula` against `document` and `input`, expecting `exp`.
fn check_with(formula: &str, document: Json, input: Json, exp: Json) {
    match Engine::new().evaluate(formula, &document, &input) {
        Ok(result) => {
            println!("Code: {}", formula);
            assert_eq!(result.value, exp, "{}", formula);
        }
        Err(e) => panic!("{}: {}", formula, e),
    }
}

fn check(formula: &str, input: Json, exp: Json) {
    check_with(formula, json!({}), input, exp)
}
