fn main() {
    afl::fuzz!(|data: &[u8]| {
        if let Ok(text) = std::str::from_utf8(data) {
            if let Ok(formula) = formulary::compile(text) {
                let engine = formulary::Engine::new();
                let _ = engine.evaluate_formula(&formula, &serde_json::Value::Null, &serde_json::Value::Null);
            }
        }
    });
}
