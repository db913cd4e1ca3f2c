use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::EvalError;
use crate::eval::Interpreter;
use crate::library;
use crate::value::Value;

pub type NativeFn = Arc<dyn Fn(&Interpreter<'_>, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

static BASE: Lazy<FunctionRegistry> = Lazy::new(|| {
    let mut functions = FunctionRegistry::empty();
    library::install(&mut functions);
    functions
});

/// Named functions callable from formulas.
///
/// Every engine owns its own copy, so registering a function on one engine
/// is never visible to another.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NativeFn>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in library.
    pub fn base() -> Self {
        BASE.clone()
    }

    /// Adds or replaces `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&Interpreter<'_>, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
        self
    }

    /// Merges `other` into this registry; entries of `other` win.
    pub fn extend(&mut self, other: FunctionRegistry) -> &mut Self {
        self.functions.extend(other.functions);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
