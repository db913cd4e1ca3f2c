use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

mod config;
mod document;
mod error;
mod eval;
mod library;
mod links;
mod object;
mod parser;
mod registry;
mod schema;
mod sema;
mod triggers;
mod value;

#[cfg(test)]
mod tests;

// Following is our public interface
pub use crate::config::Config;
pub use crate::error::{Error, EvalError, Result};
pub use crate::eval::{Callable, Interpreter, Scope};
pub use crate::library::{MERGEABLE, NEVER, PENDING};
pub use crate::links::{LinkConstraint, LinkRegistry, ReverseLink};
pub use crate::object::evaluation_order;
pub use crate::parser::{parse, Node, ParseError};
pub use crate::registry::{FunctionRegistry, NativeFn};
pub use crate::schema::{extract_formulas, schema_hash, FormulaCache, FormulaDescriptor, OutputPath};
pub use crate::sema::{document_reads, link_references, LinkReference};
pub use crate::triggers::{slugify, TriggerData, TriggerDefinition, TypeContract, TypeData};
pub use crate::value::Value;

/// A parsed formula, ready to be evaluated any number of times.
#[derive(Clone)]
pub struct Formula {
    text: String,
    ast: Arc<Node>,
}

impl Debug for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formula")
            .field("text", &self.text)
            .field("functions", &sema::called_functions(&self.ast))
            .finish()
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ast)
    }
}

impl Formula {
    pub fn compile(text: &str) -> std::result::Result<Self, ParseError> {
        let ast = parser::parse(text)?;
        Ok(Formula {
            text: text.to_string(),
            ast,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Node {
        &self.ast
    }
}

pub fn compile(text: &str) -> std::result::Result<Formula, ParseError> {
    Formula::compile(text)
}

/// Result of evaluating one formula. Anything JSON cannot hold, and any
/// ordinary runtime failure, is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub value: Json,
}

impl Evaluation {
    pub fn null() -> Self {
        Self { value: Json::Null }
    }
}

/// Formula evaluation, object and patch evaluation, and trigger synthesis
/// behind one configuration.
///
/// Engines are cheap to clone apart from their function table, and each
/// owns that table: registering on one engine never affects another.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) functions: FunctionRegistry,
    pub(crate) cache: Arc<FormulaCache>,
    pub(crate) links: LinkRegistry,
    pub(crate) config: Config,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Engine {
            functions: FunctionRegistry::base(),
            cache: FormulaCache::shared(),
            links: LinkRegistry::default(),
            config,
        }
    }

    /// Adds custom functions; they take precedence over built-ins.
    pub fn with_functions(mut self, custom: FunctionRegistry) -> Self {
        self.functions.extend(custom);
        self
    }

    /// Uses `cache` instead of the process-wide formula cache.
    pub fn with_cache(mut self, cache: Arc<FormulaCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_links(mut self, links: LinkRegistry) -> Self {
        self.links = links;
        self
    }

    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&Interpreter<'_>, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions.register(name, func);
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// Formulas declared by `schema`, memoized by schema content.
    pub fn formulas(&self, schema: &Json) -> Arc<[FormulaDescriptor]> {
        self.cache.formulas(schema)
    }

    /// Parses and evaluates `formula` with `document` bound to the document
    /// key and `input` to `input`.
    pub fn evaluate(&self, formula: &str, document: &Json, input: &Json) -> Result<Evaluation> {
        let formula = Formula::compile(formula)?;
        self.evaluate_formula(&formula, document, input)
    }

    pub fn evaluate_formula(&self, formula: &Formula, document: &Json, input: &Json) -> Result<Evaluation> {
        match self.run(formula, document, input) {
            Ok(value) => Ok(Evaluation {
                value: value.to_json().unwrap_or(Json::Null),
            }),
            Err(err @ EvalError::MissingArgument { .. }) => Err(err.into()),
            Err(err) => {
                debug!(formula = formula.text(), error = %err, "formula evaluated to null");
                Ok(Evaluation::null())
            }
        }
    }

    fn run(&self, formula: &Formula, document: &Json, input: &Json) -> std::result::Result<Value, EvalError> {
        let mut scope = Scope::root();
        scope
            .bind(self.config.document_key.as_str(), Value::from_json(document))
            .bind("input", Value::from_json(input));
        Interpreter::new(&self.functions, &self.config.document_key).eval(&formula.ast, &Rc::new(scope))
    }
}
