use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::EvalError;
use crate::parser::{BinaryOp, LogicalOp, Node, UnaryOp};
use crate::registry::{FunctionRegistry, NativeFn};
use crate::value::{Object, Value};

/// Lexical bindings: the root scope holds the document and `input`,
/// function literals push a child scope for their parameters.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(parent: &Rc<Scope>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(v) => Some(v.clone()),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }
}

pub struct Lambda {
    params: Vec<Arc<str>>,
    body: Arc<Node>,
    scope: Rc<Scope>,
}

/// Anything a formula can call.
#[derive(Clone)]
pub enum Callable {
    Native { name: Rc<str>, func: NativeFn },
    Lambda(Rc<Lambda>),
    /// Arguments bound ahead of (or, with `from_right`, after) the call's own.
    Partial {
        target: Rc<Callable>,
        bound: Rc<Vec<Value>>,
        from_right: bool,
    },
    /// Calls its target with the argument order reversed.
    Flip(Rc<Callable>),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native { name, .. } => write!(f, "[Function {}]", name),
            Callable::Lambda(l) => write!(f, "[Function ({})]", l.params.join(", ")),
            Callable::Partial { target, .. } => write!(f, "[Function partial {:?}]", target),
            Callable::Flip(target) => write!(f, "[Function flip {:?}]", target),
        }
    }
}

pub struct Interpreter<'r> {
    functions: &'r FunctionRegistry,
    document_key: &'r str,
}

impl<'r> Interpreter<'r> {
    pub fn new(functions: &'r FunctionRegistry, document_key: &'r str) -> Self {
        Self {
            functions,
            document_key,
        }
    }

    pub fn eval(&self, node: &Node, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        Ok(match node {
            Node::Undefined => Value::Undefined,
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Num(*n),
            Node::StringLiteral(s) => Value::from(s.as_ref()),
            Node::Regexp(p) => Value::Re(p.clone()),

            Node::Array(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<Result<Vec<_>, _>>()?
                .into(),

            Node::Object(props) => {
                let mut map = Object::with_capacity(props.len());
                for (key, value) in props {
                    map.insert(key.to_string(), self.eval(value, scope)?);
                }
                map.into()
            }

            Node::Identifier(name) => self.resolve(name, scope)?,

            // `this` is the legacy spelling of the document binding.
            Node::This => self.resolve(self.document_key, scope)?,

            Node::Member {
                object,
                property,
                computed,
                optional,
            } => {
                let target = self.eval(object, scope)?;
                let key = match (computed, property.as_str()) {
                    (false, Some(name)) => name.to_string(),
                    _ => self.eval(property, scope)?.to_property_key(),
                };
                if target.is_nullish() {
                    if *optional {
                        return Ok(Value::Undefined);
                    }
                    return Err(EvalError::NullAccess {
                        property: key,
                        target: target.kind(),
                    });
                }
                target.property(&key)
            }

            Node::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                return self.call_node(callee, &args, scope);
            }

            Node::Unary { op, expr } => {
                if let (UnaryOp::TypeOf, Node::Identifier(name)) = (op, expr.as_ref()) {
                    // typeof tolerates undeclared names
                    return Ok(self
                        .resolve(name, scope)
                        .map_or(Value::from("undefined"), |v| Value::from(v.type_of())));
                }
                let v = self.eval(expr, scope)?;
                match op {
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::Neg => Value::Num(-v.to_number()),
                    UnaryOp::Plus => Value::Num(v.to_number()),
                    UnaryOp::TypeOf => Value::from(v.type_of()),
                }
            }

            Node::Binary { lhs, op, rhs } => {
                let l = self.eval(lhs, scope)?;
                let r = self.eval(rhs, scope)?;
                binary(*op, &l, &r)
            }

            Node::Logical { lhs, op, rhs } => {
                let l = self.eval(lhs, scope)?;
                let short = match op {
                    LogicalOp::And => !l.truthy(),
                    LogicalOp::Or => l.truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if short {
                    l
                } else {
                    self.eval(rhs, scope)?
                }
            }

            Node::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)?
                } else {
                    self.eval(alternate, scope)?
                }
            }

            Node::Function { params, body } => Value::Func(Callable::Lambda(Rc::new(Lambda {
                params: params.clone(),
                body: body.clone(),
                scope: scope.clone(),
            }))),
        })
    }

    fn resolve(&self, name: &str, scope: &Rc<Scope>) -> Result<Value, EvalError> {
        if let Some(v) = scope.lookup(name) {
            return Ok(v);
        }
        match self.functions.get(name) {
            Some(func) => Ok(Value::Func(Callable::Native {
                name: name.into(),
                func: func.clone(),
            })),
            None => Err(EvalError::UnknownIdentifier(name.to_string())),
        }
    }

    fn call_node(&self, callee: &Node, args: &[Value], scope: &Rc<Scope>) -> Result<Value, EvalError> {
        match callee {
            Node::Identifier(name) => {
                if let Some(v) = scope.lookup(name) {
                    return self.invoke(&v, args);
                }
                match self.functions.get(name) {
                    Some(func) => func(self, args),
                    None => Err(EvalError::UnknownFunction(name.to_string())),
                }
            }
            // No prototype methods: `list.reduce(...)` and friends are not
            // evaluated, although they parse and are visible to analysis.
            Node::Member { .. } => Err(EvalError::Unsupported(format!("method call {}", callee))),
            other => {
                let f = self.eval(other, scope)?;
                self.invoke(&f, args)
            }
        }
    }

    /// Calls `value` if it is a function.
    pub fn invoke(&self, value: &Value, args: &[Value]) -> Result<Value, EvalError> {
        match value {
            Value::Func(callable) => self.call(callable, args),
            other => Err(EvalError::NotCallable(other.to_string())),
        }
    }

    pub fn call(&self, callable: &Callable, args: &[Value]) -> Result<Value, EvalError> {
        match callable {
            Callable::Native { func, .. } => func(self, args),
            Callable::Lambda(lambda) => {
                let mut scope = Scope::child(&lambda.scope);
                for (n, param) in lambda.params.iter().enumerate() {
                    scope.bind(param.as_ref(), args.get(n).cloned().unwrap_or(Value::Undefined));
                }
                self.eval(&lambda.body, &Rc::new(scope))
            }
            Callable::Partial {
                target,
                bound,
                from_right,
            } => {
                let all: Vec<Value> = if *from_right {
                    args.iter().chain(bound.iter()).cloned().collect()
                } else {
                    bound.iter().chain(args.iter()).cloned().collect()
                };
                self.call(target, &all)
            }
            Callable::Flip(target) => {
                let reversed: Vec<Value> = args.iter().rev().cloned().collect();
                self.call(target, &reversed)
            }
        }
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering::*;

    match op {
        BinaryOp::Add => match (l, r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Value::from(format!("{}{}", l, r)),
            (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                Value::from(format!("{}{}", l, r))
            }
            _ => Value::Num(l.to_number() + r.to_number()),
        },
        BinaryOp::Sub => Value::Num(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Num(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Num(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Num(l.to_number() % r.to_number()),

        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinaryOp::StrictNe => Value::Bool(!l.strict_eq(r)),

        BinaryOp::Lt => Value::Bool(matches!(l.js_cmp(r), Some(Less))),
        BinaryOp::Le => Value::Bool(matches!(l.js_cmp(r), Some(Less | Equal))),
        BinaryOp::Gt => Value::Bool(matches!(l.js_cmp(r), Some(Greater))),
        BinaryOp::Ge => Value::Bool(matches!(l.js_cmp(r), Some(Greater | Equal))),
    }
}
