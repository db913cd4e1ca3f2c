use std::fmt;
use std::sync::Arc;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, multispace0, satisfy};
use nom::combinator::{eof, map, not, opt, recognize};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::separated_list0;
use nom::number::complete::recognize_float;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{Finish, IResult, Offset};

use regex::{Regex, RegexBuilder};

/// Formula syntax tree.
///
/// Non-computed member properties (`a.b`) are stored as `StringLiteral`
/// nodes with `computed: false`, so `a.b` and `a["b"]` differ only in that
/// flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    StringLiteral(Arc<str>),
    Regexp(Arc<Pattern>),
    Array(Vec<Arc<Node>>),
    Object(Vec<(Arc<str>, Arc<Node>)>),
    Identifier(Arc<str>),
    This,
    Member {
        object: Arc<Node>,
        property: Arc<Node>,
        computed: bool,
        optional: bool,
    },
    Call {
        callee: Arc<Node>,
        args: Vec<Arc<Node>>,
    },
    Unary {
        op: UnaryOp,
        expr: Arc<Node>,
    },
    Binary {
        lhs: Arc<Node>,
        op: BinaryOp,
        rhs: Arc<Node>,
    },
    Logical {
        lhs: Arc<Node>,
        op: LogicalOp,
        rhs: Arc<Node>,
    },
    Conditional {
        test: Arc<Node>,
        consequent: Arc<Node>,
        alternate: Arc<Node>,
    },
    Function {
        params: Vec<Arc<str>>,
        body: Arc<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,    // !A
    Neg,    // -A
    Plus,   // +A
    TypeOf, // typeof A
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, // A + B
    Sub, // A - B
    Mul, // A * B
    Div, // A / B
    Rem, // A % B

    Eq,       // A == B
    Ne,       // A != B
    StrictEq, // A === B
    StrictNe, // A !== B

    Lt, // A <  B
    Le, // A <= B
    Gt, // A >  B
    Ge, // A >= B
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,     // A && B
    Or,      // A || B
    Nullish, // A ?? B
}

type Input<'a> = &'a str;

impl<'a> From<Input<'a>> for BinaryOp {
    fn from(i: Input) -> Self {
        match i {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNe,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => unreachable!("Unknown operator {}", i),
        }
    }
}

impl<'a> From<Input<'a>> for LogicalOp {
    fn from(i: Input) -> Self {
        match i {
            "&&" => LogicalOp::And,
            "||" => LogicalOp::Or,
            "??" => LogicalOp::Nullish,
            _ => unreachable!("Unknown operator {}", i),
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Nullish => "??",
        }
    }
}

/// A compiled regular expression literal, `/source/flags`.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        if let Some(bad) = flags.chars().find(|c| !"gimsuy".contains(*c)) {
            return Err(format!("invalid regular expression flag '{}'", bad));
        }
        let regex = RegexBuilder::new(&source.replace("\\/", "/"))
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

impl Node {
    fn from_identifier(i: Input) -> Arc<Node> {
        Arc::new(Node::Identifier(i.into()))
    }

    fn from_numeric(i: Input) -> Arc<Node> {
        let num = if let Some(hex) = i.strip_prefix("0x").or_else(|| i.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).map(|n| n as f64).unwrap_or(f64::NAN)
        } else {
            i.parse::<f64>().unwrap_or(f64::NAN)
        };
        Arc::new(Node::Number(num))
    }

    fn from_string(s: &str) -> Arc<Node> {
        Arc::new(Node::StringLiteral(s.into()))
    }

    fn new_member(object: Arc<Node>, property: Arc<Node>, computed: bool, optional: bool) -> Arc<Node> {
        Arc::new(Node::Member {
            object,
            property,
            computed,
            optional,
        })
    }

    fn new_binary(lhs: Arc<Node>, op: BinaryOp, rhs: Arc<Node>) -> Arc<Node> {
        Arc::new(Node::Binary { lhs, op, rhs })
    }

    fn new_logical(lhs: Arc<Node>, op: LogicalOp, rhs: Arc<Node>) -> Arc<Node> {
        Arc::new(Node::Logical { lhs, op, rhs })
    }

    fn new_unary(op: UnaryOp, expr: Arc<Node>) -> Arc<Node> {
        Arc::new(Node::Unary { op, expr })
    }

    /// The literal text of a string literal node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::StringLiteral(s) => Some(s),
            _ => None,
        }
    }

    /// The name of an identifier node.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Node::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Undefined => write!(f, "undefined"),
            Node::Null => write!(f, "null"),
            Node::Bool(b) => write!(f, "{}", b),
            Node::Number(n) => write!(f, "{}", crate::value::format_number(*n)),
            Node::StringLiteral(s) => write!(f, "{:?}", s),
            Node::Regexp(p) => write!(f, "{}", p),
            Node::Array(items) => {
                write!(f, "[")?;
                for (n, item) in items.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Node::Object(props) => {
                write!(f, "{{")?;
                for (n, (key, value)) in props.iter().enumerate() {
                    if n > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {:?}: {}", key, value)?;
                }
                write!(f, " }}")
            }
            Node::Identifier(name) => write!(f, "{}", name),
            Node::This => write!(f, "this"),
            Node::Member {
                object,
                property,
                computed,
                optional,
            } => {
                let dot = if *optional { "?." } else { "" };
                match (computed, property.as_str()) {
                    (false, Some(name)) => {
                        write!(f, "{}{}{}", object, if *optional { "?." } else { "." }, name)
                    }
                    _ => write!(f, "{}{}[{}]", object, dot, property),
                }
            }
            Node::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (n, arg) in args.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Node::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "!{}", expr),
                UnaryOp::Neg => write!(f, "-{}", expr),
                UnaryOp::Plus => write!(f, "+{}", expr),
                UnaryOp::TypeOf => write!(f, "typeof {}", expr),
            },
            Node::Binary { lhs, op, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Node::Logical { lhs, op, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Node::Conditional {
                test,
                consequent,
                alternate,
            } => write!(f, "({} ? {} : {})", test, consequent, alternate),
            Node::Function { params, body } => write!(f, "({}) => {}", params.join(", "), body),
        }
    }
}

/// A formula that is not a single valid expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub input: String,
    pub pos: usize,
    pub msg: String,
}

impl ParseError {
    fn new(input: Input, pos: usize, msg: String) -> Self {
        Self {
            input: input.to_string(),
            pos,
            msg,
        }
    }

    pub fn describe(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parse Error: {}", self.msg)?;
        // Only the offending line of a multi-line formula is shown.
        let start = self.input[..self.pos].rfind('\n').map_or(0, |n| n + 1);
        let end = self.input[self.pos..]
            .find('\n')
            .map_or(self.input.len(), |n| self.pos + n);
        let line = &self.input[start..end];
        let column = self.input[start..self.pos].chars().count();
        writeln!(f, "> {}", line)?;
        if self.pos != 0 {
            writeln!(f, "> {}^", " ".repeat(column))?;
            writeln!(f, "> {}`--- this is wrong!", " ".repeat(column))
        } else {
            writeln!(f, "> {}", "-".repeat(line.chars().count().max(1)))
        }
    }
}

impl std::error::Error for ParseError {}

const MAX_DEPTH: usize = 200;
// operator and member chains are folded in a loop, but the tree they build is not
const MAX_HEIGHT: usize = 256;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "let", "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var", "void",
    "while", "with", "yield", "true", "false", "null",
];

pub fn parse(i: Input) -> Result<Arc<Node>, ParseError> {
    match parse_expr(i).finish() {
        Ok((_, o)) => Ok(o),
        Err(e) => {
            let pos = i.as_bytes().offset(e.input.as_bytes());
            let msg = if e.code == ErrorKind::TooLarge {
                format!("formula nests too deeply at offset {}", pos)
            } else if e.input.trim().is_empty() {
                "unexpected end of formula".to_string()
            } else {
                format!("unexpected input at offset {}", pos)
            };
            Err(ParseError::new(i, pos, msg))
        }
    }
}

// parse_expr = { SOI ~ expression ~ ";"? ~ ws* ~ EOI }
fn parse_expr(i: Input) -> IResult<Input, Arc<Node>> {
    let (i, e) = expression(0)(i)?;
    let (i, _) = opt(punct(";"))(i)?;
    let (i, _) = ws(i)?;
    let (i, _) = eof(i)?;
    Ok((i, e))
}

// ws = { (whitespace | "//" ~ line | "/*" ~ block ~ "*/")* }
fn ws(i: Input) -> IResult<Input, ()> {
    let mut i = i;
    loop {
        let (r, _) = multispace0(i)?;
        if let Some(rest) = r.strip_prefix("//") {
            i = rest.find('\n').map_or("", |n| &rest[n..]);
        } else if let Some(rest) = r.strip_prefix("/*") {
            match rest.find("*/") {
                Some(n) => i = &rest[n + 2..],
                None => return Err(nom::Err::Failure(NomError::new(r, ErrorKind::TakeUntil))),
            }
        } else {
            return Ok((r, ()));
        }
    }
}

fn punct(t: &'static str) -> impl Fn(Input) -> IResult<Input, Input> {
    move |i| preceded(ws, tag(t))(i)
}

fn keyword(kw: &'static str) -> impl Fn(Input) -> IResult<Input, Input> {
    move |i| terminated(preceded(ws, tag(kw)), not(satisfy(is_ident_char)))(i)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn ident_name(i: Input) -> IResult<Input, Input> {
    let (i, _) = ws(i)?;
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(i)
}

fn binding_name(i: Input) -> IResult<Input, Input> {
    let (rest, name) = ident_name(i)?;
    if RESERVED.contains(&name) {
        return Err(nom::Err::Error(NomError::new(i, ErrorKind::Verify)));
    }
    Ok((rest, name))
}

// Left-associative chain: next ~ (op ~ next)*
fn fold_chain<'a, O>(
    i: Input<'a>,
    op: impl Fn(Input<'a>) -> IResult<Input<'a>, O>,
    next: impl Fn(Input<'a>) -> IResult<Input<'a>, Arc<Node>>,
    build: impl Fn(Arc<Node>, O, Arc<Node>) -> Arc<Node>,
) -> IResult<Input<'a>, Arc<Node>> {
    let (mut i, mut lhs) = next(i)?;
    let mut h = height(&lhs);
    loop {
        match op(i) {
            Ok((rest, o)) => {
                let (rest, rhs) = next(rest)?;
                h = grow(rest, h, height(&rhs))?;
                lhs = build(lhs, o, rhs);
                i = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((i, lhs)),
            Err(e) => return Err(e),
        }
    }
}

fn expression(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let d = depth(i, d)?;
        conditional(d)(i)
    }
}

// conditional = { nullish ~ ("?" ~ expression ~ ":" ~ expression)? }
fn conditional(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, test) = nullish(d)(i)?;
        match punct("?")(i) {
            Ok((i, _)) => {
                let (i, consequent) = expression(d)(i)?;
                let (i, _) = punct(":")(i)?;
                let (i, alternate) = expression(d)(i)?;
                Ok((
                    i,
                    Arc::new(Node::Conditional {
                        test,
                        consequent,
                        alternate,
                    }),
                ))
            }
            Err(nom::Err::Error(_)) => Ok((i, test)),
            Err(e) => Err(e),
        }
    }
}

fn nullish(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        fold_chain(
            i,
            |i| map(preceded(ws, tag("??")), LogicalOp::from)(i),
            or_expr(d),
            Node::new_logical,
        )
    }
}

fn or_expr(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        fold_chain(
            i,
            |i| map(preceded(ws, tag("||")), LogicalOp::from)(i),
            and_expr(d),
            Node::new_logical,
        )
    }
}

fn and_expr(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        fold_chain(
            i,
            |i| map(preceded(ws, tag("&&")), LogicalOp::from)(i),
            equality(d),
            Node::new_logical,
        )
    }
}

fn equality(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| fold_chain(i, equality_op, relational(d), Node::new_binary)
}

fn relational(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| fold_chain(i, relational_op, additive(d), Node::new_binary)
}

fn additive(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| fold_chain(i, additive_op, multiplicative(d), Node::new_binary)
}

fn multiplicative(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| fold_chain(i, multiplicative_op, unary(d), Node::new_binary)
}

fn equality_op(i: Input) -> IResult<Input, BinaryOp> {
    let (i, _) = ws(i)?;
    map(
        alt((tag("==="), tag("!=="), tag("=="), tag("!="))),
        BinaryOp::from,
    )(i)
}

fn relational_op(i: Input) -> IResult<Input, BinaryOp> {
    let (i, _) = ws(i)?;
    map(alt((tag("<="), tag(">="), tag("<"), tag(">"))), BinaryOp::from)(i)
}

fn additive_op(i: Input) -> IResult<Input, BinaryOp> {
    let (i, _) = ws(i)?;
    map(
        alt((
            terminated(tag("+"), not(char('+'))),
            terminated(tag("-"), not(char('-'))),
        )),
        BinaryOp::from,
    )(i)
}

fn multiplicative_op(i: Input) -> IResult<Input, BinaryOp> {
    let (i, _) = ws(i)?;
    map(
        terminated(alt((tag("*"), tag("/"), tag("%"))), not(char('='))),
        BinaryOp::from,
    )(i)
}

// unary = { ("!" | "-" | "+" | "typeof")* ~ postfix }
fn unary(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let d = depth(i, d)?;
        let (i, _) = ws(i)?;
        let op = alt((
            map(keyword("typeof"), |_| UnaryOp::TypeOf),
            map(tag("!"), |_| UnaryOp::Not),
            map(terminated(tag("-"), not(char('-'))), |_| UnaryOp::Neg),
            map(terminated(tag("+"), not(char('+'))), |_| UnaryOp::Plus),
        ))(i);

        match op {
            Ok((i, op)) => {
                let (i, expr) = unary(d)(i)?;
                Ok((i, Node::new_unary(op, expr)))
            }
            Err(nom::Err::Error(_)) => postfix(d)(i),
            Err(e) => Err(e),
        }
    }
}

// postfix = { primary ~ ("." ~ name | "?." ~ name | "?."? ~ "[" ~ expression ~ "]" | arguments)* }
fn postfix(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (mut i, mut node) = primary(d)(i)?;
        let mut h = height(&node);
        loop {
            if let Ok((rest, _)) = terminated(punct("?."), not(satisfy(|c| c.is_ascii_digit())))(i) {
                if let Ok((rest, _)) = punct("[")(rest) {
                    let (rest, property) = expression(d)(rest)?;
                    let (rest, _) = punct("]")(rest)?;
                    h = grow(rest, h, height(&property))?;
                    node = Node::new_member(node, property, true, true);
                    i = rest;
                } else {
                    let (rest, name) = ident_name(rest)?;
                    h = grow(rest, h, 1)?;
                    node = Node::new_member(node, Node::from_string(name), false, true);
                    i = rest;
                }
                continue;
            }

            if let Ok((rest, _)) = punct(".")(i) {
                let (rest, name) = ident_name(rest)?;
                h = grow(rest, h, 1)?;
                node = Node::new_member(node, Node::from_string(name), false, false);
                i = rest;
                continue;
            }

            if let Ok((rest, _)) = punct("[")(i) {
                let (rest, property) = expression(d)(rest)?;
                let (rest, _) = punct("]")(rest)?;
                h = grow(rest, h, height(&property))?;
                node = Node::new_member(node, property, true, false);
                i = rest;
                continue;
            }

            if let Ok((rest, _)) = punct("(")(i) {
                let (rest, args) = items(d, ")")(rest)?;
                h = grow(rest, h, args.iter().map(|a| height(a)).max().unwrap_or(0))?;
                node = Arc::new(Node::Call { callee: node, args });
                i = rest;
                continue;
            }

            return Ok((i, node));
        }
    }
}

// items = { (expression ~ ("," ~ expression)* ~ ","?)? ~ close }
fn items(d: usize, close: &'static str) -> impl Fn(Input) -> IResult<Input, Vec<Arc<Node>>> {
    move |i| {
        let mut out = Vec::new();
        let mut i = i;
        loop {
            if let Ok((rest, _)) = punct(close)(i) {
                return Ok((rest, out));
            }
            let (rest, item) = expression(d)(i)?;
            out.push(item);
            match punct(",")(rest) {
                Ok((rest, _)) => i = rest,
                Err(nom::Err::Error(_)) => {
                    let (rest, _) = punct(close)(rest)?;
                    return Ok((rest, out));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// primary = { arrow | function | numeric | string | regexp | array | object | parens | word }
fn primary(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, _) = ws(i)?;
        alt((
            arrow_function(d),
            function_expression(d),
            numeric,
            map(string_value, |s| Node::from_string(&s)),
            regexp,
            array_literal(d),
            object_literal(d),
            parens_expr(d),
            word,
        ))(i)
    }
}

fn word(i: Input) -> IResult<Input, Arc<Node>> {
    let (rest, name) = ident_name(i)?;
    let node = match name {
        "true" => Node::Bool(true),
        "false" => Node::Bool(false),
        "null" => Node::Null,
        "undefined" => Node::Undefined,
        "this" => Node::This,
        _ if RESERVED.contains(&name) => {
            return Err(nom::Err::Error(NomError::new(i, ErrorKind::Verify)));
        }
        _ => return Ok((rest, Node::from_identifier(name))),
    };
    Ok((rest, Arc::new(node)))
}

fn params(i: Input) -> IResult<Input, Vec<Arc<str>>> {
    delimited(
        punct("("),
        separated_list0(punct(","), map(binding_name, Arc::<str>::from)),
        punct(")"),
    )(i)
}

// arrow = { (name | params) ~ "=>" ~ (body | expression) }
fn arrow_function(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, params) = alt((map(binding_name, |p| vec![Arc::<str>::from(p)]), params))(i)?;
        let (i, _) = punct("=>")(i)?;
        let (i, body) = alt((block_body(d), expression(d)))(i)?;
        Ok((i, Arc::new(Node::Function { params, body })))
    }
}

// function = { "function" ~ name? ~ params ~ body }
fn function_expression(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, _) = keyword("function")(i)?;
        let (i, _) = opt(binding_name)(i)?;
        let (i, params) = params(i)?;
        let (i, body) = block_body(d)(i)?;
        Ok((i, Arc::new(Node::Function { params, body })))
    }
}

// body = { "{" ~ "return" ~ expression ~ ";"? ~ "}" }
fn block_body(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, _) = punct("{")(i)?;
        let (i, _) = keyword("return")(i)?;
        let (i, body) = expression(d)(i)?;
        let (i, _) = opt(punct(";"))(i)?;
        let (i, _) = punct("}")(i)?;
        Ok((i, body))
    }
}

fn array_literal(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (i, _) = punct("[")(i)?;
        let (i, elements) = items(d, "]")(i)?;
        Ok((i, Arc::new(Node::Array(elements))))
    }
}

// object = { "{" ~ (key ~ (":" ~ expression)? ~ ","?)* ~ "}" }
fn object_literal(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| {
        let (mut i, _) = punct("{")(i)?;
        let mut props = Vec::new();
        loop {
            if let Ok((rest, _)) = punct("}")(i) {
                return Ok((rest, Arc::new(Node::Object(props))));
            }
            let (rest, _) = ws(i)?;
            let (rest, (key, shorthand)) = alt((
                map(string_value, |s| (s, false)),
                map(ident_name, |s| (s.to_string(), !RESERVED.contains(&s))),
            ))(rest)?;
            let (rest, value) = match punct(":")(rest) {
                Ok((rest, _)) => expression(d)(rest)?,
                Err(nom::Err::Error(e)) if !shorthand => return Err(nom::Err::Error(e)),
                Err(nom::Err::Error(_)) => (rest, Node::from_identifier(&key)),
                Err(e) => return Err(e),
            };
            props.push((Arc::<str>::from(key), value));
            match punct(",")(rest) {
                Ok((rest, _)) => i = rest,
                Err(nom::Err::Error(_)) => {
                    let (rest, _) = punct("}")(rest)?;
                    return Ok((rest, Arc::new(Node::Object(props))));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// parens_expr = { "(" ~ expression ~ ")" }
fn parens_expr(d: usize) -> impl Fn(Input) -> IResult<Input, Arc<Node>> {
    move |i| delimited(punct("("), expression(d), punct(")"))(i)
}

fn numeric(i: Input) -> IResult<Input, Arc<Node>> {
    let (i, n) = map(alt((hexnum, unsigned_float)), Node::from_numeric)(i)?;
    let (i, _) = not(satisfy(is_ident_char))(i)?;
    Ok((i, n))
}

fn unsigned_float(i: Input) -> IResult<Input, Input> {
    let (_, _) = satisfy(|c| c.is_ascii_digit() || c == '.')(i)?;
    recognize_float(i)
}

fn hexnum(i: Input) -> IResult<Input, Input> {
    recognize(pair(
        alt((tag("0x"), tag("0X"))),
        take_while1(|c: char| c.is_ascii_hexdigit()),
    ))(i)
}

// string = { quote ~ (escaped_char | !quote ~ ANY)* ~ quote }
fn string_value(i: Input) -> IResult<Input, String> {
    let quote = match i.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Err(nom::Err::Error(NomError::new(i, ErrorKind::Char))),
    };

    let mut out = String::new();
    let mut chars = i.char_indices().skip(1);
    while let Some((pos, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&i[pos + 1..], out)),
            '\\' => {
                let Some((epos, e)) = chars.next() else { break };
                match e {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    '0' => out.push('\0'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'v' => out.push('\u{b}'),
                    '\n' => {}
                    'x' | 'u' => {
                        let len = if e == 'x' { 2 } else { 4 };
                        let escaped = i
                            .get(epos + 1..epos + 1 + len)
                            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                nom::Err::Failure(NomError::new(&i[pos..], ErrorKind::Escaped))
                            })?;
                        out.push(escaped);
                        for _ in 0..len {
                            chars.next();
                        }
                    }
                    other => out.push(other),
                }
            }
            '\n' => break,
            c => out.push(c),
        }
    }

    Err(nom::Err::Failure(NomError::new(i, ErrorKind::Char)))
}

// regexp = { "/" ~ (escaped | class | !"/" ~ ANY)+ ~ "/" ~ flags }
fn regexp(i: Input) -> IResult<Input, Arc<Node>> {
    let body = match i.strip_prefix('/') {
        Some(body) if !body.starts_with('/') && !body.starts_with('*') => body,
        _ => return Err(nom::Err::Error(NomError::new(i, ErrorKind::Char))),
    };

    let mut in_class = false;
    let mut escaped = false;
    let mut end = None;
    for (pos, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                end = Some(pos);
                break;
            }
            '\n' => break,
            _ => {}
        }
    }

    let end = end.ok_or_else(|| nom::Err::Failure(NomError::new(i, ErrorKind::Char)))?;
    let (rest, flags) = take_while(is_ident_char)(&body[end + 1..])?;
    let pattern = Pattern::new(&body[..end], flags)
        .map_err(|_| nom::Err::Failure(NomError::new(i, ErrorKind::Verify)))?;
    Ok((rest, Arc::new(Node::Regexp(Arc::new(pattern)))))
}

fn depth(i: Input, d: usize) -> Result<usize, nom::Err<NomError<Input>>> {
    if d > MAX_DEPTH {
        return Err(nom::Err::Failure(NomError::new(i, ErrorKind::TooLarge)));
    }
    Ok(d + 1)
}

/// Height of the chain after hanging another node of height `other` off it.
fn grow(i: Input, h: usize, other: usize) -> Result<usize, nom::Err<NomError<Input>>> {
    let h = h.max(other) + 1;
    if h > MAX_HEIGHT {
        return Err(nom::Err::Failure(NomError::new(i, ErrorKind::TooLarge)));
    }
    Ok(h)
}

fn height(node: &Node) -> usize {
    let below = match node {
        Node::Array(items) => items.iter().map(|n| height(n)).max(),
        Node::Object(props) => props.iter().map(|(_, n)| height(n)).max(),
        Node::Member {
            object, property, ..
        } => Some(height(object).max(height(property))),
        Node::Call { callee, args } => Some(args.iter().map(|n| height(n)).fold(height(callee), usize::max)),
        Node::Unary { expr, .. } => Some(height(expr)),
        Node::Binary { lhs, rhs, .. } | Node::Logical { lhs, rhs, .. } => Some(height(lhs).max(height(rhs))),
        Node::Conditional {
            test,
            consequent,
            alternate,
        } => Some(height(test).max(height(consequent)).max(height(alternate))),
        Node::Function { body, .. } => Some(height(body)),
        _ => None,
    };
    below.map_or(1, |h| h + 1)
}
