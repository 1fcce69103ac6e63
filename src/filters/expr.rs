// src/filters/expr.rs
//! Expressions for the `eval` filter.
//!
//! The language is deliberately small: literals, the single variable
//! `value`, arithmetic, comparisons, `and`/`or`/`not`, a handful of string
//! methods (`value.upper()`, `value.replace('a', 'b')`, ...) and a few
//! conversion functions (`int`, `float`, `str`, `len`, ...). There is no
//! attribute access, indexing, assignment or anything that reaches outside
//! the value being filtered.
//!
//! Expressions are parsed once when the rule is compiled; evaluation errors
//! (type mismatches, division by zero) surface as `ParseError`s.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use super::{float_to_i64, to_float, to_int};
use crate::utils::error::{ConfigError, ParseError};
use crate::value::Value;

// Parser recursion (parentheses, unary chains, call arguments)
const MAX_NESTING: usize = 64;
// Height of the finished tree, which also bounds evaluation recursion
const MAX_TREE_HEIGHT: usize = 256;
const MAX_SOURCE_LEN: usize = 4096;
// Largest string `str * int` may build
const MAX_REPEAT_BYTES: usize = 1 << 20;

/// A parsed `eval` expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidExpression {
            expression: source.to_string(),
            reason,
        };
        if source.len() > MAX_SOURCE_LEN {
            return Err(invalid(format!("longer than {} bytes", MAX_SOURCE_LEN)));
        }
        let tokens = Lexer::new(source).tokenize().map_err(invalid)?;
        let root = Parser::new(tokens).parse().map_err(invalid)?;
        if root.height() > MAX_TREE_HEIGHT {
            return Err(invalid(format!(
                "more than {} levels of operations",
                MAX_TREE_HEIGHT
            )));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates with `value` bound to the given input.
    pub fn eval(&self, value: &Value) -> Result<Value, ParseError> {
        eval_node(&self.root, value).map_err(|reason| ParseError::Eval {
            expression: self.source.clone(),
            reason,
        })
    }
}

// --- Lexing ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
}

static TWO_CHAR_OPS: [&str; 5] = ["//", "==", "!=", "<=", ">="];
static ONE_CHAR_OPS: [&str; 7] = ["+", "-", "*", "/", "%", "<", ">"];

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(&(pos, ch)) = self.chars.peek() {
            match ch {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                c if c.is_ascii_digit() => tokens.push(self.number(pos)?),
                '.' if self.src[pos + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
                    tokens.push(self.number(pos)?)
                }
                '\'' | '"' => tokens.push(self.string(ch)?),
                c if c.is_alphabetic() || c == '_' => tokens.push(self.ident(pos)),
                '(' | ')' | ',' | '.' => {
                    self.chars.next();
                    tokens.push(match ch {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        _ => Token::Dot,
                    });
                }
                _ => tokens.push(self.operator(pos)?),
            }
        }
        Ok(tokens)
    }

    fn number(&mut self, start: usize) -> Result<Token, String> {
        let mut end = start;
        let mut is_float = false;
        while let Some(&(pos, ch)) = self.chars.peek() {
            let fraction_dot = ch == '.'
                && !is_float
                && self.src[pos + 1..].starts_with(|c: char| c.is_ascii_digit());
            if !(ch.is_ascii_digit() || fraction_dot) {
                break;
            }
            is_float |= fraction_dot;
            end = pos + ch.len_utf8();
            self.chars.next();
        }
        let literal = &self.src[start..end];
        if is_float {
            literal
                .parse()
                .map(Token::Float)
                .map_err(|_| format!("bad number {}", literal))
        } else {
            literal
                .parse()
                .map(Token::Int)
                .map_err(|_| format!("integer {} is too large", literal))
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, String> {
        self.chars.next(); // opening quote
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, c)) if c == '\\' || c == '\'' || c == '"' => out.push(c),
                    Some((_, c)) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn ident(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(pos, ch)) = self.chars.peek() {
            if !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            end = pos + ch.len_utf8();
            self.chars.next();
        }
        Token::Ident(self.src[start..end].to_string())
    }

    fn operator(&mut self, pos: usize) -> Result<Token, String> {
        let rest = &self.src[pos..];
        let op = TWO_CHAR_OPS
            .iter()
            .chain(ONE_CHAR_OPS.iter())
            .copied()
            .find(|op| rest.starts_with(*op))
            .ok_or_else(|| format!("unexpected character {:?}", rest.chars().next().unwrap_or(' ')))?;
        for _ in 0..op.len() {
            self.chars.next();
        }
        Ok(Token::Op(op))
    }
}

// --- Syntax tree ---

#[derive(Debug, Clone)]
enum Node {
    Literal(Value),
    Var,
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
    Method(Box<Node>, Method, Vec<Node>),
}

impl Node {
    fn height(&self) -> usize {
        let mut tallest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            tallest = tallest.max(depth);
            match node {
                Node::Literal(_) | Node::Var => {}
                Node::Neg(inner) | Node::Not(inner) => stack.push((inner.as_ref(), depth + 1)),
                Node::Binary(_, left, right) | Node::And(left, right) | Node::Or(left, right) => {
                    stack.push((left.as_ref(), depth + 1));
                    stack.push((right.as_ref(), depth + 1));
                }
                Node::Call(_, args) => stack.extend(args.iter().map(|arg| (arg, depth + 1))),
                Node::Method(receiver, _, args) => {
                    stack.push((receiver.as_ref(), depth + 1));
                    stack.extend(args.iter().map(|arg| (arg, depth + 1)));
                }
            }
        }
        tallest
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    fn from_symbol(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "//" => BinOp::FloorDiv,
            "%" => BinOp::Mod,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            _ => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Int,
    Float,
    Str,
    Bool,
    Len,
    Abs,
    Round,
    Min,
    Max,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int" => Function::Int,
            "float" => Function::Float,
            "str" => Function::Str,
            "bool" => Function::Bool,
            "len" => Function::Len,
            "abs" => Function::Abs,
            "round" => Function::Round,
            "min" => Function::Min,
            "max" => Function::Max,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive.
    fn arity(self) -> (usize, usize) {
        match self {
            Function::Round => (1, 2),
            Function::Min | Function::Max => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Upper,
    Lower,
    Strip,
    LStrip,
    RStrip,
    Title,
    Capitalize,
    Replace,
    StartsWith,
    EndsWith,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "upper" => Method::Upper,
            "lower" => Method::Lower,
            "strip" => Method::Strip,
            "lstrip" => Method::LStrip,
            "rstrip" => Method::RStrip,
            "title" => Method::Title,
            "capitalize" => Method::Capitalize,
            "replace" => Method::Replace,
            "startswith" => Method::StartsWith,
            "endswith" => Method::EndsWith,
            _ => return None,
        })
    }

    fn arity(self) -> (usize, usize) {
        match self {
            Method::Strip | Method::LStrip | Method::RStrip => (0, 1),
            Method::Replace => (2, 2),
            Method::StartsWith | Method::EndsWith => (1, 1),
            _ => (0, 0),
        }
    }
}

fn check_arity(name: &str, (min, max): (usize, usize), given: usize) -> Result<(), String> {
    if given < min || given > max {
        return Err(format!("{}() got {} argument(s)", name, given));
    }
    Ok(())
}

// --- Parsing ---

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("nested deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse(mut self) -> Result<Node, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let node = self.or_expr()?;
        match self.peek() {
            None => Ok(node),
            Some(token) => Err(format!("unexpected {:?}", token)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek() {
            if ops.contains(op) {
                let op = *op;
                self.pos += 1;
                return Some(op);
            }
        }
        None
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn or_expr(&mut self) -> Result<Node, String> {
        let mut node = self.and_expr()?;
        while self.eat_keyword("or") {
            node = Node::Or(Box::new(node), Box::new(self.and_expr()?));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<Node, String> {
        let mut node = self.not_expr()?;
        while self.eat_keyword("and") {
            node = Node::And(Box::new(node), Box::new(self.not_expr()?));
        }
        Ok(node)
    }

    fn not_expr(&mut self) -> Result<Node, String> {
        if self.eat_keyword("not") {
            return Ok(Node::Not(Box::new(self.nested(Self::not_expr)?)));
        }
        self.comparison()
    }

    // Comparisons do not chain: `a < b < c` is rejected.
    fn comparison(&mut self) -> Result<Node, String> {
        let left = self.sum()?;
        match self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            Some(op) => {
                let right = self.sum()?;
                let op = BinOp::from_symbol(op).ok_or("bad comparison")?;
                Ok(Node::Binary(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn sum(&mut self) -> Result<Node, String> {
        let mut node = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let op = BinOp::from_symbol(op).ok_or("bad operator")?;
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, String> {
        let mut node = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let op = BinOp::from_symbol(op).ok_or("bad operator")?;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, String> {
        match self.eat_op(&["-", "+"]) {
            Some("-") => Ok(Node::Neg(Box::new(self.nested(Self::unary)?))),
            Some(_) => self.nested(Self::unary),
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Node, String> {
        let mut node = self.primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(format!("expected method name, found {:?}", other)),
            };
            let method =
                Method::from_name(&name).ok_or_else(|| format!("unknown method {}()", name))?;
            self.expect(Token::LParen)?;
            let args = self.arguments()?;
            check_arity(&name, method.arity(), args.len())?;
            node = Node::Method(Box::new(node), method, args);
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<Node, String> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Node::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Node::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Node::Literal(Value::Str(s))),
            Some(Token::LParen) => self.nested(|parser| {
                let node = parser.or_expr()?;
                parser.expect(Token::RParen)?;
                Ok(node)
            }),
            Some(Token::Ident(name)) => match name.as_str() {
                "value" => Ok(Node::Var),
                "True" | "true" => Ok(Node::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Node::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Node::Literal(Value::Null)),
                _ => {
                    let function = Function::from_name(&name)
                        .ok_or_else(|| format!("unknown name {}", name))?;
                    self.expect(Token::LParen)?;
                    let args = self.arguments()?;
                    check_arity(&name, function.arity(), args.len())?;
                    Ok(Node::Call(function, args))
                }
            },
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    /// Comma separated arguments; the opening parenthesis is already consumed.
    fn arguments(&mut self) -> Result<Vec<Node>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.nested(Self::or_expr)?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {:?}", other)),
            }
        }
    }
}

// --- Evaluation ---

fn eval_node(node: &Node, value: &Value) -> Result<Value, String> {
    match node {
        Node::Literal(literal) => Ok(literal.clone()),
        Node::Var => Ok(value.clone()),
        Node::Neg(inner) => match eval_node(inner, value)? {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(format!("bad operand type for unary -: {}", other.type_name())),
        },
        Node::Not(inner) => Ok(Value::Bool(!eval_node(inner, value)?.is_truthy())),
        Node::And(left, right) => {
            let left = eval_node(left, value)?;
            if !left.is_truthy() {
                return Ok(left);
            }
            eval_node(right, value)
        }
        Node::Or(left, right) => {
            let left = eval_node(left, value)?;
            if left.is_truthy() {
                return Ok(left);
            }
            eval_node(right, value)
        }
        Node::Binary(op, left, right) => {
            let left = eval_node(left, value)?;
            let right = eval_node(right, value)?;
            binary(*op, left, right)
        }
        Node::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| eval_node(arg, value))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, args)
        }
        Node::Method(receiver, method, args) => {
            let receiver = eval_node(receiver, value)?;
            let args = args
                .iter()
                .map(|arg| eval_node(arg, value))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(*method, receiver, args)
        }
    }
}

fn overflow() -> String {
    "integer overflow".to_string()
}

#[derive(Debug, Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Num::I(*i)),
            Value::Float(f) => Some(Num::F(*f)),
            Value::Bool(b) => Some(Num::I(i64::from(*b))),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, String> {
    match (op, &left, &right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let times = usize::try_from(*n).unwrap_or(0);
            return match s.len().checked_mul(times) {
                Some(size) if size <= MAX_REPEAT_BYTES => Ok(Value::Str(s.repeat(times))),
                _ => Err("repeated string too large".to_string()),
            };
        }
        (BinOp::Eq, _, _) => return Ok(Value::Bool(equals(&left, &right))),
        (BinOp::Ne, _, _) => return Ok(Value::Bool(!equals(&left, &right))),
        (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, _, _) => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                format!(
                    "'{}' not supported between {} and {}",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                )
            })?;
            let result = match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    let (a, b) = match (Num::of(&left), Num::of(&right)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))
        }
    };

    if let (Num::I(a), Num::I(b)) = (a, b) {
        return match op {
            BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Div if b == 0 => Err("division by zero".to_string()),
            BinOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinOp::FloorDiv | BinOp::Mod if b == 0 => Err("division by zero".to_string()),
            BinOp::FloorDiv => {
                let quotient = a.checked_div(b).ok_or_else(overflow)?;
                let adjust = a % b != 0 && ((a < 0) != (b < 0));
                Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
            }
            BinOp::Mod => {
                let rem = a.checked_rem(b).ok_or_else(overflow)?;
                Ok(Value::Int(if rem != 0 && ((rem < 0) != (b < 0)) { rem + b } else { rem }))
            }
            _ => Err(format!("unsupported operator {}", op.symbol())),
        };
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            Err("division by zero".to_string())
        }
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
        _ => Err(format!("unsupported operator {}", op.symbol())),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (Num::of(left), Num::of(right)) {
        (Some(Num::I(a)), Some(Num::I(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => match (Num::of(left), Num::of(right)) {
            (Some(Num::I(a)), Some(Num::I(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    }
}

fn call(function: Function, mut args: Vec<Value>) -> Result<Value, String> {
    match function {
        Function::Int => to_int(args.swap_remove(0)).map_err(|e| e.to_string()),
        Function::Float => to_float(args.swap_remove(0)).map_err(|e| e.to_string()),
        Function::Str => Ok(Value::Str(args[0].to_string())),
        Function::Bool => Ok(Value::Bool(args[0].is_truthy())),
        Function::Len => match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Record(record) => Ok(Value::Int(record.len() as i64)),
            other => Err(format!("object of type {} has no len()", other.type_name())),
        },
        Function::Abs => match &args[0] {
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(format!("bad operand type for abs(): {}", other.type_name())),
        },
        Function::Round => {
            let digits = match args.get(1) {
                None => None,
                Some(Value::Int(n)) => Some(*n),
                Some(other) => {
                    return Err(format!("round() digits must be int, not {}", other.type_name()))
                }
            };
            match (&args[0], digits) {
                (Value::Int(i), _) => Ok(Value::Int(*i)),
                (Value::Float(f), None) => float_to_i64(f.round())
                    .map(Value::Int)
                    .ok_or_else(|| format!("cannot convert float {} to integer", f)),
                (Value::Float(f), Some(n)) => {
                    let scale = 10f64.powi(n.clamp(-300, 300) as i32);
                    Ok(Value::Float((f * scale).round() / scale))
                }
                (other, _) => Err(format!("bad operand type for round(): {}", other.type_name())),
            }
        }
        Function::Min | Function::Max => {
            let candidates = match args.as_slice() {
                [Value::List(items)] => items.clone(),
                _ => args,
            };
            let wanted = if function == Function::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = candidates.into_iter();
            let mut best = iter.next().ok_or("min()/max() of an empty sequence")?;
            for candidate in iter {
                let ordering = compare(&candidate, &best).ok_or_else(|| {
                    format!(
                        "cannot compare {} and {}",
                        candidate.type_name(),
                        best.type_name()
                    )
                })?;
                if ordering == wanted {
                    best = candidate;
                }
            }
            Ok(best)
        }
    }
}

fn call_method(method: Method, receiver: Value, args: Vec<Value>) -> Result<Value, String> {
    let text = match &receiver {
        Value::Str(s) => s.as_str(),
        other => {
            return Err(format!(
                "{:?} needs a string receiver, got {}",
                method,
                other.type_name()
            ))
        }
    };
    let string_arg = |index: usize| string_arg(&args, index);
    let result = match method {
        Method::Upper => Value::Str(text.to_uppercase()),
        Method::Lower => Value::Str(text.to_lowercase()),
        Method::Strip => Value::Str(match string_arg(0)? {
            Some(chars) => text.trim_matches(|c: char| chars.contains(c)).to_string(),
            None => text.trim().to_string(),
        }),
        Method::LStrip => Value::Str(match string_arg(0)? {
            Some(chars) => text.trim_start_matches(|c: char| chars.contains(c)).to_string(),
            None => text.trim_start().to_string(),
        }),
        Method::RStrip => Value::Str(match string_arg(0)? {
            Some(chars) => text.trim_end_matches(|c: char| chars.contains(c)).to_string(),
            None => text.trim_end().to_string(),
        }),
        Method::Title => Value::Str(title_case(text)),
        Method::Capitalize => {
            let mut chars = text.chars();
            Value::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            })
        }
        Method::Replace => {
            let from = string_arg(0)?.unwrap_or_default();
            let to = string_arg(1)?.unwrap_or_default();
            Value::Str(text.replace(from, to))
        }
        Method::StartsWith => Value::Bool(text.starts_with(string_arg(0)?.unwrap_or_default())),
        Method::EndsWith => Value::Bool(text.ends_with(string_arg(0)?.unwrap_or_default())),
    };
    Ok(result)
}

fn string_arg(args: &[Value], index: usize) -> Result<Option<&str>, String> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(format!("expected a string argument, got {}", other.type_name())),
    }
}

// Uppercases the first letter of every alphabetic run, lowercases the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}
