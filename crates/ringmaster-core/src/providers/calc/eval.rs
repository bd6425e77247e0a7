//! Restricted expression evaluator
//!
//! Parses arithmetic expressions into a small AST and walks it. Supported:
//! numeric literals, `+ - * / // % **`, unary sign, chained comparisons,
//! list literals for the aggregate functions, a whitelisted function table,
//! the constants pi/e/tau/inf/nan, named variables, and single assignment
//! `name = expr`. Anything else is rejected at parse time.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Math domain error: {0}")]
    Domain(String),
}

impl EvalError {
    /// Parse-level failures are validation errors; runtime failures are not.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EvalError::Syntax(_)
                | EvalError::Unsupported(_)
                | EvalError::UnknownFunction(_)
                | EvalError::Arity { .. }
        )
    }
}

/// Evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Number(f64),
    Bool(bool),
}

impl EvalValue {
    fn number(&self) -> Result<f64, EvalError> {
        match self {
            EvalValue::Number(n) => Ok(*n),
            EvalValue::Bool(_) => Err(EvalError::Unsupported(
                "boolean used where a number is required".into(),
            )),
        }
    }

    /// Render the way results are reported: integral floats as integers,
    /// other floats trimmed to 10 significant digits, booleans lowercase.
    pub fn format(&self) -> String {
        match self {
            EvalValue::Bool(b) => b.to_string(),
            EvalValue::Number(n) => format_number(*n),
        }
    }
}

fn format_number(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }
    if x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{}", x as i64);
    }
    let exponent = x.abs().log10().floor();
    let decimals = ((9.0 - exponent).max(0.0) as usize).min(17);
    let mut formatted = format!("{:.*}", decimals, x);
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    formatted
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Assign,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation tail: 1e-3, 2.5E+10
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mark = i;
                    i += 1;
                    if i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
                        i += 1;
                    }
                    if i < chars.len() && chars[i].is_ascii_digit() {
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    } else {
                        i = mark;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::Syntax(format!("bad number literal '{}'", text)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    tokens.push(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(EvalError::Unsupported("operator '!'".into()));
                }
            }
            'π' => {
                tokens.push(Token::Ident("pi".into()));
                i += 1;
            }
            'τ' => {
                tokens.push(Token::Ident("tau".into()));
                i += 1;
            }
            '∞' => {
                tokens.push(Token::Ident("inf".into()));
                i += 1;
            }
            other => {
                return Err(EvalError::Unsupported(format!("character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(&self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    FloorDiv(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Call(String, Vec<Expr>),
    List(Vec<Expr>),
    Assign(String, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), EvalError> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(EvalError::Syntax(format!(
                "expected {:?}, found {:?}",
                token, found
            ))),
            None => Err(EvalError::Syntax(format!(
                "expected {:?}, found end of input",
                token
            ))),
        }
    }

    fn parse_statement(&mut self) -> Result<Expr, EvalError> {
        // Lookahead for `name = expr` (a single assignment, not `==`).
        if let (Some(Token::Ident(name)), Some(Token::Assign)) =
            (self.tokens.first(), self.tokens.get(1))
        {
            let name = name.clone();
            self.position = 2;
            let value = self.parse_comparison()?;
            self.end()?;
            return Ok(Expr::Assign(name, Box::new(value)));
        }
        let expr = self.parse_comparison()?;
        self.end()?;
        Ok(expr)
    }

    fn end(&self) -> Result<(), EvalError> {
        if self.position < self.tokens.len() {
            return Err(EvalError::Syntax(format!(
                "unexpected trailing input at token {:?}",
                self.tokens[self.position]
            )));
        }
        Ok(())
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_sum()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Ne) => CmpOp::Ne,
                _ => break,
            };
            self.next();
            chain.push((op, self.parse_sum()?));
        }
        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    left = Expr::Add(Box::new(left), Box::new(self.parse_term()?));
                }
                Some(Token::Minus) => {
                    self.next();
                    left = Expr::Sub(Box::new(left), Box::new(self.parse_term()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    left = Expr::Mul(Box::new(left), Box::new(self.parse_unary()?));
                }
                Some(Token::Slash) => {
                    self.next();
                    left = Expr::Div(Box::new(left), Box::new(self.parse_unary()?));
                }
                Some(Token::DoubleSlash) => {
                    self.next();
                    left = Expr::FloorDiv(Box::new(left), Box::new(self.parse_unary()?));
                }
                Some(Token::Percent) => {
                    self.next();
                    left = Expr::Mod(Box::new(left), Box::new(self.parse_unary()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&Token::DoubleStar) {
            self.next();
            // Right-associative; unary binds tighter on the exponent side.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_comparison()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.next();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_comparison()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_comparison()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(other) => Err(EvalError::Syntax(format!("unexpected token {:?}", other))),
            None => Err(EvalError::Syntax("unexpected end of input".into())),
        }
    }
}

/// Walks the AST against a set of variable bindings.
pub struct Evaluator<'a> {
    bindings: &'a mut HashMap<String, f64>,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a mut HashMap<String, f64>) -> Self {
        Self { bindings }
    }

    /// Parse and evaluate one expression or assignment.
    pub fn eval(&mut self, input: &str) -> Result<EvalValue, EvalError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EvalError::Syntax("empty expression".into()));
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let expr = parser.parse_statement()?;
        self.eval_expr(&expr)
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<EvalValue, EvalError> {
        match expr {
            Expr::Number(value) => Ok(EvalValue::Number(*value)),
            Expr::Var(name) => self.resolve(name).map(EvalValue::Number),
            Expr::Neg(inner) => {
                let value = self.eval_expr(inner)?.number()?;
                Ok(EvalValue::Number(-value))
            }
            Expr::Add(a, b) => self.binary(a, b, |a, b| Ok(a + b)),
            Expr::Sub(a, b) => self.binary(a, b, |a, b| Ok(a - b)),
            Expr::Mul(a, b) => self.binary(a, b, |a, b| Ok(a * b)),
            Expr::Div(a, b) => self.binary(a, b, |a, b| {
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
            Expr::FloorDiv(a, b) => self.binary(a, b, |a, b| {
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok((a / b).floor())
                }
            }),
            Expr::Mod(a, b) => self.binary(a, b, |a, b| {
                if b == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(a.rem_euclid(b))
                }
            }),
            Expr::Pow(a, b) => self.binary(a, b, |a, b| Ok(a.powf(b))),
            Expr::Compare(first, chain) => {
                let mut left = self.eval_expr(first)?.number()?;
                for (op, right_expr) in chain {
                    let right = self.eval_expr(right_expr)?.number()?;
                    if !op.apply(left, right) {
                        return Ok(EvalValue::Bool(false));
                    }
                    left = right;
                }
                Ok(EvalValue::Bool(true))
            }
            Expr::Call(name, args) => self.call(name, args),
            Expr::List(_) => Err(EvalError::Unsupported(
                "list literal outside a function call".into(),
            )),
            Expr::Assign(name, value) => {
                let value = self.eval_expr(value)?.number()?;
                self.bindings.insert(name.clone(), value);
                Ok(EvalValue::Number(value))
            }
        }
    }

    fn binary(
        &mut self,
        a: &Expr,
        b: &Expr,
        op: impl Fn(f64, f64) -> Result<f64, EvalError>,
    ) -> Result<EvalValue, EvalError> {
        let a = self.eval_expr(a)?.number()?;
        let b = self.eval_expr(b)?.number()?;
        op(a, b).map(EvalValue::Number)
    }

    fn resolve(&self, name: &str) -> Result<f64, EvalError> {
        match name {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            "tau" => Ok(std::f64::consts::TAU),
            "inf" => Ok(f64::INFINITY),
            "nan" => Ok(f64::NAN),
            _ => self
                .bindings
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string())),
        }
    }

    /// Flatten call arguments: a single list literal spreads into the
    /// aggregate functions.
    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<f64>, EvalError> {
        let mut values = Vec::new();
        for arg in args {
            match arg {
                Expr::List(items) => {
                    for item in items {
                        values.push(self.eval_expr(item)?.number()?);
                    }
                }
                other => values.push(self.eval_expr(other)?.number()?),
            }
        }
        Ok(values)
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<EvalValue, EvalError> {
        let values = self.eval_args(args)?;
        let arity = |expected: usize| -> Result<(), EvalError> {
            if values.len() != expected {
                Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    got: values.len(),
                })
            } else {
                Ok(())
            }
        };
        let at_least_one = || -> Result<(), EvalError> {
            if values.is_empty() {
                Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: "1 or more".to_string(),
                    got: 0,
                })
            } else {
                Ok(())
            }
        };

        let result = match name {
            "sin" => {
                arity(1)?;
                values[0].sin()
            }
            "cos" => {
                arity(1)?;
                values[0].cos()
            }
            "tan" => {
                arity(1)?;
                values[0].tan()
            }
            "asin" => {
                arity(1)?;
                values[0].asin()
            }
            "acos" => {
                arity(1)?;
                values[0].acos()
            }
            "atan" => {
                arity(1)?;
                values[0].atan()
            }
            "atan2" => {
                arity(2)?;
                values[0].atan2(values[1])
            }
            "sinh" => {
                arity(1)?;
                values[0].sinh()
            }
            "cosh" => {
                arity(1)?;
                values[0].cosh()
            }
            "tanh" => {
                arity(1)?;
                values[0].tanh()
            }
            "sqrt" => {
                arity(1)?;
                if values[0] < 0.0 {
                    return Err(EvalError::Domain("sqrt of a negative number".into()));
                }
                values[0].sqrt()
            }
            "log" => match values.len() {
                1 => {
                    if values[0] <= 0.0 {
                        return Err(EvalError::Domain("log of a non-positive number".into()));
                    }
                    values[0].ln()
                }
                2 => {
                    if values[0] <= 0.0 || values[1] <= 0.0 {
                        return Err(EvalError::Domain("log of a non-positive number".into()));
                    }
                    values[0].log(values[1])
                }
                got => {
                    return Err(EvalError::Arity {
                        name: name.to_string(),
                        expected: "1 or 2".to_string(),
                        got,
                    })
                }
            },
            "log2" => {
                arity(1)?;
                if values[0] <= 0.0 {
                    return Err(EvalError::Domain("log of a non-positive number".into()));
                }
                values[0].log2()
            }
            "log10" => {
                arity(1)?;
                if values[0] <= 0.0 {
                    return Err(EvalError::Domain("log of a non-positive number".into()));
                }
                values[0].log10()
            }
            "exp" => {
                arity(1)?;
                values[0].exp()
            }
            "pow" => {
                arity(2)?;
                values[0].powf(values[1])
            }
            "ceil" => {
                arity(1)?;
                values[0].ceil()
            }
            "floor" => {
                arity(1)?;
                values[0].floor()
            }
            "abs" => {
                arity(1)?;
                values[0].abs()
            }
            "round" => match values.len() {
                1 => values[0].round(),
                2 => {
                    let factor = 10f64.powi(values[1] as i32);
                    (values[0] * factor).round() / factor
                }
                got => {
                    return Err(EvalError::Arity {
                        name: name.to_string(),
                        expected: "1 or 2".to_string(),
                        got,
                    })
                }
            },
            "factorial" => {
                arity(1)?;
                let n = values[0];
                if n < 0.0 || n.fract() != 0.0 {
                    return Err(EvalError::Domain(
                        "factorial requires a non-negative integer".into(),
                    ));
                }
                if n > 170.0 {
                    return Err(EvalError::Domain("factorial argument too large".into()));
                }
                (1..=n as u64).map(|k| k as f64).product()
            }
            "gcd" => {
                arity(2)?;
                integer_pair(name, values[0], values[1]).map(|(a, b)| gcd(a, b) as f64)?
            }
            "lcm" => {
                arity(2)?;
                integer_pair(name, values[0], values[1]).map(|(a, b)| {
                    if a == 0 || b == 0 {
                        0.0
                    } else {
                        (a / gcd(a, b) * b) as f64
                    }
                })?
            }
            "degrees" => {
                arity(1)?;
                values[0].to_degrees()
            }
            "radians" => {
                arity(1)?;
                values[0].to_radians()
            }
            "min" => {
                at_least_one()?;
                values.iter().copied().fold(f64::INFINITY, f64::min)
            }
            "max" => {
                at_least_one()?;
                values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
            "sum" => values.iter().sum(),
            _ => return Err(EvalError::UnknownFunction(name.to_string())),
        };

        Ok(EvalValue::Number(result))
    }
}

fn integer_pair(name: &str, a: f64, b: f64) -> Result<(u64, u64), EvalError> {
    if a.fract() != 0.0 || b.fract() != 0.0 || a < 0.0 || b < 0.0 {
        return Err(EvalError::Domain(format!(
            "{} requires non-negative integers",
            name
        )));
    }
    Ok((a as u64, b as u64))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
