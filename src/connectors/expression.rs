//! A small arithmetic expression language for combining named weight/delay
//! components. An expression like `"f1 * f2 + 0.5"` is parsed once into an
//! [`Expr`] tree; its free variables name the component functions it draws
//! from, and evaluation substitutes one vector per variable, broadcasting
//! scalars over the source population.

use std::collections::HashMap;

use crate::error::LgnError;

/// Arithmetic binary operators, in the usual precedence (`*`/`/` bind
/// tighter than `+`/`-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed weight/delay combination expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Ref(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, LgnError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LeftParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RightParen);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| {
                    LgnError::InvalidExpression(format!("Invalid number literal '{}'", literal))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            c => {
                return Err(LgnError::InvalidExpression(format!(
                    "Unexpected character '{}'",
                    c
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, LgnError> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, LgnError> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.next();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := '-' factor | primary
    fn factor(&mut self) -> Result<Expr, LgnError> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            return Ok(Expr::Neg(Box::new(self.factor()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, LgnError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Const(value)),
            Some(Token::Ident(name)) => Ok(Expr::Ref(name)),
            Some(Token::LeftParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RightParen) => Ok(inner),
                    _ => Err(LgnError::InvalidExpression(
                        "Missing closing parenthesis".to_string(),
                    )),
                }
            }
            other => Err(LgnError::InvalidExpression(format!(
                "Expected a value, found {:?}",
                other
            ))),
        }
    }
}

/// Evaluation value: expressions over vectors of different provenance stay
/// scalar until a variable reference forces them to vector length.
#[derive(Debug, Clone)]
enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    fn combine(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Scalar(a), Value::Vector(b)) => {
                Value::Vector(b.into_iter().map(|v| f(a, v)).collect())
            }
            (Value::Vector(a), Value::Scalar(b)) => {
                Value::Vector(a.into_iter().map(|v| f(v, b)).collect())
            }
            (Value::Vector(a), Value::Vector(b)) => {
                Value::Vector(a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect())
            }
        }
    }
}

impl Expr {
    /// Parse an expression string. Operators `+ - * /`, unary minus,
    /// parentheses, number literals and variable names are supported.
    pub fn parse(input: &str) -> Result<Self, LgnError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(LgnError::InvalidExpression(
                "Empty expression".to_string(),
            ));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(LgnError::InvalidExpression(format!(
                "Trailing input after expression: {:?}",
                &parser.tokens[parser.pos..]
            )));
        }
        Ok(expr)
    }

    /// The variable names referenced by this expression, in order of first
    /// appearance.
    pub fn free_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Ref(name) => {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
        }
    }

    /// Evaluate over named vectors, broadcasting the result to `len`
    /// elements. Every vector bound to a variable must have `len` elements.
    pub fn evaluate(
        &self,
        variables: &HashMap<String, Vec<f64>>,
        len: usize,
    ) -> Result<Vec<f64>, LgnError> {
        match self.evaluate_value(variables, len)? {
            Value::Scalar(v) => Ok(vec![v; len]),
            Value::Vector(v) => Ok(v),
        }
    }

    fn evaluate_value(
        &self,
        variables: &HashMap<String, Vec<f64>>,
        len: usize,
    ) -> Result<Value, LgnError> {
        match self {
            Expr::Const(value) => Ok(Value::Scalar(*value)),
            Expr::Ref(name) => {
                let values = variables.get(name).ok_or_else(|| {
                    LgnError::UnresolvedVariable(format!(
                        "Expression variable '{}' is not bound",
                        name
                    ))
                })?;
                if values.len() != len {
                    return Err(LgnError::InvalidParameters(format!(
                        "Variable '{}' has {} values, expected {}",
                        name,
                        values.len(),
                        len
                    )));
                }
                Ok(Value::Vector(values.clone()))
            }
            Expr::Neg(inner) => {
                Ok(inner
                    .evaluate_value(variables, len)?
                    .combine(Value::Scalar(-1.0), |v, s| v * s))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate_value(variables, len)?;
                let rhs = rhs.evaluate_value(variables, len)?;
                Ok(match op {
                    BinaryOp::Add => lhs.combine(rhs, |a, b| a + b),
                    BinaryOp::Sub => lhs.combine(rhs, |a, b| a - b),
                    BinaryOp::Mul => lhs.combine(rhs, |a, b| a * b),
                    BinaryOp::Div => lhs.combine(rhs, |a, b| a / b),
                })
            }
        }
    }
}
