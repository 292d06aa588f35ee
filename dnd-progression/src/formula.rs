//! Restricted arithmetic for resource-growth formulas.
//!
//! Supports integers, the variables `level` and `proficiency_bonus`
//! (`proficiencyBonus` is accepted as an alias), the operators `+ - * /`,
//! parentheses, and the single-argument functions `ceil(...)` and
//! `floor(...)`. Anything else is rejected while parsing, so a formula can
//! never reach anything beyond this grammar.
//!
//! A bare `/` truncates toward zero. Inside `ceil(...)` or `floor(...)`
//! intermediate values are kept as exact fractions and rounded once by the
//! wrapper.

use crate::error::FormulaError;
use std::fmt;

/// Variables available to a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormulaVars {
    pub level: i32,
    pub proficiency_bonus: i32,
}

impl FormulaVars {
    pub fn new(level: i32, proficiency_bonus: i32) -> Self {
        Self {
            level,
            proficiency_bonus,
        }
    }

    /// Variables for a character of the given level, with the standard
    /// proficiency progression.
    pub fn for_level(level: u8) -> Self {
        Self::new(level as i32, proficiency_bonus(level) as i32)
    }
}

/// Proficiency bonus for a total character level: `floor((level-1)/4)+2`.
pub fn proficiency_bonus(level: u8) -> i8 {
    ((level.max(1) as i16 - 1) / 4 + 2) as i8
}

/// Evaluates formula strings against [`FormulaVars`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaEvaluator;

impl FormulaEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parse and evaluate `formula` in one step.
    pub fn evaluate(&self, formula: &str, vars: FormulaVars) -> Result<i32, FormulaError> {
        Formula::parse(formula)?.evaluate(vars)
    }

    /// Check that a formula parses without evaluating it.
    pub fn validate(&self, formula: &str) -> Result<(), FormulaError> {
        Formula::parse(formula).map(|_| ())
    }
}

/// A parsed formula, ready to evaluate repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(i64),
    Level,
    ProficiencyBonus,
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Ceil(Box<Expr>),
    Floor(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

impl Formula {
    /// Parse a formula string.
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        let source = formula.trim().to_string();
        let tokens = tokenize(&source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source: &source,
        };
        let expr = parser.expr()?;

        if let Some(token) = parser.peek() {
            return Err(match token {
                Token::RParen => FormulaError::UnbalancedParentheses(source.clone()),
                other => FormulaError::UnknownToken {
                    token: other.to_string(),
                    formula: source.clone(),
                },
            });
        }

        Ok(Self { source, expr })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate, truncating the final value toward zero.
    pub fn evaluate(&self, vars: FormulaVars) -> Result<i32, FormulaError> {
        let value = eval(&self.expr, vars, &self.source, false)?;
        i32::try_from(value.truncate()).map_err(|_| FormulaError::Overflow(self.source.clone()))
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = digits
                    .parse()
                    .map_err(|_| FormulaError::Overflow(source.to_string()))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                chars.next();
                tokens.push(match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            other => {
                return Err(FormulaError::UnknownToken {
                    token: other.to_string(),
                    formula: source.to_string(),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let source = self.source.to_string();
        let token = self
            .next()
            .cloned()
            .ok_or_else(|| FormulaError::UnexpectedEnd(source.clone()))?;

        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::LParen => {
                let inner = self.expr()?;
                self.close_paren()?;
                Ok(inner)
            }
            Token::RParen => Err(FormulaError::UnbalancedParentheses(source)),
            Token::Ident(name) => match name.as_str() {
                "level" => Ok(Expr::Level),
                "proficiency_bonus" | "proficiencyBonus" => Ok(Expr::ProficiencyBonus),
                "ceil" | "floor" => {
                    match self.next() {
                        Some(Token::LParen) => {}
                        Some(other) => {
                            return Err(FormulaError::UnknownToken {
                                token: other.to_string(),
                                formula: source,
                            })
                        }
                        None => return Err(FormulaError::UnexpectedEnd(source)),
                    }
                    let inner = Box::new(self.expr()?);
                    self.close_paren()?;
                    Ok(if name == "ceil" {
                        Expr::Ceil(inner)
                    } else {
                        Expr::Floor(inner)
                    })
                }
                _ => Err(FormulaError::UnknownToken {
                    token: name,
                    formula: source,
                }),
            },
            other => Err(FormulaError::UnknownToken {
                token: other.to_string(),
                formula: source,
            }),
        }
    }

    fn close_paren(&mut self) -> Result<(), FormulaError> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            Some(other) => Err(FormulaError::UnknownToken {
                token: other.to_string(),
                formula: self.source.to_string(),
            }),
            None => Err(FormulaError::UnbalancedParentheses(self.source.to_string())),
        }
    }
}

/// Exact fraction with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ratio {
    num: i64,
    den: i64,
}

impl Ratio {
    fn int(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    /// Reduced fraction, or `None` when normalizing the sign overflows.
    fn new(num: i64, den: i64) -> Option<Self> {
        let (num, den) = if den < 0 {
            (num.checked_neg()?, den.checked_neg()?)
        } else {
            (num, den)
        };
        let divisor = gcd(num.checked_abs()?, den).max(1);
        Some(Self {
            num: num / divisor,
            den: den / divisor,
        })
    }

    fn floor(self) -> i64 {
        self.num.div_euclid(self.den)
    }

    fn ceil(self) -> i64 {
        self.floor() + i64::from(self.num.rem_euclid(self.den) != 0)
    }

    fn truncate(self) -> i64 {
        self.num / self.den
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Evaluate `expr`. Inside `ceil`/`floor` (`exact`) divisions keep their
/// fraction for the wrapper to round; elsewhere each division truncates
/// toward zero as soon as it is taken.
fn eval(expr: &Expr, vars: FormulaVars, source: &str, exact: bool) -> Result<Ratio, FormulaError> {
    let overflow = || FormulaError::Overflow(source.to_string());

    Ok(match expr {
        Expr::Number(n) => Ratio::int(*n),
        Expr::Level => Ratio::int(vars.level as i64),
        Expr::ProficiencyBonus => Ratio::int(vars.proficiency_bonus as i64),
        Expr::Neg(inner) => {
            let v = eval(inner, vars, source, exact)?;
            Ratio::new(v.num.checked_neg().ok_or_else(overflow)?, v.den).ok_or_else(overflow)?
        }
        Expr::Ceil(inner) => Ratio::int(eval(inner, vars, source, true)?.ceil()),
        Expr::Floor(inner) => Ratio::int(eval(inner, vars, source, true)?.floor()),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, vars, source, exact)?;
            let b = eval(rhs, vars, source, exact)?;
            let value = match op {
                Op::Add | Op::Sub => {
                    let left = a.num.checked_mul(b.den).ok_or_else(overflow)?;
                    let right = b.num.checked_mul(a.den).ok_or_else(overflow)?;
                    let num = if *op == Op::Add {
                        left.checked_add(right)
                    } else {
                        left.checked_sub(right)
                    }
                    .ok_or_else(overflow)?;
                    Ratio::new(num, a.den.checked_mul(b.den).ok_or_else(overflow)?)
                }
                Op::Mul => Ratio::new(
                    a.num.checked_mul(b.num).ok_or_else(overflow)?,
                    a.den.checked_mul(b.den).ok_or_else(overflow)?,
                ),
                Op::Div => {
                    if b.num == 0 {
                        return Err(FormulaError::DivisionByZero(source.to_string()));
                    }
                    let quotient = Ratio::new(
                        a.num.checked_mul(b.den).ok_or_else(overflow)?,
                        a.den.checked_mul(b.num).ok_or_else(overflow)?,
                    );
                    if exact {
                        quotient
                    } else {
                        quotient.map(|q| Ratio::int(q.truncate()))
                    }
                }
            };
            value.ok_or_else(overflow)?
        }
    })
}
