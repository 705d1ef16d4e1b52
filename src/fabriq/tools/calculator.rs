//! Arithmetic expression evaluator behind the `calculate` tool
//!
//! Grammar (lowest to highest precedence):
//! - `expr   := term (('+' | '-') term)*`
//! - `term   := factor (('*' | '/' | '//' | '%') factor)*`
//! - `factor := ('+' | '-') factor | power`
//! - `power  := call ('**' factor)?`
//! - `call   := NAME '(' expr (',' expr)* ')' | NUMBER | '(' expr ')'`
//!
//! Functions: `abs`, `round`, `min`, `max`, `pow`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("{name}() takes {expected} arguments ({got} given)")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                let in_number = |c: char| c.is_ascii_digit() || c == '.' || c == '_';
                while i < chars.len() && in_number(chars[i]) {
                    i += 1;
                }
                // exponent: 1e3, 2.5E-4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let raw: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| CalcError::InvalidNumber(raw.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::StarStar);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::SlashSlash);
                i += 2;
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => return Err(CalcError::UnexpectedChar(other)),
                };
                tokens.push(token);
                i += 1;
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
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(CalcError::UnexpectedToken(format!("{:?}", t))),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Token::Star,
                Some(Token::Slash) => Token::Slash,
                Some(Token::SlashSlash) => Token::SlashSlash,
                Some(Token::Percent) => Token::Percent,
                _ => return Ok(value),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            value = match op {
                Token::Star => value * rhs,
                _ if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                Token::Slash => value / rhs,
                Token::SlashSlash => (value / rhs).floor(),
                // result takes the sign of the divisor
                _ => value - rhs * (value / rhs).floor(),
            };
        }
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.factor()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::StarStar) {
            self.pos += 1;
            let exponent = self.factor()?;
            if base == 0.0 && exponent < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Name(name)) => {
                self.expect(Token::LParen)?;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen)?;
                call(&name, &args)
            }
            Some(t) => Err(CalcError::UnexpectedToken(format!("{:?}", t))),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

/// Round half to even
fn round_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    let arity = |expected: &'static str| CalcError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    };
    match name {
        "abs" => match args {
            [x] => Ok(x.abs()),
            _ => Err(arity("exactly 1")),
        },
        "round" => match args {
            [x] => Ok(round_even(*x)),
            [x, digits] => {
                let scale = 10f64.powi(*digits as i32);
                Ok(round_even(x * scale) / scale)
            }
            _ => Err(arity("1 or 2")),
        },
        "pow" => match args {
            [base, exp] => Ok(base.powf(*exp)),
            _ => Err(arity("exactly 2")),
        },
        "min" => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or_else(|| arity("at least 1")),
        "max" => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or_else(|| arity("at least 1")),
        other => Err(CalcError::UnknownName(other.to_string())),
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(input: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    let value = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(CalcError::UnexpectedToken(format!("{:?}", t)));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Render a result; integral values print without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
