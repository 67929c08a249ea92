//! A restricted arithmetic expression language for script mappings.
//!
//! Scripts never execute arbitrary code. They are parsed into a small
//! expression tree over a fixed set of variables and functions:
//!
//! - variables: `value`, `value_min`, `value_max`, `value_range`, `PI`, `E`
//! - functions: `linear(v, min, max)`, `abs`, `log`, `log10`, `exp`, `sqrt`,
//!   `pow`, `min`, `max`, `clamp(v, lo, hi)`, `floor`, `ceil`, `round`
//! - operators: `+ - * / %`, `^` and `**` (power), comparisons and `?:`
//!
//! A leading `return`, a trailing `;` and `this.`/`Math.` prefixes are
//! accepted so that scripts written against the classic helper namespace
//! keep working.

use std::fmt;

use crate::error::{Error, Result};

/// Variables a script can read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEnv {
    pub value: f64,
    pub value_min: f64,
    pub value_max: f64,
}

impl ScriptEnv {
    fn lookup(&self, var: Var) -> f64 {
        match var {
            Var::Value => self.value,
            Var::Min => self.value_min,
            Var::Max => self.value_max,
            Var::Range => self.value_max - self.value_min,
            Var::Pi => std::f64::consts::PI,
            Var::E => std::f64::consts::E,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Value,
    Min,
    Max,
    Range,
    Pi,
    E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Linear,
    Abs,
    Log,
    Log10,
    Exp,
    Sqrt,
    Pow,
    Min,
    Max,
    Clamp,
    Floor,
    Ceil,
    Round,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "linear" => Func::Linear,
            "abs" => Func::Abs,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "exp" => Func::Exp,
            "sqrt" => Func::Sqrt,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            "clamp" => Func::Clamp,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            _ => return None,
        })
    }

    /// Accepted argument counts (min, max).
    fn arity(self) -> (usize, usize) {
        match self {
            Func::Linear | Func::Clamp => (3, 3),
            Func::Pow => (2, 2),
            Func::Min | Func::Max => (1, usize::MAX),
            _ => (1, 1),
        }
    }

    fn call(self, args: &[f64]) -> f64 {
        match self {
            Func::Linear => (args[0] - args[1]) / (args[2] - args[1]),
            Func::Abs => args[0].abs(),
            Func::Log => args[0].ln(),
            Func::Log10 => args[0].log10(),
            Func::Exp => args[0].exp(),
            Func::Sqrt => args[0].sqrt(),
            Func::Pow => args[0].powf(args[1]),
            Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Func::Clamp => args[0].max(args[1]).min(args[2]),
            Func::Floor => args[0].floor(),
            Func::Ceil => args[0].ceil(),
            Func::Round => args[0].round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            BinOp::Pow => a.powf(b),
            BinOp::Lt => truth(a < b),
            BinOp::Le => truth(a <= b),
            BinOp::Gt => truth(a > b),
            BinOp::Ge => truth(a >= b),
            BinOp::Eq => truth(a == b),
            BinOp::Ne => truth(a != b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(Var),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, env: &ScriptEnv) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Var(v) => env.lookup(*v),
            Expr::Neg(e) => -e.eval(env),
            Expr::Not(e) => {
                if e.eval(env) == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::Bin(op, a, b) => op.apply(a.eval(env), b.eval(env)),
            Expr::Cond(c, t, f) => {
                let c = c.eval(env);
                if c != 0.0 && !c.is_nan() {
                    t.eval(env)
                } else {
                    f.eval(env)
                }
            }
            Expr::Call(func, args) => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(env)).collect();
                func.call(&values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
}

const OPERATORS: &[&str] = &[
    "===", "!==", "**", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "^", "<", ">", "!",
];

fn tokenize(code: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    'outer: while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ';' {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
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
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number `{text}`"))?;
            tokens.push(Token::Num(n));
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.')) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '?' => tokens.push(Token::Question),
            ':' => tokens.push(Token::Colon),
            _ => {
                for op in OPERATORS {
                    let len = op.len();
                    if i + len <= chars.len() && chars[i..i + len].iter().copied().eq(op.chars()) {
                        tokens.push(Token::Op(op));
                        i += len;
                        continue 'outer;
                    }
                }
                return Err(format!("unexpected character `{c}`"));
            }
        }
        i += 1;
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
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek()
            && ops.contains(op)
        {
            let op = *op;
            self.pos += 1;
            return Some(op);
        }
        None
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, found {t:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn conditional(&mut self) -> std::result::Result<Expr, String> {
        let cond = self.comparison()?;
        if self.peek() == Some(&Token::Question) {
            self.pos += 1;
            let then = self.conditional()?;
            self.expect(Token::Colon)?;
            let otherwise = self.conditional()?;
            return Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    fn comparison(&mut self) -> std::result::Result<Expr, String> {
        let lhs = self.additive()?;
        let Some(op) = self.eat_op(&["<", "<=", ">", ">=", "==", "===", "!=", "!=="]) else {
            return Ok(lhs);
        };
        let op = match op {
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "==" | "===" => BinOp::Eq,
            _ => BinOp::Ne,
        };
        let rhs = self.additive()?;
        Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.term()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<Expr, String> {
        match self.eat_op(&["-", "+", "!"]) {
            Some("-") => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some("!") => Ok(Expr::Not(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> std::result::Result<Expr, String> {
        let base = self.primary()?;
        if self.eat_op(&["^", "**"]).is_some() {
            // right associative
            let exponent = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let e = self.conditional()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => self.identifier(&name),
            Some(t) => Err(format!("unexpected token {t:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn identifier(&mut self, raw: &str) -> std::result::Result<Expr, String> {
        let name = raw
            .strip_prefix("this.")
            .or_else(|| raw.strip_prefix("Math."))
            .unwrap_or(raw);
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let func = Func::lookup(name).ok_or_else(|| format!("unknown function `{name}`"))?;
            let mut args = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                loop {
                    args.push(self.conditional()?);
                    if self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
            }
            self.expect(Token::RParen)?;
            let (lo, hi) = func.arity();
            if args.len() < lo || args.len() > hi {
                return Err(format!("`{name}` called with {} arguments", args.len()));
            }
            return Ok(Expr::Call(func, args));
        }
        let var = match name {
            "value" => Var::Value,
            "value_min" => Var::Min,
            "value_max" => Var::Max,
            "value_range" => Var::Range,
            "PI" => Var::Pi,
            "E" => Var::E,
            other => return Err(format!("unknown variable `{other}`")),
        };
        Ok(Expr::Var(var))
    }
}

/// A compiled script.
#[derive(Clone, PartialEq)]
pub struct Script {
    expr: Expr,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").finish_non_exhaustive()
    }
}

impl Script {
    /// Compile `code`.
    pub fn compile(code: &str) -> Result<Script> {
        let trimmed = code.trim();
        let body = trimmed
            .strip_prefix("return")
            .filter(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '('))
            .unwrap_or(trimmed);
        let tokens = tokenize(body).map_err(|m| Error::script(code, m))?;
        if tokens.is_empty() {
            return Err(Error::script(code, "empty script"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.conditional().map_err(|m| Error::script(code, m))?;
        if let Some(t) = parser.peek() {
            return Err(Error::script(code, format!("unexpected trailing {t:?}")));
        }
        Ok(Script { expr })
    }

    /// Evaluate against `env`.
    pub fn eval(&self, env: &ScriptEnv) -> f64 {
        self.expr.eval(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str, value: f64) -> f64 {
        let env = ScriptEnv {
            value,
            value_min: 0.0,
            value_max: 10.0,
        };
        match Script::compile(code) {
            Ok(s) => s.eval(&env),
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn test_default_script() {
        assert_eq!(run("return this.linear(value,this.value_min,this.value_max);", 5.0), 0.5);
    }

    #[test]
    fn test_precedence_and_power() {
        assert_eq!(run("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(run("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_eq!(run("-value ** 2", 3.0), -9.0);
        assert_eq!(run("(value_range - value) / value_range", 2.5), 0.75);
        assert_eq!(run("1e-1 * 10", 0.0), 1.0);
    }

    #[test]
    fn test_conditional_and_functions() {
        assert_eq!(run("value > 5 ? 1 : 0", 7.0), 1.0);
        assert_eq!(run("value > 5 ? 1 : 0", 3.0), 0.0);
        assert_eq!(run("Math.max(0.1, min(value, 0.3), 0.2)", 1.0), 0.3);
        assert_eq!(run("clamp(value, 2, 4)", 9.0), 4.0);
        assert_eq!(run("sqrt(abs(value))", -16.0), 4.0);
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert!(Script::compile("window.alert(1)").is_err());
        assert!(Script::compile("foo + 1").is_err());
        assert!(Script::compile("pow(1)").is_err());
        assert!(Script::compile("").is_err());
        assert!(Script::compile("1 +").is_err());
        assert!(Script::compile("value = 3").is_err());
    }
}
