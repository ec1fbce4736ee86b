//! Cut-string parser producing [`NamedFunc`]s.
//!
//! Supports arithmetic (+, -, *, /, %), comparisons (==, !=, <, <=, >, >=),
//! boolean operators (&&, ||, !), subscripts (`jets_pt[0]`) and built-in
//! functions (abs, sqrt, log, exp, pow, min, max). Identifiers are resolved
//! against a [`Schema`] so the scalar/vector tag of every sub-expression is
//! known before any event is read.

use hp_core::{Error, Result};

use crate::event::Schema;
use crate::named_func::{BinaryOp, NamedFunc, UnaryOp, binary, unary};

impl NamedFunc {
    /// Parse an expression such as `"njets>=4 && ht>500"`.
    ///
    /// The resulting function is named after the input text with whitespace
    /// removed. An empty string selects everything (constant 1).
    pub fn parse(input: &str, schema: &Schema) -> Result<NamedFunc> {
        let text: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Ok(NamedFunc::constant(1.0));
        }
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens: &tokens, pos: 0, schema };
        let f = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(Error::Expression(format!(
                "unexpected token after expression in '{input}': {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(f.with_name(text))
    }
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if i + 1 < chars.len() {
            let tok = match (c, chars[i + 1]) {
                ('&', '&') => Some(Token::And),
                ('|', '|') => Some(Token::Or),
                ('=', '=') => Some(Token::Eq),
                ('!', '=') => Some(Token::Ne),
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Not),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || chars[i] == '.'
                    || chars[i] == 'e'
                    || chars[i] == 'E'
                    || ((chars[i] == '+' || chars[i] == '-')
                        && i > start
                        && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
            {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let n: f64 =
                s.parse().map_err(|_| Error::Expression(format!("invalid number: '{s}'")))?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(Error::Expression(format!("unexpected character '{c}' in '{input}'")));
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    schema: &'a Schema,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => Err(Error::Expression(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    /// Parse a left-associative chain of binary operators at one precedence level.
    fn chain(
        &mut self,
        next: fn(&mut Self) -> Result<NamedFunc>,
        op_of: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<NamedFunc> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek().and_then(op_of) {
            self.advance();
            let rhs = next(self)?;
            lhs = binary(lhs, rhs, op);
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_and, |t| matches!(t, Token::Or).then_some(BinaryOp::Or))
    }

    fn parse_and(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_eq, |t| matches!(t, Token::And).then_some(BinaryOp::And))
    }

    fn parse_eq(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_rel, |t| match t {
            Token::Eq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_rel(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_add, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_add(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_mul, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_mul(&mut self) -> Result<NamedFunc> {
        self.chain(Self::parse_unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<NamedFunc> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(unary(e, UnaryOp::Neg))
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(unary(e, UnaryOp::Not))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<NamedFunc> {
        let mut e = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.advance();
            let index = self.parse_or()?;
            self.expect(&Token::RBracket)?;
            e = e.at(index)?;
        }
        Ok(e)
    }

    fn parse_atom(&mut self) -> Result<NamedFunc> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(NamedFunc::constant(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let mut args = vec![self.parse_or()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Token::RParen)?;
                    call(&name, args)
                } else {
                    NamedFunc::field(&name, self.schema)
                }
            }
            other => Err(Error::Expression(format!(
                "expected number, identifier, or '(', got {other:?}"
            ))),
        }
    }
}

fn call(name: &str, mut args: Vec<NamedFunc>) -> Result<NamedFunc> {
    let arity = match name {
        "abs" | "sqrt" | "log" | "exp" => 1,
        "pow" | "min" | "max" => 2,
        _ => return Err(Error::Expression(format!("unknown function: '{name}'"))),
    };
    if args.len() != arity {
        return Err(Error::Expression(format!(
            "function '{name}' takes {arity} argument(s), got {}",
            args.len()
        )));
    }
    let first = args.remove(0);
    Ok(match name {
        "abs" => unary(first, UnaryOp::Abs),
        "sqrt" => unary(first, UnaryOp::Sqrt),
        "log" => unary(first, UnaryOp::Log),
        "exp" => unary(first, UnaryOp::Exp),
        "pow" => binary(first, args.remove(0), BinaryOp::Pow),
        "min" => binary(first, args.remove(0), BinaryOp::Min),
        _ => binary(first, args.remove(0), BinaryOp::Max),
    })
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MapEvent;
    use crate::named_func::Value;

    fn schema() -> Schema {
        Schema::new()
            .with_scalar("x")
            .with_scalar("y")
            .with_scalar("njet")
            .with_scalar("pt_lead")
            .with_vector("jets_pt")
            .with_vector("jets_csv")
    }

    fn eval(text: &str, ev: &MapEvent) -> f64 {
        NamedFunc::parse(text, &schema()).unwrap().get_scalar(ev).unwrap()
    }

    #[test]
    fn simple_arithmetic() {
        let e = NamedFunc::parse("2 + 3 * 4", &schema()).unwrap();
        assert_eq!(e.as_constant(), Some(14.0));
        assert_eq!(e.name(), "2+3*4");
    }

    #[test]
    fn precedence_and_modulo() {
        let ev = MapEvent::new().with_scalar("x", 7.0).with_scalar("y", 3.0);
        assert!((eval("x % y + 1", &ev) - 2.0).abs() < 1e-10);
        assert!((eval("x - y - 1", &ev) - 3.0).abs() < 1e-10);
        assert!((eval("x > 5 == 1", &ev) - 1.0).abs() < 1e-10);
        assert!((eval("-x + +y", &ev) - (-4.0)).abs() < 1e-10);
    }

    #[test]
    fn comparison_and_boolean() {
        let mk = |n: f64, pt: f64| MapEvent::new().with_scalar("njet", n).with_scalar("pt_lead", pt);
        let text = "njet >= 4 && pt_lead > 25.0";
        assert!((eval(text, &mk(4.0, 30.0)) - 1.0).abs() < 1e-10);
        assert!((eval(text, &mk(3.0, 30.0)) - 0.0).abs() < 1e-10);
        assert!((eval(text, &mk(4.0, 20.0)) - 0.0).abs() < 1e-10);
        assert!((eval("!(njet > 3)", &mk(2.0, 0.0)) - 1.0).abs() < 1e-10);
        assert!((eval("njet > 5 || pt_lead < 2", &mk(3.0, 1.0)) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn functions() {
        let ev = MapEvent::new().with_scalar("x", 9.0).with_scalar("y", -2.0);
        assert!((eval("sqrt(x)", &ev) - 3.0).abs() < 1e-10);
        assert!((eval("pow(y, 2)", &ev) - 4.0).abs() < 1e-10);
        assert!((eval("max(x, y) + abs(y)", &ev) - 11.0).abs() < 1e-10);
        assert!((eval("log(exp(2))", &ev) - 2.0).abs() < 1e-10);
        assert!(NamedFunc::parse("pow(x)", &schema()).is_err());
        assert!(NamedFunc::parse("cosh(x)", &schema()).is_err());
    }

    #[test]
    fn vector_fields_and_subscripts() {
        let ev = MapEvent::new()
            .with_scalar("x", 1.0)
            .with_vector("jets_pt", vec![120.0, 60.0, 25.0])
            .with_vector("jets_csv", vec![0.9, 0.1, 0.95]);
        let sel = NamedFunc::parse("jets_pt > 30 && jets_csv > 0.8", &schema()).unwrap();
        assert!(sel.is_vector());
        assert_eq!(sel.eval(&ev).unwrap(), Value::Vector(vec![1.0, 0.0, 0.0]));

        let lead = NamedFunc::parse("jets_pt[0] + jets_pt[x]", &schema()).unwrap();
        assert!(lead.is_scalar());
        assert!((lead.get_scalar(&ev).unwrap() - 180.0).abs() < 1e-10);

        let bad = NamedFunc::parse("jets_pt[5]", &schema()).unwrap();
        assert!(bad.get_scalar(&ev).is_err());
        assert!(NamedFunc::parse("x[0]", &schema()).is_err());
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = NamedFunc::parse("met > 200", &schema()).unwrap_err();
        assert!(err.to_string().contains("met"));
    }

    #[test]
    fn empty_selects_everything() {
        let e = NamedFunc::parse("  ", &schema()).unwrap();
        assert_eq!(e.as_constant(), Some(1.0));
    }

    #[test]
    fn malformed_inputs() {
        assert!(NamedFunc::parse("(x > 1", &schema()).is_err());
        assert!(NamedFunc::parse("x > 1)", &schema()).is_err());
        assert!(NamedFunc::parse("x $ y", &schema()).is_err());
        assert!(NamedFunc::parse("x >", &schema()).is_err());
    }

    #[test]
    fn scientific_notation() {
        let e = NamedFunc::parse("1.5e2 + 3.0E-1", &schema()).unwrap();
        assert!((e.as_constant().unwrap() - 150.3).abs() < 1e-10);
    }

    #[test]
    fn name_is_whitespace_free_text() {
        let e = NamedFunc::parse("njet >= 4 && x/y < 0.5", &schema()).unwrap();
        assert_eq!(e.name(), "njet>=4&&x/y<0.5");
        assert_eq!(e.plain_name(), "njet_GEQ_4_AND_x_DIV_y_LES_0p5");
    }
}
