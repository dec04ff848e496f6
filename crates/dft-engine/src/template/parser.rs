//! Lexer and recursive-descent parser for template expressions.
//!
//! The language inside `{{ … }}` spans: string/number/bool literals,
//! variable references, function calls with positional and keyword
//! arguments, callable field accesses, and `+`/`-` arithmetic.

use crate::template::value::TemplateValue;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(TemplateValue),
    Var(String),
    Call {
        name: String,
        args: Vec<Arg>,
    },
    Method {
        recv: Box<Expr>,
        name: String,
        args: Vec<Arg>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

pub(crate) fn parse(input: &str) -> Result<Expr, String> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected trailing input at token {:?}",
            parser.tokens[parser.pos]
        ));
    }
    Ok(expr)
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\'' | '\\')) => s.push(esc),
                            Some('n') => s.push('\n'),
                            Some(other) => return Err(format!("bad escape '\\{other}'")),
                            None => return Err("unterminated string".into()),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string".into()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut num = String::new();
                let mut is_float = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        num.push(d);
                        chars.next();
                    } else if d == '.' {
                        // A dot not followed by a digit is a method access.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if ahead.peek().is_some_and(char::is_ascii_digit) {
                            is_float = true;
                            num.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    tokens.push(Token::Float(
                        num.parse().map_err(|_| format!("bad number '{num}'"))?,
                    ));
                } else {
                    tokens.push(Token::Int(
                        num.parse().map_err(|_| format!("bad number '{num}'"))?,
                    ));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&a) = chars.peek() {
                    if a.is_ascii_alphanumeric() || a == '_' {
                        ident.push(a);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character '{other}'")),
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
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {expected:?}, found {tok:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.postfix()?;
        while let Some(tok) = self.peek() {
            let op = match tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.postfix()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(Token::Dot)) {
            self.next();
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(format!("expected method name after '.', found {other:?}")),
            };
            self.expect(&Token::LParen)?;
            let args = self.args()?;
            expr = Expr::Method {
                recv: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Lit(TemplateValue::Str(s))),
            Some(Token::Int(i)) => Ok(Expr::Lit(TemplateValue::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(TemplateValue::Float(f))),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.primary()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(TemplateValue::Bool(true))),
                "false" => Ok(Expr::Lit(TemplateValue::Bool(false))),
                "none" | "null" => Ok(Expr::Lit(TemplateValue::Null)),
                _ => {
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.next();
                        let args = self.args()?;
                        Ok(Expr::Call { name, args })
                    } else {
                        Ok(Expr::Var(name))
                    }
                }
            },
            other => Err(format!("expected expression, found {other:?}")),
        }
    }

    /// Argument list; the opening paren is already consumed.
    fn args(&mut self) -> Result<Vec<Arg>, String> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.next();
            return Ok(args);
        }
        loop {
            // Keyword argument: `ident =` lookahead.
            let name = if let (Some(Token::Ident(kw)), Some(Token::Eq)) =
                (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
            {
                let kw = kw.clone();
                self.pos += 2;
                Some(kw)
            } else {
                None
            };
            let value = self.expr()?;
            args.push(Arg { name, value });
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => break,
                other => return Err(format!("expected ',' or ')', found {other:?}")),
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_call() {
        let expr = parse(r#"var("target_table")"#).unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "var".into(),
                args: vec![Arg {
                    name: None,
                    value: Expr::Lit(TemplateValue::Str("target_table".into())),
                }],
            }
        );
    }

    #[test]
    fn test_parse_bare_variable() {
        assert_eq!(parse("batch_start").unwrap(), Expr::Var("batch_start".into()));
    }

    #[test]
    fn test_parse_method_chain() {
        let expr = parse(r#"batch_start.strftime("%Y-%m-%d")"#).unwrap();
        match expr {
            Expr::Method { recv, name, args } => {
                assert_eq!(*recv, Expr::Var("batch_start".into()));
                assert_eq!(name, "strftime");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_kwargs() {
        let expr = parse("timedelta(hours=2, minutes=30)").unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "timedelta");
                assert_eq!(args[0].name.as_deref(), Some("hours"));
                assert_eq!(args[0].value, Expr::Lit(TemplateValue::Int(2)));
                assert_eq!(args[1].name.as_deref(), Some("minutes"));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_subtraction_with_parens() {
        let expr = parse("(batch_start) - timedelta(hours=2)").unwrap();
        match expr {
            Expr::BinOp { op, lhs, .. } => {
                assert_eq!(op, BinOp::Sub);
                assert_eq!(*lhs, Expr::Var("batch_start".into()));
            }
            other => panic!("expected binop, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_state_get_with_default() {
        let expr = parse(r#"state.get("cursor", "2024-01-01")"#).unwrap();
        match expr {
            Expr::Method { recv, name, args } => {
                assert_eq!(*recv, Expr::Var("state".into()));
                assert_eq!(name, "get");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected method, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_single_quoted_string() {
        assert_eq!(
            parse("env_var('HOME')").unwrap(),
            Expr::Call {
                name: "env_var".into(),
                args: vec![Arg {
                    name: None,
                    value: Expr::Lit(TemplateValue::Str("HOME".into())),
                }],
            }
        );
    }

    #[test]
    fn test_parse_float_vs_method_dot() {
        assert_eq!(parse("1.5").unwrap(), Expr::Lit(TemplateValue::Float(1.5)));
        assert!(parse("now().isoformat()").is_ok());
    }

    #[test]
    fn test_unterminated_string_fails() {
        let err = parse(r#"var("oops"#).unwrap_err();
        assert!(err.contains("unterminated"), "got: {err}");
    }

    #[test]
    fn test_trailing_garbage_fails() {
        let err = parse("today() today()").unwrap_err();
        assert!(err.contains("trailing"), "got: {err}");
    }
}
