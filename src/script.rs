//! A small S-expression front end for the combinator registry.
//!
//! ## Syntax
//!
//! ```text
//! ; comment
//! 42  -0.5                     ; numbers
//! "bd [sn sn]"                 ; mini-notation
//! bd                           ; symbol (becomes a string value)
//! ~  true  false               ; silence and booleans
//! [1, 2, 3]                    ; list
//! (fast 2 (s "bd sn"))         ; call a registered combinator
//! (->> (s "bd sn")             ; thread the value in as the last argument
//!      (fast 2)
//!      (gain "0.5 1"))
//! ```
//!
//! Several top-level forms are stacked.

use crate::error::{EvalError, ParseError};
use crate::event::Location;
use crate::mini::{parse_mini_notation_at, ValueAtoms};
use crate::pattern::{silence, stack, Pattern};
use crate::registry::{arg_pattern, registry};
use crate::value::Value;
use std::fmt;
use tracing::debug;

const THREAD_LAST: &str = "->>";

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Number(f64),
    Str(String),
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source span; for strings, the text between the quotes.
    pub location: Location,
}

/// Tokenize a script. Offsets are in characters.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().enumerate().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token {
                kind,
                location: Location::new(start, start + 1),
            });
            continue;
        }

        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                // Comment runs to the end of the line.
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut end = None;
                while let Some((i, c)) = chars.next() {
                    match c {
                        '"' => {
                            end = Some(i);
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => s.push('\n'),
                            Some((_, 't')) => s.push('\t'),
                            Some((_, escaped)) => s.push(escaped),
                            None => break,
                        },
                        _ => s.push(c),
                    }
                }
                let Some(end) = end else {
                    return Err(ParseError::new("unterminated string", start));
                };
                tokens.push(Token {
                    kind: TokenKind::Str(s),
                    location: Location::new(start + 1, end),
                });
            }
            _ if is_symbol_char(c) => {
                let mut text = String::new();
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_symbol_char(c) {
                        break;
                    }
                    text.push(c);
                    end = i + 1;
                    chars.next();
                }
                let kind = match text.parse::<f64>() {
                    Ok(n) if looks_numeric(&text) => TokenKind::Number(n),
                    _ => TokenKind::Symbol(text),
                };
                tokens.push(Token {
                    kind,
                    location: Location::new(start, end),
                });
            }
            _ => {
                return Err(ParseError::new(format!("unexpected character '{}'", c), start));
            }
        }
    }

    Ok(tokens)
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '-' | '+' | '*' | '/' | '!' | '?' | '<' | '>' | '=' | ':' | '.' | '~' | '%'
        )
}

/// Excludes symbols such as `inf` or `nan` that `f64` would accept.
fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits.chars().any(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Symbol(String),
    /// `( ... )`
    List(Vec<Expr>),
    /// `[ ... ]`
    Seq(Vec<Expr>),
}

/// A parsed expression and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str| -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, "{}", sep)?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        };
        match &self.kind {
            ExprKind::Number(n) => write!(f, "{}", n),
            ExprKind::Str(s) => write!(f, "{:?}", s),
            ExprKind::Symbol(s) => write!(f, "{}", s),
            ExprKind::List(items) => {
                write!(f, "(")?;
                join(f, items, " ")?;
                write!(f, ")")
            }
            ExprKind::Seq(items) => {
                write!(f, "[")?;
                join(f, items, ", ")?;
                write!(f, "]")
            }
        }
    }
}

/// Parse every top-level form.
pub fn parse(tokens: &[Token]) -> Result<Vec<Expr>, ParseError> {
    let mut pos = 0;
    let mut exprs = Vec::new();
    while pos < tokens.len() {
        exprs.push(parse_expr(tokens, &mut pos)?);
    }
    Ok(exprs)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<Expr, ParseError> {
    let Some(token) = tokens.get(*pos) else {
        let end = tokens.last().map_or(0, |t| t.location.end);
        return Err(ParseError::new("unexpected end of input", end));
    };
    *pos += 1;
    let atom = |kind: ExprKind| -> Result<Expr, ParseError> {
        Ok(Expr {
            kind,
            location: token.location,
        })
    };

    match &token.kind {
        TokenKind::Number(n) => atom(ExprKind::Number(*n)),
        TokenKind::Str(s) => atom(ExprKind::Str(s.clone())),
        TokenKind::Symbol(s) => atom(ExprKind::Symbol(s.clone())),
        TokenKind::LParen => {
            let (items, end) = parse_until(tokens, pos, &TokenKind::RParen, token)?;
            Ok(Expr {
                kind: ExprKind::List(items),
                location: Location::new(token.location.start, end),
            })
        }
        TokenKind::LBracket => {
            let (items, end) = parse_until(tokens, pos, &TokenKind::RBracket, token)?;
            Ok(Expr {
                kind: ExprKind::Seq(items),
                location: Location::new(token.location.start, end),
            })
        }
        TokenKind::RParen => Err(ParseError::new("unexpected ')'", token.location.start)),
        TokenKind::RBracket => Err(ParseError::new("unexpected ']'", token.location.start)),
        TokenKind::Comma => Err(ParseError::new("unexpected ','", token.location.start)),
    }
}

/// Items up to `close`, skipping commas. Returns the end offset of `close`.
fn parse_until(
    tokens: &[Token],
    pos: &mut usize,
    close: &TokenKind,
    open: &Token,
) -> Result<(Vec<Expr>, usize), ParseError> {
    let mut items = Vec::new();
    loop {
        match tokens.get(*pos) {
            None => {
                let what = if *close == TokenKind::RParen {
                    "unclosed parenthesis"
                } else {
                    "unclosed bracket"
                };
                return Err(ParseError::new(what, open.location.start));
            }
            Some(token) if token.kind == *close => {
                *pos += 1;
                return Ok((items, token.location.end));
            }
            Some(Token {
                kind: TokenKind::Comma,
                ..
            }) => *pos += 1,
            Some(_) => items.push(parse_expr(tokens, pos)?),
        }
    }
}

/// Evaluate an expression.
pub fn eval(expr: &Expr) -> Result<Value, EvalError> {
    match &expr.kind {
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        // Literals are mini-notation, positioned within the script.
        ExprKind::Str(s) => Ok(Value::Pattern(parse_mini_notation_at(
            s,
            &ValueAtoms,
            Some(expr.location),
        )?)),
        ExprKind::Symbol(s) => Ok(match s.as_str() {
            "~" => Value::Pattern(silence()),
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Str(s.clone()),
        }),
        ExprKind::Seq(items) => Ok(Value::Seq(
            items.iter().map(eval).collect::<Result<_, _>>()?,
        )),
        ExprKind::List(items) => eval_form(items),
    }
}

fn eval_form(items: &[Expr]) -> Result<Value, EvalError> {
    let Some((head, rest)) = items.split_first() else {
        return Err(EvalError::EmptyForm);
    };
    let ExprKind::Symbol(name) = &head.kind else {
        return Err(EvalError::type_error(
            &head.to_string(),
            "a form must start with a function name",
        ));
    };
    if name == THREAD_LAST {
        return eval_thread_last(rest);
    }
    let args = rest.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
    registry().call(name, &args)
}

/// `(->> x (f a) g)` is `(g (f a x))`.
fn eval_thread_last(items: &[Expr]) -> Result<Value, EvalError> {
    let Some((first, steps)) = items.split_first() else {
        return Err(EvalError::Arity {
            name: THREAD_LAST.to_string(),
            expected: "at least 1".to_string(),
            got: 0,
        });
    };
    let mut value = eval(first)?;
    for step in steps {
        let (name, args) = match &step.kind {
            ExprKind::Symbol(name) => (name, &[][..]),
            ExprKind::List(form) => match form.split_first() {
                Some((Expr { kind: ExprKind::Symbol(name), .. }, args)) => (name, args),
                _ => {
                    return Err(EvalError::type_error(
                        THREAD_LAST,
                        format!("cannot thread into {}", step),
                    ))
                }
            },
            _ => {
                return Err(EvalError::type_error(
                    THREAD_LAST,
                    format!("cannot thread into {}", step),
                ))
            }
        };
        let mut args = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
        args.push(value);
        value = registry().call(name, &args)?;
    }
    Ok(value)
}

/// Mark queries of `pat` as coming from `location`.
fn at_call_site(pat: Pattern<Value>, location: Location) -> Pattern<Value> {
    pat.with_context(move |ctx| ctx.with_call_site(location))
}

/// Compile a script into a single pattern.
///
/// Each top-level form is coerced to a pattern; several forms are stacked.
/// An empty script is silence.
pub fn compile(src: &str) -> Result<Pattern<Value>, EvalError> {
    let exprs = parse(&tokenize(src)?)?;
    let mut layers = Vec::with_capacity(exprs.len());
    for expr in &exprs {
        let pat = arg_pattern("program", &eval(expr)?)?;
        layers.push(at_call_site(pat, expr.location));
    }
    debug!(forms = layers.len(), "compiled script");
    Ok(match layers.len() {
        0 => silence(),
        1 => layers.remove(0),
        _ => stack(layers),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::Rational;
    use crate::signal::continuous;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(
            kinds("(+ 1 -2.5)"),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol("+".into()),
                TokenKind::Number(1.0),
                TokenKind::Number(-2.5),
                TokenKind::RParen,
            ]
        );
        assert_eq!(kinds("- inf"), vec![TokenKind::Symbol("-".into()), TokenKind::Symbol("inf".into())]);
    }

    #[test]
    fn test_tokenize_string_location() {
        let tokens = tokenize("(s \"bd sn\") ; drums").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[2].kind, TokenKind::Str("bd sn".into()));
        assert_eq!(tokens[2].location, Location::new(4, 9));
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(tokenize("(s \"bd").unwrap_err().offset, 3);
        assert_eq!(tokenize("(a #)").unwrap_err().offset, 3);
    }

    #[test]
    fn test_parse_forms() {
        let exprs = parse(&tokenize("(fast 2 [a, b]) x").unwrap()).unwrap();
        assert_eq!(exprs.len(), 2);
        assert_eq!(exprs[0].to_string(), "(fast 2 [a, b])");
        assert_eq!(exprs[0].location, Location::new(0, 15));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(&tokenize("(fast 2").unwrap()).unwrap_err().offset, 0);
        assert_eq!(parse(&tokenize("a )").unwrap()).unwrap_err().offset, 2);
    }

    #[test]
    fn test_compile_sequence() {
        let pat = compile("(fast 2 \"a b\")").unwrap();
        let onsets: Vec<Rational> = pat.first_cycle().iter().filter_map(|e| e.onset()).collect();
        assert_eq!(
            onsets,
            vec![
                Rational::ZERO,
                Rational::new(1, 4),
                Rational::new(1, 2),
                Rational::new(3, 4)
            ]
        );
    }

    #[test]
    fn test_compile_thread_last() {
        let chained = compile("(->> (s \"bd sn\") (fast 2) (gain 0.5))").unwrap();
        let nested = compile("(gain 0.5 (fast 2 (s \"bd sn\")))").unwrap();
        assert_eq!(chained.first_cycle_values(), nested.first_cycle_values());
        let values = chained.first_cycle_values();
        assert_eq!(values.len(), 4);
        assert_eq!(values[1].get("s"), Some(&Value::from("sn")));
        assert_eq!(values[1].get("gain"), Some(&Value::Number(0.5)));

        assert_eq!(
            compile("(->> \"a b\" rev)").unwrap().first_cycle_values(),
            vec![Value::from("b"), Value::from("a")]
        );
    }

    #[test]
    fn test_compile_stacks_forms() {
        let pat = compile("\"a b\" \n (s \"c\") ; two layers").unwrap();
        assert_eq!(pat.first_cycle().len(), 3);
        assert!(compile("").unwrap().first_cycle().is_empty());
        assert!(compile("~").unwrap().first_cycle().is_empty());
    }

    #[test]
    fn test_compile_list_literal() {
        let pat = compile("(pick [\"a\", \"b c\"] \"0 1\")").unwrap();
        assert_eq!(
            pat.first_cycle_values(),
            vec![Value::from("a"), Value::from("c")]
        );
    }

    #[test]
    fn test_mini_notation_errors_point_into_script() {
        let err = compile("(s \"bd [sn\")").unwrap_err();
        let EvalError::Parse(err) = err else {
            panic!("expected a parse error, got {:?}", err);
        };
        assert_eq!(err.location, Some(Location::new(4, 10)));
        assert_eq!(err.absolute_offset(), 10);
    }

    #[test]
    fn test_event_locations_in_script() {
        let pat = compile("(fast 1 \"a b\")").unwrap();
        let events = pat.first_cycle();
        assert_eq!(events[1].locations, vec![Location::new(11, 12)]);
    }

    #[test]
    fn test_eval_errors() {
        assert_eq!(compile("()").unwrap_err(), EvalError::EmptyForm);
        assert!(matches!(compile("(nope 1)"), Err(EvalError::UnknownFunction(_))));
        assert!(matches!(compile("(1 2)"), Err(EvalError::Type { .. })));
        assert!(matches!(compile("(->>)"), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_huge_numbers_are_type_errors() {
        assert!(matches!(compile("(fast 1e19 \"a\")"), Err(EvalError::Type { .. })));
        assert!(matches!(compile("(slow -1e300 \"a\")"), Err(EvalError::Type { .. })));
        assert!(compile("(fast 2.5 \"a\")").is_ok());
    }

    #[test]
    fn test_call_site_context() {
        let depth = continuous(|state| Some(Value::from(state.ctx.call_site().len() as i64)));
        let pat = at_call_site(depth, Location::new(0, 5));
        assert_eq!(pat.first_cycle_values(), vec![Value::Number(1.0)]);
    }
}
