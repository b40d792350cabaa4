//! Mini-notation: a compact text syntax for patterns.
//!
//! ## Syntax
//!
//! ```text
//! bd sn          ; two steps per cycle
//! [bd sn] hh     ; groups take one step
//! <bd sn cp>     ; one child per cycle
//! bd, hh hh      ; stack
//! ~              ; rest
//! bd*2  bd/2     ; fast / slow (factors may be [..] or <..>)
//! bd!3  bd ! !   ; repeat
//! bd _ _ sn      ; elongate the previous step
//! bd@3 sn        ; weight
//! bd?  bd?0.3    ; random drop
//! bd | sn        ; random choice per cycle
//! bd(3,8,2)      ; euclid (pulses, steps, rotation)
//! bd:3:0.8       ; name, index and gain
//! ```
//!
//! The parser only knows the grammar. Leaf text is turned into patterns by
//! an [`AtomFactory`], so the same parser builds numeric, sample and
//! control patterns.

use crate::control::as_control;
use crate::error::ParseError;
use crate::event::Location;
use crate::pattern::{alternate, sequence, silence, stack, Pattern};
use crate::random::choose_cycle;
use crate::rational::Rational;
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::debug;

const PUNCTUATION: &[char] = &[
    '[', ']', '<', '>', '(', ')', ',', '*', '/', '~', '@', '|', '?', '!',
];

/// Salt for the first random operator; each `?` and `|` gets its own.
const SALT_BASE: u64 = 0x6d69_6e69;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Punct(char),
    Literal(String),
}

/// A token and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Character offset of the first character.
    pub offset: usize,
    /// Length in characters.
    pub len: usize,
    /// Whitespace comes right before this token.
    pub spaced: bool,
}

impl Token {
    fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Punct(c) => format!("'{}'", c),
            TokenKind::Literal(text) => format!("'{}'", text),
        }
    }
}

/// Split mini-notation text into tokens.
///
/// Every punctuation character is its own token; any other run of
/// non-whitespace characters is a literal. Tokenizing never fails.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut literal_start = 0;
    let mut literal_spaced = false;
    let mut spaced = false;

    let flush = |tokens: &mut Vec<Token>, literal: &mut String, start: usize, spaced: bool| {
        if !literal.is_empty() {
            let len = literal.chars().count();
            tokens.push(Token {
                kind: TokenKind::Literal(std::mem::take(literal)),
                offset: start,
                len,
                spaced,
            });
        }
    };

    for (offset, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            flush(&mut tokens, &mut literal, literal_start, literal_spaced);
            spaced = true;
        } else if PUNCTUATION.contains(&c) {
            flush(&mut tokens, &mut literal, literal_start, literal_spaced);
            tokens.push(Token {
                kind: TokenKind::Punct(c),
                offset,
                len: 1,
                spaced,
            });
            spaced = false;
        } else {
            if literal.is_empty() {
                literal_start = offset;
                literal_spaced = spaced;
            }
            literal.push(c);
            spaced = false;
        }
    }
    flush(&mut tokens, &mut literal, literal_start, literal_spaced);
    tokens
}

/// A leaf of the notation, with its `name:index:gain` suffix split off.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The literal as written.
    pub text: String,
    pub name: String,
    pub index: Option<i64>,
    pub gain: Option<f64>,
    /// Where the literal sits in the source.
    pub location: Location,
}

impl Atom {
    /// Split a literal into its parts.
    ///
    /// A suffix only counts when the index is an integer (and the gain a
    /// number); otherwise the whole text is the name.
    pub fn parse(text: &str, location: Location) -> Atom {
        let plain = Atom {
            text: text.to_string(),
            name: text.to_string(),
            index: None,
            gain: None,
            location,
        };
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 || parts[0].is_empty() {
            return plain;
        }
        let Ok(index) = parts[1].parse::<i64>() else {
            return plain;
        };
        let gain = match parts.get(2) {
            Some(gain) => match gain.parse::<f64>() {
                Ok(gain) => Some(gain),
                Err(_) => return plain,
            },
            None => None,
        };
        Atom {
            name: parts[0].to_string(),
            index: Some(index),
            gain,
            ..plain
        }
    }

    pub fn has_suffix(&self) -> bool {
        self.index.is_some()
    }
}

/// Turns atoms into patterns.
pub trait AtomFactory<T> {
    fn build(&self, atom: &Atom) -> Result<Pattern<T>, String>;
}

impl<T, F> AtomFactory<T> for F
where
    F: Fn(&Atom) -> Result<Pattern<T>, String>,
{
    fn build(&self, atom: &Atom) -> Result<Pattern<T>, String> {
        self(atom)
    }
}

/// Exact numbers, for factors and numeric patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberAtoms;

impl AtomFactory<Rational> for NumberAtoms {
    fn build(&self, atom: &Atom) -> Result<Pattern<Rational>, String> {
        Rational::parse(&atom.text)
            .map(crate::pattern::pure)
            .ok_or_else(|| format!("'{}' is not a number", atom.text))
    }
}

/// Dynamic values: numbers, booleans and strings.
///
/// An atom with a suffix becomes a map, `bd:3:0.5` giving
/// `{s: "bd", n: 3, gain: 0.5}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueAtoms;

impl ValueAtoms {
    pub fn value(atom: &Atom) -> Value {
        if let Some(index) = atom.index {
            let mut fields = BTreeMap::new();
            fields.insert("s".to_string(), Value::Str(atom.name.clone()));
            fields.insert("n".to_string(), Value::from(index));
            if let Some(gain) = atom.gain {
                fields.insert("gain".to_string(), Value::Number(gain));
            }
            return Value::Map(fields);
        }
        match atom.text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            text => match text.parse::<f64>() {
                Ok(n) if n.is_finite() => Value::Number(n),
                _ => Value::Str(text.to_string()),
            },
        }
    }
}

impl AtomFactory<Value> for ValueAtoms {
    fn build(&self, atom: &Atom) -> Result<Pattern<Value>, String> {
        Ok(crate::pattern::pure(ValueAtoms::value(atom)))
    }
}

/// Maps holding one named control, e.g. `ControlAtoms("s")`.
#[derive(Debug, Clone)]
pub struct ControlAtoms(pub String);

impl ControlAtoms {
    pub fn new(name: impl Into<String>) -> Self {
        ControlAtoms(name.into())
    }
}

impl AtomFactory<Value> for ControlAtoms {
    fn build(&self, atom: &Atom) -> Result<Pattern<Value>, String> {
        Ok(crate::pattern::pure(as_control(&self.0, ValueAtoms::value(atom))))
    }
}

/// Parse mini-notation into a pattern.
pub fn parse_mini_notation<T, A>(text: &str, atoms: &A) -> Result<Pattern<T>, ParseError>
where
    T: Clone + Send + Sync + 'static,
    A: AtomFactory<T>,
{
    parse_mini_notation_at(text, atoms, None)
}

/// Parse mini-notation embedded in a larger source.
///
/// `origin` is the location of the text itself; atom locations and errors
/// are reported relative to it.
pub fn parse_mini_notation_at<T, A>(
    text: &str,
    atoms: &A,
    origin: Option<Location>,
) -> Result<Pattern<T>, ParseError>
where
    T: Clone + Send + Sync + 'static,
    A: AtomFactory<T>,
{
    let tokens = tokenize(text);
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: text.chars().count(),
        origin,
        salt: SALT_BASE,
    };
    let pat = parser.expression(atoms, None)?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected {}", token.describe()), token.offset));
    }
    debug!(text, tokens = tokens.len(), "compiled mini-notation");
    Ok(pat)
}

/// A parsed step waiting to be placed in its sequence.
struct Step<T> {
    pat: Pattern<T>,
    repeats: usize,
}

enum EuclidArg {
    Literal(i64),
    Pattern(Pattern<i64>),
}

impl EuclidArg {
    fn into_pattern(self) -> Pattern<i64> {
        match self {
            EuclidArg::Literal(n) => crate::pattern::pure(n),
            EuclidArg::Pattern(pat) => pat,
        }
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Offset reported for errors at the end of input.
    end: usize,
    origin: Option<Location>,
    salt: u64,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_punct(&self, c: char) -> bool {
        self.peek().is_some_and(|t| t.is_punct(c))
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(message, offset).with_location(self.origin)
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token.is_punct(c) => Ok(()),
            Some(token) => Err(self.error(
                format!("expected '{}', found {}", c, token.describe()),
                token.offset,
            )),
            None => Err(self.error(format!("expected '{}'", c), self.end)),
        }
    }

    fn next_salt(&mut self) -> u64 {
        self.salt = self.salt.wrapping_add(1);
        self.salt
    }

    /// Literal directly attached to the previous token, if any.
    fn attached_literal(&mut self) -> Option<&'t Token> {
        match self.peek() {
            Some(token @ Token { kind: TokenKind::Literal(_), spaced: false, .. }) => {
                self.pos += 1;
                Some(token)
            }
            _ => None,
        }
    }

    fn location(&self, token: &Token) -> Location {
        let location = Location::new(token.offset, token.offset + token.len);
        match &self.origin {
            Some(origin) => location.offset_by(origin),
            None => location,
        }
    }

    /// `sequence (',' sequence)*`, stacked.
    fn expression<T>(
        &mut self,
        atoms: &dyn AtomFactory<T>,
        close: Option<char>,
    ) -> Result<Pattern<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut layers = vec![sequence(self.sequence(atoms)?)];
        while self.peek_punct(',') {
            self.pos += 1;
            layers.push(sequence(self.sequence(atoms)?));
        }
        if let Some(c) = close {
            self.expect(c)?;
        }
        Ok(if layers.len() == 1 {
            layers.remove(0)
        } else {
            stack(layers)
        })
    }

    /// `<seq, seq, ...>`: each sequence alternates, several are stacked.
    fn alternation<T>(&mut self, atoms: &dyn AtomFactory<T>) -> Result<Pattern<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut layers = vec![alternate(self.sequence(atoms)?)];
        while self.peek_punct(',') {
            self.pos += 1;
            layers.push(alternate(self.sequence(atoms)?));
        }
        self.expect('>')?;
        Ok(if layers.len() == 1 {
            layers.remove(0)
        } else {
            stack(layers)
        })
    }

    /// The weighted steps of one sequence, up to a separator or closer.
    fn sequence<T>(&mut self, atoms: &dyn AtomFactory<T>) -> Result<Vec<Pattern<T>>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut steps: Vec<Pattern<T>> = Vec::new();
        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Punct(',' | ']' | '>' | ')') => break,
                TokenKind::Literal(text) if text == "_" => {
                    self.pos += 1;
                    let Some(last) = steps.pop() else {
                        return Err(self.error("'_' has no step to extend", token.offset));
                    };
                    let weight = last.weight() + Rational::ONE;
                    steps.push(last.with_weight(weight));
                }
                TokenKind::Punct('!') => {
                    self.pos += 1;
                    let Some(last) = steps.last().cloned() else {
                        return Err(self.error("'!' has no step to repeat", token.offset));
                    };
                    steps.push(last);
                }
                _ => {
                    let step = self.step(atoms)?;
                    steps.extend(std::iter::repeat(step.pat).take(step.repeats));
                }
            }
        }
        Ok(steps)
    }

    /// One modified step, or a random choice between several (`a | b`).
    fn step<T>(&mut self, atoms: &dyn AtomFactory<T>) -> Result<Step<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let first = self.modified(atoms)?;
        if !self.peek_punct('|') {
            return Ok(first);
        }
        let mut choices = vec![first];
        while self.peek_punct('|') {
            self.pos += 1;
            choices.push(self.modified(atoms)?);
        }
        let alternatives = choices
            .into_iter()
            .map(|step| match step.repeats {
                1 => step.pat,
                n => sequence(vec![step.pat; n]),
            })
            .collect();
        let salt = self.next_salt();
        Ok(Step {
            pat: choose_cycle(alternatives, salt),
            repeats: 1,
        })
    }

    /// A primary followed by its postfix modifiers, applied in order.
    fn modified<T>(&mut self, atoms: &dyn AtomFactory<T>) -> Result<Step<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut pat = self.primary(atoms)?;
        let mut repeats = 1;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Punct('*') => {
                    self.pos += 1;
                    let factor = self.primary(&NumberAtoms)?;
                    pat = pat.fast_by(factor);
                }
                TokenKind::Punct('/') => {
                    self.pos += 1;
                    let factor = self.primary(&NumberAtoms)?;
                    pat = pat.slow_by(factor);
                }
                TokenKind::Punct('!') if !token.spaced => {
                    self.pos += 1;
                    repeats = match self.attached_literal() {
                        Some(count) => self.count(count)?,
                        None => repeats + 1,
                    };
                }
                TokenKind::Punct('?') => {
                    self.pos += 1;
                    let prob = match self.attached_literal() {
                        Some(literal) => self.probability(literal)?,
                        None => 0.5,
                    };
                    let salt = self.next_salt();
                    pat = pat.degrade_by(prob, salt);
                }
                TokenKind::Punct('@') => {
                    self.pos += 1;
                    let weight = match self.next() {
                        Some(literal @ Token { kind: TokenKind::Literal(text), .. }) => {
                            Rational::parse(text).ok_or_else(|| {
                                self.error(format!("invalid weight '{}'", text), literal.offset)
                            })?
                        }
                        _ => return Err(self.error("expected a weight after '@'", token.offset)),
                    };
                    pat = pat.with_weight(weight);
                }
                TokenKind::Punct('(') => {
                    self.pos += 1;
                    pat = self.euclid(pat, token.offset)?;
                }
                _ => break,
            }
        }
        Ok(Step { pat, repeats })
    }

    fn count(&self, token: &Token) -> Result<usize, ParseError> {
        match &token.kind {
            TokenKind::Literal(text) => match text.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(self.error(format!("invalid repeat count '{}'", text), token.offset)),
            },
            TokenKind::Punct(c) => Err(self.error(format!("unexpected '{}'", c), token.offset)),
        }
    }

    fn probability(&self, token: &Token) -> Result<f64, ParseError> {
        match &token.kind {
            TokenKind::Literal(text) => match text.parse::<f64>() {
                Ok(p) if (0.0..=1.0).contains(&p) => Ok(p),
                _ => Err(self.error(format!("invalid probability '{}'", text), token.offset)),
            },
            TokenKind::Punct(c) => Err(self.error(format!("unexpected '{}'", c), token.offset)),
        }
    }

    /// One euclid argument: a plain number, or a numeric sequence.
    fn euclid_arg(&mut self) -> Result<EuclidArg, ParseError> {
        if let (Some(Token { kind: TokenKind::Literal(text), .. }), Some(after)) =
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
        {
            if after.is_punct(',') || after.is_punct(')') {
                if let Some(n) = Rational::parse(text) {
                    self.pos += 1;
                    return Ok(EuclidArg::Literal(n.cycle()));
                }
            }
        }
        let arg = sequence(self.sequence(&NumberAtoms)?).fmap(|r| r.cycle());
        Ok(EuclidArg::Pattern(arg))
    }

    /// `(pulses, steps[, rotation])`. Plain numbers fix the mask at parse
    /// time; any sequence argument makes the whole rhythm patterned.
    fn euclid<T>(&mut self, pat: Pattern<T>, open: usize) -> Result<Pattern<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut args = vec![self.euclid_arg()?];
        while self.peek_punct(',') {
            self.pos += 1;
            args.push(self.euclid_arg()?);
        }
        self.expect(')')?;
        match args.as_slice() {
            [EuclidArg::Literal(p), EuclidArg::Literal(s)] => return Ok(pat.euclid(*p, *s)),
            [EuclidArg::Literal(p), EuclidArg::Literal(s), EuclidArg::Literal(r)] => {
                return Ok(pat.euclid_rot(*p, *s, *r))
            }
            [_, _] | [_, _, _] => {}
            _ => {
                return Err(self.error(
                    format!("euclid takes 2 or 3 arguments, got {}", args.len()),
                    open,
                ))
            }
        }
        let mut args = args.into_iter().map(EuclidArg::into_pattern);
        let (Some(pulses), Some(steps)) = (args.next(), args.next()) else {
            return Err(self.error("euclid needs pulses and steps", open));
        };
        let rotation = args.next().unwrap_or_else(|| crate::pattern::pure(0));
        Ok(pat.euclid_by(pulses, steps, rotation))
    }

    /// An atom, a rest, a group or an alternation.
    fn primary<T>(&mut self, atoms: &dyn AtomFactory<T>) -> Result<Pattern<T>, ParseError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let Some(token) = self.next() else {
            return Err(self.error("unexpected end of input", self.end));
        };
        match &token.kind {
            TokenKind::Literal(text) if text == "_" => {
                Err(self.error("'_' must follow a step", token.offset))
            }
            TokenKind::Literal(text) => {
                let location = self.location(token);
                let atom = Atom::parse(text, location);
                let pat = atoms
                    .build(&atom)
                    .map_err(|message| self.error(message, token.offset))?;
                Ok(pat.with_location(location))
            }
            TokenKind::Punct('~') => Ok(silence()),
            TokenKind::Punct('[') => self.expression(atoms, Some(']')),
            TokenKind::Punct('<') => self.alternation(atoms),
            TokenKind::Punct(c) => Err(self.error(format!("unexpected '{}'", c), token.offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::timespan::TimeSpan;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn values(text: &str) -> Pattern<Value> {
        parse_mini_notation(text, &ValueAtoms).unwrap()
    }

    fn names(pat: &Pattern<Value>) -> Vec<String> {
        pat.first_cycle_values().iter().map(|v| v.to_string()).collect()
    }

    fn cycle(pat: &Pattern<Value>, n: i64) -> Vec<String> {
        pat.query_arc(
            Rational::from_integer(n),
            Rational::from_integer(n + 1),
            &QueryContext::empty(),
        )
        .iter()
        .map(|e| e.value.to_string())
        .collect()
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("bd*2 [sn:3]");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Literal("bd".into()),
                TokenKind::Punct('*'),
                TokenKind::Literal("2".into()),
                TokenKind::Punct('['),
                TokenKind::Literal("sn:3".into()),
                TokenKind::Punct(']'),
            ]
        );
        assert_eq!(tokens[3].offset, 5);
        assert!(tokens[3].spaced);
        assert!(!tokens[4].spaced);
        assert_eq!(tokens[4].len, 4);
    }

    #[test]
    fn test_atom_suffix() {
        let loc = Location::new(0, 8);
        let atom = Atom::parse("bd:3:0.5", loc);
        assert_eq!(atom.name, "bd");
        assert_eq!(atom.index, Some(3));
        assert_eq!(atom.gain, Some(0.5));

        let chord = Atom::parse("c:maj", loc);
        assert_eq!(chord.name, "c:maj");
        assert!(!chord.has_suffix());
    }

    #[test]
    fn test_two_steps() {
        let pat = values("bd sn");
        let events = pat.first_cycle();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].whole, Some(TimeSpan::new(r(0, 1), r(1, 2))));
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(1, 2), r(1, 1))));
        assert!(events.iter().all(|e| e.is_onset()));
    }

    #[test]
    fn test_groups_and_rests() {
        let pat = values("bd [hh hh] ~ sn");
        let events = pat.first_cycle();
        assert_eq!(names(&pat), vec!["bd", "hh", "hh", "sn"]);
        assert_eq!(events[2].part.begin, r(3, 8));
        assert_eq!(events[3].part.begin, r(3, 4));
    }

    #[test]
    fn test_euclid_steps() {
        let pat = values("bd(3,8)");
        let onsets: Vec<Rational> = pat.first_cycle().iter().filter_map(|e| e.onset()).collect();
        assert_eq!(onsets, vec![r(0, 8), r(3, 8), r(6, 8)]);

        let rotated = values("bd(3,8,2)");
        let onsets: Vec<Rational> = rotated.first_cycle().iter().filter_map(|e| e.onset()).collect();
        assert_eq!(onsets, vec![r(1, 8), r(4, 8), r(6, 8)]);
    }

    #[test]
    fn test_literal_euclid_matches_patterned() {
        let literal = values("bd(3,8,2)");
        assert_eq!(literal.steps(), Some(r(8, 1)));
        let patterned = values("bd([3],[8],[2])");
        for c in 0..3 {
            let query = |pat: &Pattern<Value>| -> Vec<Option<TimeSpan>> {
                pat.query_arc(r(c, 1), r(c + 1, 1), &QueryContext::empty())
                    .into_iter()
                    .map(|e| e.whole)
                    .collect()
            };
            assert_eq!(query(&literal), query(&patterned));
        }
        assert_eq!(values("bd(<3 5>,8)").first_cycle().len(), 3);
    }

    #[test]
    fn test_alternation() {
        let pat = values("<a b>");
        assert_eq!(cycle(&pat, 0), vec!["a"]);
        assert_eq!(cycle(&pat, 1), vec!["b"]);
        assert_eq!(cycle(&pat, 2), vec!["a"]);

        let stacked = values("<a b, c>");
        assert_eq!(cycle(&stacked, 1).len(), 2);
    }

    #[test]
    fn test_stack() {
        let pat = values("a b, c");
        assert_eq!(pat.first_cycle().len(), 3);
    }

    #[test]
    fn test_fast_and_slow() {
        assert_eq!(values("a*2 b").first_cycle().len(), 3);
        let slow = values("a/2");
        assert_eq!(slow.first_cycle().len(), 1);
        assert!(slow.first_cycle()[0].is_onset());
        assert!(!cycle(&slow, 1).is_empty());
        let events = slow.query_arc(r(1, 1), r(2, 1), &QueryContext::empty());
        assert!(!events[0].is_onset());
    }

    #[test]
    fn test_patterned_factor() {
        let pat = values("a*<2 3>");
        assert_eq!(cycle(&pat, 0).len(), 2);
        assert_eq!(cycle(&pat, 1).len(), 3);
        assert_eq!(values("a*[1 2]").first_cycle().len(), 2);
    }

    #[test]
    fn test_elongate_and_weight() {
        let a = values("a _ b");
        let b = values("a@2 b");
        let spans = |p: &Pattern<Value>| -> Vec<TimeSpan> {
            p.first_cycle().iter().map(|e| e.part).collect()
        };
        assert_eq!(spans(&a), spans(&b));
        assert_eq!(spans(&a)[1], TimeSpan::new(r(2, 3), r(1, 1)));
    }

    #[test]
    fn test_repeat() {
        assert_eq!(names(&values("a!3 b")), vec!["a", "a", "a", "b"]);
        assert_eq!(names(&values("a ! b")), vec!["a", "a", "b"]);
        assert_eq!(names(&values("a! b")), vec!["a", "a", "b"]);
    }

    #[test]
    fn test_degrade() {
        let all = values("a*16");
        let some = values("a*16?");
        let n = some.first_cycle().len();
        assert!(n < all.first_cycle().len());
        assert_eq!(values("a*16?0").first_cycle().len(), 16);
        assert!(values("a*16?1").first_cycle().is_empty());
        // Same text, same result.
        assert_eq!(values("a*16?").first_cycle().len(), n);
    }

    #[test]
    fn test_choice() {
        let pat = values("a | b");
        let ctx = QueryContext::empty();
        let mut seen = Vec::new();
        for c in 0..32 {
            let events = pat.query_arc(Rational::from_integer(c), Rational::from_integer(c + 1), &ctx);
            assert_eq!(events.len(), 1);
            seen.push(events[0].value.to_string());
        }
        assert!(seen.iter().any(|v| v == "a"));
        assert!(seen.iter().any(|v| v == "b"));
    }

    #[test]
    fn test_value_atoms() {
        let vals = values("1 0.5 true bd:2").first_cycle_values();
        assert_eq!(vals[0], Value::Number(1.0));
        assert_eq!(vals[1], Value::Number(0.5));
        assert_eq!(vals[2], Value::Bool(true));
        assert_eq!(vals[3].get("s"), Some(&Value::from("bd")));
        assert_eq!(vals[3].get("n"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_number_atoms() {
        let pat = parse_mini_notation("0.25 3", &NumberAtoms).unwrap();
        assert_eq!(pat.first_cycle_values(), vec![r(1, 4), r(3, 1)]);

        let err = parse_mini_notation("1 x", &NumberAtoms).unwrap_err();
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_control_atoms() {
        let pat = parse_mini_notation("bd sn:1", &ControlAtoms::new("s")).unwrap();
        let vals = pat.first_cycle_values();
        assert_eq!(vals[0].get("s"), Some(&Value::from("bd")));
        assert_eq!(vals[1].get("n"), Some(&Value::Number(1.0)));

        let pat = parse_mini_notation("c e", &ControlAtoms::new("note")).unwrap();
        assert_eq!(pat.first_cycle_values()[1].get("note"), Some(&Value::from("e")));
    }

    #[test]
    fn test_closure_factory() {
        let upper = |atom: &Atom| -> Result<Pattern<String>, String> {
            Ok(crate::pattern::pure(atom.text.to_uppercase()))
        };
        let pat = parse_mini_notation("a b", &upper).unwrap();
        assert_eq!(pat.first_cycle_values(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_event_locations() {
        let events = values("bd  sn").first_cycle();
        assert_eq!(events[1].locations, vec![Location::new(4, 6)]);

        let origin = Location::new(10, 16);
        let pat = parse_mini_notation_at("bd  sn", &ValueAtoms, Some(origin)).unwrap();
        assert_eq!(pat.first_cycle()[1].locations, vec![Location::new(14, 16)]);
    }

    #[test]
    fn test_empty_is_silent() {
        assert!(values("").first_cycle().is_empty());
        assert!(values("[ ]").first_cycle().is_empty());
    }

    #[test]
    fn test_errors() {
        let err = parse_mini_notation("bd [sn", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 6);

        let err = parse_mini_notation("bd ]", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 3);

        let err = parse_mini_notation("<a b]", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 4);

        let err = parse_mini_notation("bd(3)", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse_mini_notation("_ a", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 0);

        let err = parse_mini_notation("a@", &ValueAtoms).unwrap_err();
        assert_eq!(err.offset, 1);

        let origin = Location::new(20, 30);
        let err = parse_mini_notation_at("a *", &ValueAtoms, Some(origin)).unwrap_err();
        assert_eq!(err.location, Some(origin));
        assert_eq!(err.absolute_offset(), 23);
    }
}
