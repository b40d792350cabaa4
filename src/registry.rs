//! Name to combinator lookup.
//!
//! Every feature module registers its combinators into a
//! [`RegistryBuilder`]; [`Registry::standard`] runs them all once. The
//! process-wide instance behind [`registry`] is built lazily on first use
//! and is read-only afterwards, so lookups from any thread need no locking.

use crate::error::EvalError;
use crate::mini::{parse_mini_notation, NumberAtoms, ValueAtoms};
use crate::pattern::{pure, sequence, Pattern};
use crate::rational::Rational;
use crate::value::Value;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A registered combinator. Arguments arrive already evaluated.
pub type Combinator = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::standard);

/// The process-wide registry, built on first call.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collects combinators before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, Combinator>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a combinator. The first registration of a name wins.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        if self.entries.contains_key(name) {
            warn!(name, "combinator registered twice, keeping the first");
            return;
        }
        self.entries.insert(name.to_string(), Arc::new(f));
    }

    /// Make `alias` call the same combinator as `target`.
    pub fn alias(&mut self, alias: &str, target: &str) {
        match self.entries.get(target).cloned() {
            Some(f) if !self.entries.contains_key(alias) => {
                self.entries.insert(alias.to_string(), f);
            }
            Some(_) => warn!(alias, target, "alias already registered, keeping the first"),
            None => warn!(alias, target, "alias for an unknown combinator"),
        }
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// A frozen name to combinator table.
pub struct Registry {
    entries: HashMap<String, Combinator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.entries.len())
            .finish()
    }
}

impl Registry {
    /// Build a registry holding every combinator the crate provides.
    ///
    /// Each call builds a fresh table; [`registry`] keeps the shared one.
    pub fn standard() -> Registry {
        let mut builder = RegistryBuilder::new();
        crate::pattern::register(&mut builder);
        crate::value::register(&mut builder);
        crate::euclid::register(&mut builder);
        crate::random::register(&mut builder);
        crate::signal::register(&mut builder);
        crate::control::register(&mut builder);
        crate::pick::register(&mut builder);
        let registry = builder.build();
        debug!(functions = registry.len(), "built combinator registry");
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Combinator> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Call the combinator `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let f = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        f(args)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================
// Argument helpers
// ============================================

pub fn expect_args(name: &str, args: &[Value], n: usize) -> Result<(), EvalError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected: n.to_string(),
            got: args.len(),
        })
    }
}

pub fn expect_args_between(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected: format!("{} to {}", min, max),
            got: args.len(),
        })
    }
}

/// Coerce an argument to a pattern.
///
/// Strings are read as mini-notation, sequences become a sequence pattern,
/// and any other value repeats once per cycle.
pub fn arg_pattern(name: &str, value: &Value) -> Result<Pattern<Value>, EvalError> {
    match value {
        Value::Pattern(pat) => Ok(pat.clone()),
        Value::Str(text) => Ok(parse_mini_notation(text, &ValueAtoms)?),
        Value::Seq(items) => Ok(sequence(arg_patterns(name, items)?)),
        other => Ok(pure(other.clone())),
    }
}

pub fn arg_patterns(name: &str, values: &[Value]) -> Result<Vec<Pattern<Value>>, EvalError> {
    values.iter().map(|v| arg_pattern(name, v)).collect()
}

pub fn arg_f64(name: &str, value: &Value) -> Result<f64, EvalError> {
    value
        .as_number()
        .ok_or_else(|| type_mismatch(name, "a number", value))
}

pub fn arg_i64(name: &str, value: &Value) -> Result<i64, EvalError> {
    match value.as_number() {
        Some(n) if n.is_finite() => Ok(n.floor() as i64),
        _ => Err(type_mismatch(name, "an integer", value)),
    }
}

pub fn arg_rational(name: &str, value: &Value) -> Result<Rational, EvalError> {
    value
        .as_rational()
        .ok_or_else(|| type_mismatch(name, "a number", value))
}

/// Coerce an argument to a numeric pattern, for patterned factors.
///
/// Non-numeric events of a pattern argument are dropped.
pub fn arg_rational_pattern(name: &str, value: &Value) -> Result<Pattern<Rational>, EvalError> {
    match value {
        Value::Number(_) => Ok(pure(arg_rational(name, value)?)),
        Value::Str(text) => Ok(parse_mini_notation(text, &NumberAtoms)?),
        Value::Pattern(pat) => Ok(pat.clone().filter_map_values(|v| v.as_rational())),
        Value::Seq(items) => Ok(sequence(
            items
                .iter()
                .map(|item| arg_rational_pattern(name, item))
                .collect::<Result<_, _>>()?,
        )),
        other => Err(type_mismatch(name, "a number or numeric pattern", other)),
    }
}

pub fn arg_i64_pattern(name: &str, value: &Value) -> Result<Pattern<i64>, EvalError> {
    Ok(arg_rational_pattern(name, value)?.fmap(|r| r.cycle()))
}

fn type_mismatch(name: &str, expected: &str, got: &Value) -> EvalError {
    EvalError::type_error(name, format!("expected {}, got {}", expected, got.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pattern(value: Value) -> Pattern<Value> {
        match value {
            Value::Pattern(pat) => pat,
            other => panic!("expected a pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_standard_has_core_names() {
        let reg = Registry::standard();
        for name in ["seq", "stack", "fast", "euclid", "pick", "sine", "gain", "s", "+", "degrade"] {
            assert!(reg.contains(name), "missing {}", name);
        }
        assert!(!reg.is_empty());
        let names = reg.names();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_aliases_share_combinator() {
        let reg = Registry::standard();
        let seq = reg.get("seq").unwrap();
        let fastcat = reg.get("fastcat").unwrap();
        assert!(Arc::ptr_eq(seq, fastcat));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut builder = RegistryBuilder::new();
        builder.register("f", |_| Ok(Value::Number(1.0)));
        builder.register("f", |_| Ok(Value::Number(2.0)));
        builder.alias("g", "missing");
        let reg = builder.build();
        assert_eq!(reg.call("f", &[]).unwrap(), Value::Number(1.0));
        assert!(!reg.contains("g"));
    }

    #[test]
    fn test_call() {
        let reg = Registry::standard();
        let out = reg
            .call("fast", &[Value::Number(2.0), Value::from("a b")])
            .unwrap();
        assert_eq!(pattern(out).first_cycle().len(), 4);
    }

    #[test]
    fn test_call_errors() {
        let reg = Registry::standard();
        assert_eq!(
            reg.call("nope", &[]).unwrap_err(),
            EvalError::UnknownFunction("nope".into())
        );
        assert!(matches!(
            reg.call("fast", &[Value::Number(2.0)]),
            Err(EvalError::Arity { got: 1, .. })
        ));
        assert!(matches!(
            reg.call("fast", &[Value::Bool(true), Value::from("a")]),
            Err(EvalError::Type { .. })
        ));
        assert!(matches!(
            reg.call("rev", &[Value::from("a [b")]),
            Err(EvalError::Parse(_))
        ));
    }

    #[test]
    fn test_arg_pattern_coercions() {
        let seq = arg_pattern("t", &Value::Seq(vec![Value::from("a"), Value::Number(1.0)])).unwrap();
        assert_eq!(seq.first_cycle().len(), 2);
        let plain = arg_pattern("t", &Value::Bool(true)).unwrap();
        assert_eq!(plain.first_cycle_values(), vec![Value::Bool(true)]);

        let factors = arg_rational_pattern("t", &Value::from("1 0.5")).unwrap();
        assert_eq!(
            factors.first_cycle_values(),
            vec![Rational::ONE, Rational::new(1, 2)]
        );
        let ints = arg_i64_pattern("t", &Value::Number(2.7)).unwrap();
        assert_eq!(ints.first_cycle_values(), vec![2]);
    }

    #[test]
    fn test_global_registry_is_shared() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| registry() as *const Registry as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
        assert!(std::ptr::eq(registry(), registry()));
    }
}
