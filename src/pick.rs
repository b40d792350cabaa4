//! Pattern selection by index or key.
//!
//! A selector pattern chooses, per event, one pattern out of a lookup
//! table. Plain picks window the chosen pattern to the selector event;
//! squeezed picks fit a whole cycle of it into the selector event.

use crate::error::EvalError;
use crate::pattern::{pure, silence, Pattern};
use crate::registry::{arg_pattern, expect_args, RegistryBuilder};
use crate::value::Value;
use std::collections::HashMap;
use tracing::trace;

/// Patterns to choose from.
#[derive(Clone)]
pub enum Lookup<T> {
    /// Selected by numeric index.
    List(Vec<Pattern<T>>),
    /// Selected by the selector value's string form.
    Map(HashMap<String, Pattern<T>>),
}

impl<T: Clone + Send + Sync + 'static> Lookup<T> {
    /// A list lookup of constant values.
    pub fn values(values: Vec<T>) -> Self {
        Lookup::List(values.into_iter().map(pure).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Lookup::List(items) => items.is_empty(),
            Lookup::Map(entries) => entries.is_empty(),
        }
    }

    /// The pattern selected by `key`.
    ///
    /// List indices are floored, then clamped into range or wrapped when
    /// `wrap` is set. Map keys always match exactly; `wrap` does not apply.
    pub fn resolve(&self, key: &Value, wrap: bool) -> Option<Pattern<T>> {
        match self {
            Lookup::List(items) => {
                let len = items.len() as i64;
                if len == 0 {
                    return None;
                }
                let index = key.as_number()?.floor() as i64;
                let index = if wrap {
                    index.rem_euclid(len)
                } else {
                    index.clamp(0, len - 1)
                };
                items.get(index as usize).cloned()
            }
            Lookup::Map(entries) => entries.get(&key.to_string()).cloned(),
        }
    }
}

impl Pattern<Value> {
    fn select<T>(self, lookup: Lookup<T>, wrap: bool) -> Option<Pattern<Pattern<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        if lookup.is_empty() {
            trace!("pick from an empty lookup is silent");
            return None;
        }
        Some(self.filter_map_values(move |key| lookup.resolve(&key, wrap)))
    }

    /// Pick by index (clamped) or key, windowed to each selector event.
    pub fn pick<T: Clone + Send + Sync + 'static>(self, lookup: Lookup<T>) -> Pattern<T> {
        self.select(lookup, false)
            .map_or_else(silence, |selected| selected.inner_join())
    }

    /// Like [`Pattern::pick`], but indices wrap around the list.
    pub fn pickmod<T: Clone + Send + Sync + 'static>(self, lookup: Lookup<T>) -> Pattern<T> {
        self.select(lookup, true)
            .map_or_else(silence, |selected| selected.inner_join())
    }

    /// Pick and squeeze a whole cycle of the choice into each selector event.
    pub fn pick_squeeze<T: Clone + Send + Sync + 'static>(self, lookup: Lookup<T>) -> Pattern<T> {
        self.select(lookup, false)
            .map_or_else(silence, |selected| selected.squeeze_join())
    }

    /// Squeezed pick with wrapping indices.
    pub fn pickmod_squeeze<T: Clone + Send + Sync + 'static>(
        self,
        lookup: Lookup<T>,
    ) -> Pattern<T> {
        self.select(lookup, true)
            .map_or_else(silence, |selected| selected.squeeze_join())
    }

    /// Squeeze named patterns into the selector's events.
    pub fn inhabit<T: Clone + Send + Sync + 'static>(
        self,
        patterns: HashMap<String, Pattern<T>>,
    ) -> Pattern<T> {
        self.pick_squeeze(Lookup::Map(patterns))
    }
}

fn arg_lookup(name: &str, value: &Value) -> Result<Lookup<Value>, EvalError> {
    match value {
        Value::Seq(items) => Ok(Lookup::List(
            items
                .iter()
                .map(|item| arg_pattern(name, item))
                .collect::<Result<_, _>>()?,
        )),
        Value::Map(fields) => Ok(Lookup::Map(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), arg_pattern(name, v)?)))
                .collect::<Result<_, EvalError>>()?,
        )),
        other => Err(EvalError::type_error(
            name,
            format!("expected a list or map lookup, got {}", other.type_name()),
        )),
    }
}

type PickFn = fn(Pattern<Value>, Lookup<Value>) -> Pattern<Value>;

const PICKS: &[(&str, PickFn)] = &[
    ("pick", Pattern::<Value>::pick),
    ("pickmod", Pattern::<Value>::pickmod),
    ("squeeze", Pattern::<Value>::pick_squeeze),
    ("pickmod-squeeze", Pattern::<Value>::pickmod_squeeze),
    ("inhabit", Pattern::<Value>::pick_squeeze),
];

pub(crate) fn register(reg: &mut RegistryBuilder) {
    // (pick lookup selector)
    for &(name, pick) in PICKS {
        reg.register(name, move |args| {
            expect_args(name, args, 2)?;
            let lookup = arg_lookup(name, &args[0])?;
            let selector = arg_pattern(name, &args[1])?;
            Ok(Value::Pattern(pick(selector, lookup)))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::sequence;
    use crate::rational::Rational;

    fn selector(values: Vec<Value>) -> Pattern<Value> {
        sequence(values.into_iter().map(pure).collect())
    }

    fn letters() -> Lookup<&'static str> {
        Lookup::values(vec!["a", "b", "c"])
    }

    #[test]
    fn test_pick_clamps() {
        let sel = selector(vec![
            Value::Number(0.0),
            Value::Number(2.7),
            Value::Number(9.0),
            Value::Number(-1.0),
        ]);
        assert_eq!(sel.pick(letters()).first_cycle_values(), vec!["a", "c", "c", "a"]);
    }

    #[test]
    fn test_pickmod_wraps() {
        let sel = selector(vec![Value::Number(3.0), Value::Number(4.0), Value::Number(-1.0)]);
        assert_eq!(sel.pickmod(letters()).first_cycle_values(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pick_by_key() {
        let mut entries = HashMap::new();
        entries.insert("x".to_string(), pure(1));
        entries.insert("1".to_string(), pure(2));
        let sel = selector(vec![Value::from("x"), Value::Number(1.0), Value::from("zzz")]);
        // Unknown keys select nothing.
        let picked = sel.clone().pick(Lookup::Map(entries.clone()));
        assert_eq!(picked.first_cycle_values(), vec![1, 2]);
        // Wrapping does not change key lookups.
        assert_eq!(sel.pickmod(Lookup::Map(entries)).first_cycle_values(), vec![1, 2]);
    }

    #[test]
    fn test_empty_lookup_is_silent() {
        let sel = selector(vec![Value::Number(0.0)]);
        assert!(sel.pick(Lookup::<i32>::List(vec![])).first_cycle().is_empty());
    }

    #[test]
    fn test_pick_windows_inner() {
        let lookup = Lookup::List(vec![sequence(vec![pure(1), pure(2)])]);
        let sel = selector(vec![Value::Number(0.0), Value::Number(0.0)]);
        // Each half of the cycle sees the matching half of [1 2].
        assert_eq!(sel.pick(lookup).first_cycle_values(), vec![1, 2]);
    }

    #[test]
    fn test_squeeze_fits_cycle() {
        let lookup = Lookup::List(vec![sequence(vec![pure(1), pure(2)])]);
        let sel = selector(vec![Value::Number(0.0), Value::Number(0.0)]);
        let pat = sel.pick_squeeze(lookup);
        assert_eq!(pat.first_cycle_values(), vec![1, 2, 1, 2]);
        let onsets: Vec<Rational> = pat.first_cycle().iter().filter_map(|e| e.onset()).collect();
        assert_eq!(onsets[1], Rational::new(1, 4));
    }

    #[test]
    fn test_inhabit() {
        let mut entries = HashMap::new();
        entries.insert("ab".to_string(), sequence(vec![pure("a"), pure("b")]));
        entries.insert("c".to_string(), pure("c"));
        let sel = selector(vec![Value::from("ab"), Value::from("c")]);
        assert_eq!(sel.inhabit(entries).first_cycle_values(), vec!["a", "b", "c"]);
    }
}
