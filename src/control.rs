//! Control sampling (outer join) and cycle-bounded shifts.
//!
//! The source pattern owns the structure. A control pattern is only sampled
//! at each source onset, so applying controls never adds or removes events.

use crate::event::Event;
use crate::pattern::Pattern;
use crate::rational::Rational;
use crate::registry::{arg_pattern, arg_rational_pattern, expect_args, expect_args_between, RegistryBuilder};
use crate::timespan::TimeSpan;
use crate::value::Value;
use crate::voice::CONTROL_NAMES;
use std::collections::BTreeMap;

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Sample `control` at each event's onset and fold it into the value.
    ///
    /// The probe is a zero-width span at the onset. Events with no control
    /// value there, or for which `combine` gives nothing, pass through
    /// unchanged.
    pub fn sample_control<U, F>(self, control: Pattern<U>, combine: F) -> Self
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T, &U) -> Option<T> + Send + Sync + 'static,
    {
        self.with_events(move |events, state| {
            events
                .into_iter()
                .map(|event| {
                    let probe = state.set_span(TimeSpan::point(event.whole_or_part().begin));
                    let sampled = control.query(&probe).into_iter().next().and_then(|c| {
                        combine(&event.value, &c.value).map(|value| (value, c.locations))
                    });
                    match sampled {
                        Some((value, control_locations)) => {
                            let mut locations = event.locations;
                            locations.extend(control_locations);
                            Event::with_locations(event.whole, event.part, value, locations)
                        }
                        None => event,
                    }
                })
                .collect()
        })
    }

    /// Shift events later by a sampled amount without leaving their cycle.
    ///
    /// Each cycle is handled on its own: portions pushed past the cycle end
    /// are dropped rather than wrapped, and nothing is pulled in from a
    /// neighbouring cycle.
    pub fn late_in_cycle(self, amount: Pattern<Rational>) -> Self {
        let (weight, steps) = (self.weight(), self.steps());
        let source = self;
        Pattern::new(move |state| {
            let mut events = Vec::new();
            for span in state.span.split_by_cycle() {
                let cycle = span.begin.sam();
                let cycle_end = cycle + Rational::ONE;
                let whole_cycle = state.set_span(TimeSpan::new(cycle, cycle_end));
                for event in source.query(&whole_cycle) {
                    let onset = event.whole_or_part().begin;
                    let shift = amount
                        .query(&state.set_span(TimeSpan::point(onset)))
                        .first()
                        .map(|e| e.value)
                        .unwrap_or(Rational::ZERO);
                    let Some(part) = event
                        .part
                        .shift(shift)
                        .clip_to(cycle, cycle_end)
                        .and_then(|p| p.intersection(&span))
                    else {
                        continue;
                    };
                    if part.is_zero_width() && !span.is_zero_width() {
                        continue;
                    }
                    let whole = event.whole.map(|w| {
                        let begin = w.begin + shift;
                        TimeSpan::new(begin, (w.end + shift).min(cycle_end).max(begin))
                    });
                    events.push(Event::with_locations(whole, part, event.value, event.locations));
                }
            }
            events.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
            events
        })
        .with_weight(weight)
        .with_steps(steps)
    }

    /// Shift events earlier by a sampled amount without leaving their cycle.
    pub fn early_in_cycle(self, amount: Pattern<Rational>) -> Self {
        self.late_in_cycle(amount.fmap(|d| -d))
    }
}

/// View a value as control fields.
///
/// Maps are kept, strings become a sound and numbers a note, anything else
/// lands in a `value` field.
pub fn as_controls(value: &Value) -> BTreeMap<String, Value> {
    match value {
        Value::Map(fields) => fields.clone(),
        Value::Str(_) => single("s", value.clone()),
        Value::Number(_) => single("note", value.clone()),
        other => single("value", other.clone()),
    }
}

fn single(name: &str, value: Value) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    fields.insert(name.to_string(), value);
    fields
}

/// Wrap a value as the control `name`.
///
/// An `s`-keyed map (from a `name:index` atom) has its sound renamed to
/// `name`; its other fields are kept.
pub fn as_control(name: &str, value: Value) -> Value {
    match value {
        Value::Map(mut fields) if name != "s" && name != "sound" => {
            if let Some(base) = fields.remove("s") {
                fields.insert(name.to_string(), base);
            }
            Value::Map(fields)
        }
        Value::Map(fields) => Value::Map(fields),
        other => Value::field(name, other),
    }
}

impl Pattern<Value> {
    /// Set control `name` from a control pattern, sampled at each onset.
    pub fn set_field(self, name: &str, control: Pattern<Value>) -> Pattern<Value> {
        let name = name.to_string();
        self.sample_control(control, move |source, value| {
            let mut fields = as_controls(source);
            match as_control(&name, value.clone()) {
                Value::Map(set) => fields.extend(set),
                other => {
                    fields.insert(name.clone(), other);
                }
            }
            Some(Value::Map(fields))
        })
    }

    /// Merge every field of the sampled control map into each event.
    pub fn set_controls(self, controls: Pattern<Value>) -> Pattern<Value> {
        self.sample_control(controls, |source, value| {
            let mut fields = as_controls(source);
            fields.extend(as_controls(value));
            Some(Value::Map(fields))
        })
    }
}

pub(crate) fn register(reg: &mut RegistryBuilder) {
    // (gain "0.5 1") builds a control pattern; (gain "0.5 1" pat) sets it.
    for &(name, _) in CONTROL_NAMES {
        reg.register(name, move |args| {
            expect_args_between(name, args, 1, 2)?;
            let control = arg_pattern(name, &args[0])?.fmap(move |v| as_control(name, v));
            match args.get(1) {
                Some(source) => Ok(Value::Pattern(arg_pattern(name, source)?.set_controls(control))),
                None => Ok(Value::Pattern(control)),
            }
        });
    }
    reg.register("set", |args| {
        expect_args("set", args, 2)?;
        let controls = arg_pattern("set", &args[0])?;
        Ok(Value::Pattern(arg_pattern("set", &args[1])?.set_controls(controls)))
    });
    reg.register("late-in-cycle", |args| {
        expect_args("late-in-cycle", args, 2)?;
        let amount = arg_rational_pattern("late-in-cycle", &args[0])?;
        Ok(Value::Pattern(arg_pattern("late-in-cycle", &args[1])?.late_in_cycle(amount)))
    });
    reg.register("early-in-cycle", |args| {
        expect_args("early-in-cycle", args, 2)?;
        let amount = arg_rational_pattern("early-in-cycle", &args[0])?;
        Ok(Value::Pattern(arg_pattern("early-in-cycle", &args[1])?.early_in_cycle(amount)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::pattern::{pure, sequence};
    use crate::signal::saw;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_sample_control_keeps_cardinality() {
        let source = sequence(vec![pure(1.0), pure(2.0), pure(3.0)]);
        let control = sequence(vec![pure(10.0), pure(20.0)]);
        let pat = source.clone().sample_control(control, |a, b| Some(a + b));
        assert_eq!(pat.first_cycle().len(), source.first_cycle().len());
        // Onsets 0, 1/3 and 2/3 sample 10, 10 and 20.
        assert_eq!(pat.first_cycle_values(), vec![11.0, 12.0, 23.0]);
    }

    #[test]
    fn test_sample_control_passes_through() {
        let source = sequence(vec![pure(1), pure(2)]);
        let control = sequence(vec![pure(5), crate::pattern::silence()]);
        let pat = source.sample_control(control, |a, b| Some(a * b));
        assert_eq!(pat.first_cycle_values(), vec![5, 2]);

        let refused = pure(1).sample_control(pure(0), |_, _| None::<i32>);
        assert_eq!(refused.first_cycle_values(), vec![1]);
    }

    #[test]
    fn test_sample_continuous_control() {
        let source = sequence(vec![pure(0.0), pure(0.0)]);
        let pat = source.sample_control(saw(), |_, c| Some(*c));
        assert_eq!(pat.first_cycle_values(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_set_field() {
        let source = sequence(vec![pure(Value::from("bd")), pure(Value::from("sn"))]);
        let pat = source.set_field("gain", pure(Value::Number(0.5)));
        let values = pat.first_cycle_values();
        assert_eq!(values[1].get("s"), Some(&Value::from("sn")));
        assert_eq!(values[1].get("gain"), Some(&Value::Number(0.5)));
    }

    #[test]
    fn test_late_in_cycle_drops_overflow() {
        let pat = sequence(vec![pure("a"), pure("b")]).late_in_cycle(pure(r(1, 4)));
        let events = pat.first_cycle();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].part, TimeSpan::new(r(1, 4), r(3, 4)));
        // "b" is cut at the cycle end instead of spilling into the next one.
        assert_eq!(events[1].part, TimeSpan::new(r(3, 4), r(1, 1)));
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(3, 4), r(1, 1))));
    }

    #[test]
    fn test_late_in_cycle_pulls_nothing_in() {
        let pat = pure("a").late_in_cycle(pure(r(1, 2)));
        let events = pat.query_arc(r(1, 1), r(2, 1), &QueryContext::empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].part, TimeSpan::new(r(3, 2), r(2, 1)));
    }

    #[test]
    fn test_reversed_control_sampled_at_onsets() {
        let control = sequence(vec![pure(1), pure(2)]);
        let single = pure(0).sample_control(control.clone().rev(), |_, c| Some(*c));
        assert_eq!(single.first_cycle_values(), vec![2]);

        let pair = sequence(vec![pure(0), pure(0)]);
        let reversed = pair.clone().sample_control(control.clone().rev(), |_, c| Some(*c));
        assert_eq!(reversed.first_cycle_values(), vec![2, 1]);
        let negative = pair.sample_control(control.fast(Rational::MINUS_ONE), |_, c| Some(*c));
        assert_eq!(negative.first_cycle_values(), vec![2, 1]);
    }

    #[test]
    fn test_early_in_cycle() {
        let pat = sequence(vec![pure("a"), pure("b")]).early_in_cycle(pure(r(1, 4)));
        let events = pat.first_cycle();
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_onset());
        assert_eq!(events[0].part, TimeSpan::new(r(0, 1), r(1, 4)));
        assert_eq!(events[1].part, TimeSpan::new(r(1, 4), r(3, 4)));
    }
}
