//! Continuous signals.
//!
//! A continuous pattern ignores the width of the query: it answers with a
//! single event covering the whole queried span, with no whole, whose value
//! is sampled once (at the span's midpoint for periodic signals).

use crate::event::Event;
use crate::pattern::Pattern;
use crate::random::SeededRng;
use crate::rational::Rational;
use crate::registry::{arg_i64, expect_args, RegistryBuilder};
use crate::state::State;
use crate::value::Value;
use std::f64::consts::TAU;

const RAND_SALT: u64 = 0x5241_4e44;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// A continuous pattern computed from the query state.
///
/// When `f` has nothing to say the query is empty.
pub fn continuous<T, F>(f: F) -> Pattern<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&State) -> Option<T> + Send + Sync + 'static,
{
    Pattern::new(move |state| match f(state) {
        Some(value) => vec![Event::new(None, state.span, value)],
        None => Vec::new(),
    })
}

/// A continuous pattern sampled at the midpoint of each query.
pub fn signal<T, F>(f: F) -> Pattern<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(Rational) -> T + Send + Sync + 'static,
{
    continuous(move |state| Some(f(state.span.midpoint())))
}

/// A continuous signal that goes from 0 to 1 over each cycle.
pub fn saw() -> Pattern<f64> {
    signal(|t| t.cycle_pos().to_f64())
}

/// Goes from 1 to 0 over each cycle.
pub fn isaw() -> Pattern<f64> {
    saw().fmap(|x| 1.0 - x)
}

/// A continuous sine wave signal (0 to 1).
pub fn sine() -> Pattern<f64> {
    saw().fmap(|x| (x * TAU).sin() * 0.5 + 0.5)
}

/// A continuous cosine wave signal (0 to 1).
pub fn cosine() -> Pattern<f64> {
    saw().fmap(|x| (x * TAU).cos() * 0.5 + 0.5)
}

/// A continuous triangle wave signal (0 to 1).
pub fn tri() -> Pattern<f64> {
    saw().fmap(|x| 1.0 - (2.0 * x - 1.0).abs())
}

/// A continuous square wave signal (0 or 1).
pub fn square() -> Pattern<f64> {
    saw().fmap(|x| if x < 0.5 { 0.0 } else { 1.0 })
}

/// Deterministic noise in `[0, 1)`, keyed on the sampled instant.
pub fn rand() -> Pattern<f64> {
    continuous(|state| {
        let t = state.span.midpoint();
        Some(SeededRng::for_time(state.ctx.seed(), t, RAND_SALT).rand_float())
    })
}

/// Deterministic integers in `[0, n)`.
pub fn irand(n: i64) -> Pattern<f64> {
    let n = n.max(0) as f64;
    rand().fmap(move |x| (x * n).floor())
}

/// The context's cycles per second.
pub fn cps() -> Pattern<f64> {
    continuous(|state| state.ctx.cps())
}

fn seconds_of_day(state: &State) -> Option<f64> {
    let clock = state.ctx.clock()?;
    Some(clock.now().rem_euclid(SECONDS_PER_DAY))
}

/// Fraction of the current (UTC) day that has elapsed, from the context clock.
pub fn time_of_day() -> Pattern<f64> {
    continuous(|state| seconds_of_day(state).map(|s| s / SECONDS_PER_DAY))
}

/// Hour of the day, 0 to 24.
pub fn hour_of_day() -> Pattern<f64> {
    continuous(|state| seconds_of_day(state).map(|s| s / 3600.0))
}

/// Minute within the hour, 0 to 60.
pub fn minute_of_hour() -> Pattern<f64> {
    continuous(|state| seconds_of_day(state).map(|s| (s / 60.0).rem_euclid(60.0)))
}

impl Pattern<f64> {
    /// Scale a signal from [0, 1] to [min, max].
    pub fn range(self, min: f64, max: f64) -> Pattern<f64> {
        self.fmap(move |x| x * (max - min) + min)
    }

    pub fn into_values(self) -> Pattern<Value> {
        self.fmap(Value::Number)
    }
}

const SIGNALS: &[(&str, fn() -> Pattern<f64>)] = &[
    ("saw", saw),
    ("isaw", isaw),
    ("sine", sine),
    ("cosine", cosine),
    ("tri", tri),
    ("square", square),
    ("rand", rand),
    ("cps", cps),
    ("time-of-day", time_of_day),
    ("hour-of-day", hour_of_day),
    ("minute-of-hour", minute_of_hour),
];

pub(crate) fn register(reg: &mut RegistryBuilder) {
    for &(name, make) in SIGNALS {
        reg.register(name, move |args| {
            expect_args(name, args, 0)?;
            Ok(Value::Pattern(make().into_values()))
        });
    }
    reg.register("irand", |args| {
        expect_args("irand", args, 1)?;
        Ok(Value::Pattern(irand(arg_i64("irand", &args[0])?).into_values()))
    });
}
