//! Deterministic randomness.
//!
//! There is no shared generator. Every draw builds a fresh PRNG from the
//! context seed, a key (the cycle number or an exact time) and a salt that
//! tells independent random choices apart, so a query always gives the
//! same answer no matter how often or from which thread it runs.

use crate::context::SEED;
use crate::pattern::{silence, Pattern};
use crate::rational::Rational;
use crate::registry::{arg_f64, arg_i64, arg_pattern, arg_patterns, expect_args, RegistryBuilder};
use crate::value::Value;

/// A short-lived PRNG derived from `(seed, key, salt)`.
#[derive(Debug)]
pub struct SeededRng(oorandom::Rand64);

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

impl SeededRng {
    pub fn new(seed: u64, key: u64, salt: u64) -> Self {
        let hi = splitmix64(seed ^ splitmix64(salt));
        let lo = splitmix64(key ^ hi);
        SeededRng(oorandom::Rand64::new(((hi as u128) << 64) | lo as u128))
    }

    /// Generator for one cycle.
    pub fn for_cycle(seed: u64, cycle: i64, salt: u64) -> Self {
        SeededRng::new(seed, cycle as u64, salt)
    }

    /// Generator for one exact instant.
    pub fn for_time(seed: u64, t: Rational, salt: u64) -> Self {
        let key = splitmix64(t.numer() as u64) ^ (t.denom() as u64).rotate_left(32);
        SeededRng::new(seed, key, salt)
    }

    /// A float in `[0, 1)`.
    pub fn rand_float(&mut self) -> f64 {
        self.0.rand_float()
    }

    /// An integer in `[0, n)`. `n` must be non-zero.
    pub fn rand_below(&mut self, n: u64) -> u64 {
        self.0.rand_range(0..n)
    }
}

/// Pick one alternative per cycle at random (the `a | b` notation).
pub fn choose_cycle<T: Clone + Send + Sync + 'static>(
    alternatives: Vec<Pattern<T>>,
    salt: u64,
) -> Pattern<T> {
    if alternatives.is_empty() {
        return silence();
    }
    let count = alternatives.len() as u64;
    Pattern::new(move |state| {
        let cycle = state.span.begin.cycle();
        let pick = SeededRng::for_cycle(state.ctx.seed(), cycle, salt).rand_below(count);
        alternatives[pick as usize].query(state)
    })
    .split_queries()
}

/// Alias for [`choose_cycle`] with no salt.
pub fn randcat<T: Clone + Send + Sync + 'static>(alternatives: Vec<Pattern<T>>) -> Pattern<T> {
    choose_cycle(alternatives, 0)
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Drop each event with probability `prob`, keyed on its onset time.
    pub fn degrade_by(self, prob: f64, salt: u64) -> Self {
        self.with_events(move |events, state| {
            let seed = state.ctx.seed();
            events
                .into_iter()
                .filter(|event| {
                    let onset = event.whole_or_part().begin;
                    SeededRng::for_time(seed, onset, salt).rand_float() >= prob
                })
                .collect()
        })
    }

    /// Drop half of the events.
    pub fn degrade(self) -> Self {
        self.degrade_by(0.5, 0)
    }

    /// Query with a different base seed.
    pub fn with_seed(self, seed: i64) -> Self {
        self.with_context(move |ctx| ctx.with(SEED, seed))
    }
}

pub(crate) fn register(reg: &mut RegistryBuilder) {
    reg.register("randcat", |args| Ok(Value::Pattern(randcat(arg_patterns("randcat", args)?))));
    reg.register("degrade-by", |args| {
        expect_args("degrade-by", args, 2)?;
        let prob = arg_f64("degrade-by", &args[0])?;
        Ok(Value::Pattern(arg_pattern("degrade-by", &args[1])?.degrade_by(prob, 0)))
    });
    reg.register("degrade", |args| {
        expect_args("degrade", args, 1)?;
        Ok(Value::Pattern(arg_pattern("degrade", &args[0])?.degrade()))
    });
    reg.register("seed", |args| {
        expect_args("seed", args, 2)?;
        let seed = arg_i64("seed", &args[0])?;
        Ok(Value::Pattern(arg_pattern("seed", &args[1])?.with_seed(seed)))
    });
}
