//! Pattern is the core abstraction for representing time-varying values.
//!
//! A `Pattern<T>` is a function from [`State`] (a queried span plus its
//! context) to `Vec<Event<T>>`. Patterns are immutable: every combinator
//! wraps its inputs in a new query closure and never changes them, so a
//! pattern can be queried from any number of threads at once.
//!
//! Besides the query, each pattern carries two pieces of metadata that only
//! its parents read: a `weight` (its share of a sequence, default 1) and an
//! optional `steps` count used to align polymeters.

use crate::context::QueryContext;
use crate::error::EvalError;
use crate::event::{Event, Location};
use crate::rational::{lcm, Rational};
use crate::registry::{
    arg_pattern, arg_patterns, arg_rational, arg_rational_pattern, expect_args, RegistryBuilder,
};
use crate::state::State;
use crate::timespan::TimeSpan;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// The query function type: takes a State and returns a list of events.
pub type QueryFn<T> = dyn Fn(&State) -> Vec<Event<T>> + Send + Sync;

/// A Pattern represents a function from time to events.
pub struct Pattern<T> {
    /// The query function that produces events for a given time span.
    query: Arc<QueryFn<T>>,
    /// Share of a parent sequence's cycle.
    weight: Rational,
    /// Number of steps per cycle (for structural operations).
    steps: Option<Rational>,
}

impl<T> Clone for Pattern<T> {
    fn clone(&self) -> Self {
        Pattern {
            query: Arc::clone(&self.query),
            weight: self.weight,
            steps: self.steps,
        }
    }
}

impl<T> fmt::Debug for Pattern<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("weight", &self.weight)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Create a new pattern from a query function.
    pub fn new<F>(query: F) -> Self
    where
        F: Fn(&State) -> Vec<Event<T>> + Send + Sync + 'static,
    {
        Pattern {
            query: Arc::new(query),
            weight: Rational::ONE,
            steps: None,
        }
    }

    /// Query the pattern for events in the given state.
    pub fn query(&self, state: &State) -> Vec<Event<T>> {
        (self.query)(state)
    }

    /// Query the pattern for events in `[begin, end)` under `ctx`.
    pub fn query_arc(&self, begin: Rational, end: Rational, ctx: &QueryContext) -> Vec<Event<T>> {
        let state = State::new(TimeSpan::new(begin, end), ctx.clone());
        self.query(&state)
    }

    /// Float-time convenience for callers that carry no context.
    ///
    /// Bounds with no exact rational form give no events.
    pub fn query_arc_f64(&self, begin: f64, end: f64) -> Vec<Event<T>> {
        match (Rational::from_f64(begin), Rational::from_f64(end)) {
            (Some(begin), Some(end)) => self.query_arc(begin, end, &QueryContext::empty()),
            _ => {
                trace!(begin, end, "float query outside rational range is silent");
                Vec::new()
            }
        }
    }

    /// Share of a parent sequence's cycle.
    pub fn weight(&self) -> Rational {
        self.weight
    }

    /// Get the steps value if set.
    pub fn steps(&self) -> Option<Rational> {
        self.steps
    }

    pub fn with_weight(mut self, weight: Rational) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_steps(mut self, steps: Option<Rational>) -> Self {
        self.steps = steps;
        self
    }

    // ============================================
    // Functor operations
    // ============================================

    /// Apply a function to the value of each event.
    pub fn fmap<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.with_event(move |event| event.with_value(&f))
    }

    /// Map values, dropping events for which `f` gives nothing.
    pub fn filter_map_values<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| {
                query(state)
                    .into_iter()
                    .filter_map(|event| {
                        let Event {
                            whole,
                            part,
                            value,
                            locations,
                        } = event;
                        f(value).map(|v| Event::with_locations(whole, part, v, locations))
                    })
                    .collect()
            }),
            weight: self.weight,
            steps: self.steps,
        }
    }

    /// Apply a function to the query state.
    pub fn with_state<F>(self, f: F) -> Self
    where
        F: Fn(&State) -> State + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(&f(state))),
            weight: self.weight,
            steps: self.steps,
        }
    }

    /// Extend the query context seen by this pattern.
    pub fn with_context<F>(self, f: F) -> Self
    where
        F: Fn(&QueryContext) -> QueryContext + Send + Sync + 'static,
    {
        self.with_state(move |state| state.set_context(f(&state.ctx)))
    }

    // ============================================
    // Query span transformations
    // ============================================

    /// Apply a function to the query timespan before querying.
    pub fn with_query_span<F>(self, f: F) -> Self
    where
        F: Fn(TimeSpan) -> TimeSpan + Send + Sync + 'static,
    {
        self.with_state(move |state| state.with_span(&f))
    }

    /// Apply a function to both begin and end of the query timespan.
    pub fn with_query_time<F>(self, f: F) -> Self
    where
        F: Fn(Rational) -> Rational + Send + Sync + 'static,
    {
        self.with_query_span(move |span| span.with_time(&f))
    }

    // ============================================
    // Event transformations
    // ============================================

    /// Rewrite the whole event list a query returns.
    pub fn with_events<F>(self, f: F) -> Self
    where
        F: Fn(Vec<Event<T>>, &State) -> Vec<Event<T>> + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| f(query(state), state)),
            weight: self.weight,
            steps: self.steps,
        }
    }

    /// Reinterpret each event, possibly as a different value type.
    pub fn with_event<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(Event<T>) -> Event<U> + Send + Sync + 'static,
    {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| query(state).into_iter().map(&f).collect()),
            weight: self.weight,
            steps: self.steps,
        }
    }

    /// Apply a function to the timespan of each event.
    pub fn with_event_span<F>(self, f: F) -> Self
    where
        F: Fn(TimeSpan) -> TimeSpan + Send + Sync + 'static,
    {
        self.with_event(move |event| event.with_span(&f))
    }

    /// Apply a function to both begin and end of event timespans.
    pub fn with_event_time<F>(self, f: F) -> Self
    where
        F: Fn(Rational) -> Rational + Send + Sync + 'static,
    {
        self.with_event_span(move |span| span.with_time(&f))
    }

    // ============================================
    // Filtering
    // ============================================

    /// Filter events based on a predicate.
    pub fn filter_events<F>(self, pred: F) -> Self
    where
        F: Fn(&Event<T>) -> bool + Send + Sync + 'static,
    {
        self.with_events(move |events, _| events.into_iter().filter(|e| pred(e)).collect())
    }

    /// Filter events based on their values.
    pub fn filter_values<F>(self, pred: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter_events(move |event| pred(&event.value))
    }

    /// Keep only events whose onset falls inside the query.
    pub fn onsets_only(self) -> Self {
        self.filter_events(|event| event.is_onset())
    }

    /// Keep only discrete events (those with a whole timespan).
    pub fn discrete_only(self) -> Self {
        self.filter_events(|event| event.whole.is_some())
    }

    /// Split queries at cycle boundaries.
    pub fn split_queries(self) -> Self {
        let query = self.query;
        Pattern {
            query: Arc::new(move |state| {
                state
                    .span
                    .split_by_cycle()
                    .flat_map(|span| query(&state.set_span(span)))
                    .collect()
            }),
            weight: self.weight,
            steps: self.steps,
        }
    }

    /// Add a source location to all events.
    pub fn with_location(self, location: Location) -> Self {
        self.with_event(move |mut event| {
            event.locations.push(location);
            event
        })
    }

    // ============================================
    // Utility methods
    // ============================================

    /// Query the first cycle with an empty context.
    pub fn first_cycle(&self) -> Vec<Event<T>> {
        self.query_arc(Rational::ZERO, Rational::ONE, &QueryContext::empty())
    }

    /// Get the values from the first cycle.
    pub fn first_cycle_values(&self) -> Vec<T> {
        self.first_cycle().into_iter().map(|e| e.value).collect()
    }
}

// ============================================
// Pattern constructors
// ============================================

/// Create a pattern that produces no events (silence).
pub fn silence<T: Clone + Send + Sync + 'static>() -> Pattern<T> {
    Pattern::new(|_| Vec::new())
}

/// Silence that still counts as `steps` steps.
pub fn gap<T: Clone + Send + Sync + 'static>(steps: Rational) -> Pattern<T> {
    silence().with_steps(Some(steps))
}

/// Create a pattern with a single value that repeats once per cycle.
pub fn pure<T: Clone + Send + Sync + 'static>(value: T) -> Pattern<T> {
    Pattern::new(move |state| {
        state
            .span
            .split_by_cycle()
            .map(|span| {
                let cycle = span.begin.sam();
                let whole = TimeSpan::new(cycle, cycle + Rational::ONE);
                Event::new(Some(whole), span, value.clone())
            })
            .collect()
    })
    .with_steps(Some(Rational::ONE))
}

/// Stack multiple patterns (play them simultaneously).
///
/// Events are stable-sorted by part begin, so children keep their relative
/// order at equal onsets.
pub fn stack<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    if patterns.is_empty() {
        return silence();
    }
    Pattern::new(move |state| {
        let mut events: Vec<Event<T>> = patterns.iter().flat_map(|p| p.query(state)).collect();
        events.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
        events
    })
}

/// Divide each cycle into steps proportional to the children's weights.
pub fn sequence<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    stepped(patterns, None)
}

/// Alias for [`sequence`].
pub fn seq<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    sequence(patterns)
}

/// Alias for [`sequence`].
pub fn fastcat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    sequence(patterns)
}

/// A sequence whose cycle is divided into `steps` units instead of the sum
/// of the children's weights.
///
/// Children past the end of the cycle are cut off; a total weight below
/// `steps` leaves trailing silence.
pub fn stepped<T: Clone + Send + Sync + 'static>(
    patterns: Vec<Pattern<T>>,
    steps: Option<Rational>,
) -> Pattern<T> {
    let total = patterns
        .iter()
        .fold(Rational::ZERO, |acc, p| acc + p.weight().max(Rational::ZERO));
    let divisor = steps.unwrap_or(total);
    if patterns.is_empty() || divisor <= Rational::ZERO {
        trace!(children = patterns.len(), "sequence with no width is silent");
        return silence();
    }

    // (offset within the cycle, width, child), computed once.
    let mut cursor = Rational::ZERO;
    let mut layout = Vec::with_capacity(patterns.len());
    for pat in patterns {
        let weight = pat.weight().max(Rational::ZERO);
        let offset = cursor / divisor;
        cursor = cursor + weight;
        if weight.is_zero() || offset >= Rational::ONE {
            continue;
        }
        layout.push((offset, weight / divisor, pat));
    }

    Pattern::new(move |state| {
        let mut events = Vec::new();
        for span in state.span.split_by_cycle() {
            let cycle = span.begin.sam();
            for (offset, width, pat) in &layout {
                let (offset, width) = (*offset, *width);
                let step_begin = cycle + offset;
                let step_end = (step_begin + width).min(cycle + Rational::ONE);
                let Some(overlap) = span.intersection(&TimeSpan::new(step_begin, step_end)) else {
                    continue;
                };
                let inner = overlap.with_time(|t| cycle + (t - step_begin) / width);
                events.extend(pat.query(&state.set_span(inner)).into_iter().map(|event| {
                    event.with_span(|s| s.with_time(|t| step_begin + (t - cycle) * width))
                }));
            }
        }
        events
    })
    .with_steps(Some(divisor))
}

/// A sequence built from explicit `(weight, pattern)` pairs.
pub fn timecat<T: Clone + Send + Sync + 'static>(pairs: Vec<(Rational, Pattern<T>)>) -> Pattern<T> {
    sequence(
        pairs
            .into_iter()
            .map(|(weight, pat)| pat.with_weight(weight))
            .collect(),
    )
}

/// One child per cycle, in order (the `<a b c>` notation).
///
/// Equivalent to the weighted sequence slowed by its total weight, so the
/// active child depends only on the absolute cycle number.
pub fn alternate<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    let seq = sequence(patterns);
    match seq.steps() {
        Some(total) if total > Rational::ZERO => seq.slow(total).with_steps(Some(Rational::ONE)),
        _ => silence(),
    }
}

/// Alias for [`alternate`].
pub fn cat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    alternate(patterns)
}

/// Alias for [`alternate`].
pub fn slowcat<T: Clone + Send + Sync + 'static>(patterns: Vec<Pattern<T>>) -> Pattern<T> {
    alternate(patterns)
}

/// Stack children so that each plays `target` of its steps per cycle.
///
/// `target` defaults to the least common multiple of the children's step
/// counts; children without a step count are treated as one step.
pub fn polymeter<T: Clone + Send + Sync + 'static>(
    patterns: Vec<Pattern<T>>,
    steps: Option<Rational>,
) -> Pattern<T> {
    let counts: Vec<Rational> = patterns
        .iter()
        .map(|p| p.steps().filter(|s| *s > Rational::ZERO).unwrap_or(Rational::ONE))
        .collect();
    let target = match steps.or_else(|| lcm(&counts)) {
        Some(target) if target > Rational::ZERO => target,
        _ => {
            trace!("polymeter without a positive step count is silent");
            return silence();
        }
    };
    let aligned = patterns
        .into_iter()
        .zip(counts)
        .map(|(pat, count)| pat.fast(target / count))
        .collect();
    stack(aligned).with_steps(Some(target))
}

// ============================================
// Time transformations
// ============================================

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Speed up the pattern by a factor. Negative factors also reverse it.
    pub fn fast(self, factor: Rational) -> Self {
        if factor.is_zero() {
            trace!("fast by zero is silent");
            return silence().with_weight(self.weight);
        }
        if factor.is_negative() {
            return self.rev().fast(-factor);
        }
        self.with_query_time(move |t| t * factor)
            .with_event_time(move |t| t / factor)
    }

    /// Slow down the pattern by a factor.
    pub fn slow(self, factor: Rational) -> Self {
        if factor.is_zero() {
            trace!("slow by zero is silent");
            return silence().with_weight(self.weight);
        }
        self.fast(factor.recip())
    }

    /// Speed up by a patterned factor, sampled per factor event.
    pub fn fast_by(self, factor: Pattern<Rational>) -> Self {
        let (weight, steps) = (self.weight, self.steps);
        factor
            .fmap(move |f| self.clone().fast(f))
            .inner_join()
            .with_weight(weight)
            .with_steps(steps)
    }

    /// Slow down by a patterned factor.
    pub fn slow_by(self, factor: Pattern<Rational>) -> Self {
        self.fast_by(factor.fmap(|f| if f.is_zero() { f } else { f.recip() }))
    }

    /// Shift the pattern earlier in time.
    pub fn early(self, offset: Rational) -> Self {
        self.with_query_time(move |t| t + offset)
            .with_event_time(move |t| t - offset)
    }

    /// Shift the pattern later in time.
    pub fn late(self, offset: Rational) -> Self {
        self.early(-offset)
    }

    /// Reverse the pattern within each cycle.
    pub fn rev(self) -> Self {
        let (weight, steps) = (self.weight, self.steps);
        let pat = self;
        Pattern::new(move |state| {
            let span = state.span;
            let cycle = span.begin.sam();
            let next_cycle = span.begin.next_sam();

            // Mirror a span within the cycle; begin and end swap roles.
            let reflect = |ts: TimeSpan| {
                TimeSpan::new(cycle + (next_cycle - ts.end), cycle + (next_cycle - ts.begin))
            };

            // A mirrored point lands on the far edge of the half-open step,
            // so point queries pick their step out of the whole cycle.
            if span.is_zero_width() {
                let t = span.begin;
                let mirrored = state.set_span(TimeSpan::point(cycle + (next_cycle - t)));
                let continuous = pat
                    .query(&mirrored)
                    .into_iter()
                    .filter(|event| event.whole.is_none());
                let discrete = pat
                    .query(&state.set_span(TimeSpan::new(cycle, next_cycle)))
                    .into_iter()
                    .filter(|event| event.whole.is_some())
                    .filter(|event| {
                        let part = reflect(event.part);
                        part.begin <= t && t < part.end
                    });
                return continuous
                    .chain(discrete)
                    .map(|event| {
                        let whole = event.whole.map(reflect);
                        Event::with_locations(whole, span, event.value, event.locations)
                    })
                    .collect();
            }

            pat.query(&state.set_span(reflect(span)))
                .into_iter()
                .rev()
                .map(|event| {
                    let whole = event.whole.map(reflect);
                    let part = reflect(event.part);
                    Event::with_locations(whole, part, event.value, event.locations)
                })
                .collect()
        })
        .split_queries()
        .with_weight(weight)
        .with_steps(steps)
    }

    /// Repeat each event `n` times within its own span.
    pub fn ply(self, n: Rational) -> Self {
        let (weight, steps) = (self.weight, self.steps);
        self.fmap(move |v| pure(v).fast(n))
            .squeeze_join()
            .with_weight(weight)
            .with_steps(steps.map(|s| s * n))
    }

    /// Sample the pattern `n` times per cycle.
    pub fn segment(self, n: Rational) -> Self {
        self.restructure(pure(true).fast(n))
            .with_steps(Some(n))
    }

    /// Take structure from the `true` events of `mask`, values from `self`.
    pub fn restructure(self, mask: Pattern<bool>) -> Self {
        let (weight, steps) = (self.weight, mask.steps);
        let keep = |v: T| v;
        app_left(mask.filter_values(|on| *on).fmap(move |_| keep), self)
            .with_weight(weight)
            .with_steps(steps)
    }
}

// ============================================
// Applicative operations
// ============================================

/// Apply with structure from the left (function) pattern.
///
/// Each function event is paired with every value event overlapping its
/// whole; the result keeps the function event's whole.
pub fn app_left<F, A, B>(pat_func: Pattern<F>, pat_val: Pattern<A>) -> Pattern<B>
where
    F: Fn(A) -> B + Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    Pattern::new(move |state| {
        let mut result = Vec::new();
        for event_func in pat_func.query(state) {
            for event_val in pat_val.query(&state.set_span(event_func.whole_or_part())) {
                if let Some(part) = event_func.part.intersection(&event_val.part) {
                    let locations = event_func.combine_locations(&event_val);
                    let value = (event_func.value)(event_val.value);
                    result.push(Event::with_locations(event_func.whole, part, value, locations));
                }
            }
        }
        result
    })
}

// ============================================
// Monadic operations
// ============================================

impl<T: Clone + Send + Sync + 'static> Pattern<Pattern<T>> {
    /// Flatten a pattern of patterns, keeping the inner events' wholes.
    ///
    /// Each inner pattern is queried over its outer event's whole and the
    /// results are clipped to the outer event's part.
    pub fn inner_join(self) -> Pattern<T> {
        let outer = self;
        Pattern::new(move |state| {
            let mut events = Vec::new();
            for outer_event in outer.query(state) {
                let window = outer_event.whole_or_part();
                for inner_event in outer_event.value.query(&state.set_span(window)) {
                    let Some(part) = inner_event.part.intersection(&outer_event.part) else {
                        continue;
                    };
                    let locations = outer_event.combine_locations(&inner_event);
                    events.push(Event::with_locations(
                        inner_event.whole,
                        part,
                        inner_event.value,
                        locations,
                    ));
                }
            }
            events
        })
    }

    /// Flatten by fitting cycle zero of each inner pattern into the whole of
    /// its outer event.
    pub fn squeeze_join(self) -> Pattern<T> {
        let outer = self.discrete_only();
        Pattern::new(move |state| {
            let mut events = Vec::new();
            for outer_event in outer.query(state) {
                let Some(whole) = outer_event.whole else {
                    continue;
                };
                let duration = whole.duration();
                if duration.is_zero() {
                    continue;
                }
                let inner_span = outer_event
                    .part
                    .with_time(|t| (t - whole.begin) / duration);
                for inner_event in outer_event.value.query(&state.set_span(inner_span)) {
                    let inner_event =
                        inner_event.with_span(|s| s.with_time(|t| whole.begin + t * duration));
                    let Some(part) = inner_event.part.intersection(&outer_event.part) else {
                        continue;
                    };
                    let new_whole = match inner_event.whole {
                        Some(w) => match w.intersection(&whole) {
                            Some(clipped) => Some(clipped),
                            None => continue,
                        },
                        None => None,
                    };
                    let locations = outer_event.combine_locations(&inner_event);
                    events.push(Event::with_locations(
                        new_whole,
                        part,
                        inner_event.value,
                        locations,
                    ));
                }
            }
            events
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Derive an inner pattern from each value and inner-join.
    pub fn bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.inner_bind(f)
    }

    /// Inner bind: structure comes from the derived patterns.
    pub fn inner_bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).inner_join()
    }

    /// Squeeze bind: each derived pattern is fitted into its source event.
    pub fn squeeze_bind<U, F>(self, f: F) -> Pattern<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Pattern<U> + Send + Sync + 'static,
    {
        self.fmap(f).squeeze_join()
    }
}

// ============================================
// Registry
// ============================================

fn pattern_value(pat: Pattern<Value>) -> Result<Value, EvalError> {
    Ok(Value::Pattern(pat))
}

pub(crate) fn register(reg: &mut RegistryBuilder) {
    reg.register("pure", |args| {
        expect_args("pure", args, 1)?;
        pattern_value(pure(args[0].clone()))
    });
    reg.register("silence", |args| {
        expect_args("silence", args, 0)?;
        pattern_value(silence())
    });
    reg.register("gap", |args| {
        expect_args("gap", args, 1)?;
        pattern_value(gap(arg_rational("gap", &args[0])?))
    });
    reg.register("seq", |args| pattern_value(sequence(arg_patterns("seq", args)?)));
    reg.alias("sequence", "seq");
    reg.alias("fastcat", "seq");
    reg.register("cat", |args| pattern_value(alternate(arg_patterns("cat", args)?)));
    reg.alias("slowcat", "cat");
    reg.alias("alternate", "cat");
    reg.register("stack", |args| pattern_value(stack(arg_patterns("stack", args)?)));
    reg.register("polymeter", |args| {
        pattern_value(polymeter(arg_patterns("polymeter", args)?, None))
    });
    reg.register("timecat", |args| {
        if args.len() % 2 != 0 {
            return Err(EvalError::type_error("timecat", "expects weight/pattern pairs"));
        }
        let pairs = args
            .chunks(2)
            .map(|pair| Ok((arg_rational("timecat", &pair[0])?, arg_pattern("timecat", &pair[1])?)))
            .collect::<Result<Vec<_>, EvalError>>()?;
        pattern_value(timecat(pairs))
    });

    reg.register("fast", |args| {
        expect_args("fast", args, 2)?;
        let factor = arg_rational_pattern("fast", &args[0])?;
        pattern_value(arg_pattern("fast", &args[1])?.fast_by(factor))
    });
    reg.register("slow", |args| {
        expect_args("slow", args, 2)?;
        let factor = arg_rational_pattern("slow", &args[0])?;
        pattern_value(arg_pattern("slow", &args[1])?.slow_by(factor))
    });
    reg.register("early", |args| {
        expect_args("early", args, 2)?;
        let offset = arg_rational("early", &args[0])?;
        pattern_value(arg_pattern("early", &args[1])?.early(offset))
    });
    reg.register("late", |args| {
        expect_args("late", args, 2)?;
        let offset = arg_rational("late", &args[0])?;
        pattern_value(arg_pattern("late", &args[1])?.late(offset))
    });
    reg.register("rev", |args| {
        expect_args("rev", args, 1)?;
        pattern_value(arg_pattern("rev", &args[0])?.rev())
    });
    reg.register("ply", |args| {
        expect_args("ply", args, 2)?;
        let n = arg_rational("ply", &args[0])?;
        pattern_value(arg_pattern("ply", &args[1])?.ply(n))
    });
    reg.register("segment", |args| {
        expect_args("segment", args, 2)?;
        let n = arg_rational("segment", &args[0])?;
        pattern_value(arg_pattern("segment", &args[1])?.segment(n))
    });
    reg.register("struct", |args| {
        expect_args("struct", args, 2)?;
        let mask = arg_pattern("struct", &args[0])?.fmap(|v| v.is_truthy());
        pattern_value(arg_pattern("struct", &args[1])?.restructure(mask))
    });
    reg.register("weight", |args| {
        expect_args("weight", args, 2)?;
        let weight = arg_rational("weight", &args[0])?;
        pattern_value(arg_pattern("weight", &args[1])?.with_weight(weight))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(n, d)
    }

    fn onsets<T: Clone + Send + Sync + 'static>(pat: &Pattern<T>) -> Vec<Rational> {
        pat.first_cycle()
            .iter()
            .filter(|e| e.is_onset())
            .filter_map(|e| e.onset())
            .collect()
    }

    #[test]
    fn test_pure_one_event_per_cycle() {
        let events = pure("a").query_arc(r(0, 1), r(3, 1), &QueryContext::empty());
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.is_onset()));
        assert_eq!(events[2].whole, Some(TimeSpan::from_integers(2, 3)));
    }

    #[test]
    fn test_pure_fragment() {
        let events = pure(1).query_arc(r(1, 2), r(3, 2), &QueryContext::empty());
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_onset());
        assert!(events[1].is_onset());
    }

    #[test]
    fn test_sequence_steps() {
        let pat = sequence(vec![pure("a"), pure("b"), pure("c")]);
        let events = pat.first_cycle();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(1, 3), r(2, 3))));
        assert_eq!(pat.steps(), Some(r(3, 1)));
    }

    #[test]
    fn test_sequence_weights() {
        let pat = sequence(vec![pure("a").with_weight(r(3, 1)), pure("b")]);
        let events = pat.first_cycle();
        assert_eq!(events[0].whole, Some(TimeSpan::new(r(0, 1), r(3, 4))));
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(3, 4), r(1, 1))));
    }

    #[test]
    fn test_sequence_equals_fastcat() {
        let a = sequence(vec![pure(1), pure(2)]).first_cycle();
        let b = fastcat(vec![pure(1), pure(2)]).first_cycle();
        assert_eq!(a.len(), b.len());
        assert!(a.iter().zip(&b).all(|(x, y)| x.equals(y)));
    }

    #[test]
    fn test_stepped_override() {
        let pat = stepped(vec![pure("a"), pure("b")], Some(r(4, 1)));
        let events = pat.first_cycle();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(1, 4), r(1, 2))));
    }

    #[test]
    fn test_nested_sequence_keeps_cycle() {
        let inner = alternate(vec![pure("x"), pure("y")]);
        let pat = sequence(vec![inner, pure("z")]);
        let second = pat.query_arc(r(1, 1), r(2, 1), &QueryContext::empty());
        assert_eq!(second[0].value, "y");
    }

    #[test]
    fn test_stack_is_sorted() {
        let pat = stack(vec![sequence(vec![silence(), pure("b")]), pure("a")]);
        let values = pat.first_cycle_values();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_alternate() {
        let pat = alternate(vec![pure("a"), pure("b")]);
        let ctx = QueryContext::empty();
        assert_eq!(pat.query_arc(r(0, 1), r(1, 1), &ctx)[0].value, "a");
        assert_eq!(pat.query_arc(r(1, 1), r(2, 1), &ctx)[0].value, "b");
        assert_eq!(pat.query_arc(r(2, 1), r(3, 1), &ctx)[0].value, "a");
    }

    #[test]
    fn test_nested_alternate() {
        let pat = alternate(vec![pure("a"), alternate(vec![pure("b"), pure("c")])]);
        let ctx = QueryContext::empty();
        let values: Vec<_> = (0..4)
            .map(|c| pat.query_arc(r(c, 1), r(c + 1, 1), &ctx)[0].value)
            .collect();
        assert_eq!(values, vec!["a", "b", "a", "c"]);
    }

    #[test]
    fn test_fast_onsets() {
        let pat = sequence(vec![pure("a"), pure("b")]).fast(r(2, 1));
        assert_eq!(onsets(&pat), vec![r(0, 1), r(1, 4), r(1, 2), r(3, 4)]);
    }

    #[test]
    fn test_fast_with_zero() {
        assert!(pure(1).fast(Rational::ZERO).first_cycle().is_empty());
    }

    #[test]
    fn test_slow_with_zero() {
        assert!(pure(1).slow(Rational::ZERO).first_cycle().is_empty());
    }

    #[test]
    fn test_negative_fast_reverses() {
        let pat = sequence(vec![pure("a"), pure("b")]).fast(r(-1, 1));
        assert_eq!(pat.first_cycle_values(), vec!["b", "a"]);
    }

    #[test]
    fn test_fast_by_pattern() {
        let factor = alternate(vec![pure(r(1, 1)), pure(r(2, 1))]);
        let pat = pure("a").fast_by(factor);
        let ctx = QueryContext::empty();
        assert_eq!(pat.query_arc(r(0, 1), r(1, 1), &ctx).len(), 1);
        assert_eq!(pat.query_arc(r(1, 1), r(2, 1), &ctx).len(), 2);
    }

    #[test]
    fn test_late_query_across_cycles() {
        let pat = pure("a").late(r(1, 2));
        let events = pat.query_arc(r(0, 1), r(1, 1), &QueryContext::empty());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(1, 2), r(3, 2))));
    }

    #[test]
    fn test_rev_three_elements() {
        let pat = sequence(vec![pure(1), pure(2), pure(3)]).rev();
        assert_eq!(pat.first_cycle_values(), vec![3, 2, 1]);
    }

    #[test]
    fn test_rev_point_query_takes_step_starting_there() {
        let pat = sequence(vec![pure(1), pure(2)]).rev();
        let ctx = QueryContext::empty();
        let at = |t: Rational| -> Vec<i32> {
            pat.query_arc(t, t, &ctx).into_iter().map(|e| e.value).collect()
        };
        assert_eq!(at(r(0, 1)), vec![2]);
        assert_eq!(at(r(1, 2)), vec![1]);
        assert_eq!(at(r(1, 4)), vec![2]);
        assert_eq!(at(r(3, 1)), vec![2]);

        let events = pat.query_arc(r(1, 2), r(1, 2), &ctx);
        assert_eq!(events[0].whole, Some(TimeSpan::new(r(1, 2), r(1, 1))));
        assert_eq!(events[0].part, TimeSpan::point(r(1, 2)));
    }

    #[test]
    fn test_ply() {
        let pat = sequence(vec![pure("a"), pure("b")]).ply(r(2, 1));
        assert_eq!(pat.first_cycle_values(), vec!["a", "a", "b", "b"]);
        assert_eq!(onsets(&pat), vec![r(0, 1), r(1, 4), r(1, 2), r(3, 4)]);
    }

    #[test]
    fn test_segment() {
        let pat = pure(5).segment(r(4, 1));
        assert_eq!(pat.first_cycle().len(), 4);
    }

    #[test]
    fn test_restructure() {
        let mask = sequence(vec![pure(true), pure(false), pure(true)]);
        let pat = pure("x").restructure(mask);
        assert_eq!(onsets(&pat), vec![r(0, 1), r(2, 3)]);
    }

    #[test]
    fn test_timecat() {
        let pat = timecat(vec![(r(1, 1), pure("a")), (r(2, 1), pure("b"))]);
        let events = pat.first_cycle();
        assert_eq!(events[1].whole, Some(TimeSpan::new(r(1, 3), r(1, 1))));
    }

    #[test]
    fn test_polymeter() {
        let three = sequence(vec![pure("a"), pure("b"), pure("c")]);
        let two = sequence(vec![pure("d"), pure("e")]);
        let pat = polymeter(vec![three, two], None);
        assert_eq!(pat.steps(), Some(r(6, 1)));
        assert_eq!(pat.first_cycle().len(), 12);
    }

    #[test]
    fn test_inner_join_windows_inner() {
        let outer = sequence(vec![pure(sequence(vec![pure(1), pure(2)])), pure(pure(3))]);
        let events = outer.inner_join().first_cycle();
        // The inner [1 2] is windowed to the first half, so only 1 survives.
        assert_eq!(events.iter().map(|e| e.value).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_squeeze_join_fits_cycle() {
        let outer = sequence(vec![pure(sequence(vec![pure(1), pure(2)])), pure(pure(3))]);
        let pat = outer.squeeze_join();
        assert_eq!(pat.first_cycle_values(), vec![1, 2, 3]);
        assert_eq!(onsets(&pat), vec![r(0, 1), r(1, 4), r(1, 2)]);
    }

    #[test]
    fn test_with_location() {
        let pat = pure(1).with_location(Location::new(2, 4));
        assert_eq!(pat.first_cycle()[0].locations, vec![Location::new(2, 4)]);
    }

    #[test]
    fn test_query_arc_f64() {
        let events = sequence(vec![pure(1), pure(2)]).query_arc_f64(0.0, 0.5);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_query_arc_f64_out_of_range_is_silent() {
        let pat = pure(1);
        assert!(pat.query_arc_f64(0.0, 1e19).is_empty());
        assert!(pat.query_arc_f64(f64::NAN, 1.0).is_empty());
    }

    #[test]
    fn test_zero_width_query_hits_one_step() {
        let pat = sequence(vec![pure("a"), pure("b")]);
        let events = pat.query_arc(r(1, 2), r(1, 2), &QueryContext::empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, "b");
    }
}
