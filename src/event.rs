//! Event is the unit a query returns.
//!
//! An event has a "whole" timespan (its full logical duration) and a "part"
//! timespan (the fragment visible in the queried arc). Continuous patterns
//! produce events with no whole.

use crate::rational::Rational;
use crate::timespan::TimeSpan;

/// A span of source text, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(start: usize, end: usize) -> Self {
        Location { start, end }
    }

    /// This location moved by `origin.start` characters.
    pub fn offset_by(&self, origin: &Location) -> Location {
        Location::new(self.start + origin.start, self.end + origin.start)
    }
}

/// A value active during a timespan.
///
/// `part` never extends outside `whole` when a whole is present.
#[derive(Debug, Clone)]
pub struct Event<T> {
    /// The full timespan of this event. `None` for continuous patterns.
    pub whole: Option<TimeSpan>,
    /// The portion of the event inside the queried arc.
    pub part: TimeSpan,
    pub value: T,
    /// Source locations that produced this event, outermost first.
    pub locations: Vec<Location>,
}

impl<T> Event<T> {
    pub fn new(whole: Option<TimeSpan>, part: TimeSpan, value: T) -> Self {
        Event {
            whole,
            part,
            value,
            locations: Vec::new(),
        }
    }

    pub fn with_locations(
        whole: Option<TimeSpan>,
        part: TimeSpan,
        value: T,
        locations: Vec<Location>,
    ) -> Self {
        Event {
            whole,
            part,
            value,
            locations,
        }
    }

    /// True when the query caught the start of the event.
    ///
    /// Zero-width parts from point queries never count as onsets.
    pub fn is_onset(&self) -> bool {
        match &self.whole {
            Some(w) => w.begin == self.part.begin && !self.part.is_zero_width(),
            None => false,
        }
    }

    /// Start of the whole, if there is one.
    pub fn onset(&self) -> Option<Rational> {
        self.whole.map(|w| w.begin)
    }

    pub fn whole_or_part(&self) -> TimeSpan {
        self.whole.unwrap_or(self.part)
    }

    /// Apply a function to the timespan(s) of this event.
    pub fn with_span<F>(self, f: F) -> Self
    where
        F: Fn(TimeSpan) -> TimeSpan,
    {
        Event {
            whole: self.whole.map(&f),
            part: f(self.part),
            value: self.value,
            locations: self.locations,
        }
    }

    pub fn with_value<U, F>(self, f: F) -> Event<U>
    where
        F: FnOnce(T) -> U,
    {
        Event {
            whole: self.whole,
            part: self.part,
            value: f(self.value),
            locations: self.locations,
        }
    }

    /// This event's locations followed by `other`'s.
    pub fn combine_locations<U>(&self, other: &Event<U>) -> Vec<Location> {
        let mut locations = self.locations.clone();
        locations.extend(other.locations.iter().copied());
        locations
    }

    /// Duration of the whole, or of the part for continuous events.
    pub fn duration(&self) -> Rational {
        self.whole_or_part().duration()
    }

    pub fn span_equals<U>(&self, other: &Event<U>) -> bool {
        self.whole == other.whole && self.part == other.part
    }
}

impl<T: PartialEq> Event<T> {
    /// Same spans and same value; locations are ignored.
    pub fn equals(&self, other: &Event<T>) -> bool {
        self.span_equals(other) && self.value == other.value
    }
}

impl<T: std::fmt::Display> Event<T> {
    pub fn show(&self) -> String {
        let spans = match &self.whole {
            None => format!("~{}", self.part),
            Some(whole) if *whole == self.part => self.part.show(),
            Some(whole) => format!("({}) in {}", self.part.show(), whole.show()),
        };
        format!("[ {} | {} ]", spans, self.value)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.show())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_onset() {
        let whole = TimeSpan::from_integers(0, 1);
        let part = TimeSpan::new(Rational::ZERO, Rational::new(1, 2));
        let event = Event::new(Some(whole), part, 42);
        assert!(event.is_onset());

        let tail = TimeSpan::new(Rational::new(1, 2), Rational::ONE);
        let fragment = Event::new(Some(whole), tail, 42);
        assert!(!fragment.is_onset());

        let continuous = Event::new(None, whole, 42);
        assert!(!continuous.is_onset());

        let sampled = Event::new(Some(whole), TimeSpan::point(Rational::ZERO), 42);
        assert!(!sampled.is_onset());
    }

    #[test]
    fn test_with_value() {
        let whole = TimeSpan::from_integers(0, 1);
        let event = Event::new(Some(whole), whole, 21).with_value(|v| v * 2);
        assert_eq!(event.value, 42);
    }

    #[test]
    fn test_show() {
        let whole = TimeSpan::from_integers(0, 1);
        let part = TimeSpan::new(Rational::ZERO, Rational::new(1, 2));
        let event = Event::new(Some(whole), part, "bd");
        assert_eq!(event.show(), "[ (0 -> 1/2) in 0 -> 1 | bd ]");
    }

    #[test]
    fn test_combine_locations() {
        let span = TimeSpan::from_integers(0, 1);
        let mut a = Event::new(Some(span), span, 1);
        a.locations.push(Location::new(0, 2));
        let mut b = Event::new(Some(span), span, 2);
        b.locations.push(Location::new(5, 7));
        assert_eq!(
            a.combine_locations(&b),
            vec![Location::new(0, 2), Location::new(5, 7)]
        );
    }
}
