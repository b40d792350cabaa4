//! TimeSpan is a `[begin, end)` arc of cycle time.
//!
//! Spans are split at cycle boundaries before anything cycle-relative
//! (sequence steps, alternation, per-cycle randomness) is computed.

use crate::rational::Rational;

/// A span of time with a begin and end point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub begin: Rational,
    pub end: Rational,
}

impl TimeSpan {
    /// Create a new TimeSpan.
    ///
    /// Panics if `end < begin`.
    pub fn new(begin: Rational, end: Rational) -> Self {
        assert!(end >= begin, "TimeSpan end {} precedes begin {}", end, begin);
        TimeSpan { begin, end }
    }

    pub fn from_integers(begin: i64, end: i64) -> Self {
        TimeSpan::new(Rational::from_integer(begin), Rational::from_integer(end))
    }

    /// The zero-width span at `t`.
    pub fn point(t: Rational) -> Self {
        TimeSpan { begin: t, end: t }
    }

    pub fn duration(&self) -> Rational {
        self.end - self.begin
    }

    pub fn midpoint(&self) -> Rational {
        self.begin + self.duration() / Rational::from_integer(2)
    }

    pub fn is_zero_width(&self) -> bool {
        self.begin == self.end
    }

    /// Move both ends by `by` cycles.
    pub fn shift(&self, by: Rational) -> TimeSpan {
        TimeSpan::new(self.begin + by, self.end + by)
    }

    /// Clip to `[lo, hi)`. Returns `None` when the spans are disjoint.
    ///
    /// A zero-width result means the span only touches the boundary.
    pub fn clip_to(&self, lo: Rational, hi: Rational) -> Option<TimeSpan> {
        let begin = self.begin.max(lo);
        let end = self.end.min(hi);
        if begin > end {
            None
        } else {
            Some(TimeSpan::new(begin, end))
        }
    }

    /// Split into per-cycle sub-spans, lazily.
    ///
    /// The iterator is `Clone`, so it can be restarted. A zero-width span
    /// yields itself once.
    pub fn split_by_cycle(&self) -> CycleSpans {
        CycleSpans {
            cursor: self.begin,
            end: self.end,
            zero_width: self.is_zero_width(),
            done: false,
        }
    }

    /// Shifts this span to one of equal duration that starts within cycle zero.
    pub fn cycle_arc(&self) -> TimeSpan {
        let b = self.begin.cycle_pos();
        TimeSpan::new(b, b + self.duration())
    }

    /// Apply a function to both the begin and end time.
    pub fn with_time<F>(&self, f: F) -> TimeSpan
    where
        F: Fn(Rational) -> Rational,
    {
        TimeSpan::new(f(self.begin), f(self.end))
    }

    /// Apply a function relative to the cycle of `begin`.
    pub fn with_cycle<F>(&self, f: F) -> TimeSpan
    where
        F: Fn(Rational) -> Rational,
    {
        let sam = self.begin.sam();
        TimeSpan::new(sam + f(self.begin - sam), sam + f(self.end - sam))
    }

    /// Intersection of two spans, or `None` if they don't intersect.
    ///
    /// A point touching the end of a non-zero span does not intersect it,
    /// so adjacent steps never both claim a boundary instant.
    pub fn intersection(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);

        if begin > end {
            return None;
        }
        if begin == end {
            if begin == self.end && self.begin < self.end {
                return None;
            }
            if begin == other.end && other.begin < other.end {
                return None;
            }
        }
        Some(TimeSpan::new(begin, end))
    }

    /// True if `other` lies entirely within this span.
    pub fn contains(&self, other: &TimeSpan) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    pub fn show(&self) -> String {
        format!("{} -> {}", self.begin, self.end)
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.begin, self.end)
    }
}

/// Iterator over the per-cycle pieces of a span.
#[derive(Debug, Clone)]
pub struct CycleSpans {
    cursor: Rational,
    end: Rational,
    zero_width: bool,
    done: bool,
}

impl Iterator for CycleSpans {
    type Item = TimeSpan;

    fn next(&mut self) -> Option<TimeSpan> {
        if self.done {
            return None;
        }
        if self.zero_width {
            self.done = true;
            return Some(TimeSpan::point(self.cursor));
        }
        if self.cursor >= self.end {
            self.done = true;
            return None;
        }
        let next = self.cursor.next_sam().min(self.end);
        let span = TimeSpan::new(self.cursor, next);
        self.cursor = next;
        Some(span)
    }
}
