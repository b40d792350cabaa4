//! # weft
//!
//! A pattern algebra for cycle-based live-coded music.
//!
//! ## Core Concepts
//!
//! - **Pattern**: A function from a queried timespan to events. Patterns can
//!   be transformed, combined, and queried; querying the same span twice
//!   always gives the same events.
//! - **Event**: A value active during a timespan, with its whole (logical
//!   duration) and part (the fragment inside the query).
//! - **Rational**: Exact fractional time, counted in cycles.
//! - **TimeSpan**: A `[begin, end)` arc of time.
//! - **Mini-notation**: Compact text such as `"bd [sn sn] <hh oh>(3,8)"`.
//!
//! ## Example
//!
//! ```rust
//! use weft::*;
//!
//! // Create a simple pattern
//! let pat = sequence(vec![pure(1), pure(2), pure(3), pure(4)]);
//!
//! // Query the first cycle
//! let events = pat.first_cycle();
//! assert_eq!(events.len(), 4);
//!
//! // Transform the pattern
//! let doubled = pat.fmap(|x| x * 2);
//! let fast_pat = doubled.fast(Rational::from_integer(2));
//! assert_eq!(fast_pat.first_cycle().len(), 8);
//!
//! // Or write it as mini-notation
//! let drums = parse_mini_notation("bd(3,8) [~ sn]", &ValueAtoms).unwrap();
//! assert_eq!(drums.first_cycle().len(), 4);
//! ```
//!
//! Or use the script front end, which reaches every registered combinator:
//!
//! ```rust
//! let pat = weft::compile("(->> (s \"bd sn\") (fast 2) (gain 0.8))").unwrap();
//! assert_eq!(pat.first_cycle().len(), 4);
//! ```

// Time
pub mod context;
pub mod rational;
pub mod state;
pub mod timespan;

// Patterns
pub mod control;
pub mod euclid;
pub mod event;
pub mod pattern;
pub mod pick;
pub mod random;
pub mod signal;

// Values
pub mod value;
pub mod voice;

// Text
pub mod error;
pub mod mini;
pub mod registry;
pub mod script;

// Re-export core types
pub use context::{FixedClock, QueryContext, SystemClock, WallClock};
pub use error::{EvalError, ParseError};
pub use event::{Event, Location};
pub use mini::{parse_mini_notation, parse_mini_notation_at, Atom, AtomFactory, ControlAtoms, NumberAtoms, ValueAtoms};
pub use pattern::{
    alternate, app_left, cat, fastcat, gap, polymeter, pure, seq, sequence, silence, slowcat,
    stack, stepped, timecat, Pattern,
};
pub use pick::Lookup;
pub use random::{choose_cycle, randcat};
pub use rational::Rational;
pub use registry::{registry, Registry};
pub use script::compile;
pub use signal::{continuous, cosine, irand, isaw, rand, saw, signal, sine, square, tri};
pub use state::State;
pub use timespan::TimeSpan;
pub use value::Value;
pub use voice::VoiceData;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::QueryContext;
    pub use crate::event::Event;
    pub use crate::mini::{parse_mini_notation, ValueAtoms};
    pub use crate::pattern::{alternate, pure, sequence, silence, stack, Pattern};
    pub use crate::rational::Rational;
    pub use crate::script::compile;
    pub use crate::signal::{saw, sine};
    pub use crate::timespan::TimeSpan;
    pub use crate::value::Value;
}
