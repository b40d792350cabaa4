//! State is what a pattern receives when it is queried: the span being
//! asked about plus the query context.

use crate::context::QueryContext;
use crate::timespan::TimeSpan;

/// The query state passed to patterns.
#[derive(Debug, Clone)]
pub struct State {
    /// The timespan being queried.
    pub span: TimeSpan,
    /// Environment shared by the whole query.
    pub ctx: QueryContext,
}

impl State {
    pub fn new(span: TimeSpan, ctx: QueryContext) -> Self {
        State { span, ctx }
    }

    /// Same context, different span.
    pub fn set_span(&self, span: TimeSpan) -> Self {
        State {
            span,
            ctx: self.ctx.clone(),
        }
    }

    pub fn with_span<F>(&self, f: F) -> Self
    where
        F: FnOnce(TimeSpan) -> TimeSpan,
    {
        self.set_span(f(self.span))
    }

    /// Same span, different context.
    pub fn set_context(&self, ctx: QueryContext) -> Self {
        State {
            span: self.span,
            ctx,
        }
    }
}

impl From<TimeSpan> for State {
    fn from(span: TimeSpan) -> Self {
        State::new(span, QueryContext::empty())
    }
}
