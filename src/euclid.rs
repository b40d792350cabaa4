//! Euclidean rhythms: `k` onsets spread as evenly as possible over `n`
//! steps, optionally rotated.

use crate::pattern::{pure, sequence, silence, Pattern};
use crate::registry::{arg_i64_pattern, arg_pattern, expect_args, RegistryBuilder};
use crate::value::Value;
use tracing::trace;

/// Bjorklund's algorithm for Euclidean rhythms.
///
/// A negative `pulses` gives the complement of the positive mask.
pub fn bjorklund(pulses: i64, steps: i64) -> Vec<bool> {
    if steps <= 0 {
        return vec![];
    }
    let steps = steps as usize;
    let mask = distribute(pulses.unsigned_abs().min(steps as u64) as usize, steps);
    if pulses < 0 {
        mask.into_iter().map(|hit| !hit).collect()
    } else {
        mask
    }
}

fn distribute(pulses: usize, steps: usize) -> Vec<bool> {
    if pulses >= steps {
        return vec![true; steps];
    }
    if pulses == 0 {
        return vec![false; steps];
    }

    let mut pattern: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut remainder: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];

    // Pair groups off until at most one remainder group is left.
    while remainder.len() > 1 {
        let min_len = pattern.len().min(remainder.len());
        let mut paired = Vec::with_capacity(min_len);
        for i in 0..min_len {
            let mut combined = pattern[i].clone();
            combined.extend_from_slice(&remainder[i]);
            paired.push(combined);
        }

        let leftover = if pattern.len() > remainder.len() {
            pattern[min_len..].to_vec()
        } else {
            remainder[min_len..].to_vec()
        };

        pattern = paired;
        remainder = leftover;
    }

    pattern.extend(remainder);
    pattern.into_iter().flatten().collect()
}

/// The Bjorklund mask rotated left by `rotation` steps.
///
/// Rotation wraps modulo `steps`, so negative values rotate right.
pub fn euclid_mask(pulses: i64, steps: i64, rotation: i64) -> Vec<bool> {
    let mut mask = bjorklund(pulses, steps);
    if !mask.is_empty() {
        let shift = rotation.rem_euclid(steps) as usize;
        mask.rotate_left(shift);
    }
    mask
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    /// Play this pattern on the onsets of a Euclidean rhythm.
    pub fn euclid(self, pulses: i64, steps: i64) -> Self {
        self.euclid_rot(pulses, steps, 0)
    }

    /// Play this pattern on the onsets of a rotated Euclidean rhythm.
    pub fn euclid_rot(self, pulses: i64, steps: i64, rotation: i64) -> Self {
        if steps <= 0 {
            trace!(pulses, steps, "euclid with no steps is silent");
            return silence().with_weight(self.weight());
        }
        let mask = sequence(
            euclid_mask(pulses, steps, rotation)
                .into_iter()
                .map(pure)
                .collect(),
        );
        self.restructure(mask)
    }

    /// Euclidean rhythm with patterned arguments, e.g. `bd(<3 5>,8)`.
    pub fn euclid_by(
        self,
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
    ) -> Self {
        let weight = self.weight();
        let pat = self;
        pulses
            .inner_bind(move |p| {
                let pat = pat.clone();
                let rotation = rotation.clone();
                steps.clone().inner_bind(move |s| {
                    let pat = pat.clone();
                    rotation
                        .clone()
                        .inner_bind(move |r| pat.clone().euclid_rot(p, s, r))
                })
            })
            .with_weight(weight)
    }
}

pub(crate) fn register(reg: &mut RegistryBuilder) {
    reg.register("euclid", |args| {
        expect_args("euclid", args, 3)?;
        let pulses = arg_i64_pattern("euclid", &args[0])?;
        let steps = arg_i64_pattern("euclid", &args[1])?;
        let pat = arg_pattern("euclid", &args[2])?;
        Ok(Value::Pattern(pat.euclid_by(pulses, steps, pure(0))))
    });
    reg.register("euclid-rot", |args| {
        expect_args("euclid-rot", args, 4)?;
        let pulses = arg_i64_pattern("euclid-rot", &args[0])?;
        let steps = arg_i64_pattern("euclid-rot", &args[1])?;
        let rotation = arg_i64_pattern("euclid-rot", &args[2])?;
        let pat = arg_pattern("euclid-rot", &args[3])?;
        Ok(Value::Pattern(pat.euclid_by(pulses, steps, rotation)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::pattern::alternate;
    use crate::rational::Rational;

    fn hits(mask: &[bool]) -> Vec<usize> {
        mask.iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_bjorklund_algorithm() {
        assert_eq!(hits(&bjorklund(3, 8)), vec![0, 3, 6]);
        assert_eq!(hits(&bjorklund(5, 8)), vec![0, 2, 3, 5, 6]);
        assert_eq!(hits(&bjorklund(2, 5)), vec![0, 2]);
        assert_eq!(bjorklund(0, 4), vec![false; 4]);
        assert_eq!(bjorklund(6, 4), vec![true; 4]);
        assert!(bjorklund(3, 0).is_empty());
    }

    #[test]
    fn test_negative_pulses_invert() {
        assert_eq!(hits(&bjorklund(-3, 8)), vec![1, 2, 4, 5, 7]);
    }

    #[test]
    fn test_rotation() {
        assert_eq!(hits(&euclid_mask(3, 8, 1)), vec![2, 5, 7]);
        assert_eq!(euclid_mask(3, 8, -1), euclid_mask(3, 8, 7));
        assert_eq!(euclid_mask(3, 8, 8), euclid_mask(3, 8, 0));
    }

    #[test]
    fn test_euclid_positions() {
        let pat = pure("x").euclid(3, 8);
        let onsets: Vec<Rational> = pat
            .first_cycle()
            .iter()
            .filter_map(|e| e.onset())
            .collect();
        assert_eq!(
            onsets,
            vec![Rational::ZERO, Rational::new(3, 8), Rational::new(6, 8)]
        );
        assert!(pat
            .first_cycle()
            .iter()
            .all(|e| e.duration() == Rational::new(1, 8)));
    }

    #[test]
    fn test_zero_steps_is_silent() {
        assert!(pure("x").euclid(3, 0).first_cycle().is_empty());
    }

    #[test]
    fn test_euclid_by_pattern() {
        let pulses = alternate(vec![pure(3), pure(5)]);
        let pat = pure("x").euclid_by(pulses, pure(8), pure(0));
        let ctx = QueryContext::empty();
        let first = pat.query_arc(Rational::ZERO, Rational::ONE, &ctx);
        let second = pat.query_arc(Rational::ONE, Rational::from_integer(2), &ctx);
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 5);
    }
}
