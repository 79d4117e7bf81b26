use anyhow::{ensure, Result};

/// Mismatches retained for reporting; the rest are only counted.
pub const MAX_REPORTED_MISMATCHES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mismatch {
    pub index: usize,
    pub actual: f32,
    pub expected: f32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Comparison {
    pub compared: usize,
    /// Largest absolute difference seen; NaN differences count as infinite.
    pub max_diff: f32,
    pub mismatches: usize,
    pub first: Vec<Mismatch>,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

/// Element-wise `|actual - expected| <= tolerance`.
pub fn compare(actual: &[f32], expected: &[f32], tolerance: f32) -> Result<Comparison> {
    ensure!(
        actual.len() == expected.len(),
        "output has {} elements, expected {}",
        actual.len(),
        expected.len()
    );

    let mut cmp = Comparison {
        compared: actual.len(),
        ..Comparison::default()
    };
    for (index, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let diff = (a - e).abs();
        let diff = if diff.is_nan() { f32::INFINITY } else { diff };
        cmp.max_diff = cmp.max_diff.max(diff);
        if diff > tolerance {
            cmp.mismatches += 1;
            if cmp.first.len() < MAX_REPORTED_MISMATCHES {
                cmp.first.push(Mismatch {
                    index,
                    actual: a,
                    expected: e,
                });
            }
        }
    }
    Ok(cmp)
}
