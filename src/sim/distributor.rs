//! Mapping between the flat encoded solution and each part's private slice.

use std::ops::Range;

use serde::Deserialize;

use crate::devices::ProblemPart;
use crate::error::{Error, Result};

/// Encoding kind of a candidate solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Bit-string.
    Binary,
    /// Real vector with every variable in `[0, 1]`.
    Real,
}

/// A flat candidate solution as manipulated by the search algorithms.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedSolution {
    Binary(Vec<bool>),
    Real(Vec<f64>),
}

impl EncodedSolution {
    /// Encoding kind of this solution.
    pub fn encoding(&self) -> Encoding {
        match self {
            EncodedSolution::Binary(_) => Encoding::Binary,
            EncodedSolution::Real(_) => Encoding::Real,
        }
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        match self {
            EncodedSolution::Binary(bits) => bits.len(),
            EncodedSolution::Real(values) => values.len(),
        }
    }

    /// Returns `true` if the solution has no variables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrowed view of `range`.
    pub fn slice(&self, range: Range<usize>) -> SolutionSlice<'_> {
        match self {
            EncodedSolution::Binary(bits) => SolutionSlice::Binary(&bits[range]),
            EncodedSolution::Real(values) => SolutionSlice::Real(&values[range]),
        }
    }
}

/// One part's view of the encoded solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolutionSlice<'a> {
    Binary(&'a [bool]),
    Real(&'a [f64]),
}

impl SolutionSlice<'_> {
    /// Number of variables in the slice.
    pub fn len(&self) -> usize {
        match self {
            SolutionSlice::Binary(bits) => bits.len(),
            SolutionSlice::Real(values) => values.len(),
        }
    }

    /// Returns `true` if the slice is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variable `index` read as a switch: a set bit, or a real `>= 0.5`.
    pub fn flag(&self, index: usize) -> bool {
        match self {
            SolutionSlice::Binary(bits) => bits.get(index).copied().unwrap_or(false),
            SolutionSlice::Real(values) => values.get(index).is_some_and(|v| *v >= 0.5),
        }
    }
}

/// Contiguous, non-overlapping sub-ranges of the encoded solution, one per
/// part, for both encodings.
///
/// Built once per optimization run from the parts in dense-id order. The
/// ranges of one encoding exactly tile `[0, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionDistributor {
    binary: Vec<Range<usize>>,
    real: Vec<Range<usize>>,
    binary_width: usize,
    real_width: usize,
}

impl SolutionDistributor {
    /// Builds the distributor from `parts`, which must be ordered by dense id.
    pub fn new(parts: &[Box<dyn ProblemPart>]) -> Self {
        let (binary, binary_width) = Self::layout(parts, Encoding::Binary);
        let (real, real_width) = Self::layout(parts, Encoding::Real);
        Self {
            binary,
            real,
            binary_width,
            real_width,
        }
    }

    fn layout(parts: &[Box<dyn ProblemPart>], encoding: Encoding) -> (Vec<Range<usize>>, usize) {
        let mut ranges = Vec::with_capacity(parts.len());
        let mut start = 0;
        for (dense_id, part) in parts.iter().enumerate() {
            debug_assert_eq!(part.dense_id(), dense_id, "parts must be ordered by dense id");
            let count = if part.is_completely_static() {
                0
            } else {
                part.variable_count(encoding)
            };
            ranges.push(start..start + count);
            start += count;
        }
        (ranges, start)
    }

    /// Total number of variables for `encoding`.
    pub fn width(&self, encoding: Encoding) -> usize {
        match encoding {
            Encoding::Binary => self.binary_width,
            Encoding::Real => self.real_width,
        }
    }

    /// Sub-ranges for `encoding`, indexed by dense id.
    pub fn ranges(&self, encoding: Encoding) -> &[Range<usize>] {
        match encoding {
            Encoding::Binary => &self.binary,
            Encoding::Real => &self.real,
        }
    }

    /// Sub-range of the part with `dense_id`.
    pub fn range(&self, dense_id: usize, encoding: Encoding) -> Option<Range<usize>> {
        self.ranges(encoding).get(dense_id).cloned()
    }

    /// Hands each part its slice of `solution`; parts without variables are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SolutionSizeMismatch`] if the solution width differs
    /// from the summed part variable counts.
    pub fn distribute_solution(
        &self,
        solution: &EncodedSolution,
        parts: &mut [Box<dyn ProblemPart>],
    ) -> Result<()> {
        let encoding = solution.encoding();
        let expected = self.width(encoding);
        if solution.len() != expected {
            return Err(Error::SolutionSizeMismatch {
                expected,
                actual: solution.len(),
            });
        }
        for (part, range) in parts.iter_mut().zip(self.ranges(encoding)) {
            if range.is_empty() {
                continue;
            }
            part.set_solution(solution.slice(range.clone()));
        }
        Ok(())
    }
}
