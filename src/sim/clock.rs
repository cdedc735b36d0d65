/// A simulation clock that walks ticks over a half-open range.
///
/// The `Clock` yields `start, start + step, ...` while the tick is below
/// `end`.
///
/// # Examples
///
/// ```
/// use ems_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(0, 3, 1);
/// let mut ticks = Vec::new();
///
/// clock.run(|tick| ticks.push(tick));
/// assert_eq!(ticks, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    /// Next tick to hand out
    current: u64,
    /// Exclusive end tick
    end: u64,
    /// Ticks between two steps
    step: u64,
}

impl Clock {
    /// Creates a new clock over `[start, end)`.
    ///
    /// # Arguments
    ///
    /// * `start` - First tick
    /// * `end` - Exclusive end tick
    /// * `step` - Ticks between steps
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    pub fn new(start: u64, end: u64, step: u64) -> Self {
        assert!(step > 0, "step must be > 0");
        Self {
            current: start,
            end,
            step,
        }
    }

    /// Number of ticks left.
    pub fn remaining(&self) -> usize {
        if self.current >= self.end {
            0
        } else {
            (self.end - self.current).div_ceil(self.step) as usize
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The tick before advancing
    /// * `None` - If the clock reached its end
    pub fn tick(&mut self) -> Option<u64> {
        if self.current < self.end {
            let tick = self.current;
            self.current += self.step;
            Some(tick)
        } else {
            None
        }
    }

    /// Runs a function for each remaining tick.
    ///
    /// # Arguments
    ///
    /// * `f` - A function that takes the current tick as an argument
    pub fn run(&mut self, mut f: impl FnMut(u64)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }

    /// Runs a fallible function for each remaining tick, stopping at the
    /// first error.
    pub fn try_run<E>(&mut self, mut f: impl FnMut(u64) -> Result<(), E>) -> Result<(), E> {
        while let Some(tick) = self.tick() {
            f(tick)?;
        }
        Ok(())
    }
}
