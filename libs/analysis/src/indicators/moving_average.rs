use std::collections::VecDeque;

use ta::errors::{Result, TaError};
use ta::{Next, Period, Reset};

/// Trailing mean over the last `period` dates that tolerates gaps.
///
/// Missing observations occupy a slot in the window but are left out of the mean, and
/// the window narrows near the series start, so the first defined input already yields
/// a value. Output is `None` only when the whole window is missing.
#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    window: VecDeque<Option<f64>>,
}

impl RollingMean {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
        })
    }
}

impl Period for RollingMean {
    fn period(&self) -> usize {
        self.period
    }
}

impl Next<Option<f64>> for RollingMean {
    type Output = Option<f64>;

    fn next(&mut self, input: Option<f64>) -> Self::Output {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(input);

        let (sum, count) = self
            .window
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(sum, count), x| (sum + x, count + 1));

        (count > 0).then(|| sum / count as f64)
    }
}

impl Reset for RollingMean {
    fn reset(&mut self) {
        self.window.clear();
    }
}
