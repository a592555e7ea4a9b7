use ta::{Next, Reset};

/// Fractional change from the previous date's price.
///
/// Undefined at the first input and wherever either side of the pair is missing.
#[derive(Debug, Clone, Default)]
pub struct SimpleReturn {
    prev: Option<f64>,
}

impl SimpleReturn {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Next<Option<f64>> for SimpleReturn {
    type Output = Option<f64>;

    fn next(&mut self, input: Option<f64>) -> Self::Output {
        let out = match (self.prev, input) {
            (Some(prev), Some(cur)) => Some((cur - prev) / prev).filter(|r| r.is_finite()),
            _ => None,
        };
        self.prev = input;
        out
    }
}

impl Reset for SimpleReturn {
    fn reset(&mut self) {
        self.prev = None;
    }
}
