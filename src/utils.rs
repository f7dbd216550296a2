/// Prevent the inner value from being verbosely / pretty printed during a debug.
pub(crate) struct NoPrettyPrint<T: std::fmt::Debug>(pub T);

impl<T: std::fmt::Debug> NoPrettyPrint<T> {
    pub const fn new(t: T) -> Self {
        Self(t)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for NoPrettyPrint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Prevent "{:#?}" from being used.
        write!(f, "{:?}", self.0)
    }
}

/// Online Mean and Variance
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanAndVariance {
    count: usize,
    mean: f64,
    m2: f64,
}

impl MeanAndVariance {
    #[must_use]
    pub fn update(self, new_value: f64) -> Self {
        let count = self.count + 1;
        let delta = new_value - self.mean;
        #[allow(clippy::cast_precision_loss)]
        let mean = self.mean + delta / (count as f64);
        let delta2 = new_value - mean;
        let m2 = delta.mul_add(delta2, self.m2);

        Self { count, mean, m2 }
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance; `NaN` with fewer than two values.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            f64::NAN
        } else {
            self.m2 / ((self.count - 1) as f64)
        }
    }
}

impl FromIterator<f64> for MeanAndVariance {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::default(), |acc, x| acc.update(x))
    }
}
