use rand::Rng;

use crate::error::Result;

pub mod history;
pub mod samplers;

/// Trait for Markov Chain Monte Carlo Samplers which own their state.
pub trait Sampler: Sized {
    /// Output of one step.
    type Step;

    /// Step the Sampler.
    ///
    /// # Errors
    /// Whatever the underlying move reports; the state is left as it was
    /// after the last completed step.
    fn step<R: Rng>(&mut self, rng: &mut R) -> Result<Self::Step>;

    /// Warm-up the sampler
    ///
    /// # Errors
    /// Stops at the first failing step.
    fn multi_step<R: Rng>(&mut self, steps: usize, rng: &mut R) -> Result<()> {
        (0..steps).try_for_each(|_| self.step(rng).map(|_| ()))
    }

    /// Step forever, mapping the sampler after every step through `f`.
    ///
    /// The iterator yields the error of a failed step and then ends.
    fn iter_sample<'a, T, F, R>(
        &'a mut self,
        rng: &'a mut R,
        f: F,
    ) -> impl Iterator<Item = Result<T>> + 'a
    where
        T: 'a,
        F: Fn(&Self) -> T + 'a,
        R: Rng,
    {
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            match self.step(rng) {
                Ok(_) => Some(Ok(f(&*self))),
                Err(err) => {
                    failed = true;
                    Some(Err(err))
                }
            }
        })
    }
}
