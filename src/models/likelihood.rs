use std::marker::PhantomData;

use rv::data::DataOrSuffStat;
use rv::traits::{ConjugatePrior, HasSuffStat, Rv};

/// Log marginal likelihood of a set of observations.
///
/// Implementations must be pure functions of their input, return `0.0` for
/// the empty set and be defined for every non-empty subset of the data.
pub trait MarginalLikelihood<X> {
    fn ln_m(&self, xs: &[&X]) -> f64;
}

impl<X, F> MarginalLikelihood<X> for F
where
    F: Fn(&[&X]) -> f64,
{
    fn ln_m(&self, xs: &[&X]) -> f64 {
        self(xs)
    }
}

/// Marginal likelihood of a conjugate model, with the component parameters
/// integrated out under `prior`.
#[derive(Clone, Debug)]
pub struct ConjugateMarginal<Fx, Pr> {
    prior: Pr,
    _phantom_fx: PhantomData<Fx>,
}

impl<Fx, Pr> ConjugateMarginal<Fx, Pr> {
    pub const fn new(prior: Pr) -> Self {
        Self {
            prior,
            _phantom_fx: PhantomData,
        }
    }

    pub const fn prior(&self) -> &Pr {
        &self.prior
    }
}

impl<X, Fx, Pr> MarginalLikelihood<X> for ConjugateMarginal<Fx, Pr>
where
    X: Clone,
    Fx: Rv<X> + HasSuffStat<X>,
    Pr: ConjugatePrior<X, Fx>,
{
    fn ln_m(&self, xs: &[&X]) -> f64 {
        if xs.is_empty() {
            return 0.0;
        }
        let owned: Vec<X> = xs.iter().map(|&x| x.clone()).collect();
        self.prior
            .ln_m(&DataOrSuffStat::<'_, X, Fx>::Data(&owned))
    }
}
