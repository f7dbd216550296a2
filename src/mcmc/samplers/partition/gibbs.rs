use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, trace};
use rand::Rng;
use rv::dist::Crp;
use rv::misc::LogSumExp;
use rv::traits::HasDensity;

use crate::config::GibbsConfig;
use crate::data::partition::{Block, BlockId, PartitionStore};
use crate::error::{Error, Result};
use crate::mcmc::Sampler;
use crate::mcmc::history::{HistoryRecord, HistorySink};
use crate::models::Model;
use crate::models::likelihood::MarginalLikelihood;
use crate::rvs::{Pflip, WeightedChoice};

/// Whether a sampler has seated every item yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Running,
}

/// One Gibbs move: `item` left block `from` and was seated in block `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GibbsMove {
    pub item: usize,
    pub from: Option<BlockId>,
    pub to: BlockId,
}

/// Collapsed Gibbs sampling on the space of partitions under a CRP prior.
///
/// Every step reseats one uniformly chosen item. The item is removed from its
/// block, then placed in an open block `b` with probability proportional to
///
/// - `|b| / (alpha + n) * exp(L(b + item) - L(b))` for an open block, or
/// - `alpha / (alpha + n) * exp(L({item}))` for a new block,
///
/// where `n` counts the assigned items, excluding the one being moved.
/// Weights are normalized in log space.
#[derive(Clone, Debug)]
pub struct PartitionGibbs<X, L, W = Pflip> {
    store: PartitionStore<X, L>,
    crp: Crp,
    history_interval: usize,
    chooser: W,
    uniform: Vec<f64>,
    n_steps: usize,
    phase: Phase,
}

impl<X, L> PartitionGibbs<X, L, Pflip>
where
    L: MarginalLikelihood<X>,
{
    /// Build an uninitialized sampler drawing with [`Pflip`].
    ///
    /// # Errors
    /// [`Error::EmptyData`] without data, or an invalid `config`.
    pub fn new(data: impl Into<Vec<X>>, likelihood: L, config: GibbsConfig) -> Result<Self> {
        Self::with_chooser(data, likelihood, config, Pflip)
    }
}

impl<X, L, W> PartitionGibbs<X, L, W>
where
    L: MarginalLikelihood<X>,
    W: WeightedChoice,
{
    /// Build an uninitialized sampler with a custom weighted draw.
    ///
    /// # Errors
    /// [`Error::EmptyData`] without data, or an invalid `config`.
    pub fn with_chooser(
        data: impl Into<Vec<X>>,
        likelihood: L,
        config: GibbsConfig,
        chooser: W,
    ) -> Result<Self> {
        config.validate()?;
        let data = data.into();
        if data.is_empty() {
            return Err(Error::EmptyData);
        }
        let alpha = config.concentration;
        let crp = Crp::new(alpha, data.len()).map_err(|_| Error::InvalidConcentration { alpha })?;
        let uniform = vec![1.0; data.len()];

        Ok(Self {
            store: PartitionStore::new(data, likelihood),
            crp,
            history_interval: config.history_interval,
            chooser,
            uniform,
            n_steps: 0,
            phase: Phase::Uninitialized,
        })
    }

    /// Seat items `0..N` in index order, starting from an empty partition.
    ///
    /// # Errors
    /// See [`initialize_in_order`](Self::initialize_in_order).
    pub fn initialize<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let n = self.store.len();
        self.initialize_in_order(0..n, rng)
    }

    /// Empty the partition, then seat the items one at a time in `order`,
    /// each drawn from its conditional given the items seated before it.
    ///
    /// May be called again on a running sampler to restart from scratch.
    ///
    /// # Errors
    /// - [`Error::InvalidOrder`] unless `order` is a permutation of `0..N`.
    /// - [`Error::DegenerateDistribution`] or [`Error::NonFiniteLikelihood`]
    ///   if an item cannot be seated; the sampler is then left uninitialized.
    pub fn initialize_in_order<I, R>(&mut self, order: I, rng: &mut R) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
        R: Rng,
    {
        let n = self.store.len();
        let order: Vec<usize> = order.into_iter().collect();
        let mut seen = vec![false; n];
        let is_permutation = order.len() == n
            && order
                .iter()
                .all(|&i| i < n && !std::mem::replace(&mut seen[i], true));
        if !is_permutation {
            return Err(Error::InvalidOrder { n_items: n });
        }

        self.phase = Phase::Uninitialized;
        for item in 0..n {
            self.store.remove(item)?;
        }
        for item in order {
            self.seat(item, rng)?;
        }
        self.phase = Phase::Running;

        info!(
            "initialized {} items into {} blocks (ln m = {})",
            n,
            self.store.cluster_count(),
            self.store.total_ln_m()
        );
        Ok(())
    }

    /// Perform `steps` Gibbs moves, collecting a history record every
    /// `history_interval` steps.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] or the first failing step.
    pub fn run<R: Rng>(&mut self, steps: usize, rng: &mut R) -> Result<Vec<HistoryRecord>> {
        let mut history = Vec::with_capacity(steps / self.history_interval);
        self.run_with_sink(steps, &mut history, rng)?;
        Ok(history)
    }

    /// Like [`run`](Self::run) but sends history records to `sink`.
    ///
    /// # Errors
    /// [`Error::Uninitialized`], the first failing step, or a sink error.
    pub fn run_with_sink<S, R>(&mut self, steps: usize, sink: &mut S, rng: &mut R) -> Result<()>
    where
        S: HistorySink,
        R: Rng,
    {
        let never = AtomicBool::new(false);
        self.run_cancellable(steps, sink, &never, rng).map(|_| ())
    }

    /// Like [`run_with_sink`](Self::run_with_sink), checking `cancel` before
    /// every step. Returns the number of steps performed.
    ///
    /// # Errors
    /// [`Error::Uninitialized`], the first failing step, or a sink error.
    pub fn run_cancellable<S, R>(
        &mut self,
        steps: usize,
        sink: &mut S,
        cancel: &AtomicBool,
        rng: &mut R,
    ) -> Result<usize>
    where
        S: HistorySink,
        R: Rng,
    {
        if self.phase == Phase::Uninitialized {
            return Err(Error::Uninitialized);
        }

        for done in 0..steps {
            if cancel.load(Ordering::Relaxed) {
                info!("run cancelled after {done} of {steps} steps");
                return Ok(done);
            }
            self.step(rng)?;

            if self.n_steps % self.history_interval == 0 {
                let record = self.history_record();
                debug!(
                    "step {}: {} blocks, ln m = {}",
                    record.step, record.cluster_count, record.total_ln_m
                );
                sink.record(record)?;
            }
        }

        info!(
            "ran {steps} steps ({} total): {} blocks, ln m = {}",
            self.n_steps,
            self.store.cluster_count(),
            self.store.total_ln_m()
        );
        Ok(steps)
    }

    /// Log posterior predictive density of a new value `x` under the current
    /// partition.
    ///
    /// # Errors
    /// [`Error::Uninitialized`] before [`initialize`](Self::initialize).
    pub fn ln_pp(&self, x: &X) -> Result<f64> {
        if self.phase == Phase::Uninitialized {
            return Err(Error::Uninitialized);
        }
        let ln_total_weight = self.ln_total_weight();
        let ln_ps = self
            .store
            .open_blocks()
            .map(|block| {
                let ln_joint = self.store.ln_m_with_value(block, x)?;
                Ok(self.ln_crp_weight(block) - ln_total_weight + ln_joint - self.baseline(block))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(ln_ps.into_iter().logsumexp())
    }

    /// Draw a block for the unassigned `item` from its full conditional and
    /// seat it there.
    fn seat<R: Rng>(&mut self, item: usize, rng: &mut R) -> Result<BlockId> {
        let candidates: Vec<BlockId> = self.store.open_blocks().collect();
        let ln_total_weight = self.ln_total_weight();
        let ln_weights = candidates
            .iter()
            .map(|&block| {
                let ln_joint = self.store.ln_m_with_item(block, item)?;
                Ok(self.ln_crp_weight(block) - ln_total_weight + ln_joint - self.baseline(block))
            })
            .collect::<Result<Vec<f64>>>()?;

        let weights = normalize(item, &candidates, ln_weights)?;
        let choice = self.chooser.draw_index(&weights, rng);
        self.store.add(item, candidates[choice])
    }

    /// Put `item` back where it was after a failed reseat.
    fn restore(&mut self, item: usize, from: Option<BlockId>) -> Result<()> {
        let Some(from) = from else {
            return Ok(());
        };
        let target = if self.store.block(from).is_some() {
            from
        } else {
            BlockId::NULL
        };
        self.store.add(item, target).map(|_| ())
    }

    fn ln_total_weight(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = self.store.working_count() as f64;
        (self.crp.alpha() + n).ln()
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_crp_weight(&self, block: BlockId) -> f64 {
        match self.store.block_size(block) {
            0 => self.crp.alpha().ln(),
            size => (size as f64).ln(),
        }
    }

    fn baseline(&self, block: BlockId) -> f64 {
        self.store.block(block).map_or(0.0, Block::ln_m)
    }
}

impl<X, L, W> PartitionGibbs<X, L, W> {
    #[must_use]
    pub const fn store(&self) -> &PartitionStore<X, L> {
        &self.store
    }

    #[must_use]
    pub fn into_store(self) -> PartitionStore<X, L> {
        self.store
    }

    #[must_use]
    pub fn concentration(&self) -> f64 {
        self.crp.alpha()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps performed since construction, across all runs.
    #[must_use]
    pub const fn n_steps(&self) -> usize {
        self.n_steps
    }

    #[must_use]
    pub const fn cluster_count(&self) -> usize {
        self.store.cluster_count()
    }

    #[must_use]
    pub const fn total_ln_m(&self) -> f64 {
        self.store.total_ln_m()
    }

    #[must_use]
    pub const fn history_record(&self) -> HistoryRecord {
        HistoryRecord {
            step: self.n_steps,
            cluster_count: self.store.cluster_count(),
            total_ln_m: self.store.total_ln_m(),
        }
    }
}

impl<X, L, W> Sampler for PartitionGibbs<X, L, W>
where
    L: MarginalLikelihood<X>,
    W: WeightedChoice,
{
    type Step = GibbsMove;

    fn step<R: Rng>(&mut self, rng: &mut R) -> Result<GibbsMove> {
        if self.phase == Phase::Uninitialized {
            return Err(Error::Uninitialized);
        }

        let item = self.chooser.draw_index(&self.uniform, rng);
        let from = self.store.assignment(item);
        self.store.remove(item)?;

        let to = match self.seat(item, rng) {
            Ok(to) => to,
            Err(err) => {
                if let Err(restore_error) = self.restore(item, from) {
                    error!("item {item} left unassigned: {restore_error}");
                    self.phase = Phase::Uninitialized;
                    return Err(Error::Unrestored {
                        item,
                        step_error: Box::new(err),
                        restore_error: Box::new(restore_error),
                    });
                }
                return Err(err);
            }
        };
        self.n_steps += 1;

        trace!("step {}: item {item} {from:?} -> {to}", self.n_steps);
        Ok(GibbsMove { item, from, to })
    }
}

impl<X, L, W> Model for PartitionGibbs<X, L, W> {
    /// Log joint of the partition and the data: the total log marginal
    /// likelihood plus the CRP log prior. `-inf` before initialization.
    fn ln_score(&self) -> f64 {
        self.store
            .to_partition()
            .map_or(f64::NEG_INFINITY, |partition| {
                self.store.total_ln_m() + self.crp.ln_f(&partition)
            })
    }
}

/// Turn log weights into probabilities, refusing distributions with no mass.
fn normalize(item: usize, candidates: &[BlockId], ln_weights: Vec<f64>) -> Result<Vec<f64>> {
    let has_mass = ln_weights.iter().any(|w| *w > f64::NEG_INFINITY);
    let well_formed = ln_weights
        .iter()
        .all(|w| !w.is_nan() && *w < f64::INFINITY);

    if has_mass && well_formed {
        let ln_norm = ln_weights.iter().copied().logsumexp();
        let weights: Vec<f64> = ln_weights.iter().map(|w| (w - ln_norm).exp()).collect();
        let total: f64 = weights.iter().sum();
        if total.is_finite() && total > 0.0 {
            return Ok(weights);
        }
    }

    Err(Error::DegenerateDistribution {
        item,
        candidates: candidates.to_vec(),
        ln_weights,
    })
}
