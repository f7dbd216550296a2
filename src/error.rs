use crate::data::partition::BlockId;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or stepping a partition sampler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `add` targeted a block which is neither open nor the null block.
    #[error("block {block} is not open")]
    InvalidReference { block: BlockId },

    /// Every candidate weight was zero, or some weight was not a number.
    #[error(
        "degenerate assignment weights for item {item} over blocks {candidates:?} (ln weights {ln_weights:?})"
    )]
    DegenerateDistribution {
        item: usize,
        candidates: Vec<BlockId>,
        ln_weights: Vec<f64>,
    },

    /// The marginal likelihood returned a non-finite value for a non-empty block.
    #[error("marginal likelihood of block {block} is not finite ({value})")]
    NonFiniteLikelihood { block: BlockId, value: f64 },

    #[error("item {item} is out of range for {n_items} items")]
    ItemOutOfRange { item: usize, n_items: usize },

    #[error("item {item} is already assigned to block {block}")]
    AlreadyAssigned { item: usize, block: BlockId },

    /// No block id was free when a new block was requested.
    #[error("no free block ids remain")]
    BlockPoolExhausted,

    #[error("concentration must be positive and finite, got {alpha}")]
    InvalidConcentration { alpha: f64 },

    #[error("history interval must be at least one step")]
    InvalidHistoryInterval,

    /// An initialization order was not a permutation of the item indices.
    #[error("initialization order must visit each of the {n_items} items exactly once")]
    InvalidOrder { n_items: usize },

    #[error("cannot partition an empty data set")]
    EmptyData,

    /// A step failed and its item could not be put back; the sampler must be
    /// initialized again.
    #[error("item {item} was left unassigned: {restore_error} (after: {step_error})")]
    Unrestored {
        item: usize,
        step_error: Box<Error>,
        restore_error: Box<Error>,
    },

    /// `step` or `run` was called before `initialize`.
    #[error("sampler has not been initialized")]
    Uninitialized,

    #[error("failed to write history: {0}")]
    Sink(#[from] std::io::Error),
}
