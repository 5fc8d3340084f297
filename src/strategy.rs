//! Ordered fallback tiers.
//!
//! Both the key-column detector and the metric selector degrade through a
//! fixed list of heuristics, stopping at the first one that produces a result.
//! Each tier is its own type so it can be exercised in isolation.

pub trait Strategy<I: ?Sized, O> {
    fn name(&self) -> &'static str;
    fn apply(&self, input: &I) -> Option<O>;
}

pub struct StrategyChain<I: ?Sized, O> {
    tiers: Vec<Box<dyn Strategy<I, O>>>,
}

impl<I: ?Sized, O> StrategyChain<I, O> {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn then(mut self, tier: impl Strategy<I, O> + 'static) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Runs tiers in order and returns the first result with its tier name.
    pub fn resolve(&self, input: &I) -> Option<(&'static str, O)> {
        self.tiers
            .iter()
            .find_map(|tier| tier.apply(input).map(|output| (tier.name(), output)))
    }
}

impl<I: ?Sized, O> Default for StrategyChain<I, O> {
    fn default() -> Self {
        Self::new()
    }
}
