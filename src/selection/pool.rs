use rand::Rng;

/// Items with integer weights, drawn with probability proportional to weight.
///
/// Holds cumulative weights instead of one copy per unit of weight, so a
/// draw is a binary search rather than an index into an expanded list.
#[derive(Debug, Clone)]
pub struct WeightedPool<T> {
    items: Vec<T>,
    cumulative: Vec<u64>,
}

impl<T> Default for WeightedPool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cumulative: Vec::new(),
        }
    }
}

impl<T> WeightedPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. A weight of zero still gets one chance.
    pub fn push(&mut self, item: T, weight: u32) {
        let weight = u64::from(weight.max(1));
        let total = self.total_weight() + weight;
        self.items.push(item);
        self.cumulative.push(total);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Draw one item. `random_range` samples without modulo bias.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        let target = rng.random_range(0..self.total_weight());
        let index = self.cumulative.partition_point(|&bound| bound <= target);
        self.items.get(index)
    }
}

impl<T> FromIterator<(T, u32)> for WeightedPool<T> {
    fn from_iter<I: IntoIterator<Item = (T, u32)>>(iter: I) -> Self {
        let mut pool = WeightedPool::new();
        for (item, weight) in iter {
            pool.push(item, weight);
        }
        pool
    }
}
