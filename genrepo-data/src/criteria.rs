use crate::entity::Entity;
use crate::error::DataError;
use crate::predicate::{Include, OrderBy, Predicate, Tracking};

/// Everything a storage context needs to answer a read: filter, ordering,
/// window, relations to include and tracking mode.
///
/// Contexts that cannot translate part of a query evaluate the rest with
/// [`Query::apply`] (or its individual stages) in process.
pub struct Query<T> {
    predicate: Option<Predicate<T>>,
    order: Vec<OrderBy<T>>,
    skip: Option<u64>,
    take: Option<u64>,
    includes: Vec<&'static str>,
    tracking: Tracking,
}

impl<T> Query<T> {
    /// Every record, untracked.
    pub fn all() -> Self {
        Self {
            predicate: None,
            order: Vec::new(),
            skip: None,
            take: None,
            includes: Vec::new(),
            tracking: Tracking::default(),
        }
    }

    pub fn filtered(predicate: impl Into<Predicate<T>>) -> Self {
        Self::all().filter(predicate)
    }

    /// Add a predicate. Successive calls are combined with AND.
    pub fn filter(mut self, predicate: impl Into<Predicate<T>>) -> Self {
        let predicate = predicate.into();
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy<T>) -> Self {
        self.order.push(order);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn include(mut self, include: Include<T>) -> Self {
        self.includes.push(include.name());
        self
    }

    pub fn tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn predicate(&self) -> Option<&Predicate<T>> {
        self.predicate.as_ref()
    }

    pub fn orders(&self) -> &[OrderBy<T>] {
        &self.order
    }

    pub fn skip_count(&self) -> Option<u64> {
        self.skip
    }

    pub fn take_count(&self) -> Option<u64> {
        self.take
    }

    pub fn includes(&self) -> &[&'static str] {
        &self.includes
    }

    pub fn tracking_mode(&self) -> Tracking {
        self.tracking
    }

    /// Stable sort by every ordering in turn.
    pub fn sort(&self, rows: &mut [T]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            self.order
                .iter()
                .map(|o| o.compare(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Apply skip then take.
    pub fn window(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.skip.map_or(0, saturating_usize);
        let take = self.take.map_or(usize::MAX, saturating_usize);
        rows.into_iter().skip(skip).take(take).collect()
    }
}

impl<T: Entity> Query<T> {
    /// Keep the rows matching the predicate.
    pub fn retain_matching(&self, rows: Vec<T>) -> Result<Vec<T>, DataError> {
        let Some(predicate) = &self.predicate else {
            return Ok(rows);
        };
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if predicate.evaluate(&row)? {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// Filter, stable sort, skip, take.
    pub fn apply(&self, rows: Vec<T>) -> Result<Vec<T>, DataError> {
        let mut rows = self.retain_matching(rows)?;
        self.sort(&mut rows);
        Ok(self.window(rows))
    }
}

fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            order: self.order.clone(),
            skip: self.skip,
            take: self.take,
            includes: self.includes.clone(),
            tracking: self.tracking,
        }
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("predicate", &self.predicate)
            .field("order", &self.order)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("includes", &self.includes)
            .field("tracking", &self.tracking)
            .finish()
    }
}
