//! Caller-supplied predicates, selectors and orderings.
//!
//! These are plain values. Whether a storage context translates them to its
//! own query language or evaluates them in process is its own business; the
//! repository only relies on their meaning.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::entity::{record_fields, Entity};
use crate::error::DataError;
use crate::filter::Filter;

type TestFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A boolean test over a record.
///
/// Built from a [`Filter`] (translatable by SQL contexts) or from a closure
/// (evaluated in process). A tree is translatable only when every leaf is a
/// filter.
pub enum Predicate<T> {
    Filter(Filter),
    Closure(TestFn<T>),
    And(Box<Predicate<T>>, Box<Predicate<T>>),
    Or(Box<Predicate<T>>, Box<Predicate<T>>),
    Not(Box<Predicate<T>>),
}

impl<T> Predicate<T> {
    pub fn new(test: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Closure(Arc::new(test))
    }

    pub fn and(self, other: impl Into<Predicate<T>>) -> Self {
        Predicate::And(Box::new(self), Box::new(other.into()))
    }

    pub fn or(self, other: impl Into<Predicate<T>>) -> Self {
        Predicate::Or(Box::new(self), Box::new(other.into()))
    }

    /// The equivalent filter, or `None` when a closure is involved.
    pub fn to_filter(&self) -> Option<Filter> {
        match self {
            Predicate::Filter(f) => Some(f.clone()),
            Predicate::Closure(_) => None,
            Predicate::And(a, b) => Some(a.to_filter()?.and(b.to_filter()?)),
            Predicate::Or(a, b) => Some(a.to_filter()?.or(b.to_filter()?)),
            Predicate::Not(inner) => Some(!inner.to_filter()?),
        }
    }

    pub fn is_translatable(&self) -> bool {
        match self {
            Predicate::Filter(_) => true,
            Predicate::Closure(_) => false,
            Predicate::And(a, b) | Predicate::Or(a, b) => a.is_translatable() && b.is_translatable(),
            Predicate::Not(inner) => inner.is_translatable(),
        }
    }
}

impl<T: Entity> Predicate<T> {
    /// Evaluate in process. Fields are serialized at most once, and only when
    /// a filter leaf is reached.
    pub fn evaluate(&self, record: &T) -> Result<bool, DataError> {
        let mut fields = None;
        self.evaluate_with(record, &mut fields)
    }

    fn evaluate_with(
        &self,
        record: &T,
        fields: &mut Option<Map<String, Value>>,
    ) -> Result<bool, DataError> {
        match self {
            Predicate::Filter(filter) => {
                if fields.is_none() {
                    *fields = Some(record_fields(record)?);
                }
                Ok(fields.as_ref().is_some_and(|f| filter.matches(f)))
            }
            Predicate::Closure(test) => Ok(test(record)),
            Predicate::And(a, b) => {
                Ok(a.evaluate_with(record, fields)? && b.evaluate_with(record, fields)?)
            }
            Predicate::Or(a, b) => {
                Ok(a.evaluate_with(record, fields)? || b.evaluate_with(record, fields)?)
            }
            Predicate::Not(inner) => Ok(!inner.evaluate_with(record, fields)?),
        }
    }
}

impl<T> From<Filter> for Predicate<T> {
    fn from(filter: Filter) -> Self {
        Predicate::Filter(filter)
    }
}

impl<T> std::ops::Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Predicate<T> {
        Predicate::Not(Box::new(self))
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Filter(f) => Predicate::Filter(f.clone()),
            Predicate::Closure(test) => Predicate::Closure(test.clone()),
            Predicate::And(a, b) => Predicate::And(a.clone(), b.clone()),
            Predicate::Or(a, b) => Predicate::Or(a.clone(), b.clone()),
            Predicate::Not(inner) => Predicate::Not(inner.clone()),
        }
    }
}

impl<T> std::fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Filter(filter) => f.debug_tuple("Filter").field(filter).finish(),
            Predicate::Closure(_) => f.write_str("Closure(..)"),
            Predicate::And(a, b) => f.debug_tuple("And").field(a).field(b).finish(),
            Predicate::Or(a, b) => f.debug_tuple("Or").field(a).field(b).finish(),
            Predicate::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
        }
    }
}

/// Projection of a record to one field.
///
/// A selector built with [`Selector::column`] also names the column it reads,
/// which lets SQL contexts push ordering and aggregation down.
pub struct Selector<T, K> {
    column: Option<&'static str>,
    project: Arc<dyn Fn(&T) -> K + Send + Sync>,
}

impl<T, K> Selector<T, K> {
    pub fn new(project: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self {
            column: None,
            project: Arc::new(project),
        }
    }

    pub fn column(name: &'static str, project: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self {
            column: Some(name),
            project: Arc::new(project),
        }
    }

    pub fn column_name(&self) -> Option<&'static str> {
        self.column
    }

    pub fn select(&self, record: &T) -> K {
        (self.project)(record)
    }
}

impl<T, K> Clone for Selector<T, K> {
    fn clone(&self) -> Self {
        Self {
            column: self.column,
            project: self.project.clone(),
        }
    }
}

impl<T, K> std::fmt::Debug for Selector<T, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector").field("column", &self.column).finish_non_exhaustive()
    }
}

/// Ordering by a selector in one direction.
///
/// Direction only exists together with a selector; there is no
/// "descending, by nothing in particular".
pub struct OrderBy<T> {
    column: Option<&'static str>,
    ascending: bool,
    compare: Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>,
}

impl<T: 'static> OrderBy<T> {
    pub fn new<K: PartialOrd + 'static>(selector: Selector<T, K>, ascending: bool) -> Self {
        let column = selector.column_name();
        let compare = move |a: &T, b: &T| {
            let ordering = selector
                .select(a)
                .partial_cmp(&selector.select(b))
                .unwrap_or(Ordering::Equal);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        };
        Self {
            column,
            ascending,
            compare: Arc::new(compare),
        }
    }

    pub fn asc<K: PartialOrd + 'static>(selector: Selector<T, K>) -> Self {
        Self::new(selector, true)
    }

    pub fn desc<K: PartialOrd + 'static>(selector: Selector<T, K>) -> Self {
        Self::new(selector, false)
    }
}

impl<T> OrderBy<T> {
    pub fn column(&self) -> Option<&'static str> {
        self.column
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.compare)(a, b)
    }
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        Self {
            column: self.column,
            ascending: self.ascending,
            compare: self.compare.clone(),
        }
    }
}

impl<T> std::fmt::Debug for OrderBy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBy")
            .field("column", &self.column)
            .field("ascending", &self.ascending)
            .finish_non_exhaustive()
    }
}

/// A named relation of `T` to eager-load.
pub struct Include<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Include<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

impl<T> std::fmt::Debug for Include<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Include").field(&self.name).finish()
    }
}

/// Whether returned records are registered with the context's change
/// tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tracking {
    #[default]
    NoTracking,
    Tracking,
}

impl Tracking {
    pub fn is_tracked(self) -> bool {
        self == Tracking::Tracking
    }
}

/// Numeric field types accepted by aggregates.
///
/// Integer conversions from storage results are exact: a value that does
/// not fit the type is `None`, never truncated or saturated.
pub trait Numeric: Copy + PartialOrd + Send + Sync + 'static {
    /// `None` on integer overflow.
    fn checked_add(self, other: Self) -> Option<Self>;
    fn to_f64(self) -> f64;
    /// Convert an integer aggregate read back from storage.
    fn from_i64(value: i64) -> Option<Self>;
    /// Convert a real aggregate read back from storage. Integer types only
    /// accept integral values in range.
    fn from_real(value: f64) -> Option<Self>;
}

macro_rules! integer_numeric {
    ($($ty:ty),+) => {
        $(
            impl Numeric for $ty {
                fn checked_add(self, other: Self) -> Option<Self> {
                    <$ty>::checked_add(self, other)
                }
                fn to_f64(self) -> f64 {
                    self as f64
                }
                fn from_i64(value: i64) -> Option<Self> {
                    <$ty>::try_from(value).ok()
                }
                fn from_real(value: f64) -> Option<Self> {
                    let (min, max) = (<$ty>::MIN as f64, <$ty>::MAX as f64);
                    let exact = value.is_finite() && value.fract() == 0.0;
                    (exact && value >= min && value < max + 1.0).then(|| value as $ty)
                }
            }
        )+
    };
}

macro_rules! float_numeric {
    ($($ty:ty),+) => {
        $(
            impl Numeric for $ty {
                fn checked_add(self, other: Self) -> Option<Self> {
                    Some(self + other)
                }
                fn to_f64(self) -> f64 {
                    self as f64
                }
                fn from_i64(value: i64) -> Option<Self> {
                    Some(value as $ty)
                }
                fn from_real(value: f64) -> Option<Self> {
                    Some(value as $ty)
                }
            }
        )+
    };
}

integer_numeric!(i32, i64, u32, u64);
float_numeric!(f32, f64);

/// Aggregate with a value of the field's own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Max,
    Min,
    Sum,
}

impl Aggregate {
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Sum => "sum",
        }
    }

    pub fn sql_function(self) -> &'static str {
        match self {
            Aggregate::Max => "MAX",
            Aggregate::Min => "MIN",
            Aggregate::Sum => "SUM",
        }
    }

    /// Fold values in process. `Ok(None)` for an empty sequence, `Overflow`
    /// when an integer sum leaves the range of `V`.
    pub fn fold<V: Numeric>(
        self,
        entity: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Option<V>, DataError> {
        let mut iter = values.into_iter();
        let Some(mut acc) = iter.next() else {
            return Ok(None);
        };
        for v in iter {
            acc = match self {
                Aggregate::Max if v > acc => v,
                Aggregate::Min if v < acc => v,
                Aggregate::Max | Aggregate::Min => acc,
                Aggregate::Sum => acc.checked_add(v).ok_or_else(|| self.overflow(entity))?,
            };
        }
        Ok(Some(acc))
    }

    pub fn overflow(self, entity: &'static str) -> DataError {
        DataError::Overflow {
            entity,
            operation: self.name(),
        }
    }
}

/// Arithmetic mean in process. `None` for an empty sequence.
pub fn mean<V: Numeric>(values: impl IntoIterator<Item = V>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0u64), |(sum, count), v| (sum + v.to_f64(), count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Point {
        x: i64,
    }

    #[test]
    fn closure_predicates_are_not_translatable() {
        let p: Predicate<Point> = Predicate::from(Filter::gt("x", 1));
        assert!(p.is_translatable());
        let mixed = p.clone().and(Predicate::new(|pt: &Point| pt.x < 10));
        assert!(!mixed.is_translatable());
        assert!(mixed.to_filter().is_none());
        assert_eq!(
            (!p).to_filter(),
            Some(Filter::Not(Box::new(Filter::gt("x", 1))))
        );
    }

    #[test]
    fn ordering_respects_direction() {
        let by_x = Selector::column("x", |p: &Point| p.x);
        let mut points = vec![Point { x: 2 }, Point { x: 3 }, Point { x: 1 }];
        let desc = OrderBy::desc(by_x.clone());
        points.sort_by(|a, b| desc.compare(a, b));
        assert_eq!(points.iter().map(|p| p.x).collect::<Vec<_>>(), [3, 2, 1]);
        assert_eq!(desc.column(), Some("x"));
        assert!(!desc.is_ascending());
    }

    #[test]
    fn aggregates_fold_and_reject_empty() {
        assert_eq!(Aggregate::Max.fold("Point", [3, 9, 4]).unwrap(), Some(9));
        assert_eq!(Aggregate::Min.fold("Point", [3.5, 1.5]).unwrap(), Some(1.5));
        assert_eq!(Aggregate::Sum.fold("Point", [1u64, 2, 3]).unwrap(), Some(6));
        assert_eq!(Aggregate::Max.fold("Point", Vec::<i32>::new()).unwrap(), None);
        assert_eq!(mean([1, 2, 3, 4]), Some(2.5));
        assert_eq!(mean(Vec::<f64>::new()), None);
    }

    #[test]
    fn integer_sum_overflow_is_an_error() {
        let err = Aggregate::Sum.fold("Point", [i32::MAX, 1]).unwrap_err();
        assert!(matches!(err, DataError::Overflow { entity: "Point", operation: "sum" }));
        assert_eq!(Aggregate::Max.fold("Point", [i32::MAX, 1]).unwrap(), Some(i32::MAX));
        assert_eq!(Aggregate::Sum.fold("Point", [f64::MAX, 1.0]).unwrap(), Some(f64::MAX));
    }

    #[test]
    fn storage_results_convert_exactly() {
        assert_eq!(<i32 as Numeric>::from_i64(i64::from(i32::MAX) + 1), None);
        assert_eq!(<u32 as Numeric>::from_i64(-1), None);
        assert_eq!(<i64 as Numeric>::from_i64(9_007_199_254_740_993), Some(9_007_199_254_740_993));
        assert_eq!(<i64 as Numeric>::from_real(2.5), None);
        assert_eq!(<i32 as Numeric>::from_real(42.0), Some(42));
        assert_eq!(<u64 as Numeric>::from_real(-1.0), None);
        assert_eq!(<i64 as Numeric>::from_real(9.3e18), None);
        assert_eq!(<f64 as Numeric>::from_i64(7), Some(7.0));
    }
}
