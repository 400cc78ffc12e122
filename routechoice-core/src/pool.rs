//! Scalar-or-pool values and uniform selection from them.
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configured field that is either a single value or a pool of candidates.
///
/// Pools are stored as JSON arrays and scalars as bare values, so existing
/// configuration documents deserialize without a discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValuePool<T> {
    Pool(Vec<T>),
    Scalar(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot sample from an empty pool")]
pub struct EmptyPool;

impl<T> ValuePool<T> {
    /// Pick one value: scalars pass through, pools yield a uniformly random element.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyPool`] when the pool has no candidates.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T, EmptyPool> {
        match self {
            Self::Scalar(value) => Ok(value),
            Self::Pool(values) => pick(values, rng).ok_or(EmptyPool),
        }
    }

    /// Candidate values in stored order.
    #[must_use]
    pub fn candidates(&self) -> &[T] {
        match self {
            Self::Scalar(value) => std::slice::from_ref(value),
            Self::Pool(values) => values,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates().is_empty()
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.candidates().contains(value)
    }
}

impl<T> From<Vec<T>> for ValuePool<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Pool(values)
    }
}

/// Uniform pick from a slice; `None` when empty.
pub fn pick<'a, T, R: Rng + ?Sized>(values: &'a [T], rng: &mut R) -> Option<&'a T> {
    if values.is_empty() {
        return None;
    }
    values.get(rng.gen_range(0..values.len()))
}
