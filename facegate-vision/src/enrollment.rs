use indexmap::IndexMap;
use std::borrow::Borrow;
use std::hash::Hash;

use crate::embedding::Embedding;
use crate::error::MatchError;
use crate::matcher::{find_best_match, Decision};

/// Identity → embedding mapping with a stable iteration order.
///
/// Order is insertion order. Re-enrolling an identity swaps its embedding
/// but keeps its original position, so tie-breaks in
/// [`EnrollmentSet::best_match`] do not move around on re-enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentSet<I = String> {
    entries: IndexMap<I, Embedding>,
}

impl<I: Hash + Eq> Default for EnrollmentSet<I> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<I: Hash + Eq> EnrollmentSet<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll an identity, returning the embedding it replaced if any.
    pub fn enroll(&mut self, identity: I, embedding: Embedding) -> Option<Embedding> {
        self.entries.insert(identity, embedding)
    }

    /// Remove an identity, keeping the relative order of the rest.
    pub fn remove<Q>(&mut self, identity: &Q) -> Option<Embedding>
    where
        I: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.shift_remove(identity)
    }

    pub fn get<Q>(&self, identity: &Q) -> Option<&Embedding>
    where
        I: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(identity)
    }

    pub fn contains<Q>(&self, identity: &Q) -> bool
    where
        I: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &I> + '_ {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&I, &Embedding)> + '_ {
        self.entries.iter()
    }

    /// Best-matching identity for an unclaimed query.
    pub fn best_match(
        &self,
        query: &Embedding,
        threshold: f32,
    ) -> Result<Decision<&I>, MatchError> {
        find_best_match(query, self.entries.iter(), threshold)
    }
}

impl<I: Hash + Eq> FromIterator<(I, Embedding)> for EnrollmentSet<I> {
    fn from_iter<T: IntoIterator<Item = (I, Embedding)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<I: Hash + Eq> Extend<(I, Embedding)> for EnrollmentSet<I> {
    fn extend<T: IntoIterator<Item = (I, Embedding)>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}
