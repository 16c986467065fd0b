//! Per-chunk matching and classification, and merging the partial results.
//!
//! A [`ChunkProcessor`] turns one [`Chunk`] into a [`Partition`] of unique
//! private and public addresses. Partitions merge by set union, so the order
//! in which chunks finish does not matter. [`Partition::finish`] sorts the
//! merged sets into the final [`Harvest`].

use std::net::Ipv4Addr;

use bstr::ByteSlice;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::chunk::Chunk;
use crate::classify::{AddressClass, AddressClassifier};
use crate::matcher::PatternMatcher;

/// How the final address lists are ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Plain string order: `10.0.0.100` sorts before `10.0.0.2`.
    #[default]
    Lexicographic,
    /// Dotted-quad order: `10.0.0.2` sorts before `10.0.0.100`.
    Numeric,
}

/// Unique addresses found in one or more chunks, split by class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    private: FxHashSet<String>,
    public: FxHashSet<String>,
}

impl Partition {
    /// Add an address to the set for `class`.
    #[inline]
    pub fn insert(&mut self, class: AddressClass, address: String) -> bool {
        self.set_mut(class).insert(address)
    }

    /// Union another partition into this one.
    pub fn merge(&mut self, other: Partition) {
        let Partition { private, public } = other;
        union_into(&mut self.private, private);
        union_into(&mut self.public, public);
    }

    /// The addresses of one class.
    #[inline]
    #[must_use]
    pub fn set(&self, class: AddressClass) -> &FxHashSet<String> {
        match class {
            AddressClass::Private => &self.private,
            AddressClass::Public => &self.public,
        }
    }

    #[inline]
    fn set_mut(&mut self, class: AddressClass) -> &mut FxHashSet<String> {
        match class {
            AddressClass::Private => &mut self.private,
            AddressClass::Public => &mut self.public,
        }
    }

    /// Whether both sets are empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.private.is_empty() && self.public.is_empty()
    }

    /// Sort both sets into a finished [`Harvest`].
    #[must_use]
    pub fn finish(self, order: SortOrder) -> Harvest {
        Harvest {
            private: sorted(self.private, order),
            public: sorted(self.public, order),
        }
    }
}

// drain the smaller set into the larger one
fn union_into(ours: &mut FxHashSet<String>, mut theirs: FxHashSet<String>) {
    if theirs.len() > ours.len() {
        std::mem::swap(ours, &mut theirs);
    }
    ours.extend(theirs);
}

fn sorted(set: FxHashSet<String>, order: SortOrder) -> Vec<String> {
    let mut list: Vec<String> = set.into_iter().collect();
    match order {
        SortOrder::Lexicographic => list.sort_unstable(),
        SortOrder::Numeric => list.sort_unstable_by_key(|s| {
            // every member already passed the classifier
            s.parse::<Ipv4Addr>().map(u32::from).unwrap_or(u32::MAX)
        }),
    }
    list
}

/// The final, sorted result of one extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Harvest {
    private: Vec<String>,
    public: Vec<String>,
}

impl Harvest {
    /// Sorted private addresses.
    #[inline]
    #[must_use]
    pub fn private(&self) -> &[String] {
        &self.private
    }

    /// Sorted public addresses.
    #[inline]
    #[must_use]
    pub fn public(&self) -> &[String] {
        &self.public
    }

    /// Sorted addresses of one class.
    #[inline]
    #[must_use]
    pub fn addresses(&self, class: AddressClass) -> &[String] {
        match class {
            AddressClass::Private => &self.private,
            AddressClass::Public => &self.public,
        }
    }

    /// Whether nothing was found.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.private.is_empty() && self.public.is_empty()
    }

    /// Split into `(private, public)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.private, self.public)
    }
}

/// Test builds panic on any chunk containing this, to exercise worker failure.
#[cfg(test)]
pub(crate) const PANIC_MARKER: &[u8] = b"<<panic>>";

/// Matches and classifies the addresses of a single chunk.
///
/// Holds no mutable state, so one processor is shared by every worker.
#[derive(Clone, Debug)]
pub struct ChunkProcessor {
    matcher: PatternMatcher,
    classifier: AddressClassifier,
}

impl ChunkProcessor {
    #[must_use]
    pub fn new(matcher: PatternMatcher, classifier: AddressClassifier) -> Self {
        ChunkProcessor {
            matcher,
            classifier,
        }
    }

    /// The classifier used for candidates.
    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &AddressClassifier {
        &self.classifier
    }

    /// Process one chunk into its private and public address sets.
    pub fn process(&self, chunk: &Chunk) -> Partition {
        let data = chunk.data();
        #[cfg(test)]
        if data.windows(PANIC_MARKER.len()).any(|w| w == PANIC_MARKER) {
            panic!("chunk {} hit the panic marker", chunk.index());
        }
        let mut seen: FxHashSet<&[u8]> = FxHashSet::default();
        let mut partition = Partition::default();

        for range in self.matcher.find_iter(data, chunk.edges()) {
            let candidate = &data[range];
            if !seen.insert(candidate) {
                continue;
            }
            match self.classifier.classify_bytes(candidate) {
                Some(class) => {
                    partition.insert(class, candidate.to_str_lossy().into_owned());
                }
                None => trace!(
                    chunk = chunk.index(),
                    candidate = %candidate.as_bstr(),
                    "dropping unclassifiable candidate"
                ),
            }
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> ChunkProcessor {
        ChunkProcessor::new(PatternMatcher::new().unwrap(), AddressClassifier::default())
    }

    fn sorted_set(set: &FxHashSet<String>) -> Vec<&str> {
        let mut v: Vec<&str> = set.iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn partitions_and_dedupes_one_chunk() {
        let chunk = Chunk::whole(
            b"10.0.0.1 8.8.8.8 10.0.0.1 8.8.8.8 1.1.1.1 0.0.0.0 224.0.0.1 01.2.3.4".to_vec(),
        );
        let partition = processor().process(&chunk);
        assert_eq!(sorted_set(partition.set(AddressClass::Private)), ["10.0.0.1"]);
        assert_eq!(
            sorted_set(partition.set(AddressClass::Public)),
            ["1.1.1.1", "8.8.8.8"]
        );
    }

    #[test]
    fn members_reclassify_to_their_own_set() {
        let chunk = Chunk::whole(
            b"172.16.5.4 172.32.5.4 192.168.9.9 127.0.0.1 100.64.0.1 10.10.10.10".to_vec(),
        );
        let processor = processor();
        let partition = processor.process(&chunk);
        for class in AddressClass::ALL {
            for addr in partition.set(class) {
                assert_eq!(processor.classifier().classify(addr), Some(class));
            }
        }
    }

    #[test]
    fn merge_is_a_union() {
        let mut a = Partition::default();
        a.insert(AddressClass::Public, "8.8.8.8".into());
        a.insert(AddressClass::Private, "10.0.0.1".into());
        let mut b = Partition::default();
        b.insert(AddressClass::Public, "8.8.8.8".into());
        b.insert(AddressClass::Public, "1.1.1.1".into());
        b.insert(AddressClass::Public, "9.9.9.9".into());

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.set(AddressClass::Public).len(), 3);
        assert_eq!(ab.set(AddressClass::Private).len(), 1);
    }

    #[test]
    fn lexicographic_and_numeric_orders() {
        let mut p = Partition::default();
        for a in ["10.0.0.100", "10.0.0.2", "10.0.0.20"] {
            p.insert(AddressClass::Private, a.into());
        }
        assert_eq!(
            p.clone().finish(SortOrder::Lexicographic).private(),
            ["10.0.0.100", "10.0.0.2", "10.0.0.20"]
        );
        assert_eq!(
            p.finish(SortOrder::Numeric).private(),
            ["10.0.0.2", "10.0.0.20", "10.0.0.100"]
        );
    }
}
