//! Compaction-time filtering and rewriting of stored lists.
//!
//! The store hands each stored value to a [`CompactionFilter`]; for list
//! state that filter is a [`ListSnapshotTransformer`], which decodes the list
//! element by element and asks an [`ElementTransformer`] what to keep.

use crate::codec::{encode_list, ElementCodec, ListDecoder};
use crate::error::Result;
use crate::store::CompactionFilter;
use std::sync::Arc;
use tracing::trace;

/// How a list transformer treats the elements after the first kept one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransformStrategy {
    /// Transform every element, re-encode the survivors.
    #[default]
    TransformAll,
    /// Stop at the first element the transformer keeps and return the
    /// original bytes from that element to the end, untouched.
    ///
    /// Only valid when the transformer is monotone over list order: once an
    /// element is kept, every later one would be kept unchanged too (for
    /// example TTL expiry over elements appended in time order).
    StopOnFirstIncluded,
}

/// Per-element filter or rewrite. `None` drops the element.
pub trait ElementTransformer<T>: Send + Sync {
    fn filter_or_transform(&self, element: T) -> Option<T>;

    fn strategy(&self) -> TransformStrategy {
        TransformStrategy::TransformAll
    }
}

/// [`ElementTransformer`] from a closure.
pub struct FnTransformer<F> {
    f: F,
    strategy: TransformStrategy,
}

impl<F> FnTransformer<F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            strategy: TransformStrategy::TransformAll,
        }
    }

    pub fn stop_on_first_included(f: F) -> Self {
        Self {
            f,
            strategy: TransformStrategy::StopOnFirstIncluded,
        }
    }
}

impl<T, F> ElementTransformer<T> for FnTransformer<F>
where
    F: Fn(T) -> Option<T> + Send + Sync,
{
    fn filter_or_transform(&self, element: T) -> Option<T> {
        (self.f)(element)
    }

    fn strategy(&self) -> TransformStrategy {
        self.strategy
    }
}

/// Applies an element transformer to whole encoded lists.
pub struct ListSnapshotTransformer<C, F> {
    codec: Arc<C>,
    transformer: F,
    name: String,
}

impl<C, F> ListSnapshotTransformer<C, F>
where
    C: ElementCodec,
    F: ElementTransformer<C::Item>,
{
    pub fn new(codec: Arc<C>, transformer: F) -> Self {
        let name = format!("list-transform({})", codec.name());
        Self {
            codec,
            transformer,
            name,
        }
    }

    pub fn strategy(&self) -> TransformStrategy {
        self.transformer.strategy()
    }

    /// Filter one stored value.
    ///
    /// `None` in gives `None` out. A list whose elements are all dropped
    /// becomes `None` so the key is removed. Decoding failures are errors;
    /// nothing is guessed.
    pub fn transform(&self, value: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let Some(value) = value else {
            return Ok(None);
        };

        let strategy = self.transformer.strategy();
        let mut decoder = ListDecoder::new(&*self.codec, value);
        let mut kept = Vec::new();
        let mut dropped = 0usize;

        while let Some(next) = decoder.next() {
            match self.transformer.filter_or_transform(next?) {
                Some(element) => match strategy {
                    TransformStrategy::StopOnFirstIncluded => {
                        trace!(dropped, offset = decoder.element_start(), "kept list suffix");
                        return Ok(Some(decoder.suffix_from_current().to_vec()));
                    }
                    TransformStrategy::TransformAll => kept.push(element),
                },
                None => dropped += 1,
            }
        }

        trace!(kept = kept.len(), dropped, "transformed list");
        if kept.is_empty() {
            Ok(None)
        } else {
            Ok(Some(encode_list(&*self.codec, &kept)?))
        }
    }
}

impl<C, F> CompactionFilter for ListSnapshotTransformer<C, F>
where
    C: ElementCodec,
    F: ElementTransformer<C::Item>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_or_transform(&self, value: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.transform(value)
    }
}
