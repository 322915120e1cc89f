//! Lazy, forward-only iteration over query results.

use futures::{Stream, StreamExt, TryStreamExt};
use std::{
    fmt,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{backend::DocumentStream, error::ModelResult, record::Record};

/// A stream of records decoded from the documents returned by a query.
///
/// Each item is decoded when it is polled. A document that fails to decode yields an
/// `Err` at its position and the following documents are still produced.
pub struct Cursor<T> {
    documents: DocumentStream,
    marker: PhantomData<fn() -> T>,
}

impl<T: Record> Cursor<T> {
    pub(crate) fn new(documents: DocumentStream) -> Self {
        Self {
            documents,
            marker: PhantomData,
        }
    }

    /// Drains the cursor, stopping at the first error.
    pub async fn try_collect_all(self) -> ModelResult<Vec<T>> {
        self.try_collect().await
    }
}

impl<T: Record> Stream for Cursor<T> {
    type Item = ModelResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.documents.poll_next_unpin(cx).map(|next| {
            next.map(|document| -> ModelResult<T> { Ok(T::from_document(&document?)?) })
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}
