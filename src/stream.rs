//! Snapshot streams: watch a task as a `Stream` of whole states.
//!
//! The orchestrator publishes a fresh [`TaskSnapshot`] on a
//! `tokio::sync::watch` channel after every mutation. A watch channel keeps
//! only the latest value, so a slow consumer skips intermediate snapshots
//! rather than falling behind. It always sees the newest state.
//!
//! [`settled`] cuts a snapshot stream off after the first settled snapshot,
//! which is what "wait for the task, showing progress" wants.

use crate::orchestrator::TaskSnapshot;
use futures::stream::StreamExt;
use std::pin::Pin;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// A boxed stream of task snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = TaskSnapshot> + Send>>;

/// Stream every published snapshot, starting with the current one.
pub fn snapshot_stream(rx: watch::Receiver<TaskSnapshot>) -> SnapshotStream {
    Box::pin(WatchStream::new(rx))
}

/// Yield snapshots up to and including the first settled one.
pub fn settled(stream: SnapshotStream) -> SnapshotStream {
    Box::pin(
        stream
            .scan(false, |done, snapshot| {
                if *done {
                    return futures::future::ready(None);
                }
                *done = snapshot.is_settled();
                futures::future::ready(Some(snapshot))
            })
            .fuse(),
    )
}
