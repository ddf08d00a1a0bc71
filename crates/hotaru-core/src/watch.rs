use std::path::Path;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Debounce window used by the supervisor unless overridden.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

const RAW_CAPACITY: usize = 256;
const BATCH_CAPACITY: usize = 16;

/// Coalesces raw filesystem notifications into debounced batches.
///
/// Raw events are buffered until no new event has arrived for the full
/// debounce window, then the buffer is flushed as one batch. A burst of
/// writes across a directory tree therefore produces a single batch instead
/// of one event per file.
pub struct Batcher {
	watcher: RecommendedWatcher,
	batches: mpsc::Receiver<Vec<Event>>,
}

impl Batcher {
	/// Must be called from within a tokio runtime; the debouncer runs as a
	/// background task for the life of the batcher.
	pub fn new(debounce: Duration) -> Result<Self, String> {
		let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
		let (batch_tx, batch_rx) = mpsc::channel(BATCH_CAPACITY);
		spawn_debouncer(debounce, raw_rx, batch_tx);

		// the callback runs on the notify thread, never on the runtime
		let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
			if let Ok(event) = res {
				let _ = raw_tx.blocking_send(event);
			}
		})
		.map_err(|e| format!("failed to create watcher: {}", e))?;

		Ok(Self {
			watcher,
			batches: batch_rx,
		})
	}

	/// Register a single directory. Registration is not recursive: the
	/// caller walks the tree and adds each subdirectory it finds, so
	/// directories created afterwards are not picked up.
	pub fn add(&mut self, dir: &Path) -> Result<(), String> {
		self.watcher
			.watch(dir, RecursiveMode::NonRecursive)
			.map_err(|e| format!("failed to watch {}: {}", dir.display(), e))
	}

	/// The next coalesced batch, or `None` once the event source is gone.
	pub async fn next(&mut self) -> Option<Vec<Event>> {
		self.batches.recv().await
	}
}

fn spawn_debouncer(
	debounce: Duration,
	mut raw: mpsc::Receiver<Event>,
	batches: mpsc::Sender<Vec<Event>>,
) {
	tokio::spawn(async move {
		let mut pending: Vec<Event> = Vec::new();
		loop {
			match tokio::time::timeout(debounce, raw.recv()).await {
				Ok(Some(event)) => pending.push(event),
				Ok(None) => break,
				Err(_) => {
					if !pending.is_empty() {
						let batch = std::mem::take(&mut pending);
						if batches.send(batch).await.is_err() {
							break;
						}
					}
				}
			}
		}
		tracing::debug!("debouncer stopped");
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{CreateKind, EventKind};
	use std::path::PathBuf;

	fn create_event(path: &str) -> Event {
		Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(path))
	}

	#[tokio::test]
	async fn burst_collapses_into_one_batch() {
		let (raw_tx, raw_rx) = mpsc::channel(16);
		let (batch_tx, mut batch_rx) = mpsc::channel(4);
		spawn_debouncer(Duration::from_millis(50), raw_rx, batch_tx);

		for i in 0..5 {
			raw_tx.send(create_event(&format!("file-{}.go", i))).await.unwrap();
		}

		let batch = batch_rx.recv().await.unwrap();
		assert_eq!(batch.len(), 5);

		// nothing left pending
		let next = tokio::time::timeout(Duration::from_millis(150), batch_rx.recv()).await;
		assert!(next.is_err());
	}

	#[tokio::test]
	async fn separated_bursts_become_separate_batches() {
		let (raw_tx, raw_rx) = mpsc::channel(16);
		let (batch_tx, mut batch_rx) = mpsc::channel(4);
		spawn_debouncer(Duration::from_millis(50), raw_rx, batch_tx);

		raw_tx.send(create_event("a.go")).await.unwrap();
		let first = batch_rx.recv().await.unwrap();
		assert_eq!(first.len(), 1);

		raw_tx.send(create_event("b.go")).await.unwrap();
		raw_tx.send(create_event("c.go")).await.unwrap();
		let second = batch_rx.recv().await.unwrap();
		assert_eq!(second.len(), 2);
	}

	#[tokio::test]
	async fn quiet_windows_emit_nothing() {
		let (_raw_tx, raw_rx) = mpsc::channel::<Event>(16);
		let (batch_tx, mut batch_rx) = mpsc::channel(4);
		spawn_debouncer(Duration::from_millis(20), raw_rx, batch_tx);

		let next = tokio::time::timeout(Duration::from_millis(100), batch_rx.recv()).await;
		assert!(next.is_err());
	}
}
