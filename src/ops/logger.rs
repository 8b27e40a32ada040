use crossbeam_channel::bounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::TrySendError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// one audit record on the hot path. value type; copied onto the queue
/// so producers never share state with the consumer.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: Instant,
    pub level: log::Level,
    pub layer: &'static str,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: log::Level, layer: &'static str, message: impl Into<String>) -> Self {
        Self {
            at: Instant::now(),
            level,
            layer,
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggerStats {
    pub queued: AtomicU64,
    pub dropped: AtomicU64,
    pub batches: AtomicU64,
}

/// non-blocking audit logger: producers push onto a bounded channel
/// and move on; a consumer thread drains in batches and hands them to
/// the standard log facade. when the queue is full the entry is
/// dropped and counted, never waited on.
pub struct AsyncLogger {
    sender: Sender<LogEntry>,
    stats: Arc<LoggerStats>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl AsyncLogger {
    pub fn new(capacity: usize, batch_size: usize, flush_interval: Duration) -> Self {
        let (sender, receiver) = bounded(capacity);
        let stats = Arc::new(LoggerStats::default());
        let worker_stats = stats.clone();
        let worker = std::thread::Builder::new()
            .name("async-logger".into())
            .spawn(move || Self::drain(receiver, worker_stats, batch_size, flush_interval))
            .expect("spawn logger thread");
        Self {
            sender,
            stats,
            worker: Some(worker),
        }
    }

    /// push without blocking; full queue drops and counts
    pub fn emit(&self, entry: LogEntry) {
        match self.sender.try_send(entry) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn info(&self, layer: &'static str, message: impl Into<String>) {
        self.emit(LogEntry::new(log::Level::Info, layer, message));
    }
    pub fn debug(&self, layer: &'static str, message: impl Into<String>) {
        self.emit(LogEntry::new(log::Level::Debug, layer, message));
    }
    pub fn warn(&self, layer: &'static str, message: impl Into<String>) {
        self.emit(LogEntry::new(log::Level::Warn, layer, message));
    }

    pub fn queued(&self) -> u64 {
        self.stats.queued.load(Ordering::Relaxed)
    }
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    fn drain(
        receiver: Receiver<LogEntry>,
        stats: Arc<LoggerStats>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut batch = Vec::with_capacity(batch_size);
        loop {
            match receiver.recv_timeout(flush_interval) {
                Ok(entry) => {
                    batch.push(entry);
                    while batch.len() < batch_size {
                        match receiver.try_recv() {
                            Ok(entry) => batch.push(entry),
                            Err(_) => break,
                        }
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    Self::flush(&mut batch, &stats);
                    return;
                }
            }
            if !batch.is_empty() {
                Self::flush(&mut batch, &stats);
            }
        }
    }

    fn flush(batch: &mut Vec<LogEntry>, stats: &LoggerStats) {
        for entry in batch.drain(..) {
            log::log!(entry.level, "[{}] {}", entry.layer, entry.message);
        }
        stats.batches.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        // closing the channel lets the worker flush and exit
        let (closed, _) = bounded(0);
        self.sender = closed;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let logger = AsyncLogger::new(2, 100, Duration::from_secs(60));
        let start = Instant::now();
        for i in 0..50 {
            logger.emit(LogEntry::new(log::Level::Info, "test", format!("entry {}", i)));
        }
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(logger.queued() + logger.dropped() == 50);
    }

    #[test]
    fn entries_eventually_flush() {
        let logger = AsyncLogger::new(100, 10, Duration::from_millis(10));
        for _ in 0..5 {
            logger.info("test", "hello");
        }
        std::thread::sleep(Duration::from_millis(100));
        assert!(logger.queued() == 5);
        assert!(logger.dropped() == 0);
    }
}
