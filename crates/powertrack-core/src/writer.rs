//! Dedicated writer thread: the only place rows reach the output file

use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError};

use crate::codec::Row;
use crate::shutdown::{CancelToken, POLL_INTERVAL};
use crate::sink::CsvSink;

/// Receives rows from fetch workers and writes them in arrival order.
///
/// Runs until every sender is dropped (normal drain) or `abort` fires
/// (forced stop after the grace period). The sink is flushed and closed
/// on both paths. On a write error `on_error` is cancelled so the
/// coordinator stops feeding work.
pub struct RowWriter {
    rx: Receiver<Row>,
    sink: CsvSink,
    abort: CancelToken,
    on_error: CancelToken,
}

impl RowWriter {
    pub fn new(rx: Receiver<Row>, sink: CsvSink, abort: CancelToken, on_error: CancelToken) -> Self {
        Self {
            rx,
            sink,
            abort,
            on_error,
        }
    }

    /// Writer loop; returns the number of rows written
    pub fn run(self) -> io::Result<u64> {
        let Self {
            rx,
            mut sink,
            abort,
            on_error,
        } = self;

        let result = loop {
            if abort.is_cancelled() {
                let dropped = rx.try_iter().count();
                if dropped > 0 {
                    log::warn!("Writer aborted, {dropped} queued rows dropped");
                }
                break Ok(());
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(row) => {
                    if let Err(e) = sink.write_row(&row) {
                        break Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break Ok(()),
            }
        };

        match result.and_then(|()| sink.finish()) {
            Ok(rows) => Ok(rows),
            Err(e) => {
                log::error!("Row writer failed: {e}");
                on_error.cancel();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn sink(dir: &tempfile::TempDir) -> CsvSink {
        CsvSink::open(&dir.path().join("w.csv"), &["v".to_string()], false).unwrap()
    }

    #[test]
    fn drains_until_senders_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        let writer = RowWriter::new(rx, sink(&dir), CancelToken::new(), CancelToken::new());
        let handle = std::thread::spawn(move || writer.run());

        let tx2 = tx.clone();
        for i in 0..50 {
            tx.send(vec![i.to_string()]).unwrap();
            tx2.send(vec![(i + 100).to_string()]).unwrap();
        }
        drop(tx);
        drop(tx2);

        assert_eq!(handle.join().unwrap().unwrap(), 100);
        let text = std::fs::read_to_string(dir.path().join("w.csv")).unwrap();
        assert_eq!(text.lines().count(), 101);
        assert_eq!(text.lines().next(), Some("v"));
    }

    #[test]
    fn abort_stops_with_live_senders() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel::<Row>();
        let abort = CancelToken::new();
        let writer = RowWriter::new(rx, sink(&dir), abort.clone(), CancelToken::new());
        let handle = std::thread::spawn(move || writer.run());

        tx.send(vec!["kept".into()]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        abort.cancel();

        assert_eq!(handle.join().unwrap().unwrap(), 1);
        drop(tx);
        let text = std::fs::read_to_string(dir.path().join("w.csv")).unwrap();
        assert_eq!(text, "v\nkept\n");
    }
}
