use std::io::{self, BufRead, BufReader, Read};
use std::mem;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::debug;

/// Splits a byte stream on `\r` as well as `\n`.
///
/// ffmpeg redraws its statistics line with bare carriage returns, so a plain
/// `lines()` would hold every progress update until the encode finishes.
pub struct OutputLines<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        OutputLines { reader, pending: Vec::new() }
    }

    fn take_pending(&mut self) -> Option<String> {
        let bytes = mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim_end();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

impl<R: BufRead> Iterator for OutputLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(Err(err)),
            };

            if available.is_empty() {
                return self.take_pending().map(Ok);
            }

            match available.iter().position(|b| *b == b'\r' || *b == b'\n') {
                Some(end) => {
                    self.pending.extend_from_slice(&available[..end]);
                    self.reader.consume(end + 1);
                    if let Some(line) = self.take_pending() {
                        return Some(Ok(line));
                    }
                },
                None => {
                    let len = available.len();
                    self.pending.extend_from_slice(available);
                    self.reader.consume(len);
                },
            }
        }
    }
}

/// Reads both child streams on their own threads and merges their lines.
///
/// The receiver disconnects once both streams reach end of file or fail.
pub fn merge<A, B>(stdout: A, stderr: B) -> Receiver<io::Result<String>>
where
    A: Read + Send + 'static,
    B: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let stderr_tx = tx.clone();
    thread::spawn(move || forward("stdout", stdout, tx));
    thread::spawn(move || forward("stderr", stderr, stderr_tx));
    rx
}

fn forward<R: Read>(name: &str, stream: R, tx: mpsc::Sender<io::Result<String>>) {
    for line in OutputLines::new(BufReader::new(stream)) {
        let failed = line.is_err();
        if tx.send(line).is_err() {
            debug!(stream = name, "line receiver dropped");
            return;
        }
        if failed {
            return;
        }
    }
    debug!(stream = name, "end of stream");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(input: &[u8]) -> Vec<String> {
        OutputLines::new(Cursor::new(input.to_vec()))
            .map(|l| l.unwrap())
            .collect()
    }

    #[test]
    fn test_newlines() {
        assert_eq!(split(b"one\ntwo\nthree"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_carriage_returns() {
        let input = b"frame=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\nvideo:1kB\r\n";
        assert_eq!(split(input), vec![
            "frame=1 time=00:00:01.00",
            "frame=2 time=00:00:02.00",
            "video:1kB",
        ]);
    }

    #[test]
    fn test_blank_fragments_dropped() {
        assert_eq!(split(b"\r\n\n  \r\nlast   \n"), vec!["last"]);
        assert!(split(b"").is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(split(b"bad \xff byte\n"), vec!["bad \u{fffd} byte"]);
    }

    #[test]
    fn test_small_buffer() {
        let reader = BufReader::with_capacity(3, Cursor::new(b"abcdefgh\rij\n".to_vec()));
        let lines: Vec<String> = OutputLines::new(reader).map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["abcdefgh", "ij"]);
    }

    #[test]
    fn test_merge() {
        let rx = merge(Cursor::new(b"out 1\nout 2\n".to_vec()), Cursor::new(b"err 1\rerr 2\r".to_vec()));
        let mut lines: Vec<String> = rx.iter().map(|l| l.unwrap()).collect();
        lines.sort();
        assert_eq!(lines, vec!["err 1", "err 2", "out 1", "out 2"]);
    }
}
