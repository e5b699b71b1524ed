// src/system/stdin.rs

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

const CHUNK_SIZE: usize = 32 * 1024;

/// Reads `source` on a background thread and broadcasts every chunk to
/// `consumers` readers. Each reader sees the full stream followed by end of
/// file. A reader dropped early is simply skipped.
pub fn fan_out(mut source: Box<dyn Read + Send>, consumers: usize) -> Vec<ChannelReader> {
    let (senders, readers): (Vec<Sender<Vec<u8>>>, Vec<ChannelReader>) = (0..consumers)
        .map(|_| {
            let (tx, rx) = mpsc::channel();
            (tx, ChannelReader::new(rx))
        })
        .unzip();

    thread::spawn(move || {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Reading standard input failed: {}", e);
                    break;
                }
            };
            let chunk = buf.get(..read).unwrap_or_default();
            let delivered = senders
                .iter()
                .filter(|tx| tx.send(chunk.to_vec()).is_ok())
                .count();
            if delivered == 0 {
                log::debug!("All stdin consumers are gone; stop reading");
                break;
            }
        }
    });

    readers
}

/// The receiving end of a [`fan_out`] broadcast.
#[derive(Debug)]
pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                // Sender gone: the source reached end of file.
                Err(_) => return Ok(0),
            }
        }
        let available = self.pending.get(self.pos..).unwrap_or_default();
        let n = available.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), available.get(..n)) {
            dst.copy_from_slice(src);
        }
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_reader_sees_the_whole_stream() {
        let readers = fan_out(Box::new(&b"line one\nline two\n"[..]), 3);
        assert_eq!(readers.len(), 3);
        for mut reader in readers {
            let mut text = String::new();
            reader.read_to_string(&mut text).unwrap();
            assert_eq!(text, "line one\nline two\n");
        }
    }

    #[test]
    fn test_dropped_reader_does_not_block_others() {
        let mut readers = fan_out(Box::new(io::repeat(b'x').take(100_000)), 2);
        drop(readers.pop());
        let mut total = Vec::new();
        readers.pop().unwrap().read_to_end(&mut total).unwrap();
        assert_eq!(total.len(), 100_000);
    }
}
