use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct LineBufferConfig {
    /// An unterminated run longer than this is force-flushed as one line.
    pub max_line_size: usize,
    /// Complete lines retained before the oldest are dropped.
    pub max_lines: usize,
}

impl Default for LineBufferConfig {
    fn default() -> Self {
        Self {
            max_line_size: 64 * 1024,
            max_lines: 1000,
        }
    }
}

/// Bounded in-memory line assembly between pipe reads and the disk writer.
/// Holding only complete lines keeps a restart from splicing two processes'
/// half-lines together in the sink.
#[derive(Debug)]
pub struct LineBuffer {
    config: LineBufferConfig,
    state: Mutex<BufferState>,
}

#[derive(Debug)]
struct BufferState {
    lines: VecDeque<Bytes>,
    partial: BytesMut,
    dropped: u64,
}

impl LineBuffer {
    pub fn new(config: LineBufferConfig) -> Self {
        let capacity = config.max_lines;
        Self {
            config,
            state: Mutex::new(BufferState {
                lines: VecDeque::with_capacity(capacity),
                partial: BytesMut::with_capacity(4096),
                dropped: 0,
            }),
        }
    }

    /// Append raw bytes; complete lines become available for draining.
    pub fn push(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.partial.extend_from_slice(data);

        loop {
            let Some(pos) = state.partial.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line = state.partial.split_to(pos + 1).freeze();
            Self::store(&mut state, self.config.max_lines, line);
        }

        if state.partial.len() > self.config.max_line_size {
            let line = state.partial.split().freeze();
            Self::store(&mut state, self.config.max_lines, line);
        }
    }

    fn store(state: &mut BufferState, max_lines: usize, line: Bytes) {
        state.lines.push_back(line);
        while state.lines.len() > max_lines {
            state.lines.pop_front();
            state.dropped += 1;
        }
    }

    /// Atomically take every complete line.
    pub fn drain(&self) -> Vec<Bytes> {
        self.state.lock().lines.drain(..).collect()
    }

    /// Take whatever unterminated tail remains (used on close so the last
    /// words of a dying process are not lost).
    pub fn take_partial(&self) -> Option<Bytes> {
        let mut state = self.state.lock();
        if state.partial.is_empty() {
            None
        } else {
            Some(state.partial.split().freeze())
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.lines.is_empty() && state.partial.is_empty()
    }

    /// Lines discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines_and_keeps_partial() {
        let buffer = LineBuffer::new(LineBufferConfig::default());
        buffer.push(b"line 1\nline 2\ntail");

        let lines = buffer.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"line 1\n");
        assert_eq!(&lines[1][..], b"line 2\n");
        assert_eq!(&buffer.take_partial().unwrap()[..], b"tail");
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_spanning_pushes_is_reassembled() {
        let buffer = LineBuffer::new(LineBufferConfig::default());
        buffer.push(b"hel");
        buffer.push(b"lo\n");
        let lines = buffer.drain();
        assert_eq!(&lines[0][..], b"hello\n");
    }

    #[test]
    fn oversized_run_is_force_flushed() {
        let buffer = LineBuffer::new(LineBufferConfig {
            max_line_size: 8,
            max_lines: 16,
        });
        buffer.push(b"a very long line with no newline at all");
        let lines = buffer.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].len() > 8);
    }

    #[test]
    fn oldest_lines_are_dropped_when_full() {
        let buffer = LineBuffer::new(LineBufferConfig {
            max_line_size: 1024,
            max_lines: 2,
        });
        buffer.push(b"1\n2\n3\n4\n");
        let lines = buffer.drain();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"3\n");
        assert_eq!(&lines[1][..], b"4\n");
        assert_eq!(buffer.dropped(), 2);
    }
}
