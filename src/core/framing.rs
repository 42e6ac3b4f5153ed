//! Newline framing for chunked byte streams.
//!
//! Chunks arrive with arbitrary boundaries. The framer carries any
//! unterminated tail forward so that a frame is only ever emitted once its
//! terminator has been seen.

/// Frame terminator.
pub const TERMINATOR: u8 = b'\n';

/// A complete, terminator-stripped byte run.
pub type Frame = Vec<u8>;

/// Splits a byte stream into newline-delimited frames.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes after the last terminator seen so far
    carry: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completes, in order.
    ///
    /// A chunk without a terminator only grows the carry buffer.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut start = 0;

        for (offset, _) in chunk
            .iter()
            .enumerate()
            .filter(|(_, byte)| **byte == TERMINATOR)
        {
            let piece = &chunk[start..offset];
            if self.carry.is_empty() {
                frames.push(piece.to_vec());
            } else {
                let mut frame = std::mem::take(&mut self.carry);
                frame.extend_from_slice(piece);
                frames.push(frame);
            }
            start = offset + 1;
        }

        self.carry.extend_from_slice(&chunk[start..]);
        frames
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Drop the unterminated tail, returning how many bytes were discarded.
    ///
    /// Called at end of stream: a tail without a terminator cannot be told
    /// apart from a truncated record, so it is never surfaced.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.carry.len();
        self.carry.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> (Vec<Frame>, usize) {
        let mut framer = LineFramer::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(framer.feed(chunk));
        }
        (frames, framer.pending_len())
    }

    #[test]
    fn test_single_chunk_multiple_frames() {
        let (frames, pending) = feed_all(&[b"one\ntwo\nthree\n"]);
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(pending, 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let (frames, pending) = feed_all(&[b"{\"a\":1}\n{\"a\":2", b"}\n"]);
        assert_eq!(frames, vec![b"{\"a\":1}".to_vec(), b"{\"a\":2}".to_vec()]);
        assert_eq!(pending, 0);
    }

    #[test]
    fn test_chunk_without_terminator_only_buffers() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"partial").is_empty());
        assert!(framer.feed(b" still partial").is_empty());
        assert_eq!(framer.pending_len(), 21);

        let frames = framer.feed(b"\n");
        assert_eq!(frames, vec![b"partial still partial".to_vec()]);
    }

    #[test]
    fn test_consecutive_terminators_yield_empty_frames() {
        let (frames, _) = feed_all(&[b"a\n\n", b"\nb\n"]);
        assert_eq!(frames.len(), 4);
        assert!(frames[1].is_empty());
        assert!(frames[2].is_empty());
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let stream: &[u8] = b"{\"x\":1}\n{\"x\":22}\nnot json\n\n{\"y\":[1,2,3]}\ntail";
        let terminators = stream.iter().filter(|b| **b == TERMINATOR).count();
        let (expected, _) = feed_all(&[stream]);
        assert_eq!(expected.len(), terminators);

        for size in 1..stream.len() {
            let chunks: Vec<&[u8]> = stream.chunks(size).collect();
            let (frames, pending) = feed_all(&chunks);
            assert_eq!(frames, expected, "chunk size {size}");
            assert_eq!(pending, 4);
        }
    }

    #[test]
    fn test_discard_pending_tail() {
        let mut framer = LineFramer::new();
        framer.feed(b"done\nunfinished");
        assert_eq!(framer.discard_pending(), 10);
        assert_eq!(framer.pending_len(), 0);
        assert!(framer.feed(b"\n")[0].is_empty());
    }
}
