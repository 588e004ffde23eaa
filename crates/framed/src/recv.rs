use crate::error::FrameError;
use crate::frame::{LEN_HEADER_SIZE, decode_len};

/// Initial body buffer capacity, matching the original's starting
/// reservation before any doubling kicks in.
const INITIAL_RESERVE: usize = 1024;

enum Phase {
    /// Waiting for the 4-byte length prefix.
    Header { buf: [u8; LEN_HEADER_SIZE], have: usize },
    /// Reading the body of a frame whose length is already known.
    Body { len: usize, buf: Vec<u8> },
}

/// Per-connection incremental frame assembler.
///
/// Lives only on the reactor thread: nothing here is shared or synchronized.
/// `feed` consumes however many bytes a single non-blocking read produced,
/// which may span zero, one, or several frames, and calls `on_frame` once
/// per frame fully assembled.
pub struct RecvState {
    max_frame_len: u32,
    phase: Phase,
}

impl RecvState {
    pub fn new(max_frame_len: u32) -> Self {
        Self { max_frame_len, phase: Phase::Header { buf: [0; LEN_HEADER_SIZE], have: 0 } }
    }

    /// Feeds newly read bytes through the state machine.
    ///
    /// `on_frame` is called with the completed body of each frame found in
    /// `src`, in order. Returns an error the first time a frame violates a
    /// codec invariant (declared zero length, length over the configured
    /// maximum, or an allocation failure growing the body buffer) — the
    /// caller must treat the connection as dead at that point, the same way
    /// any other fatal per-connection error is handled.
    pub fn feed(
        &mut self,
        mut src: &[u8],
        mut on_frame: impl FnMut(Vec<u8>),
    ) -> Result<(), FrameError> {
        while !src.is_empty() {
            match &mut self.phase {
                Phase::Header { buf, have } => {
                    let need = LEN_HEADER_SIZE - *have;
                    let take = need.min(src.len());
                    buf[*have..*have + take].copy_from_slice(&src[..take]);
                    *have += take;
                    src = &src[take..];

                    if *have == LEN_HEADER_SIZE {
                        let len = decode_len(buf);
                        if len == 0 {
                            return Err(FrameError::EmptyFrame);
                        }
                        if len > self.max_frame_len {
                            return Err(FrameError::TooLarge { len, max: self.max_frame_len });
                        }
                        let mut body = Vec::new();
                        grow_for(&mut body, len as usize)?;
                        self.phase = Phase::Body { len: len as usize, buf: body };
                    }
                }

                Phase::Body { len, buf } => {
                    let remain = *len - buf.len();
                    let take = remain.min(src.len());
                    buf.extend_from_slice(&src[..take]);
                    src = &src[take..];

                    if buf.len() == *len {
                        let done = core::mem::take(buf);
                        on_frame(done);
                        self.phase = Phase::Header { buf: [0; LEN_HEADER_SIZE], have: 0 };
                    }
                }
            }
        }
        Ok(())
    }
}

/// Grows `buf`'s capacity to at least `need` bytes, doubling from
/// [`INITIAL_RESERVE`] rather than reserving exactly `need` in one shot.
fn grow_for(buf: &mut Vec<u8>, need: usize) -> Result<(), FrameError> {
    if buf.capacity() >= need {
        return Ok(());
    }
    let mut target = buf.capacity().max(INITIAL_RESERVE);
    while target < need {
        target *= 2;
    }
    let additional = target - buf.capacity();
    buf.try_reserve_exact(additional).map_err(|_| FrameError::Alloc(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn assembles_single_frame_delivered_whole() {
        let mut state = RecvState::new(u32::MAX);
        let mut got = Vec::new();
        state.feed(&frame(b"hello"), |f| got.push(f)).unwrap();
        assert_eq!(got, vec![b"hello".to_vec()]);
    }

    #[test]
    fn assembles_frame_delivered_one_byte_at_a_time() {
        let mut state = RecvState::new(u32::MAX);
        let mut got = Vec::new();
        for byte in frame(b"hello world") {
            state.feed(&[byte], |f| got.push(f)).unwrap();
        }
        assert_eq!(got, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn assembles_multiple_frames_in_one_read() {
        let mut state = RecvState::new(u32::MAX);
        let mut buf = frame(b"one");
        buf.extend(frame(b"two"));
        buf.extend(frame(b"three"));
        let mut got = Vec::new();
        state.feed(&buf, |f| got.push(f)).unwrap();
        assert_eq!(got, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn grows_buffer_past_initial_reserve_for_large_frames() {
        let body = vec![7u8; 300_000];
        let mut state = RecvState::new(u32::MAX);
        let mut got = Vec::new();
        state.feed(&frame(&body), |f| got.push(f)).unwrap();
        assert_eq!(got, vec![body]);
    }

    #[test]
    fn rejects_zero_length_frame() {
        let mut state = RecvState::new(u32::MAX);
        let err = state.feed(&0u32.to_be_bytes(), |_| panic!("no frame expected")).unwrap_err();
        assert!(matches!(err, FrameError::EmptyFrame));
    }

    #[test]
    fn rejects_frame_over_configured_max() {
        let mut state = RecvState::new(10);
        let err = state.feed(&frame(b"this is far more than ten bytes"), |_| {
            panic!("no frame expected")
        });
        assert!(matches!(err, Err(FrameError::TooLarge { max: 10, .. })));
    }

    /// A small deterministic xorshift so this test doesn't need an external
    /// RNG crate just to vary its input.
    struct Xorshift(u64);
    impl Xorshift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn arbitrary_byte_streams_never_panic() {
        let mut rng = Xorshift(0x5EED_u64);
        for _ in 0..200 {
            // cap the max frame length low so TooLarge triggers often, not
            // just EmptyFrame/Alloc paths.
            let mut state = RecvState::new(4096);
            let stream_len = (rng.next() % 2048) as usize;
            let bytes: Vec<u8> = (0..stream_len).map(|_| (rng.next() % 256) as u8).collect();

            // feed it in randomly sized chunks, matching how a real socket
            // read would never hand over the whole stream at once.
            let mut offset = 0;
            loop {
                let remaining = bytes.len() - offset;
                if remaining == 0 {
                    break;
                }
                let chunk_len = 1 + (rng.next() as usize % remaining);
                if state.feed(&bytes[offset..offset + chunk_len], |_frame| {}).is_err() {
                    // a fatal frame error is an acceptable outcome: the
                    // caller tears the connection down and moves on.
                    break;
                }
                offset += chunk_len;
            }
        }
    }
}
