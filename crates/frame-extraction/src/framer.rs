//! Scans a decoder subprocess's raw stdout byte stream for complete JPEG
//! frames, delimited by the start-of-image (`0xFFD8`) and end-of-image
//! (`0xFFD9`) markers. The caller (`manager::run_session`) forwards each
//! frame this produces through a bounded channel to a separate consumer
//! task, rather than processing it inline in the loop draining the pipe.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct JpegFramer {
    accumulator: Vec<u8>,
    cap_bytes: usize,
}

impl JpegFramer {
    pub fn new(cap_bytes: usize) -> Self {
        Self { accumulator: Vec::new(), cap_bytes }
    }

    /// Feed newly-read bytes in; returns every complete JPEG frame found.
    /// Resets the accumulator (dropping any partial frame) if it would
    /// exceed `cap_bytes`, or if the stream desyncs (an EOI with no prior SOI).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.accumulator.extend_from_slice(chunk);
        if self.accumulator.len() > self.cap_bytes {
            self.accumulator.clear();
            return Vec::new();
        }

        let mut frames = Vec::new();
        loop {
            let Some(start) = find(&self.accumulator, &SOI) else {
                // No start marker yet; keep at most the cap worth of tail data.
                break;
            };
            let Some(end) = find(&self.accumulator[start + 2..], &EOI) else {
                if start > 0 {
                    self.accumulator.drain(0..start);
                }
                break;
            };
            let end_abs = start + 2 + end + 2;
            frames.push(self.accumulator[start..end_abs].to_vec());
            self.accumulator.drain(0..end_abs);
        }
        frames
    }

    pub fn reset(&mut self) {
        self.accumulator.clear();
    }

    pub fn accumulator_len(&self) -> usize {
        self.accumulator.len()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8];
        v.extend_from_slice(body);
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn single_complete_frame_in_one_chunk() {
        let mut framer = JpegFramer::new(5 * 1024 * 1024);
        let frame = jpeg(b"hello");
        let out = framer.feed(&frame);
        assert_eq!(out, vec![frame]);
        assert_eq!(framer.accumulator_len(), 0);
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut framer = JpegFramer::new(5 * 1024 * 1024);
        let frame = jpeg(b"split-body");
        let (a, b) = frame.split_at(frame.len() / 2);
        assert!(framer.feed(a).is_empty());
        let out = framer.feed(b);
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn two_back_to_back_frames_both_extracted() {
        let mut framer = JpegFramer::new(5 * 1024 * 1024);
        let f1 = jpeg(b"one");
        let f2 = jpeg(b"two");
        let mut combined = f1.clone();
        combined.extend_from_slice(&f2);
        let out = framer.feed(&combined);
        assert_eq!(out, vec![f1, f2]);
    }

    #[test]
    fn oversized_accumulator_resets_and_drops() {
        let mut framer = JpegFramer::new(8);
        // No EOI ever arrives; accumulator should reset once it exceeds the cap.
        let out = framer.feed(&[0xFF, 0xD8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert!(out.is_empty());
        assert_eq!(framer.accumulator_len(), 0);
    }

    #[test]
    fn garbage_before_start_marker_is_discarded() {
        let mut framer = JpegFramer::new(5 * 1024 * 1024);
        let mut noisy = vec![1, 2, 3];
        noisy.extend_from_slice(&jpeg(b"x"));
        let out = framer.feed(&noisy);
        assert_eq!(out, vec![jpeg(b"x")]);
    }
}
