use std::io::BufRead;

/// Reads newline-separated byte-string keys from `buf`, skipping empty lines.
pub struct RawLines<B>(pub B);

impl<B: BufRead> Iterator for RawLines<B> {
    type Item = std::io::Result<Box<[u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = Vec::new();
            match self.0.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') { buf.pop(); }
                    }
                    if !buf.is_empty() {
                        return Some(Ok(buf.into_boxed_slice()));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Xor-shift generator of 32-bit keys; the state (and so the seed) must be non-zero.
pub struct XorShift32(pub u32);

impl Iterator for XorShift32 {
    type Item = u32;

    #[inline] fn next(&mut self) -> Option<u32> {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        Some(self.0)
    }
}

/// Xor-shift generator of 64-bit keys; the state (and so the seed) must be non-zero.
pub struct XorShift64(pub u64);

impl Iterator for XorShift64 {
    type Item = u64;

    #[inline] fn next(&mut self) -> Option<u64> {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        Some(self.0)
    }
}
