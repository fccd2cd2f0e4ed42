//! Bitcoin's double-SHA256 hash, computed incrementally over a `Write` sink.
//!
//! Hashing a header or transaction is just serializing it into this writer
//! and reading the digest back out, so the hash of any `BitcoinSerialize`
//! value is always consistent with its wire bytes.

use sha2::{Digest, Sha256};

/// An incremental double-SHA256 hasher exposed as an [`io::Write`](std::io::Write) sink.
#[derive(Default, Clone)]
pub struct Writer(Sha256);

impl Writer {
    /// Consumes the writer and returns the double-SHA256 digest of everything
    /// written to it, in the internal (little-endian) byte order Bitcoin
    /// uses for on-disk and on-wire hashes.
    pub fn finish(self) -> [u8; 32] {
        let first = self.0.finalize();
        let second = Sha256::digest(&first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        out
    }
}

impl std::io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Returns the double-SHA256 digest of `data`.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut w = Writer::default();
    std::io::Write::write_all(&mut w, data).expect("writing to a Writer is infallible");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        // sha256d("") = 5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456
        // (double SHA256 of the empty string, a well known test vector)
        let digest = hash(b"");
        assert_eq!(
            hex::encode(digest),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
