//! Chunk-by-chunk read and write against the stripe files

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};

use super::StripedFile;
use crate::error::Result;

impl StripedFile<'_> {
    /// Write `data` at logical `offset`, returning the bytes written.
    ///
    /// Each iteration writes at most up to the end of the current chunk and
    /// advances by what the stripe actually accepted. Stripe files must
    /// already exist.
    pub fn write(&self, data: &[u8], offset: u64) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut current_offset = offset;

        while written < data.len() {
            let addr = self.layout.translate(current_offset);
            let remaining = (data.len() - written) as u64;
            let span = remaining.min(addr.bytes_available) as usize;
            let path = &self.paths[addr.stripe_index];

            let count = {
                let _guard = self.locks.lock(path);
                let mut file = OpenOptions::new().write(true).open(path)?;
                file.seek(SeekFrom::Start(addr.physical_offset))?;
                file.write(&data[written..written + span])?
            };

            if count == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("stripe {} accepted no data", path.display()),
                )
                .into());
            }

            written += count;
            current_offset += count as u64;
        }

        Ok(written)
    }

    /// Read up to `size` bytes from logical `offset`.
    ///
    /// Stops at the first iteration that yields no data, so the result is
    /// shorter than `size` at end of file.
    pub fn read(&self, size: usize, offset: u64) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(size);
        let mut current_offset = offset;

        while buffer.len() < size {
            let addr = self.layout.translate(current_offset);
            let remaining = (size - buffer.len()) as u64;
            let span = remaining.min(addr.bytes_available);
            let path = &self.paths[addr.stripe_index];

            let count = {
                let _guard = self.locks.lock(path);
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(addr.physical_offset))?;
                file.take(span).read_to_end(&mut buffer)?
            };

            if count == 0 {
                break;
            }
            current_offset += count as u64;
        }

        Ok(buffer)
    }
}
