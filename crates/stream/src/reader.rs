use std::io::{BufReader, Read};

use byteorder::{BigEndian, ByteOrder};

use crate::{mutf8, Result};

/// Buffered reader over the raw stream bytes, with big-endian primitives and
/// length-prefixed modified-UTF-8 strings.
///
/// Every byte consumed is appended to an internal record; `mark` restarts the
/// recording and `snapshot` copies out everything consumed since the last
/// mark. The record is what ends up in an exception-state item when a
/// serialized exception interrupts a write, so it must cover exactly the
/// consumed bytes, not whatever the underlying source buffered ahead.
pub struct DataReader<R> {
    r: BufReader<R>,
    record: Vec<u8>,
}

impl<R: Read> DataReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r: BufReader::new(r),
            record: Vec::new(),
        }
    }

    /// Begins (or restarts) recording.
    pub fn mark(&mut self) {
        self.record.clear();
    }

    /// Copy of every byte consumed since the last `mark`.
    pub fn snapshot(&self) -> Vec<u8> {
        self.record.clone()
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.r.read_exact(buf)?;
        self.record.extend_from_slice(buf);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(BigEndian::read_f32(&buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(BigEndian::read_f64(&buf))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Modified-UTF-8 string prefixed with its u16 byte length.
    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let data = self.read_bytes(len)?;
        mutf8::decode(&data)
    }
}
