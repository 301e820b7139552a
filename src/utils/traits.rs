use crate::fs::Result;

/// A metadata record with a frozen on-disk width.
///
/// Implemented by the superblock, allocation table records and directory slots,
/// which all live in fixed-size regions of the volume.
pub trait FixedWidthRecord: Sized {
    /// the number of bytes one record occupies on disk
    const WIDTH: usize;

    /// encode into `buf`, which is exactly [Self::WIDTH] bytes long
    fn encode_into(&self, buf: &mut [u8]) -> Result<()>;

    /// decode from `buf`, which is exactly [Self::WIDTH] bytes long
    fn decode_from(buf: &[u8]) -> Result<Self>;

    /// encode into a freshly allocated buffer
    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; Self::WIDTH];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// encode `records` back to back into a region of `region_len` bytes,
    /// zero filling whatever the records leave over
    fn encode_all(records: &[Self], region_len: usize) -> Result<Vec<u8>> {
        assert!(records.len() * Self::WIDTH <= region_len);
        let mut region = vec![0u8; region_len];
        for (record, chunk) in records.iter().zip(region.chunks_exact_mut(Self::WIDTH)) {
            record.encode_into(chunk)?;
        }
        Ok(region)
    }

    /// decode `count` records laid out back to back at the start of `region`
    fn decode_all(region: &[u8], count: usize) -> Result<Vec<Self>> {
        assert!(count * Self::WIDTH <= region.len());
        region
            .chunks_exact(Self::WIDTH)
            .take(count)
            .map(Self::decode_from)
            .collect()
    }
}
