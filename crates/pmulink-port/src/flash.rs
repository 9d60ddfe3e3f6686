use crate::error::FlashError;

/// The flash sector holding the configuration record.
///
/// Offsets are relative to the start of the sector; the board maps them to
/// the absolute address.
pub trait Flash {
    /// Sector size in bytes.
    fn size(&self) -> usize;

    /// Erase the whole sector. May take longer than a watchdog period.
    fn erase(&mut self) -> Result<(), FlashError>;

    /// Program one 32-bit word at a word-aligned offset.
    fn program_word(&mut self, offset: usize, word: u32) -> Result<(), FlashError>;

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;
}

const ERASED: u8 = 0xFF;

/// RAM-backed flash sector with NOR semantics: words can only be programmed
/// once after an erase. Failures can be injected.
#[derive(Debug, Clone)]
pub struct MemFlash {
    data: Vec<u8>,
    fail_erase: bool,
    fail_program_at: Option<usize>,
    erase_count: u32,
    program_count: u32,
}

impl MemFlash {
    /// An erased sector of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_image(vec![ERASED; size])
    }

    /// A sector initialised from a raw image.
    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            data: image,
            fail_erase: false,
            fail_program_at: None,
            erase_count: 0,
            program_count: 0,
        }
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }

    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// Flip bits directly in the backing store, bypassing program rules.
    pub fn corrupt(&mut self, offset: usize, xor: u8) {
        self.data[offset] ^= xor;
    }

    pub fn set_fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Make programming the word at `offset` fail.
    pub fn set_fail_program_at(&mut self, offset: Option<usize>) {
        self.fail_program_at = offset;
    }

    pub fn erase_count(&self) -> u32 {
        self.erase_count
    }

    pub fn program_count(&self) -> u32 {
        self.program_count
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), FlashError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FlashError::OutOfBounds { offset, len }),
        }
    }
}

impl Flash for MemFlash {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        self.erase_count += 1;
        if self.fail_erase {
            return Err(FlashError::Erase);
        }
        self.data.fill(ERASED);
        Ok(())
    }

    fn program_word(&mut self, offset: usize, word: u32) -> Result<(), FlashError> {
        self.check_bounds(offset, 4)?;
        if offset % 4 != 0 || self.fail_program_at == Some(offset) {
            return Err(FlashError::Program { offset });
        }
        let target = &mut self.data[offset..offset + 4];
        if target.iter().any(|&b| b != ERASED) {
            return Err(FlashError::NotErased { offset });
        }
        target.copy_from_slice(&word.to_le_bytes());
        self.program_count += 1;
        Ok(())
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programs_little_endian_words() {
        let mut flash = MemFlash::new(8);
        flash.program_word(4, 0x4433_2211).unwrap();
        assert_eq!(flash.image(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn reprogramming_requires_erase() {
        let mut flash = MemFlash::new(8);
        flash.program_word(0, 1).unwrap();
        assert_eq!(
            flash.program_word(0, 2),
            Err(FlashError::NotErased { offset: 0 })
        );
        flash.erase().unwrap();
        flash.program_word(0, 2).unwrap();
    }

    #[test]
    fn rejects_misaligned_and_out_of_bounds() {
        let mut flash = MemFlash::new(8);
        assert_eq!(
            flash.program_word(2, 0),
            Err(FlashError::Program { offset: 2 })
        );
        assert_eq!(
            flash.program_word(8, 0),
            Err(FlashError::OutOfBounds { offset: 8, len: 4 })
        );
        let mut buf = [0u8; 4];
        assert!(flash.read(6, &mut buf).is_err());
    }

    #[test]
    fn injected_failures() {
        let mut flash = MemFlash::new(8);
        flash.set_fail_erase(true);
        assert_eq!(flash.erase(), Err(FlashError::Erase));
        flash.set_fail_program_at(Some(4));
        assert!(flash.program_word(0, 0).is_ok());
        assert_eq!(
            flash.program_word(4, 0),
            Err(FlashError::Program { offset: 4 })
        );
    }
}
