//! Persistent configuration store.
//!
//! Record layout at the start of the flash sector, little-endian:
//! ```text
//! magic u32 = 0x434F4E46 ("CONF") | size u16 | crc16 u16 | data[size]
//! ```
//! Written in 32-bit words; the final partial word is padded with 0xFF.

use pmulink_frame::crc16_ccitt;
use tracing::{debug, info, warn};

use crate::board::Watchdog;
use crate::error::{FlashError, StoreError};
use crate::flash::Flash;

pub const CONFIG_MAGIC: u32 = 0x434F_4E46;
pub const RECORD_HEADER_SIZE: usize = 8;
pub const DEFAULT_CONFIG_CAPACITY: usize = 2048;

const PAD: u8 = 0xFF;

/// Header of a persisted configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub size: u16,
    pub crc16: u16,
}

impl RecordHeader {
    /// Header describing `blob`. `blob` must fit in a u16 length.
    pub fn for_blob(blob: &[u8]) -> Self {
        Self {
            magic: CONFIG_MAGIC,
            size: blob.len() as u16,
            crc16: crc16_ccitt(blob),
        }
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut out = [0u8; RECORD_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.size.to_le_bytes());
        out[6..8].copy_from_slice(&self.crc16.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            size: u16::from_le_bytes([bytes[4], bytes[5]]),
            crc16: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

/// RAM copy of the configuration blob plus its flash backing.
///
/// The RAM copy is authoritative: uploads assemble into it, GetConfig reads
/// from it, and SaveConfig persists it.
#[derive(Debug)]
pub struct ConfigStore<F> {
    flash: F,
    blob: Vec<u8>,
    capacity: usize,
}

impl<F: Flash> ConfigStore<F> {
    /// Capacity is clamped to what fits in the sector after the header.
    pub fn new(flash: F, capacity: usize) -> Self {
        let capacity = capacity
            .min(flash.size().saturating_sub(RECORD_HEADER_SIZE))
            .min(u16::MAX as usize);
        Self {
            flash,
            blob: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the RAM copy without touching flash.
    pub fn reset_blob(&mut self) {
        self.blob.clear();
    }

    /// Append to the RAM copy. Bytes past capacity are dropped; returns the
    /// number actually appended.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let room = self.capacity - self.blob.len();
        let take = data.len().min(room);
        self.blob.extend_from_slice(&data[..take]);
        if take < data.len() {
            warn!(
                dropped = data.len() - take,
                capacity = self.capacity,
                "configuration blob full, data truncated"
            );
        }
        take
    }

    /// Write `blob` as the flash record. Does not change the RAM copy.
    pub fn save(&mut self, blob: &[u8], watchdog: &mut impl Watchdog) -> Result<(), StoreError> {
        write_record(&mut self.flash, self.capacity, blob, watchdog)
    }

    /// Write the RAM copy as the flash record.
    pub fn persist(&mut self, watchdog: &mut impl Watchdog) -> Result<(), StoreError> {
        write_record(&mut self.flash, self.capacity, &self.blob, watchdog)
    }

    /// Read the flash record into the RAM copy.
    ///
    /// Returns `None` (and leaves the RAM copy empty) unless the magic,
    /// size and CRC all check out.
    pub fn load(&mut self) -> Option<&[u8]> {
        self.blob.clear();

        let header = self.header()?;
        if header.magic != CONFIG_MAGIC {
            debug!(magic = header.magic, "no configuration record");
            return None;
        }

        let size = header.size as usize;
        if size == 0 || size > self.capacity {
            warn!(size, capacity = self.capacity, "configuration record size invalid");
            return None;
        }

        let mut data = vec![0u8; size];
        if let Err(err) = self.flash.read(RECORD_HEADER_SIZE, &mut data) {
            warn!(error = %err, "configuration record unreadable");
            return None;
        }

        let computed = crc16_ccitt(&data);
        if computed != header.crc16 {
            warn!(
                stored = header.crc16,
                computed, "configuration record crc mismatch"
            );
            return None;
        }

        info!(size, "configuration loaded from flash");
        self.blob = data;
        Some(&self.blob)
    }

    /// Drop the RAM copy and erase the record so nothing reloads at boot.
    pub fn clear(&mut self, watchdog: &mut impl Watchdog) -> Result<(), StoreError> {
        self.blob.clear();
        erase_with_watchdog(&mut self.flash, watchdog)?;
        info!("configuration erased");
        Ok(())
    }

    /// Raw header at the start of the sector, valid or not.
    pub fn header(&self) -> Option<RecordHeader> {
        let mut raw = [0u8; RECORD_HEADER_SIZE];
        match self.flash.read(0, &mut raw) {
            Ok(()) => Some(RecordHeader::decode(&raw)),
            Err(err) => {
                warn!(error = %err, "configuration header unreadable");
                None
            }
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }
}

/// Erase latency can exceed the watchdog period, so the watchdog is
/// refreshed right before and right after.
fn erase_with_watchdog<F: Flash>(
    flash: &mut F,
    watchdog: &mut impl Watchdog,
) -> Result<(), FlashError> {
    watchdog.refresh();
    let result = flash.erase();
    watchdog.refresh();
    result
}

fn write_record<F: Flash>(
    flash: &mut F,
    capacity: usize,
    blob: &[u8],
    watchdog: &mut impl Watchdog,
) -> Result<(), StoreError> {
    if blob.is_empty() {
        return Err(StoreError::Empty);
    }
    if blob.len() > capacity {
        return Err(StoreError::TooLarge {
            size: blob.len(),
            max: capacity,
        });
    }

    erase_with_watchdog(flash, watchdog)?;

    let header = RecordHeader::for_blob(blob).encode();
    let mut offset = 0usize;
    for chunk in header.chunks(4).chain(blob.chunks(4)) {
        let mut word = [PAD; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        // No rollback: a half-written record fails its CRC on the next load.
        flash.program_word(offset, u32::from_le_bytes(word))?;
        offset += 4;
    }

    info!(size = blob.len(), "configuration saved to flash");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::flash::MemFlash;

    const SECTOR: usize = 4096;

    #[derive(Default)]
    struct CountingWatchdog {
        refreshes: u32,
    }

    impl Watchdog for CountingWatchdog {
        fn refresh(&mut self) {
            self.refreshes += 1;
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Refresh,
        Erase,
        Program,
    }

    struct LoggedWatchdog(Rc<RefCell<Vec<Event>>>);

    impl Watchdog for LoggedWatchdog {
        fn refresh(&mut self) {
            self.0.borrow_mut().push(Event::Refresh);
        }
    }

    struct LoggedFlash {
        inner: MemFlash,
        log: Rc<RefCell<Vec<Event>>>,
    }

    impl Flash for LoggedFlash {
        fn size(&self) -> usize {
            self.inner.size()
        }

        fn erase(&mut self) -> Result<(), FlashError> {
            self.log.borrow_mut().push(Event::Erase);
            self.inner.erase()
        }

        fn program_word(&mut self, offset: usize, word: u32) -> Result<(), FlashError> {
            self.log.borrow_mut().push(Event::Program);
            self.inner.program_word(offset, word)
        }

        fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
            self.inner.read(offset, buf)
        }
    }

    fn store() -> ConfigStore<MemFlash> {
        ConfigStore::new(MemFlash::new(SECTOR), DEFAULT_CONFIG_CAPACITY)
    }

    #[test]
    fn header_layout() {
        let header = RecordHeader {
            magic: CONFIG_MAGIC,
            size: 0x0102,
            crc16: 0xBEEF,
        };
        let raw = header.encode();
        assert_eq!(raw, [0x46, 0x4E, 0x4F, 0x43, 0x02, 0x01, 0xEF, 0xBE]);
        assert_eq!(RecordHeader::decode(&raw), header);
    }

    #[test]
    fn save_pads_final_word() {
        let mut store = store();
        store
            .save(&[1, 2, 3, 4, 5], &mut CountingWatchdog::default())
            .unwrap();

        let image = store.flash().image();
        assert_eq!(&image[8..16], &[1, 2, 3, 4, 5, 0xFF, 0xFF, 0xFF]);
        assert_eq!(store.flash().program_count(), 4);
    }

    #[test]
    fn erase_is_bracketed_by_watchdog_refresh() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let flash = LoggedFlash {
            inner: MemFlash::new(SECTOR),
            log: log.clone(),
        };
        let mut store = ConfigStore::new(flash, DEFAULT_CONFIG_CAPACITY);
        let mut wdg = LoggedWatchdog(log.clone());

        store.save(b"abc", &mut wdg).unwrap();
        assert_eq!(
            &log.borrow()[..3],
            &[Event::Refresh, Event::Erase, Event::Refresh]
        );
        assert!(log.borrow()[3..].iter().all(|e| *e == Event::Program));

        log.borrow_mut().clear();
        store.clear(&mut wdg).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![Event::Refresh, Event::Erase, Event::Refresh]
        );
    }

    #[test]
    fn rejects_empty_and_oversize() {
        let mut store = store();
        let mut wdg = CountingWatchdog::default();
        assert!(matches!(store.save(&[], &mut wdg), Err(StoreError::Empty)));
        let big = vec![0u8; DEFAULT_CONFIG_CAPACITY + 1];
        assert!(matches!(
            store.save(&big, &mut wdg),
            Err(StoreError::TooLarge { .. })
        ));
        assert_eq!(store.flash().erase_count(), 0);
        assert_eq!(wdg.refreshes, 0);
    }

    #[test]
    fn capacity_clamped_to_sector() {
        let store = ConfigStore::new(MemFlash::new(64), DEFAULT_CONFIG_CAPACITY);
        assert_eq!(store.capacity(), 56);
    }

    #[test]
    fn corrupt_data_byte_reads_as_absent() {
        let mut store = store();
        store
            .save(b"output-config", &mut CountingWatchdog::default())
            .unwrap();
        store.flash_mut().corrupt(RECORD_HEADER_SIZE + 4, 0x01);

        assert!(store.load().is_none());
        assert!(store.blob().is_empty());
    }

    #[test]
    fn bad_magic_reads_as_absent() {
        let mut store = store();
        store.save(b"cfg", &mut CountingWatchdog::default()).unwrap();
        store.flash_mut().corrupt(0, 0xFF);
        assert!(store.load().is_none());
    }

    #[test]
    fn erased_sector_reads_as_absent() {
        let mut store = store();
        store.append(b"stale ram copy");
        assert!(store.load().is_none());
        assert!(store.blob().is_empty());
    }

    #[test]
    fn oversize_header_reads_as_absent() {
        let mut flash = MemFlash::new(SECTOR);
        let header = RecordHeader {
            magic: CONFIG_MAGIC,
            size: 3000,
            crc16: 0,
        }
        .encode();
        flash
            .program_word(0, u32::from_le_bytes(header[0..4].try_into().unwrap()))
            .unwrap();
        flash
            .program_word(4, u32::from_le_bytes(header[4..8].try_into().unwrap()))
            .unwrap();

        let mut store = ConfigStore::new(flash, DEFAULT_CONFIG_CAPACITY);
        assert!(store.load().is_none());
    }

    #[test]
    fn clear_then_load_is_absent() {
        let mut store = store();
        let mut wdg = CountingWatchdog::default();
        store.save(b"valid", &mut wdg).unwrap();
        assert!(store.load().is_some());

        store.clear(&mut wdg).unwrap();
        assert!(store.blob().is_empty());
        assert!(store.load().is_none());
    }

    #[test]
    fn program_failure_aborts_and_invalidates() {
        let mut store = store();
        let mut wdg = CountingWatchdog::default();
        store.save(b"first good config", &mut wdg).unwrap();

        store.flash_mut().set_fail_program_at(Some(12));
        let err = store.save(b"second config!", &mut wdg).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Flash(FlashError::Program { offset: 12 })
        ));
        assert!(store.load().is_none());
    }

    #[test]
    fn erase_failure_is_reported() {
        let mut store = store();
        store.flash_mut().set_fail_erase(true);
        let mut wdg = CountingWatchdog::default();
        assert!(matches!(
            store.clear(&mut wdg),
            Err(StoreError::Flash(FlashError::Erase))
        ));
        assert_eq!(wdg.refreshes, 2);
    }

    #[test]
    fn append_truncates_at_capacity() {
        let mut store = ConfigStore::new(MemFlash::new(24), DEFAULT_CONFIG_CAPACITY);
        assert_eq!(store.append(&[1; 10]), 10);
        assert_eq!(store.append(&[2; 10]), 6);
        assert_eq!(store.blob().len(), 16);
        assert_eq!(store.append(&[3]), 0);
    }

    #[test]
    fn persist_writes_ram_copy() {
        let mut store = store();
        store.append(b"from ram");
        store.persist(&mut CountingWatchdog::default()).unwrap();
        store.reset_blob();
        assert_eq!(store.load(), Some(&b"from ram"[..]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn save_then_load_round_trips(
            blob in proptest::collection::vec(any::<u8>(), 1..=DEFAULT_CONFIG_CAPACITY),
        ) {
            let mut store = store();
            store.save(&blob, &mut CountingWatchdog::default()).unwrap();
            prop_assert_eq!(store.load(), Some(blob.as_slice()));
        }
    }
}
