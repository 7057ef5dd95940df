//! The binary layout of a log region.
//!
//! ```text
//! offset        size  field
//! 0             4     magic
//! 4             4     index of the next slot to write, wrapping
//! 8 + 520 * i   8     slot i: timestamp in ns since the UNIX epoch, 0 if never written
//! 16 + 520 * i  512   slot i: text, NUL padded
//! ```
//!
//! All accesses go through atomics at these fixed offsets. We never overlay a native struct on
//! the mapped memory: the region is shared with processes running other binaries and is mutated
//! concurrently. The text is packed little-endian into 64-bit words so the in-memory byte string
//! is the same no matter how the words are loaded.
use core::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

/// Maximum length of the text of one line, including its NUL terminator.
pub const MAX_LINE_LEN: usize = 512;
/// Maximum length of a writer tag.
pub const MAX_TAG_LEN: usize = 5;
/// Number of lines in the ring.
pub const SLOT_COUNT: u32 = 2048;
/// Identifies memory initialized as a log region.
pub const MAGIC: u32 = 0x0bad_babe;

const MAGIC_OFFSET: usize = 0;
const INDEX_OFFSET: usize = 4;
const HEADER_SIZE: usize = 8;
const STAMP_SIZE: usize = 8;
const TEXT_WORDS: usize = MAX_LINE_LEN / 8;

/// Size of one slot, timestamp and text.
pub const SLOT_SIZE: usize = STAMP_SIZE + MAX_LINE_LEN;
/// Size of the whole region, the length every process maps.
pub const REGION_SIZE: usize = HEADER_SIZE + SLOT_COUNT as usize * SLOT_SIZE;

const _: () = assert!(HEADER_SIZE % 8 == 0 && SLOT_SIZE % 8 == 0);
const _: () = assert!(MAX_LINE_LEN % 8 == 0);

/// A checked view of a mapped region.
#[derive(Clone, Copy)]
pub(crate) struct Region<'lt> {
    words: &'lt [AtomicU64],
}

/// One line of the ring.
pub(crate) struct Slot<'lt> {
    stamp: &'lt AtomicU64,
    text: &'lt [AtomicU64],
}

impl<'lt> Region<'lt> {
    /// Wrap memory holding at least a region.
    ///
    /// Returns `None` if the memory is too short or not aligned to 8 bytes.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes during `'lt` and all accesses to it, from any
    /// process, must be atomic. Writing methods may only be called if the memory is writable.
    pub(crate) unsafe fn from_raw(ptr: *const u8, len: usize) -> Option<Self> {
        if len < REGION_SIZE || ptr.align_offset(8) != 0 {
            return None;
        }

        let words = core::slice::from_raw_parts(ptr as *const AtomicU64, REGION_SIZE / 8);
        Some(Region { words })
    }

    /// Wrap process-local memory, for example a heap buffer.
    #[cfg(test)]
    pub(crate) fn from_words(words: &'lt [AtomicU64]) -> Option<Self> {
        let len = core::mem::size_of_val(words);
        // Safety: a shared slice of atomics is valid for reads and writes during `'lt`.
        unsafe { Self::from_raw(words.as_ptr() as *const u8, len) }
    }

    fn header(&self, offset: usize) -> &'lt AtomicU32 {
        debug_assert!(offset + 4 <= HEADER_SIZE);
        // Safety: the header is within the first word and 4-aligned. The header words are only
        // ever accessed as `AtomicU32`, never as the `AtomicU64` covering them.
        unsafe { &*(self.words.as_ptr() as *const u8).add(offset).cast::<AtomicU32>() }
    }

    pub(crate) fn magic(&self) -> u32 {
        self.header(MAGIC_OFFSET).load(Ordering::Acquire)
    }

    /// Write the magic into a zeroed region.
    ///
    /// Returns `Ok(true)` if this call initialized the region, `Ok(false)` if it was already
    /// initialized and `Err` with the foreign value otherwise.
    pub(crate) fn init_magic(&self) -> Result<bool, u32> {
        match self.header(MAGIC_OFFSET).compare_exchange(
            0,
            MAGIC,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(true),
            Err(MAGIC) => Ok(false),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn next_index(&self) -> u32 {
        self.header(INDEX_OFFSET).load(Ordering::Acquire)
    }

    /// Claim the next slot, returning its unreduced index.
    pub(crate) fn reserve(&self) -> u32 {
        self.header(INDEX_OFFSET).fetch_add(1, Ordering::AcqRel)
    }

    pub(crate) fn slot(&self, index: u32) -> Slot<'lt> {
        let slot = (index % SLOT_COUNT) as usize;
        let word = (HEADER_SIZE + slot * SLOT_SIZE) / 8;

        Slot {
            stamp: &self.words[word],
            text: &self.words[word + 1..word + 1 + TEXT_WORDS],
        }
    }
}

impl Slot<'_> {
    /// Store a line, the timestamp last.
    ///
    /// The timestamp is cleared before the text is touched so that a concurrent reader can tell
    /// a torn slot from a published one.
    pub(crate) fn publish(&self, text: &[u8; MAX_LINE_LEN], stamp: i64) {
        debug_assert_ne!(stamp, 0);
        self.stamp.store(0, Ordering::Relaxed);
        fence(Ordering::Release);

        for (word, chunk) in self.text.iter().zip(text.chunks_exact(8)) {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(chunk);
            word.store(u64::from_le_bytes(bytes), Ordering::Relaxed);
        }

        self.stamp.store(stamp as u64, Ordering::Release);
    }

    /// Copy out a published line.
    ///
    /// `None` if the slot was never written or was being rewritten while we copied it.
    pub(crate) fn read(&self) -> Option<(i64, [u8; MAX_LINE_LEN])> {
        let stamp = self.stamp.load(Ordering::Acquire);
        if stamp == 0 {
            return None;
        }

        let mut text = [0; MAX_LINE_LEN];
        for (chunk, word) in text.chunks_exact_mut(8).zip(self.text) {
            chunk.copy_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }

        fence(Ordering::Acquire);
        if self.stamp.load(Ordering::Relaxed) != stamp {
            return None;
        }

        Some((stamp as i64, text))
    }
}

#[cfg(test)]
pub(crate) fn heap_region() -> Box<[AtomicU64]> {
    (0..REGION_SIZE / 8).map(|_| AtomicU64::new(0)).collect()
}

#[test]
fn region_size_matches_c_layout() {
    assert_eq!(SLOT_SIZE, 520);
    assert_eq!(REGION_SIZE, 1_064_968);
}

#[test]
fn rejects_short_memory() {
    let words = heap_region();
    assert!(Region::from_words(&words[..words.len() - 1]).is_none());
    assert!(Region::from_words(&words).is_some());
}

#[test]
fn magic_initializes_once() {
    let words = heap_region();
    let region = Region::from_words(&words).unwrap();

    assert_eq!(region.magic(), 0);
    assert_eq!(region.init_magic(), Ok(true));
    assert_eq!(region.init_magic(), Ok(false));
    assert_eq!(region.magic(), MAGIC);
    if cfg!(target_endian = "little") {
        assert_eq!(words[0].load(Ordering::Relaxed) as u32, MAGIC);
    }
}

#[test]
fn foreign_magic_is_kept() {
    let words = heap_region();
    let region = Region::from_words(&words).unwrap();
    region.header(MAGIC_OFFSET).store(0xdead_beef, Ordering::Relaxed);
    assert_eq!(region.init_magic(), Err(0xdead_beef));
}

#[test]
fn slots_at_fixed_offsets() {
    let words = heap_region();
    let region = Region::from_words(&words).unwrap();

    let mut text = [0; MAX_LINE_LEN];
    text[..2].copy_from_slice(b"ab");
    region.slot(SLOT_COUNT + 1).publish(&text, 77);

    let stamp_word = (HEADER_SIZE + SLOT_SIZE) / 8;
    assert_eq!(words[stamp_word].load(Ordering::Relaxed), 77);
    let first = words[stamp_word + 1].load(Ordering::Relaxed).to_le_bytes();
    assert_eq!(&first[..3], b"ab\0");

    let (stamp, read) = region.slot(1).read().unwrap();
    assert_eq!(stamp, 77);
    assert_eq!(read, text);
    assert!(region.slot(0).read().is_none());
}

#[test]
fn reserve_wraps() {
    let words = heap_region();
    let region = Region::from_words(&words).unwrap();
    region.header(INDEX_OFFSET).store(u32::MAX, Ordering::Relaxed);

    assert_eq!(region.reserve(), u32::MAX);
    assert_eq!(region.next_index(), 0);
    assert_eq!(region.reserve(), 0);
}
