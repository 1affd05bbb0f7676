//! Continuous spaces.
//!
//! A space owns a contiguous synthetic address range backed by a word arena.
//! Objects are bump-allocated and recorded in a live bitmap keyed by their
//! start word, which is what remembered-set scans walk.
//!
//! Object layout (one word per cell):
//!
//! ```text
//! +--------------------------------+
//! | header: refs << 32 | size_words |
//! +--------------------------------+
//! | reference slot 0               |
//! | ...                            |
//! | reference slot refs-1          |
//! +--------------------------------+
//! | primitive words                |
//! +--------------------------------+
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Bytes per heap word.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Index of a space inside its [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub(crate) u32);

impl SpaceId {
    /// Raw index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "space#{}", self.0)
    }
}

/// Allocation discipline of a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Nursery-style space; objects may be evacuated out of it.
    BumpPointer,
    /// Tenured space managed by a free list.
    FreeList,
    /// Objects never move (boot images, pinned objects).
    NonMoving,
}

impl SpaceKind {
    /// Whether a collector may relocate objects out of this space.
    #[inline]
    pub fn is_movable(self) -> bool {
        matches!(self, SpaceKind::BumpPointer)
    }
}

/// Decoded object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Number of reference slots following the header.
    pub reference_count: u32,
    /// Total object size in words, header included.
    pub size_words: u32,
}

impl ObjectHeader {
    /// Header for an object with `refs` reference slots and
    /// `primitive_words` non-reference words, or `None` if the total size in
    /// words does not fit the header.
    #[inline]
    pub fn new(refs: u32, primitive_words: u32) -> Option<Self> {
        let size_words = refs.checked_add(primitive_words)?.checked_add(1)?;
        Some(Self {
            reference_count: refs,
            size_words,
        })
    }

    /// Size in bytes an object with this shape would need, computed without
    /// the header's `u32` limit.
    #[inline]
    pub fn requested_bytes(refs: u32, primitive_words: u32) -> usize {
        (1 + refs as usize + primitive_words as usize).saturating_mul(WORD_SIZE)
    }

    /// Header word encoding.
    #[inline]
    pub fn encode(self) -> usize {
        ((self.reference_count as usize) << 32) | self.size_words as usize
    }

    /// Decode a header word.
    #[inline]
    pub fn decode(word: usize) -> Self {
        Self {
            reference_count: (word >> 32) as u32,
            size_words: word as u32,
        }
    }

    /// Object size in bytes.
    #[inline]
    pub fn size_bytes(self) -> usize {
        self.size_words as usize * WORD_SIZE
    }
}

/// A contiguous, bump-allocated region of the heap.
pub struct ContinuousSpace {
    id: SpaceId,
    name: String,
    kind: SpaceKind,
    begin: usize,
    limit: usize,
    /// Allocation top; `[begin, top)` holds objects.
    top: AtomicUsize,
    words: Box<[AtomicUsize]>,
    /// One bit per word, set for object starts.
    live_bitmap: Box<[AtomicU64]>,
}

impl ContinuousSpace {
    pub(crate) fn new(id: SpaceId, name: &str, kind: SpaceKind, begin: usize, size: usize) -> Self {
        debug_assert!(begin % WORD_SIZE == 0 && size % WORD_SIZE == 0);
        let word_count = size / WORD_SIZE;
        Self {
            id,
            name: name.to_owned(),
            kind,
            begin,
            limit: begin + size,
            top: AtomicUsize::new(begin),
            words: (0..word_count).map(|_| AtomicUsize::new(0)).collect(),
            live_bitmap: (0..word_count.div_ceil(64)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Identifier inside the owning heap.
    #[inline]
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocation discipline.
    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    /// First address of the space.
    #[inline]
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Current allocation top.
    #[inline]
    pub fn end(&self) -> usize {
        self.top.load(Ordering::Acquire)
    }

    /// One past the last address the space may ever use.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.end() - self.begin
    }

    /// Whether `addr` lies inside `[begin, limit)`.
    #[inline]
    pub fn has_address(&self, addr: usize) -> bool {
        addr >= self.begin && addr < self.limit
    }

    /// Allocate an object; `None` when the space is exhausted.
    ///
    /// Reference slots and primitive words start out zeroed.
    pub fn alloc(&self, refs: u32, primitive_words: u32) -> Option<usize> {
        let header = ObjectHeader::new(refs, primitive_words)?;
        let size = header.size_bytes();
        let addr = self
            .top
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |top| {
                let new_top = top.checked_add(size)?;
                (new_top <= self.limit).then_some(new_top)
            })
            .ok()?;

        self.store_word(addr, header.encode());
        let index = self.word_index(addr);
        self.live_bitmap[index / 64].fetch_or(1 << (index % 64), Ordering::Release);
        Some(addr)
    }

    /// Load the word at `addr`.
    #[inline]
    pub fn load_word(&self, addr: usize) -> usize {
        self.words[self.word_index(addr)].load(Ordering::Acquire)
    }

    /// Store `value` at `addr`.
    #[inline]
    pub fn store_word(&self, addr: usize, value: usize) {
        self.words[self.word_index(addr)].store(value, Ordering::Release);
    }

    /// Whether an object starts at `addr`.
    pub fn is_object_start(&self, addr: usize) -> bool {
        if !self.has_address(addr) || addr % WORD_SIZE != 0 {
            return false;
        }
        let index = self.word_index(addr);
        self.live_bitmap[index / 64].load(Ordering::Acquire) & (1 << (index % 64)) != 0
    }

    /// Header of the object starting at `obj`.
    #[inline]
    pub fn header(&self, obj: usize) -> ObjectHeader {
        debug_assert!(self.is_object_start(obj), "{obj:#x} is not an object in {}", self.name);
        ObjectHeader::decode(self.load_word(obj))
    }

    /// Addresses of the reference slots of `obj`.
    pub fn reference_slots(&self, obj: usize) -> impl Iterator<Item = usize> + use<> {
        let refs = self.header(obj).reference_count as usize;
        (0..refs).map(move |i| obj + (1 + i) * WORD_SIZE)
    }

    /// Call `f` with the start of every object that begins in `[start, end)`.
    ///
    /// Objects are reported in address order, each exactly once.
    pub fn visit_marked_range<F>(&self, start: usize, end: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let start = start.max(self.begin);
        let end = end.min(self.end());
        if start >= end {
            return;
        }
        let mut index = (start - self.begin).div_ceil(WORD_SIZE);
        let last = (end - self.begin).div_ceil(WORD_SIZE);
        while index < last {
            let chunk = index / 64;
            let bits = self.live_bitmap[chunk].load(Ordering::Acquire) >> (index % 64);
            if bits == 0 {
                index = (chunk + 1) * 64;
                continue;
            }
            index += bits.trailing_zeros() as usize;
            if index >= last {
                break;
            }
            f(self.begin + index * WORD_SIZE);
            index += 1;
        }
    }

    /// Drop every object and zero the used words.
    ///
    /// Callers must guarantee no mutator is allocating or writing.
    pub fn reset(&self) {
        let used_words = self.used() / WORD_SIZE;
        for word in &self.words[..used_words] {
            word.store(0, Ordering::Relaxed);
        }
        for chunk in self.live_bitmap.iter() {
            chunk.store(0, Ordering::Relaxed);
        }
        self.top.store(self.begin, Ordering::Release);
        tracing::debug!(space = %self.name, "space reset");
    }

    #[inline]
    fn word_index(&self, addr: usize) -> usize {
        debug_assert!(self.has_address(addr), "{addr:#x} outside {}", self.name);
        (addr - self.begin) / WORD_SIZE
    }
}

impl fmt::Debug for ContinuousSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousSpace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("begin", &format_args!("{:#x}", self.begin))
            .field("end", &format_args!("{:#x}", self.end()))
            .field("limit", &format_args!("{:#x}", self.limit))
            .finish()
    }
}
