// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity single-producer single-consumer ring of fixed-size slots.
//
// The ring is plain data laid over a `Region`: a cache-line padded header
// followed by `capacity` slots. The same code runs over process-local heap
// memory and over a named shm segment mapped by two processes.
//
// A write against a full ring is rejected and latches the overflow flag.
// Once latched, the consumer can no longer trust its view of the stream
// until the owner calls `initialize()`.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ChannelError, WireError};
use crate::region::{HeapRegion, Region};
use crate::spin_lock::SpinLock;
use crate::wire::{WireRecord, MAX_RECORD_SIZE};

#[cfg(unix)]
use crate::region::ShmRegion;
#[cfg(unix)]
use crate::ShmOpenMode;

const LAYOUT_MAGIC: u32 = 0x4c43_4d52; // "LCMR"
const SLOT_ALIGN: usize = 8;

// ---------------------------------------------------------------------------
// Shared layout
// ---------------------------------------------------------------------------

#[repr(C)]
struct Header {
    write_idx: AtomicU64,
    _pad0: [u8; 64 - 8],
    read_idx: AtomicU64,
    _pad1: [u8; 64 - 8],
    overflow: AtomicBool,
    producer_attached: AtomicBool,
    consumer_attached: AtomicBool,
    constructed: AtomicBool,
    init_lock: SpinLock,
    magic: AtomicU32,
    capacity: AtomicU32,
    element_size: AtomicU32,
    producer_pid: AtomicI32,
    consumer_pid: AtomicI32,
    _pad2: [u8; 64 - 28],
}

const HEADER_SIZE: usize = std::mem::size_of::<Header>();
const _: () = assert!(HEADER_SIZE == 192);

/// Which side of a ring an endpoint drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Producer,
    Consumer,
}

// ---------------------------------------------------------------------------
// ByteChannel
// ---------------------------------------------------------------------------

/// A fixed-capacity channel of fixed-size byte elements.
///
/// Exactly one producer may call [`try_enqueue`](Self::try_enqueue) and
/// exactly one consumer may call [`try_dequeue`](Self::try_dequeue)
/// concurrently. None of the operations block or allocate.
pub trait ByteChannel: Send + Sync {
    /// Number of slots.
    fn capacity(&self) -> usize;

    /// Bytes per slot.
    fn element_size(&self) -> usize;

    /// Reset cursors and the overflow flag. Only safe while neither side is
    /// in the middle of an operation.
    fn initialize(&self);

    /// Copy `item` into the next free slot. Returns `false` and latches the
    /// overflow flag when the channel is full.
    fn try_enqueue(&self, item: &[u8]) -> bool;

    /// Copy the oldest element into `out`. Returns `false` when empty.
    fn try_dequeue(&self, out: &mut [u8]) -> bool;

    fn empty(&self) -> bool;

    fn overflow_flag(&self) -> bool;

    /// Elements currently queued.
    fn len(&self) -> usize;
}

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// SPSC ring over a heap or shared-memory [`Region`].
pub struct RingBuffer {
    region: Box<dyn Region>,
    capacity: usize,
    element_size: usize,
    stride: usize,
}

impl RingBuffer {
    /// Bytes of backing memory needed for a ring of this shape.
    pub fn layout_size(capacity: usize, element_size: usize) -> usize {
        HEADER_SIZE + capacity * stride_of(element_size)
    }

    /// Create a process-local ring.
    pub fn new(capacity: usize, element_size: usize) -> Result<Self, ChannelError> {
        check_shape(capacity, element_size)?;
        let region = HeapRegion::new(Self::layout_size(capacity, element_size))?;
        let ring = Self::over(Box::new(region), capacity, element_size);
        ring.construct();
        Ok(ring)
    }

    /// Create the named shared ring, or attach to it if another process
    /// already created it with the same shape.
    #[cfg(unix)]
    pub fn create_shared(name: &str, capacity: usize, element_size: usize) -> Result<Self, ChannelError> {
        check_shape(capacity, element_size)?;
        let size = Self::layout_size(capacity, element_size);
        let region = ShmRegion::acquire(name, size, ShmOpenMode::CreateOrOpen)?;
        let ring = Self::over(Box::new(region), capacity, element_size);
        ring.construct();
        ring.validate()?;
        Ok(ring)
    }

    /// Attach to a named shared ring created elsewhere.
    #[cfg(unix)]
    pub fn open_shared(name: &str, capacity: usize, element_size: usize) -> Result<Self, ChannelError> {
        check_shape(capacity, element_size)?;
        let size = Self::layout_size(capacity, element_size);
        let region = ShmRegion::acquire(name, size, ShmOpenMode::Open)?;
        let ring = Self::over(Box::new(region), capacity, element_size);
        if !ring.hdr().constructed.load(Ordering::Acquire) {
            return Err(ChannelError::NotInitialized);
        }
        ring.validate()?;
        Ok(ring)
    }

    fn over(region: Box<dyn Region>, capacity: usize, element_size: usize) -> Self {
        Self {
            region,
            capacity,
            element_size,
            stride: stride_of(element_size),
        }
    }

    /// One-time header construction, guarded by the header spin lock so two
    /// processes racing on a fresh segment construct it once.
    fn construct(&self) {
        let hdr = self.hdr();
        if hdr.constructed.load(Ordering::Acquire) {
            return;
        }
        let _guard = hdr.init_lock.lock();
        if hdr.constructed.load(Ordering::Relaxed) {
            return;
        }
        hdr.magic.store(LAYOUT_MAGIC, Ordering::Relaxed);
        hdr.capacity.store(self.capacity as u32, Ordering::Relaxed);
        hdr.element_size.store(self.element_size as u32, Ordering::Relaxed);
        hdr.producer_attached.store(false, Ordering::Relaxed);
        hdr.consumer_attached.store(false, Ordering::Relaxed);
        hdr.producer_pid.store(0, Ordering::Relaxed);
        hdr.consumer_pid.store(0, Ordering::Relaxed);
        self.reset();
        hdr.constructed.store(true, Ordering::Release);
        debug!(capacity = self.capacity, element_size = self.element_size, "ring constructed");
    }

    /// Both ends must agree on the shape; a mismatch is a configuration error.
    fn validate(&self) -> Result<(), ChannelError> {
        let hdr = self.hdr();
        let found_capacity = hdr.capacity.load(Ordering::Relaxed) as usize;
        let found_element_size = hdr.element_size.load(Ordering::Relaxed) as usize;
        if hdr.magic.load(Ordering::Relaxed) != LAYOUT_MAGIC
            || found_capacity != self.capacity
            || found_element_size != self.element_size
        {
            return Err(ChannelError::LayoutMismatch {
                expected_capacity: self.capacity,
                expected_element_size: self.element_size,
                found_capacity,
                found_element_size,
            });
        }
        Ok(())
    }

    fn reset(&self) {
        let hdr = self.hdr();
        hdr.read_idx.store(0, Ordering::Relaxed);
        hdr.write_idx.store(0, Ordering::Relaxed);
        hdr.overflow.store(false, Ordering::Release);
    }

    /// Claim one side of the ring. Returns `false` if that side is taken.
    ///
    /// A side held by a process that has since died (no destructor ran) is
    /// taken over, so a restarted peer can reattach to a segment the other
    /// side kept mapped.
    pub fn try_attach(&self, endpoint: Endpoint) -> bool {
        let (flag, owner) = self.endpoint_slots(endpoint);
        let me = current_pid();
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            owner.store(me, Ordering::Release);
            return true;
        }
        // 0 while a live attach is between its two stores.
        let holder = owner.load(Ordering::Acquire);
        if holder == 0 || holder == me || pid_alive(holder) {
            return false;
        }
        if owner
            .compare_exchange(holder, me, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        warn!(?endpoint, dead_pid = holder, "took over ring endpoint of dead process");
        true
    }

    pub fn detach(&self, endpoint: Endpoint) {
        let (flag, owner) = self.endpoint_slots(endpoint);
        owner.store(0, Ordering::Relaxed);
        flag.store(false, Ordering::Release);
    }

    pub fn is_attached(&self, endpoint: Endpoint) -> bool {
        self.endpoint_slots(endpoint).0.load(Ordering::Acquire)
    }

    fn endpoint_slots(&self, endpoint: Endpoint) -> (&AtomicBool, &AtomicI32) {
        let hdr = self.hdr();
        match endpoint {
            Endpoint::Producer => (&hdr.producer_attached, &hdr.producer_pid),
            Endpoint::Consumer => (&hdr.consumer_attached, &hdr.consumer_pid),
        }
    }

    fn hdr(&self) -> &Header {
        unsafe { &*(self.region.as_mut_ptr() as *const Header) }
    }

    fn slot_ptr(&self, cursor: u64) -> *mut u8 {
        let idx = (cursor & (self.capacity as u64 - 1)) as usize;
        unsafe { self.region.as_mut_ptr().add(HEADER_SIZE + idx * self.stride) }
    }
}

impl ByteChannel for RingBuffer {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn initialize(&self) {
        self.reset();
    }

    fn try_enqueue(&self, item: &[u8]) -> bool {
        if item.len() > self.element_size {
            return false;
        }
        let hdr = self.hdr();
        let w = hdr.write_idx.load(Ordering::Relaxed);
        let r = hdr.read_idx.load(Ordering::Acquire);
        if w.wrapping_sub(r) >= self.capacity as u64 {
            hdr.overflow.store(true, Ordering::Release);
            return false;
        }
        let slot = self.slot_ptr(w);
        unsafe {
            std::ptr::copy_nonoverlapping(item.as_ptr(), slot, item.len());
            std::ptr::write_bytes(slot.add(item.len()), 0, self.element_size - item.len());
        }
        hdr.write_idx.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    fn try_dequeue(&self, out: &mut [u8]) -> bool {
        let hdr = self.hdr();
        let r = hdr.read_idx.load(Ordering::Relaxed);
        let w = hdr.write_idx.load(Ordering::Acquire);
        if r == w {
            return false;
        }
        let n = out.len().min(self.element_size);
        unsafe { std::ptr::copy_nonoverlapping(self.slot_ptr(r), out.as_mut_ptr(), n) };
        hdr.read_idx.store(r.wrapping_add(1), Ordering::Release);
        true
    }

    fn empty(&self) -> bool {
        self.len() == 0
    }

    fn overflow_flag(&self) -> bool {
        self.hdr().overflow.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        let hdr = self.hdr();
        // read_idx first: it never passes a write_idx loaded after it.
        let r = hdr.read_idx.load(Ordering::Acquire);
        let w = hdr.write_idx.load(Ordering::Acquire);
        (w.wrapping_sub(r) as usize).min(self.capacity)
    }
}

fn current_pid() -> i32 {
    std::process::id() as i32
}

#[cfg(unix)]
fn pid_alive(pid: i32) -> bool {
    crate::platform::posix::process_alive(pid)
}

#[cfg(not(unix))]
fn pid_alive(_pid: i32) -> bool {
    true
}

fn stride_of(element_size: usize) -> usize {
    element_size.div_ceil(SLOT_ALIGN) * SLOT_ALIGN
}

fn check_shape(capacity: usize, element_size: usize) -> Result<(), ChannelError> {
    if capacity == 0 || !capacity.is_power_of_two() || capacity > u32::MAX as usize {
        return Err(ChannelError::CapacityNotPowerOfTwo(capacity));
    }
    if element_size == 0 {
        return Err(ChannelError::ZeroElementSize);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TypedRing
// ---------------------------------------------------------------------------

/// Record-typed view over a shared [`ByteChannel`].
///
/// Encoding happens into a stack buffer, so the send and receive paths stay
/// allocation-free.
pub struct TypedRing<T, C = RingBuffer> {
    chan: Arc<C>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireRecord, C: ByteChannel> TypedRing<T, C> {
    pub fn new(chan: Arc<C>) -> Result<Self, ChannelError> {
        if T::SIZE > chan.element_size() || T::SIZE > MAX_RECORD_SIZE {
            return Err(ChannelError::RecordTooLarge {
                record_size: T::SIZE,
                element_size: chan.element_size(),
            });
        }
        Ok(Self {
            chan,
            _marker: PhantomData,
        })
    }

    pub fn try_enqueue(&self, record: &T) -> bool {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        record.encode(&mut buf[..T::SIZE]);
        self.chan.try_enqueue(&buf[..T::SIZE])
    }

    /// `Ok(None)` when the ring is empty; `Err` when the slot held bytes that
    /// do not decode as `T`.
    pub fn try_dequeue(&self) -> Result<Option<T>, WireError> {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        if !self.chan.try_dequeue(&mut buf[..T::SIZE]) {
            return Ok(None);
        }
        T::decode(&buf[..T::SIZE]).map(Some)
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.chan
    }
}

impl<T, C> Clone for TypedRing<T, C> {
    fn clone(&self) -> Self {
        Self {
            chan: Arc::clone(&self.chan),
            _marker: PhantomData,
        }
    }
}
