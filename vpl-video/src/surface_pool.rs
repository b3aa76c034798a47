//! Reference-counted surface pool with aligned, pre-allocated frame buffers
//!
//! Every buffer is allocated once when the pool is built. A [`Surface`] is a
//! counted handle on one pool slot: cloning adds a reference, dropping (or
//! [`Surface::release`]) removes one, and the slot goes back on the idle list
//! when the last reference is gone.

use crate::error::{Result, VplError};
use crate::types::{FrameInfo, PlaneLayout, FRAME_ALIGNMENT};
use crossbeam_queue::ArrayQueue;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

/// Zeroed heap block aligned to [`FRAME_ALIGNMENT`]
struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    fn new(len: usize) -> Result<Self> {
        let layout = Layout::from_size_align(len.max(1), FRAME_ALIGNMENT)
            .map_err(|_| VplError::invalid(format!("frame buffer of {len} bytes")))?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(layout));

        Ok(Self { ptr, len, layout })
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes for the lifetime of self and
        // the &mut receiver guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfaceMeta {
    info: FrameInfo,
    timestamp: u64,
}

struct SurfaceSlot {
    meta: Mutex<SurfaceMeta>,
    buffer: Mutex<AlignedBuffer>,
    refs: AtomicU32,
}

struct PoolShared {
    info: FrameInfo,
    layout: PlaneLayout,
    slots: Box<[SurfaceSlot]>,
    idle: ArrayQueue<usize>,
}

impl PoolShared {
    fn slot(&self, index: usize) -> &SurfaceSlot {
        &self.slots[index]
    }
}

/// Pool of pre-allocated surfaces sharing one frame description
pub struct SurfacePool {
    shared: Arc<PoolShared>,
}

impl SurfacePool {
    /// Create a new surface pool
    ///
    /// # Arguments
    /// * `info` - Geometry and metadata every surface starts from
    /// * `capacity` - Number of surfaces to pre-allocate
    pub fn new(info: FrameInfo, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(VplError::invalid("surface pool capacity must be > 0"));
        }
        if !info.format.is_supported() {
            return Err(VplError::invalid(format!(
                "unsupported surface format {:?}",
                info.format
            )));
        }
        if info.width == 0 || info.height == 0 {
            return Err(VplError::invalid(format!(
                "surface size {}x{}",
                info.width, info.height
            )));
        }

        let layout = info.format.plane_layout(info.width, info.height);
        let idle = ArrayQueue::new(capacity);
        let mut slots = Vec::with_capacity(capacity);

        for index in 0..capacity {
            slots.push(SurfaceSlot {
                meta: Mutex::new(SurfaceMeta { info, timestamp: 0 }),
                buffer: Mutex::new(AlignedBuffer::new(layout.total_size)?),
                refs: AtomicU32::new(0),
            });
            // Queue was sized for exactly `capacity` indices.
            let _ = idle.push(index);
        }

        log::debug!(
            "surface pool: {} x {:?} {}x{} ({} bytes each)",
            capacity,
            info.format,
            info.width,
            info.height,
            layout.total_size
        );

        Ok(SurfacePool {
            shared: Arc::new(PoolShared {
                info,
                layout,
                slots: slots.into_boxed_slice(),
                idle,
            }),
        })
    }

    /// Acquire an idle surface with a reference count of one
    pub fn acquire(&self) -> Result<Surface> {
        let Some(index) = self.shared.idle.pop() else {
            log::warn!(
                "surface pool exhausted ({} surfaces, {:?} {}x{})",
                self.capacity(),
                self.shared.info.format,
                self.shared.info.width,
                self.shared.info.height
            );
            return Err(VplError::NotEnoughBuffer {
                capacity: self.capacity(),
            });
        };

        let slot = self.shared.slot(index);
        *slot.meta.lock() = SurfaceMeta {
            info: self.shared.info,
            timestamp: 0,
        };
        slot.refs.store(1, Ordering::Release);

        Ok(Surface {
            shared: Arc::clone(&self.shared),
            index,
        })
    }

    /// Frame description of every surface in this pool
    pub fn info(&self) -> FrameInfo {
        self.shared.info
    }

    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let available = self.shared.idle.len();
        PoolStats {
            capacity: self.capacity(),
            in_use: self.capacity() - available,
            available,
        }
    }
}

impl fmt::Debug for SurfacePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfacePool")
            .field("info", &self.shared.info)
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
}

/// Counted reference to one pooled frame buffer
///
/// `Clone` adds a reference, `Drop` releases one. Handles keep the backing
/// pool storage alive, so a surface forwarded to a caller stays valid after
/// the pipeline that produced it is closed.
pub struct Surface {
    shared: Arc<PoolShared>,
    index: usize,
}

impl Surface {
    fn slot(&self) -> &SurfaceSlot {
        self.shared.slot(self.index)
    }

    /// Current frame description (including the channel id tag)
    pub fn info(&self) -> FrameInfo {
        self.slot().meta.lock().info
    }

    pub fn channel_id(&self) -> u16 {
        self.slot().meta.lock().info.channel_id
    }

    /// Tag the surface with the logical output it belongs to
    pub fn set_channel_id(&self, channel_id: u16) {
        self.slot().meta.lock().info.channel_id = channel_id;
    }

    pub fn timestamp(&self) -> u64 {
        self.slot().meta.lock().timestamp
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.slot().meta.lock().timestamp = timestamp;
    }

    /// Plane offsets and pitches of [`Surface::data`]
    pub fn plane_layout(&self) -> PlaneLayout {
        self.shared.layout
    }

    /// Lock the pixel buffer
    pub fn data(&self) -> MappedMutexGuard<'_, [u8]> {
        MutexGuard::map(self.slot().buffer.lock(), |buffer| buffer.as_mut_slice())
    }

    pub fn ref_count(&self) -> u32 {
        self.slot().refs.load(Ordering::Acquire)
    }

    /// Add a reference; the returned handle must be released separately
    pub fn add_ref(&self) -> Surface {
        self.clone()
    }

    /// Release this reference
    pub fn release(self) {
        drop(self)
    }

    /// True when both handles point at the same pool slot
    pub fn same_slot(&self, other: &Surface) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.index == other.index
    }
}

impl Clone for Surface {
    fn clone(&self) -> Self {
        self.slot().refs.fetch_add(1, Ordering::Relaxed);
        Surface {
            shared: Arc::clone(&self.shared),
            index: self.index,
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if self.slot().refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        if self.shared.idle.push(self.index).is_err() {
            log::error!("surface slot {} released twice", self.index);
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("slot", &self.index)
            .field("info", &self.info())
            .field("refs", &self.ref_count())
            .finish()
    }
}
