//! Surface pool - owns every surface an engine allocates.
//!
//! Surfaces live in a fixed arena and are referred to by [`SurfaceId`].
//! Ids are never reused, so a stale id can only fail a lookup, never alias a
//! newer surface.

use crate::schema::GridSize;

use super::{ComputeDevice, DeviceError};

/// Handle to a surface owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(usize);

impl SurfaceId {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One of the two surfaces of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Slot {
    #[default]
    A,
    B,
}

impl Slot {
    /// The opposite slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

enum Entry<S> {
    Live(S),
    /// Taken out for the duration of a pass that writes it.
    CheckedOut,
    Released,
}

/// Arena of device surfaces of one fixed grid size.
pub struct SurfacePool<S> {
    size: GridSize,
    entries: Vec<Entry<S>>,
}

impl<S> SurfacePool<S> {
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            entries: Vec::new(),
        }
    }

    /// Grid size shared by every surface in the pool.
    #[inline]
    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Allocate a zero-initialised surface.
    pub fn allocate<D>(&mut self, device: &mut D) -> Result<SurfaceId, DeviceError>
    where
        D: ComputeDevice<Surface = S>,
    {
        let surface = device.allocate(self.size)?;
        self.entries.push(Entry::Live(surface));
        Ok(SurfaceId(self.entries.len() - 1))
    }

    /// Hand a surface back to the device. Unknown or already released ids
    /// are ignored.
    pub fn release<D>(&mut self, device: &mut D, id: SurfaceId)
    where
        D: ComputeDevice<Surface = S>,
    {
        if let Some(entry) = self.entries.get_mut(id.0) {
            if let Entry::Live(surface) = std::mem::replace(entry, Entry::Released) {
                device.release(surface);
            }
        }
    }

    /// Borrow a live surface.
    pub fn get(&self, id: SurfaceId) -> Option<&S> {
        match self.entries.get(id.0) {
            Some(Entry::Live(surface)) => Some(surface),
            _ => None,
        }
    }

    /// Take a surface out of the pool so it can be written while others are
    /// borrowed. While checked out, [`get`](Self::get) returns `None` for it.
    pub fn checkout(&mut self, id: SurfaceId) -> Option<S> {
        let entry = self.entries.get_mut(id.0)?;
        match std::mem::replace(entry, Entry::CheckedOut) {
            Entry::Live(surface) => Some(surface),
            other => {
                *entry = other;
                None
            }
        }
    }

    /// Put a checked-out surface back.
    pub fn checkin(&mut self, id: SurfaceId, surface: S) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            if matches!(entry, Entry::CheckedOut) {
                *entry = Entry::Live(surface);
            }
        }
    }

    /// Number of surfaces currently owned by the pool.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(e, Entry::Released))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuDevice;

    #[test]
    fn test_slot_flip() {
        assert_eq!(Slot::A.other(), Slot::B);
        assert_eq!(Slot::B.other().other(), Slot::B);
        assert_ne!(Slot::A.index(), Slot::B.index());
    }

    #[test]
    fn test_allocate_zeroed_distinct() {
        let mut device = CpuDevice::new();
        let mut pool = SurfacePool::new(GridSize::new(3, 2));
        let a = pool.allocate(&mut device).unwrap();
        let b = pool.allocate(&mut device).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        let data = device.read(pool.get(a).unwrap()).unwrap();
        assert_eq!(data, vec![[0.0; 4]; 6]);
    }

    #[test]
    fn test_checkout_hides_surface() {
        let mut device = CpuDevice::new();
        let mut pool = SurfacePool::new(GridSize::new(1, 1));
        let id = pool.allocate(&mut device).unwrap();

        let surface = pool.checkout(id).unwrap();
        assert!(pool.get(id).is_none());
        assert!(pool.checkout(id).is_none());
        assert_eq!(pool.len(), 1);

        pool.checkin(id, surface);
        assert!(pool.get(id).is_some());
    }

    #[test]
    fn test_release_is_permanent() {
        let mut device = CpuDevice::new();
        let mut pool = SurfacePool::new(GridSize::new(1, 1));
        let id = pool.allocate(&mut device).unwrap();
        pool.release(&mut device, id);
        pool.release(&mut device, id);
        assert!(pool.get(id).is_none());
        assert!(pool.is_empty());

        let next = pool.allocate(&mut device).unwrap();
        assert_ne!(next, id);
    }
}
