//! Object pool for per-event OS structures

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Bounded free list of reusable values
pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
    create: fn() -> T,
}

impl<T> ObjectPool<T> {
    /// Pool keeping up to `capacity` idle values, creating new ones with `create`
    pub fn new(capacity: usize, create: fn() -> T) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            create,
        }
    }

    /// Borrow a value; it returns to the pool when the guard drops
    pub fn get(&self) -> Pooled<'_, T> {
        let item = self.free.lock().pop().unwrap_or_else(self.create);
        Pooled {
            pool: self,
            item: Some(item),
        }
    }

    /// Idle values currently held
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    fn give_back(&self, item: T) {
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }
}

/// Value on loan from an [`ObjectPool`]
pub struct Pooled<'a, T> {
    pool: &'a ObjectPool<T>,
    item: Option<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only None after drop
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled value accessed after release"),
        }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_recycled() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, Vec::new);
        {
            let mut v = pool.get();
            v.push(42);
        }
        assert_eq!(pool.available(), 1);

        let v = pool.get();
        assert_eq!(*v, vec![42]);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_capacity_bounds_idle_values() {
        let pool: ObjectPool<u32> = ObjectPool::new(2, || 0);
        let loans: Vec<_> = (0..5).map(|_| pool.get()).collect();
        drop(loans);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_concurrent_use() {
        let pool: ObjectPool<u64> = ObjectPool::new(8, || 0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        let mut v = pool.get();
                        *v += 1;
                    }
                });
            }
        });
        assert!(pool.available() <= 8);
    }
}
