// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pooling of render surfaces.
//!
//! Interactive redraws request surfaces of the same few sizes over and over. A
//! [`FramebufferPool`] keeps surfaces returned by dropped [`PooledFramebuffer`]s in stock, keyed by
//! their dimensions, and hands them out again instead of allocating.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};

use crate::image::Pixmap;
use crate::{PixelBounds, RenderMetrics, Result};

/// Default rounding applied to the dimensions of [`FramebufferPool::acquire`] requests.
pub const DEFAULT_GRANULARITY: u32 = 256;

/// Creates the surfaces managed by a [`FramebufferPool`].
pub trait SurfaceAllocator {
    type Surface;

    /// Create a new surface of exactly `width` by `height`.
    fn allocate(&mut self, width: u32, height: u32) -> Result<Self::Surface>;

    /// Prepare a surface taken from stock for a request of `width` by `height`.
    fn recycle(&mut self, surface: &mut Self::Surface, width: u32, height: u32) {
        let _ = (surface, width, height);
    }
}

struct Stock<A: SurfaceAllocator> {
    allocator: A,
    free: HashMap<(u32, u32), Vec<A::Surface>>,
    granularity: u32,
    metrics: Rc<RenderMetrics>,
}

impl<A: SurfaceAllocator> Stock<A> {
    /// Take the best stocked surface of at least `width` by `height`.
    ///
    /// Exact dimensions are preferred, otherwise the smallest area that fits.
    fn take(&mut self, width: u32, height: u32) -> Option<((u32, u32), A::Surface)> {
        let key = if self.free.get(&(width, height)).is_some_and(|v| !v.is_empty()) {
            (width, height)
        } else {
            *self
                .free
                .iter()
                .filter(|(dims, v)| dims.0 >= width && dims.1 >= height && !v.is_empty())
                .min_by_key(|(dims, _)| u64::from(dims.0) * u64::from(dims.1))?
                .0
        };
        let surface = self.free.get_mut(&key)?.pop()?;
        Some((key, surface))
    }
}

/// A pool of surfaces keyed by pixel dimensions.
///
/// The pool is single-threaded and belongs to one renderer or GPU context. It never shrinks on its
/// own: surfaces stay in stock until [`clean_up`](Self::clean_up).
pub struct FramebufferPool<A: SurfaceAllocator> {
    stock: Rc<RefCell<Stock<A>>>,
}

impl<A: SurfaceAllocator> FramebufferPool<A> {
    pub fn new(allocator: A, metrics: Rc<RenderMetrics>) -> Self {
        Self {
            stock: Rc::new(RefCell::new(Stock {
                allocator,
                free: HashMap::new(),
                granularity: DEFAULT_GRANULARITY,
                metrics,
            })),
        }
    }

    /// Round requested dimensions up to multiples of `granularity` in [`acquire`](Self::acquire).
    #[must_use]
    pub fn with_granularity(self, granularity: u32) -> Self {
        self.stock.borrow_mut().granularity = granularity.max(1);
        self
    }

    /// Acquire a surface covering at least `bounds`, with dimensions rounded up to the pool's
    /// granularity so that nearby sizes share stock.
    pub fn acquire(&self, bounds: &PixelBounds) -> Result<PooledFramebuffer<A>> {
        let g = self.stock.borrow().granularity;
        let round = |v: u32| v.max(1).div_ceil(g).saturating_mul(g);
        self.acquire_exact(round(bounds.width()), round(bounds.height()))
    }

    /// Acquire a surface of at least `width` by `height` without rounding the request.
    pub fn acquire_exact(&self, width: u32, height: u32) -> Result<PooledFramebuffer<A>> {
        let mut stock = self.stock.borrow_mut();
        let stock = &mut *stock;
        let ((w, h), surface) = match stock.take(width, height) {
            Some((dims, mut surface)) => {
                stock.allocator.recycle(&mut surface, width, height);
                stock.metrics.record_surface_reused();
                (dims, surface)
            }
            None => {
                log::debug!("Allocating {width}x{height} framebuffer");
                let surface = stock.allocator.allocate(width, height)?;
                stock.metrics.record_surface_created();
                ((width, height), surface)
            }
        };
        Ok(PooledFramebuffer {
            surface: Some(surface),
            width: w,
            height: h,
            pool: Rc::downgrade(&self.stock),
        })
    }

    /// Drop every stocked surface.
    pub fn clean_up(&self) {
        let free = std::mem::take(&mut self.stock.borrow_mut().free);
        drop(free);
    }

    /// Number of surfaces currently in stock.
    pub fn stock_len(&self) -> usize {
        self.stock.borrow().free.values().map(Vec::len).sum()
    }
}

impl<A: SurfaceAllocator> fmt::Debug for FramebufferPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferPool")
            .field("stock_len", &self.stock_len())
            .finish_non_exhaustive()
    }
}

/// A surface checked out of a [`FramebufferPool`].
///
/// Dropping it returns the surface to the pool's stock, or frees it if the pool is gone.
pub struct PooledFramebuffer<A: SurfaceAllocator> {
    surface: Option<A::Surface>,
    width: u32,
    height: u32,
    pool: Weak<RefCell<Stock<A>>>,
}

impl<A: SurfaceAllocator> PooledFramebuffer<A> {
    /// Width of the underlying surface, which may exceed the requested width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the underlying surface, which may exceed the requested height.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl<A: SurfaceAllocator> Deref for PooledFramebuffer<A> {
    type Target = A::Surface;

    fn deref(&self) -> &A::Surface {
        self.surface
            .as_ref()
            .expect("surface is only taken when dropped")
    }
}

impl<A: SurfaceAllocator> DerefMut for PooledFramebuffer<A> {
    fn deref_mut(&mut self) -> &mut A::Surface {
        self.surface
            .as_mut()
            .expect("surface is only taken when dropped")
    }
}

impl<A: SurfaceAllocator> Drop for PooledFramebuffer<A> {
    fn drop(&mut self) {
        let (Some(surface), Some(pool)) = (self.surface.take(), self.pool.upgrade()) else {
            return;
        };
        if let Ok(mut stock) = pool.try_borrow_mut() {
            stock
                .free
                .entry((self.width, self.height))
                .or_default()
                .push(surface);
        };
    }
}

impl<A: SurfaceAllocator> fmt::Debug for PooledFramebuffer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledFramebuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Allocates CPU [`Pixmap`]s for the evaluator.
#[derive(Debug, Default)]
pub struct PixmapAllocator;

impl SurfaceAllocator for PixmapAllocator {
    type Surface = Pixmap;

    fn allocate(&mut self, width: u32, height: u32) -> Result<Pixmap> {
        Ok(Pixmap::new(width, height))
    }

    fn recycle(&mut self, surface: &mut Pixmap, width: u32, height: u32) {
        surface.clear_region(width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingAllocator {
        created: Rc<Cell<usize>>,
    }

    impl SurfaceAllocator for CountingAllocator {
        type Surface = (u32, u32);

        fn allocate(&mut self, width: u32, height: u32) -> Result<(u32, u32)> {
            self.created.set(self.created.get() + 1);
            Ok((width, height))
        }
    }

    fn pool() -> (FramebufferPool<CountingAllocator>, Rc<Cell<usize>>) {
        let allocator = CountingAllocator::default();
        let created = allocator.created.clone();
        (
            FramebufferPool::new(allocator, Rc::new(RenderMetrics::new())),
            created,
        )
    }

    #[test]
    fn released_surfaces_are_reused() {
        let (pool, created) = pool();
        let bounds = PixelBounds::new(0, 0, 300, 100);
        let first = pool.acquire(&bounds).unwrap();
        assert_eq!((first.width(), first.height()), (512, 256));
        drop(first);
        let second = pool.acquire(&bounds).unwrap();
        assert_eq!(*second, (512, 256));
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn surfaces_in_use_are_not_shared() {
        let (pool, created) = pool();
        let bounds = PixelBounds::new(0, 0, 10, 10);
        let _a = pool.acquire(&bounds).unwrap();
        let _b = pool.acquire(&bounds).unwrap();
        assert_eq!(created.get(), 2);
        assert_eq!(pool.stock_len(), 0);
    }

    #[test]
    fn oversized_stock_is_acceptable_undersized_is_not() {
        let (pool, created) = pool();
        drop(pool.acquire_exact(64, 64).unwrap());
        let smaller = pool.acquire_exact(32, 16).unwrap();
        assert_eq!(*smaller, (64, 64));
        assert_eq!(created.get(), 1);
        drop(smaller);
        let larger = pool.acquire_exact(65, 64).unwrap();
        assert_eq!(*larger, (65, 64));
        assert_eq!(created.get(), 2);
    }

    #[test]
    fn exact_match_is_preferred() {
        let (pool, _) = pool();
        let big = pool.acquire_exact(100, 100).unwrap();
        let exact = pool.acquire_exact(20, 20).unwrap();
        drop(big);
        drop(exact);
        assert_eq!(*pool.acquire_exact(20, 20).unwrap(), (20, 20));
    }

    #[test]
    fn clean_up_empties_the_stock() {
        let (pool, created) = pool();
        drop(pool.acquire_exact(8, 8).unwrap());
        assert_eq!(pool.stock_len(), 1);
        pool.clean_up();
        assert_eq!(pool.stock_len(), 0);
        drop(pool.acquire_exact(8, 8).unwrap());
        assert_eq!(created.get(), 2);
    }

    #[test]
    fn surfaces_outliving_the_pool_are_freed() {
        let (pool, _) = pool();
        let surface = pool.acquire_exact(4, 4).unwrap();
        drop(pool);
        drop(surface);
    }

    #[test]
    fn reused_pixmaps_are_cleared() {
        let pool = FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new()))
            .with_granularity(1);
        let mut first = pool.acquire_exact(2, 2).unwrap();
        first.data_mut().fill(crate::PremulColor::new(1., 1., 1., 1.));
        drop(first);
        let second = pool.acquire_exact(2, 2).unwrap();
        assert!(second
            .data()
            .iter()
            .all(|p| *p == crate::PremulColor::TRANSPARENT));
    }
}
