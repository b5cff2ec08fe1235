// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Counters for resource usage during rendering.

use core::cell::Cell;

/// Counters threaded through the rasterizer, the framebuffer pool and the evaluator.
///
/// A renderer owns one of these and passes it by reference to everything it drives, so tests and
/// tools can observe allocation behavior without any process-wide state.
#[derive(Debug, Default)]
pub struct RenderMetrics {
    surfaces_created: Cell<u64>,
    surfaces_reused: Cell<u64>,
    rasterizations: Cell<u64>,
    nodes_evaluated: Cell<u64>,
    cache_hits: Cell<u64>,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_surface_created(&self) {
        bump(&self.surfaces_created);
    }

    pub fn record_surface_reused(&self) {
        bump(&self.surfaces_reused);
    }

    pub fn record_rasterization(&self) {
        bump(&self.rasterizations);
    }

    pub fn record_node_evaluated(&self) {
        bump(&self.nodes_evaluated);
    }

    pub fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    /// Number of surfaces (pixmaps or textures) allocated by framebuffer pools.
    pub fn surfaces_created(&self) -> u64 {
        self.surfaces_created.get()
    }

    /// Number of surfaces handed out again from a pool's stock.
    pub fn surfaces_reused(&self) -> u64 {
        self.surfaces_reused.get()
    }

    pub fn rasterizations(&self) -> u64 {
        self.rasterizations.get()
    }

    pub fn nodes_evaluated(&self) -> u64 {
        self.nodes_evaluated.get()
    }

    /// Number of times a memoized node result was reused within an evaluation pass.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.get()
    }

    pub fn reset(&self) {
        for c in [
            &self.surfaces_created,
            &self.surfaces_reused,
            &self.rasterizations,
            &self.nodes_evaluated,
            &self.cache_hits,
        ] {
            c.set(0);
        }
    }
}

fn bump(c: &Cell<u64>) {
    c.set(c.get().saturating_add(1));
}
