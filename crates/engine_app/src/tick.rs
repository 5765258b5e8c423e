//! Fixed-timestep frame loop.
//!
//! Each frame runs, in order:
//!
//! 1. Movement: integrate `Velocity` into `Transform`.
//! 2. Lifetimes: count down and destroy expired entities.
//! 3. Render: count visible meshes (skinned meshes included).
//! 4. Advance the frame counter.

use std::time::{Duration, Instant};

use engine_storage::{EntityId, Ptr, World};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::components::{Lifetime, Mesh, Transform, Velocity};

/// Configuration for the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target frames per second.
    pub tick_rate: f64,
    /// Maximum number of frames to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Entities whose transform was integrated.
    pub moved: usize,
    /// Entities destroyed because their lifetime ran out.
    pub expired: usize,
    /// Meshes submitted for rendering.
    pub rendered: usize,
}

/// The frame loop state.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    world: World,
}

impl TickLoop {
    /// Create a frame loop over `world`.
    #[must_use]
    pub fn new(config: TickConfig, world: World) -> Self {
        Self {
            tick_id: 0,
            config,
            world,
        }
    }

    /// Returns the current frame counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns a reference to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Returns a mutable reference to the world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Run one frame.
    pub fn tick(&mut self, dt: f32) -> FrameReport {
        self.tick_id += 1;

        let report = FrameReport {
            moved: self.integrate_motion(dt),
            expired: self.expire_lifetimes(dt),
            rendered: self.count_visible(),
        };

        debug!(
            tick_id = self.tick_id,
            dt,
            moved = report.moved,
            expired = report.expired,
            rendered = report.rendered,
            entities = self.world.entity_count(),
            "tick complete"
        );
        report
    }

    fn integrate_motion(&mut self, dt: f32) -> usize {
        let mut moved = 0;
        for (mut transform, velocity) in self.world.query::<(Ptr<Transform>, Ptr<Velocity>)>() {
            // SAFETY: Rows point into distinct records and no other reference
            // to these components is alive during the frame.
            unsafe {
                let Velocity(velocity) = velocity.read();
                transform.as_mut().position += velocity * dt;
            }
            moved += 1;
        }
        moved
    }

    fn expire_lifetimes(&mut self, dt: f32) -> usize {
        for mut lifetime in self.world.query::<Ptr<Lifetime>>() {
            // SAFETY: As in `integrate_motion`.
            unsafe { lifetime.as_mut().remaining -= dt };
        }

        let expired: Vec<EntityId> = self
            .world
            .entities()
            .filter(|handle| {
                handle
                    .read::<Lifetime>()
                    .is_some_and(|lifetime| lifetime.remaining <= 0.0)
            })
            .map(|handle| handle.id())
            .collect();

        for id in &expired {
            self.world.destroy_id(*id);
        }
        expired.len()
    }

    fn count_visible(&self) -> usize {
        self.world
            .query::<(Ptr<Transform>, Option<Ptr<Mesh>>)>()
            .filter(|(_, mesh)| mesh.is_some())
            .count()
    }

    /// Log occupancy for every pool.
    pub fn log_pool_stats(&self) {
        for stats in self.world.pool_stats() {
            info!(
                archetype = %stats.archetype,
                record_size = stats.record_size,
                pages = stats.pages,
                live = stats.live,
                capacity = stats.capacity,
                "pool"
            );
        }
    }

    /// Centroid of every transform, or `None` if there are none.
    #[must_use]
    pub fn centroid(&self) -> Option<Vec3> {
        let (sum, count) = self
            .world
            .query::<Ptr<Transform>>()
            // SAFETY: Records are initialised and not mutated here.
            .map(|transform| unsafe { transform.read() }.position)
            .fold((Vec3::ZERO, 0u32), |(sum, count), position| (sum + position, count + 1));
        (count > 0).then(|| sum / count as f32)
    }

    /// Run the loop for the configured number of frames, or indefinitely.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            entities = self.world.entity_count(),
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            self.tick(tick_duration.as_secs_f32());

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(
                    ticks = tick_count,
                    entities = self.world.entity_count(),
                    "tick loop complete"
                );
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
