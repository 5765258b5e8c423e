//! Turning spawn batches into entities.

use anyhow::{Result, anyhow};
use engine_component::{Archetype, Component};
use engine_storage::{EntityId, World};
use glam::Vec3;
use tracing::info;

use crate::components::{Lifetime, Mesh, SKINNED_MESH, Transform, Velocity};
use crate::config::SpawnBatch;

/// Spacing between consecutive entities of a batch along the x axis.
const SPACING: f32 = 2.0;

/// Spawn every entity of `batch`, returning their ids.
///
/// # Errors
///
/// Returns an error if the batch names an unknown component kind or the
/// world cannot create its pool.
pub fn spawn_batch(world: &mut World, batch: &SpawnBatch) -> Result<Vec<EntityId>> {
    let archetype = world
        .catalog()
        .archetype_of(batch.components.iter().map(String::as_str))
        .map_err(|name| anyhow!("unknown component kind `{name}`"))?;

    let mut ids = Vec::with_capacity(batch.count as usize);
    for index in 0..batch.count {
        ids.push(spawn_one(world, archetype, batch, index)?);
    }

    info!(%archetype, count = batch.count, "spawned batch");
    Ok(ids)
}

fn spawn_one(
    world: &mut World,
    archetype: Archetype,
    batch: &SpawnBatch,
    index: u32,
) -> Result<EntityId> {
    let mut builder = world.create_entity(archetype)?;
    if archetype.contains(Transform::TYPE_ID) {
        builder = builder.with(Transform::from_position(Vec3::new(
            index as f32 * SPACING,
            0.0,
            0.0,
        )));
    }
    if archetype.contains(Velocity::TYPE_ID) {
        builder = builder.with(Velocity(Vec3::from_array(batch.velocity)));
    }
    if archetype.contains(Mesh::TYPE_ID) {
        builder = builder.with(Mesh { id: batch.mesh });
    }
    if archetype.contains(SKINNED_MESH) {
        builder = builder.with_kind(SKINNED_MESH, Mesh { id: batch.mesh });
    }
    if archetype.contains(Lifetime::TYPE_ID) {
        builder = builder.with(Lifetime {
            remaining: batch.lifetime,
        });
    }
    // Raw kinds such as `Collider` are zero-filled by `spawn`.
    Ok(builder.spawn()?.id())
}
