//! Slow per-block rules run over active blocks: grass recovery, node metadata
//! upkeep and ambient mob spawning.

use glam::IVec3;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use voxsim_core::{node_center, BlockPos};
use voxsim_world::{
    check_free, BlockStore, ContentId, EntityRegistry, LocalPos, MapBlock, MobLevel,
    NodeMetadata, ServerEntity, SpeciesTable, BLOCK_VOLUME, CONTENT_AIR, CONTENT_GRASS,
    CONTENT_GRASS_FOOTSTEPS, CONTENT_MUD,
};

/// Mobs only spawn where no entity is closer than this.
pub const SPAWN_CLEARANCE: f32 = 16.0;
/// Footsteps fade back to grass one time in this many.
pub const FOOTSTEP_RECOVERY_CHANCE: u32 = 5;
/// Uncovered mud grows grass one time in this many.
pub const MUD_GRASS_CHANCE: u32 = 20;

const HORIZONTAL: [IVec3; 4] = [IVec3::X, IVec3::NEG_X, IVec3::Z, IVec3::NEG_Z];

/// Turn empty parcels back into air. Returns the number of nodes cleared.
pub(crate) fn clear_empty_parcels(block: &mut MapBlock) -> usize {
    let empty: Vec<LocalPos> = block
        .metadata_positions()
        .into_iter()
        .filter(|&local| {
            matches!(block.metadata(local), Some(NodeMetadata::Parcel { items }) if items.is_empty())
        })
        .collect();
    for &local in &empty {
        block.set_node(local, CONTENT_AIR);
    }
    empty.len()
}

/// Grass recovery for one block. Returns the number of nodes changed.
pub(crate) fn grow_grass(map: &mut dyn BlockStore, pos: BlockPos, rng: &mut StdRng) -> usize {
    let Some(block) = map.get_block(pos) else {
        return 0;
    };
    let mut changes: Vec<(IVec3, ContentId)> = Vec::new();
    for index in 0..BLOCK_VOLUME {
        let local = LocalPos::from_index(index);
        let node = local.to_node(pos);
        match block.node(local) {
            CONTENT_GRASS_FOOTSTEPS => {
                if rng.gen_range(0..FOOTSTEP_RECOVERY_CHANCE) == 0 {
                    changes.push((node, CONTENT_GRASS));
                }
            }
            CONTENT_MUD => {
                if map.get_node(node + IVec3::Y) == CONTENT_AIR
                    && rng.gen_range(0..MUD_GRASS_CHANCE) == 0
                {
                    changes.push((node, CONTENT_GRASS));
                }
            }
            _ => {}
        }
    }
    for &(node, content) in &changes {
        map.set_node(node, content);
    }
    changes.len()
}

/// Pick at most one mob to spawn in a block according to the species spawn rules.
pub(crate) fn spawn_candidate(
    map: &dyn BlockStore,
    registry: &EntityRegistry,
    table: &SpeciesTable,
    pos: BlockPos,
    rng: &mut StdRng,
    night: bool,
    max_level: MobLevel,
) -> Option<ServerEntity> {
    let block = map.get_block(pos)?;
    for (species, rule) in table.spawnable() {
        if species.level > max_level || (rule.night_only && !night) {
            continue;
        }
        for index in 0..BLOCK_VOLUME {
            let local = LocalPos::from_index(index);
            if block.node(local) != rule.ground {
                continue;
            }
            let ground = local.to_node(pos);
            if let Some(near) = rule.near {
                if !HORIZONTAL.iter().any(|d| map.get_node(ground + *d) == near) {
                    continue;
                }
            }
            let cell = ground + IVec3::Y;
            if !check_free(map, species, cell) {
                continue;
            }
            if rng.gen_range(0..rule.chance.max(1)) != 0 {
                continue;
            }
            let spawn_pos = node_center(cell);
            if !registry
                .objects_in_radius(spawn_pos, SPAWN_CLEARANCE)
                .is_empty()
            {
                continue;
            }
            debug!(block = %pos, species = species.name, ?cell, "Ambient spawn");
            return Some(ServerEntity::mob(spawn_pos, species));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use voxsim_world::{
        MemoryBlockStore, SpeciesId, CONTENT_PARCEL, CONTENT_STONE, CONTENT_TREE,
    };

    fn store() -> MemoryBlockStore {
        let mut store = MemoryBlockStore::flat(8, 1);
        store.emerge_block(BlockPos::new(0, 0, 0));
        store
    }

    #[test]
    fn empty_parcels_become_air() {
        let mut store = store();
        let full = IVec3::new(2, 1, 2);
        let empty = IVec3::new(4, 1, 4);
        for node in [full, empty] {
            store.set_node(node, CONTENT_PARCEL);
        }
        store.set_node_metadata(
            full,
            Some(NodeMetadata::Parcel {
                items: vec![voxsim_core::InventoryItem::craft("stick", 1)],
            }),
        );
        store.set_node_metadata(empty, Some(NodeMetadata::Parcel { items: Vec::new() }));

        let block = store.get_block_mut(BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(clear_empty_parcels(block), 1);
        assert_eq!(store.get_node(empty), CONTENT_AIR);
        assert_eq!(store.get_node(full), CONTENT_PARCEL);
    }

    #[test]
    fn footsteps_and_uncovered_mud_recover() {
        let mut store = store();
        let steps = IVec3::new(1, 0, 1);
        let covered_mud = IVec3::new(3, 0, 3);
        let open_mud = IVec3::new(5, 0, 5);
        store.set_node(steps, CONTENT_GRASS_FOOTSTEPS);
        store.set_node(covered_mud, CONTENT_MUD);
        store.set_node(covered_mud + IVec3::Y, CONTENT_STONE);
        store.set_node(open_mud, CONTENT_MUD);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            grow_grass(&mut store, BlockPos::new(0, 0, 0), &mut rng);
        }
        assert_eq!(store.get_node(steps), CONTENT_GRASS);
        assert_eq!(store.get_node(open_mud), CONTENT_GRASS);
        assert_eq!(store.get_node(covered_mud), CONTENT_MUD);
    }

    #[test]
    fn spawning_respects_rules_and_clearance() {
        let mut store = store();
        let table = SpeciesTable::builtin();
        let registry = EntityRegistry::new();
        let pos = BlockPos::new(0, 0, 0);

        // Rats need grass beside a tree; the other daytime species need only grass.
        store.set_node(IVec3::new(8, 0, 8), CONTENT_TREE);
        let mut rng = StdRng::seed_from_u64(5);
        let mut spawned = None;
        for _ in 0..2000 {
            spawned = spawn_candidate(&store, &registry, &table, pos, &mut rng, false, MobLevel::Passive);
            if spawned.is_some() {
                break;
            }
        }
        let mob = spawned.expect("something spawns eventually");
        let species = mob.as_mob().unwrap().species;
        assert!(matches!(species, SpeciesId::RAT | SpeciesId::DEER | SpeciesId::SHEEP));
        assert_eq!(mob.base.pos.y, 1.0);

        // One entity in the middle of the block is within clearance of every surface cell.
        let mut crowded = EntityRegistry::new();
        crowded
            .add(
                ServerEntity::mob(glam::Vec3::new(8.0, 1.0, 8.0), table.get(species)),
                &mut store,
            )
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            assert!(spawn_candidate(&store, &crowded, &table, pos, &mut rng, false, MobLevel::Passive)
                .is_none());
        }
    }
}
