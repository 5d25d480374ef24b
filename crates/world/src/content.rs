//! Node content identifiers and their static features.

/// Node content identifier.
pub type ContentId = u16;

/// Solid stone.
pub const CONTENT_STONE: ContentId = 0;
/// Grass-topped dirt.
pub const CONTENT_GRASS: ContentId = 1;
/// Flowing water.
pub const CONTENT_WATER: ContentId = 2;
/// Tree trunk.
pub const CONTENT_TREE: ContentId = 4;
/// Tree leaves.
pub const CONTENT_LEAVES: ContentId = 5;
/// Grass with footprints; recovers to grass over time.
pub const CONTENT_GRASS_FOOTSTEPS: ContentId = 6;
/// Mud; dries into grass under open air.
pub const CONTENT_MUD: ContentId = 7;
/// Still water source.
pub const CONTENT_WATERSOURCE: ContentId = 9;
/// Fence post; mobs cannot stand on it.
pub const CONTENT_FENCE: ContentId = 0x3a;
/// Plain dirt.
pub const CONTENT_DIRT: ContentId = 0x17;
/// Sand.
pub const CONTENT_SAND: ContentId = 0x18;
/// Snow layer.
pub const CONTENT_SNOW: ContentId = 0x1d;
/// Wool block.
pub const CONTENT_WOOL: ContentId = 0x1e;
/// Empty space.
pub const CONTENT_AIR: ContentId = 126;
/// Unknown or not-yet-loaded content.
pub const CONTENT_IGNORE: ContentId = 127;
/// Protective marker; explosions near it are suppressed.
pub const CONTENT_BORDERSTONE: ContentId = 0x807;
/// Young tree.
pub const CONTENT_SAPLING: ContentId = 0x820;
/// Short wild grass.
pub const CONTENT_WILDGRASS_SHORT: ContentId = 0x880;
/// Container node holding dropped items.
pub const CONTENT_PARCEL: ContentId = 0x8a0;

/// Features of a content type relevant to simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFeatures {
    /// Blocks movement.
    pub walkable: bool,
    /// Is a liquid.
    pub liquid: bool,
    /// Can be stood or jumped on from.
    pub jumpable: bool,
    /// Can be replaced by placing something into it.
    pub buildable_to: bool,
    /// Plants can root in it.
    pub soil: bool,
}

impl ContentFeatures {
    const SOLID: Self = Self {
        walkable: true,
        liquid: false,
        jumpable: true,
        buildable_to: false,
        soil: false,
    };
    const OPEN: Self = Self {
        walkable: false,
        liquid: false,
        jumpable: true,
        buildable_to: true,
        soil: false,
    };
}

/// Look up the features of a content id. Unknown ids behave as solid.
pub fn content_features(content: ContentId) -> ContentFeatures {
    match content {
        CONTENT_AIR | CONTENT_SNOW | CONTENT_WILDGRASS_SHORT => ContentFeatures::OPEN,
        CONTENT_WATER | CONTENT_WATERSOURCE => ContentFeatures {
            liquid: true,
            ..ContentFeatures::OPEN
        },
        CONTENT_SAPLING => ContentFeatures {
            buildable_to: false,
            ..ContentFeatures::OPEN
        },
        CONTENT_PARCEL => ContentFeatures {
            buildable_to: false,
            ..ContentFeatures::OPEN
        },
        CONTENT_GRASS | CONTENT_GRASS_FOOTSTEPS | CONTENT_DIRT | CONTENT_MUD => {
            ContentFeatures {
                soil: true,
                ..ContentFeatures::SOLID
            }
        }
        CONTENT_FENCE => ContentFeatures {
            jumpable: false,
            ..ContentFeatures::SOLID
        },
        _ => ContentFeatures::SOLID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_open_and_stone_is_solid() {
        assert!(!content_features(CONTENT_AIR).walkable);
        assert!(content_features(CONTENT_AIR).buildable_to);
        assert!(content_features(CONTENT_STONE).walkable);
    }

    #[test]
    fn unloaded_content_blocks_movement() {
        assert!(content_features(CONTENT_IGNORE).walkable);
    }

    #[test]
    fn water_is_liquid_but_not_walkable() {
        let f = content_features(CONTENT_WATERSOURCE);
        assert!(f.liquid);
        assert!(!f.walkable);
    }

    #[test]
    fn grass_variants_are_soil() {
        for c in [CONTENT_GRASS, CONTENT_GRASS_FOOTSTEPS, CONTENT_DIRT, CONTENT_MUD] {
            assert!(content_features(c).soil);
        }
        assert!(!content_features(CONTENT_STONE).soil);
    }
}
