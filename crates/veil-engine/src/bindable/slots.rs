//! Binding convention shared by the engine and its WGSL shaders.
//!
//! Every scene pipeline has two bind groups:
//! - group 0: the surface perspective block (vertex stage, binding 0)
//! - group 1: the draw's resources, at a fixed binding per (kind, slot)
//!
//! ```wgsl
//! @group(0) @binding(0) var<uniform> perspective: Perspective;
//! @group(1) @binding(1) var<uniform> model: Model;       // vertex constant slot 1
//! @group(1) @binding(4) var<uniform> material: Material; // pixel constant slot 0
//! @group(1) @binding(8) var albedo: texture_2d<f32>;     // texture slot 0
//! @group(1) @binding(12) var albedo_sampler: sampler;    // sampler slot 0
//! ```

pub const PERSPECTIVE_GROUP: u32 = 0;
pub const PERSPECTIVE_BINDING: u32 = 0;
pub const RESOURCE_GROUP: u32 = 1;

/// Slots available per resource kind (and per vertex input).
pub const MAX_SLOTS: u32 = 4;

/// Vertex constant slot 0 is the perspective block.
pub const RESERVED_VERTEX_CONSTANT_SLOT: u32 = 0;
pub const DEFAULT_VERTEX_CONSTANT_SLOT: u32 = 1;
pub const DEFAULT_PIXEL_CONSTANT_SLOT: u32 = 0;

const VERTEX_CONSTANTS_BASE: u32 = 0;
const PIXEL_CONSTANTS_BASE: u32 = MAX_SLOTS;
const TEXTURES_BASE: u32 = 2 * MAX_SLOTS;
const SAMPLERS_BASE: u32 = 3 * MAX_SLOTS;

pub const fn vertex_constant_binding(slot: u32) -> u32 {
    VERTEX_CONSTANTS_BASE + slot
}

pub const fn pixel_constant_binding(slot: u32) -> u32 {
    PIXEL_CONSTANTS_BASE + slot
}

pub const fn texture_binding(slot: u32) -> u32 {
    TEXTURES_BASE + slot
}

pub const fn sampler_binding(slot: u32) -> u32 {
    SAMPLERS_BASE + slot
}

pub(crate) fn check_slot(kind: &'static str, slot: u32) -> crate::Result<()> {
    if slot >= MAX_SLOTS {
        return Err(crate::UsageError::SlotOutOfRange {
            kind,
            slot,
            max: MAX_SLOTS - 1,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_do_not_overlap() {
        let mut seen = std::collections::HashSet::new();
        for slot in 0..MAX_SLOTS {
            for b in [
                vertex_constant_binding(slot),
                pixel_constant_binding(slot),
                texture_binding(slot),
                sampler_binding(slot),
            ] {
                assert!(seen.insert(b), "binding {b} used twice");
            }
        }
    }

    #[test]
    fn slot_range_is_checked() {
        assert!(check_slot("texture", MAX_SLOTS - 1).is_ok());
        assert!(check_slot("texture", MAX_SLOTS).is_err());
    }
}
