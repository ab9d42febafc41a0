//! Per-surface frame queues.
//!
//! Clears and draws are recorded in submission order and encoded when the
//! surface pushes its frame.

use crate::paint::Color;

use super::state::PipelineState;

/// One indexed draw, with the pipeline state it was issued against.
#[derive(Debug, Clone)]
pub(crate) struct DrawCall {
    pub state: PipelineState,
    pub count: u32,
    /// Routed to the OIT accumulation targets.
    pub oit: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum FrameCommand {
    /// Clears the color target; `all` also clears depth and OIT targets.
    Clear { color: Color, all: bool },
    ClearDepth,
    ClearTransparency,
    Draw(DrawCall),
}

#[derive(Debug, Default)]
pub(crate) struct FrameQueue {
    /// Whether OIT draws are accepted for this surface.
    pub transparency: bool,
    pub commands: Vec<FrameCommand>,
}

/// Groups consecutive draws that can share one render pass.
///
/// A new pass starts whenever the command kind changes between a clear, an
/// opaque draw and an OIT draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum PassKind {
    Clear,
    Opaque,
    Oit,
}

impl FrameCommand {
    pub fn pass_kind(&self) -> PassKind {
        match self {
            Self::Draw(d) if d.oit => PassKind::Oit,
            Self::Draw(_) => PassKind::Opaque,
            _ => PassKind::Clear,
        }
    }
}

/// Splits `commands` into runs of the same [`PassKind`], keeping order.
pub(crate) fn split_passes(commands: &[FrameCommand]) -> Vec<(PassKind, &[FrameCommand])> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=commands.len() {
        let boundary = i == commands.len()
            || commands[i].pass_kind() != commands[start].pass_kind()
            || commands[i].pass_kind() == PassKind::Clear;
        if boundary {
            runs.push((commands[start].pass_kind(), &commands[start..i]));
            start = i;
        }
    }
    runs
}
