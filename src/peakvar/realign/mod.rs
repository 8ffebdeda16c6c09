mod swalign;
mod unitig_index;

pub use swalign::{align_local, LocalAlignment};
pub use unitig_index::{AlignTarget, ReadAssignment, UnitigAlignmentIndex};

use crate::utils::{AlnScoring, TieBreak};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealignParams {
    pub scoring: AlnScoring,
    pub tie_break: TieBreak,
    /// Unitigs aligning to the reference window below this identity are discarded
    pub min_unitig_identity: f64,
    /// Reads aligning to their best unitig below this identity are unassigned
    pub min_read_identity: f64,
    /// Bases added on each side of a read's original span when searching a unitig
    pub window_margin: u32,
}

impl Default for RealignParams {
    fn default() -> Self {
        RealignParams {
            scoring: AlnScoring::default(),
            tie_break: TieBreak::default(),
            min_unitig_identity: 0.8,
            min_read_identity: 0.9,
            window_margin: 20,
        }
    }
}
