use std::str::FromStr;

/// Gap-affine scoring weights. Penalties are stored as non-negative values and
/// a gap of length `L` costs `gapo_scr + L * gape_scr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlnScoring {
    pub match_scr: i32,
    pub mism_scr: i32,
    pub gapo_scr: i32,
    pub gape_scr: i32,
}

impl Default for AlnScoring {
    fn default() -> Self {
        AlnScoring {
            match_scr: 2,
            mism_scr: 3,
            gapo_scr: 5,
            gape_scr: 2,
        }
    }
}

/// Ordering applied to alignments (and unitig assignments) with equal scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Fewer indel bases first, then the leftmost start
    #[default]
    FewestIndels,
    /// Leftmost start first, then fewer indel bases
    Leftmost,
}

impl FromStr for TieBreak {
    type Err = &'static str;
    fn from_str(policy: &str) -> Result<Self, Self::Err> {
        match policy {
            "indels" => Ok(TieBreak::FewestIndels),
            "leftmost" => Ok(TieBreak::Leftmost),
            _ => Err("Invalid tie-break policy. Options are: indels, leftmost"),
        }
    }
}
