use std::{fmt, time::Duration};
use thiserror::Error;

/// Forward-only processing stages of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Loaded,
    Assembled,
    Realigned,
    PileupBuilt,
    Called,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "loaded",
            Stage::Assembled => "assembled",
            Stage::Realigned => "realigned",
            Stage::PileupBuilt => "pileup-built",
            Stage::Called => "called",
        };
        f.write_str(name)
    }
}

/// Errors raised while processing a single region. None of them abort a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("Malformed record {read_id}: {reason}")]
    MalformedRecord { read_id: String, reason: String },

    #[error("Assembly failed: {0}")]
    AssemblyFailure(String),

    #[error("Unitig {unitig_id} diverges from the reference (identity {identity:.3})")]
    AlignmentDivergence { unitig_id: usize, identity: f64 },

    #[error("Region exceeded its {budget:?} budget after stage '{stage}'")]
    Timeout { stage: Stage, budget: Duration },

    #[error("Reference sequence unavailable for {region}: {reason}")]
    Reference { region: String, reason: String },

    #[error("Read extraction failed for {region}: {reason}")]
    ReadSource { region: String, reason: String },
}

impl RegionError {
    pub fn malformed(read_id: &str, reason: impl Into<String>) -> Self {
        RegionError::MalformedRecord {
            read_id: read_id.to_string(),
            reason: reason.into(),
        }
    }
}
