use crate::peakvar::assembly::AssemblyParams;
use crate::peakvar::genotype::{FilterParams, LikelihoodParams};
use crate::peakvar::realign::RealignParams;
use std::time::Duration;

/// Run configuration, built once from the command line and shared read-only.
#[derive(Debug, Clone)]
pub struct Params {
    /// Reads kept per region; the rest are reservoir-sampled away
    pub max_reads: usize,
    /// Reference bases fetched on either side of a region
    pub flank: u32,
    pub min_mapq: u8,
    /// Wall-clock budget per region
    pub timeout: Option<Duration>,
    pub assembly: AssemblyParams,
    pub realign: RealignParams,
    pub likelihood: LikelihoodParams,
    pub filters: FilterParams,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            max_reads: 500,
            flank: 200,
            min_mapq: 1,
            timeout: None,
            assembly: AssemblyParams::default(),
            realign: RealignParams::default(),
            likelihood: LikelihoodParams::default(),
            filters: FilterParams::default(),
        }
    }
}
