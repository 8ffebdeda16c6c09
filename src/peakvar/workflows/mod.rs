mod params;
mod region;
mod registry;

pub use params::Params;
pub use region::{assemble_region, process_region, Budget, RegionOutcome, RegionStats, StageTrace};
pub use registry::{OrderedResults, RegionRegistry, RegionResult, RunSummary};
