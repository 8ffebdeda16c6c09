use super::Params;
use crate::peakvar::assembly::{Assembler, AssemblyResult};
use crate::peakvar::error::{RegionError, Stage};
use crate::peakvar::genotype::{Variant, VariantDecision};
use crate::peakvar::peak::Peak;
use crate::peakvar::pileup::PositionEvidence;
use crate::peakvar::read_source::ReadSource;
use crate::peakvar::reads::{Read, RegionReadCollection};
use crate::peakvar::realign::{AlignTarget, ReadAssignment, UnitigAlignmentIndex};
use crate::peakvar::reference::{ReferenceSource, ReferenceWindow};
use std::time::{Duration, Instant};

/// Reads realigned between two deadline checks.
const READS_PER_BUDGET_CHECK: usize = 32;

/// Wall-clock deadline for one region.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit: Option<Duration>,
}

impl Budget {
    pub fn new(limit: Option<Duration>) -> Self {
        Budget {
            started: Instant::now(),
            limit,
        }
    }

    /// Fails once the budget is spent; `stage` is the last completed stage.
    pub fn check(&self, stage: Stage) -> Result<(), RegionError> {
        match self.limit {
            Some(budget) if self.started.elapsed() >= budget => {
                Err(RegionError::Timeout { stage, budget })
            }
            _ => Ok(()),
        }
    }
}

/// Stages a region has passed through. Transitions only move forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTrace {
    stages: Vec<Stage>,
}

impl StageTrace {
    fn advance(&mut self, next: Stage) {
        debug_assert!(self.current().map_or(true, |current| current < next));
        self.stages.push(next);
    }

    pub fn current(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Bookkeeping for one processed region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub num_reads: usize,
    pub num_malformed: usize,
    pub num_low_mapq: usize,
    pub downsampled: bool,
    pub assembly_failed: bool,
    pub num_unitigs: usize,
    pub num_divergent: usize,
    pub num_to_unitig: usize,
    pub num_to_reference: usize,
    pub num_unassigned: usize,
    pub trace: StageTrace,
}

#[derive(Debug, Clone)]
pub struct RegionOutcome {
    pub variants: Vec<Variant>,
    pub assembly: AssemblyResult,
    pub assignments: Vec<ReadAssignment>,
    pub stats: RegionStats,
}

fn load_reads(
    peak: &Peak,
    params: &Params,
    read_sources: &mut [&mut dyn ReadSource],
    stats: &mut RegionStats,
) -> Result<RegionReadCollection, RegionError> {
    let mut collection = RegionReadCollection::new(peak.region.clone(), params.max_reads);
    for source in read_sources.iter_mut() {
        source
            .visit_region(&peak.region, &mut |raw| {
                if raw.mapq < params.min_mapq {
                    stats.num_low_mapq += 1;
                    return;
                }
                match Read::new(raw) {
                    Ok(read) => {
                        collection.add(read);
                    }
                    Err(err) => {
                        stats.num_malformed += 1;
                        log::debug!("{}: Skipping read: {}", peak.id, err);
                    }
                }
            })
            .map_err(|reason| RegionError::ReadSource {
                region: peak.region.to_string(),
                reason,
            })?;
    }

    if collection.is_downsampled() {
        log::warn!(
            "{}: Down-sampled {} reads to {}",
            peak.id,
            collection.num_seen(),
            collection.len()
        );
    }
    stats.num_reads = collection.len();
    stats.downsampled = collection.is_downsampled();
    Ok(collection)
}

/// Collects and assembles the reads of one region without calling variants.
pub fn assemble_region(
    peak: &Peak,
    params: &Params,
    read_sources: &mut [&mut dyn ReadSource],
    assembler: &dyn Assembler,
) -> Result<AssemblyResult, RegionError> {
    let budget = Budget::new(params.timeout);
    let mut stats = RegionStats::default();
    let collection = load_reads(peak, params, read_sources, &mut stats)?;
    budget.check(Stage::Loaded)?;
    let assembly = collection.assemble(assembler)?;
    log::debug!(
        "{}: Assembled {} unitigs from {} reads",
        peak.id,
        assembly.len(),
        stats.num_reads
    );
    Ok(assembly)
}

/// Runs one region from read collection to variant calls.
///
/// Only a missing reference, an unreadable read source or an exhausted
/// budget end the region early; assembly failures and divergent unitigs
/// degrade to the reference alignments.
pub fn process_region(
    peak: &Peak,
    params: &Params,
    reference: &dyn ReferenceSource,
    read_sources: &mut [&mut dyn ReadSource],
    assembler: &dyn Assembler,
) -> Result<RegionOutcome, RegionError> {
    let budget = Budget::new(params.timeout);
    let mut stats = RegionStats::default();

    let window = ReferenceWindow::fetch(reference, &peak.region, params.flank)?;
    let collection = load_reads(peak, params, read_sources, &mut stats)?;
    stats.trace.advance(Stage::Loaded);
    log::debug!("{}: Loaded {} reads", peak.id, stats.num_reads);
    budget.check(Stage::Loaded)?;

    let (assembly, index) = match collection.assemble(assembler) {
        Ok(assembly) => {
            stats.trace.advance(Stage::Assembled);
            log::debug!("{}: Assembled {} unitigs", peak.id, assembly.len());
            budget.check(Stage::Assembled)?;
            let index = UnitigAlignmentIndex::build(&assembly, &window, &params.realign);
            (assembly, index)
        }
        Err(err) => {
            log::warn!("{}: {}; using reference alignments", peak.id, err);
            stats.assembly_failed = true;
            (
                AssemblyResult::NoAssembly,
                UnitigAlignmentIndex::reference_only(&params.realign),
            )
        }
    };
    for divergence in index.divergences() {
        log::warn!("{}: {}", peak.id, divergence);
    }
    stats.num_unitigs = index.num_unitigs();
    stats.num_divergent = index.divergences().len();
    let last_stage = stats.trace.current().unwrap_or(Stage::Loaded);

    let canonical = collection.canonical_reads();
    let mut assignments = Vec::with_capacity(canonical.len());
    let mut realigned = Vec::with_capacity(canonical.len());
    for (read_index, read) in canonical.into_iter().enumerate() {
        if read_index % READS_PER_BUDGET_CHECK == 0 {
            budget.check(last_stage)?;
        }
        let (assignment, read) = index.assign(read);
        match assignment.target {
            AlignTarget::Unitig(_) => stats.num_to_unitig += 1,
            AlignTarget::Reference => stats.num_to_reference += 1,
            AlignTarget::Unassigned => stats.num_unassigned += 1,
        }
        assignments.push(assignment);
        realigned.extend(read);
    }
    stats.trace.advance(Stage::Realigned);
    log::debug!(
        "{}: Realigned reads: {} to unitigs, {} to reference, {} unassigned",
        peak.id,
        stats.num_to_unitig,
        stats.num_to_reference,
        stats.num_unassigned
    );
    budget.check(Stage::Realigned)?;

    let evidence = PositionEvidence::build(&peak.region, &window, &realigned);
    stats.trace.advance(Stage::PileupBuilt);
    log::debug!("{}: Built {} pileups", peak.id, evidence.len());
    budget.check(Stage::PileupBuilt)?;

    let decision = VariantDecision::new(params.likelihood, params.filters);
    let variants = decision.call(peak, &evidence, &window);
    stats.trace.advance(Stage::Called);
    log::debug!("{}: Called {} variants", peak.id, variants.len());

    Ok(RegionOutcome {
        variants,
        assembly,
        assignments,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::read_source::MemoryReadSource;
    use crate::peakvar::reads::{CigarOp, RawRecord, Sample};
    use crate::peakvar::reference::MemoryReference;
    use crate::utils::GenomicRegion;

    struct FailingAssembler;

    impl Assembler for FailingAssembler {
        fn assemble(&self, _seqs: &[&[u8]]) -> Result<Vec<Vec<u8>>, String> {
            Err("graph has a cycle".to_string())
        }
    }

    fn peak() -> Peak {
        Peak {
            id: "peak1".to_string(),
            region: GenomicRegion::new("chr1", 20, 60).unwrap(),
            summit: 40,
        }
    }

    fn setup() -> (MemoryReference, MemoryReadSource) {
        let seq = b"ACGTTGCAAGGCTTACCGATCGATGGCATTACGGATCCTAGGCATGCAATCGGTACCTAGTTCAAGCT".to_vec();
        let reference = MemoryReference::new().with_contig("chr1", &seq);
        let mut source = MemoryReadSource::new(Sample::Treatment);
        for i in 0..6 {
            let start = 10 + i * 3;
            let bases = seq[start..start + 40].to_vec();
            source.push(
                "chr1",
                RawRecord {
                    id: format!("read{}", i),
                    quals: vec![30; bases.len()],
                    bases,
                    ref_start: start as i64,
                    is_reverse: i % 2 == 1,
                    mapq: if i == 5 { 0 } else { 60 },
                    cigar: vec![CigarOp::Match(40)],
                    sample: Sample::Treatment,
                },
            );
        }
        (reference, source)
    }

    #[test]
    fn assembly_failure_still_reaches_called() {
        let (reference, mut source) = setup();
        let outcome = process_region(
            &peak(),
            &Params::default(),
            &reference,
            &mut [&mut source],
            &FailingAssembler,
        )
        .unwrap();
        assert!(outcome.stats.assembly_failed);
        assert_eq!(
            outcome.stats.trace.stages(),
            &[Stage::Loaded, Stage::Realigned, Stage::PileupBuilt, Stage::Called]
        );
        assert_eq!(outcome.stats.num_low_mapq, 1);
        assert_eq!(outcome.stats.num_to_reference, 5);
        assert!(outcome.variants.is_empty());
    }

    #[test]
    fn exhausted_budget_is_a_timeout() {
        let (reference, mut source) = setup();
        let params = Params {
            timeout: Some(Duration::ZERO),
            ..Params::default()
        };
        let result = process_region(
            &peak(),
            &params,
            &reference,
            &mut [&mut source],
            &FailingAssembler,
        );
        assert!(matches!(
            result,
            Err(RegionError::Timeout {
                stage: Stage::Loaded,
                ..
            })
        ));
    }

    #[test]
    fn missing_contig_is_fatal() {
        let (_, mut source) = setup();
        let reference = MemoryReference::new();
        let result = process_region(
            &peak(),
            &Params::default(),
            &reference,
            &mut [&mut source],
            &FailingAssembler,
        );
        assert!(matches!(result, Err(RegionError::Reference { .. })));
    }
}
