use super::read::{Read, Sample};
use crate::peakvar::assembly::{Assembler, AssemblyResult};
use crate::peakvar::error::RegionError;
use crate::utils::GenomicRegion;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const RESERVOIR_SEED: u64 = 42;

/// Outcome of offering a read to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Kept,
    /// Read displaced an earlier one, or lost the reservoir draw
    Sampled,
    /// Read shares no reference bases with the region
    Rejected,
}

/// Fixed-seed reservoir of at most `capacity` reads.
struct Reservoir {
    reads: Vec<Read>,
    num_seen: usize,
    rng: StdRng,
}

impl Reservoir {
    fn new() -> Self {
        Reservoir {
            reads: Vec::new(),
            num_seen: 0,
            rng: StdRng::seed_from_u64(RESERVOIR_SEED),
        }
    }

    fn offer(&mut self, read: Read, capacity: usize) -> AddOutcome {
        self.num_seen += 1;
        if self.reads.len() < capacity {
            self.reads.push(read);
            return AddOutcome::Kept;
        }
        let slot = self.rng.random_range(0..self.num_seen);
        if slot < capacity {
            self.reads[slot] = read;
        }
        AddOutcome::Sampled
    }
}

/// Reads overlapping a single region. Each sample keeps its own reservoir
/// of `max_reads`, so control coverage never displaces treatment reads.
pub struct RegionReadCollection {
    region: GenomicRegion,
    max_reads: usize,
    treatment: Reservoir,
    control: Reservoir,
    num_rejected: usize,
}

impl RegionReadCollection {
    pub fn new(region: GenomicRegion, max_reads: usize) -> Self {
        RegionReadCollection {
            region,
            max_reads: max_reads.max(1),
            treatment: Reservoir::new(),
            control: Reservoir::new(),
            num_rejected: 0,
        }
    }

    /// Offers a read to the collection. Past the cap, reads are retained by
    /// fixed-seed reservoir sampling, so the subset depends only on input order.
    pub fn add(&mut self, read: Read) -> AddOutcome {
        let (start, end) = read.ref_span();
        if self.region.overlap(start, end) == 0 {
            self.num_rejected += 1;
            return AddOutcome::Rejected;
        }
        let reservoir = match read.sample() {
            Sample::Treatment => &mut self.treatment,
            Sample::Control => &mut self.control,
        };
        reservoir.offer(read, self.max_reads)
    }

    pub fn region(&self) -> &GenomicRegion {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.treatment.reads.len() + self.control.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlapping reads offered so far, including those dropped by sampling.
    pub fn num_seen(&self) -> usize {
        self.treatment.num_seen + self.control.num_seen
    }

    pub fn num_rejected(&self) -> usize {
        self.num_rejected
    }

    pub fn is_downsampled(&self) -> bool {
        self.num_seen() > self.len()
    }

    /// Retained reads of one sample.
    pub fn sample_reads(&self, sample: Sample) -> &[Read] {
        match sample {
            Sample::Treatment => &self.treatment.reads,
            Sample::Control => &self.control.reads,
        }
    }

    /// Retained reads, treatment first.
    pub fn reads(&self) -> impl Iterator<Item = &Read> {
        self.treatment.reads.iter().chain(&self.control.reads)
    }

    /// Deduplicated reads in canonical order: read id, then start, then strand.
    pub fn canonical_reads(&self) -> Vec<&Read> {
        self.reads()
            .sorted_by(|a, b| {
                (a.id(), a.ref_start(), a.is_reverse(), a.bases())
                    .cmp(&(b.id(), b.ref_start(), b.is_reverse(), b.bases()))
            })
            .dedup_by(|a, b| {
                a.id() == b.id() && a.ref_start() == b.ref_start() && a.is_reverse() == b.is_reverse()
            })
            .collect()
    }

    /// Runs the assembler on the canonical read set.
    pub fn assemble(&self, assembler: &dyn Assembler) -> Result<AssemblyResult, RegionError> {
        let reads = self.canonical_reads();
        let seqs = reads.iter().map(|r| r.bases()).collect_vec();
        let unitigs = assembler
            .assemble(&seqs)
            .map_err(RegionError::AssemblyFailure)?;
        Ok(AssemblyResult::from_sequences(unitigs))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::reads::{CigarOp, RawRecord};

    fn read(id: &str, start: i64, len: usize) -> Read {
        sample_read(id, start, len, Sample::Treatment)
    }

    fn sample_read(id: &str, start: i64, len: usize, sample: Sample) -> Read {
        Read::new(RawRecord {
            id: id.to_string(),
            bases: vec![b'A'; len],
            quals: vec![30; len],
            ref_start: start,
            is_reverse: false,
            mapq: 60,
            cigar: vec![CigarOp::Match(len as u32)],
            sample,
        })
        .unwrap()
    }

    fn region() -> GenomicRegion {
        GenomicRegion::new("chr1", 1000, 2000).unwrap()
    }

    #[test]
    fn rejects_reads_without_overlap() {
        let mut collection = RegionReadCollection::new(region(), 10);
        assert_eq!(collection.add(read("a", 900, 100)), AddOutcome::Rejected);
        assert_eq!(collection.add(read("b", 2000, 100)), AddOutcome::Rejected);
        assert_eq!(collection.add(read("c", 901, 100)), AddOutcome::Kept);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.num_rejected(), 2);
    }

    #[test]
    fn reservoir_sampling_is_capped_and_deterministic() {
        let sample_ids = || {
            let mut collection = RegionReadCollection::new(region(), 500);
            for i in 0..10_000 {
                collection.add(read(&format!("read{}", i), 1000 + (i % 900) as i64, 100));
            }
            assert_eq!(collection.len(), 500);
            assert_eq!(collection.num_seen(), 10_000);
            assert!(collection.is_downsampled());
            collection
                .reads()
                .map(|r| r.id().to_string())
                .collect::<Vec<_>>()
        };
        let first = sample_ids();
        let second = sample_ids();
        assert_eq!(first, second);
        // The reservoir must reach past the first 500 reads
        assert!(first.iter().any(|id| id[4..].parse::<usize>().unwrap() >= 500));
    }

    #[test]
    fn canonical_order_is_sorted_and_deduplicated() {
        let mut collection = RegionReadCollection::new(region(), 10);
        collection.add(read("b", 1100, 50));
        collection.add(read("a", 1200, 50));
        collection.add(read("b", 1100, 50));
        collection.add(read("a", 1000, 50));
        let ids = collection
            .canonical_reads()
            .iter()
            .map(|r| (r.id().to_string(), r.ref_start()))
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                ("a".to_string(), 1000),
                ("a".to_string(), 1200),
                ("b".to_string(), 1100)
            ]
        );
    }

    #[test]
    fn samples_are_capped_separately() {
        let mut collection = RegionReadCollection::new(region(), 50);
        for i in 0..1_000 {
            collection.add(sample_read(&format!("ctl{}", i), 1000, 100, Sample::Control));
        }
        for i in 0..40 {
            collection.add(sample_read(&format!("trt{}", i), 1000, 100, Sample::Treatment));
        }
        assert_eq!(collection.sample_reads(Sample::Treatment).len(), 40);
        assert_eq!(collection.sample_reads(Sample::Control).len(), 50);
        assert_eq!(collection.len(), 90);
        assert_eq!(collection.num_seen(), 1_040);
        assert!(collection.is_downsampled());
    }
}
