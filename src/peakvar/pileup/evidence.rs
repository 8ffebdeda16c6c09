use crate::peakvar::reads::{Allele, Read, Sample};
use crate::peakvar::reference::ReferenceWindow;
use crate::utils::GenomicRegion;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Evidence for one allele at one position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlleleEvidence {
    pub count: u32,
    pub quals: Vec<u8>,
    /// Sample of each entry in `quals`
    pub samples: Vec<Sample>,
    pub forward: u32,
    pub reverse: u32,
    pub treatment: u32,
    pub control: u32,
}

impl AlleleEvidence {
    fn add(&mut self, qual: u8, is_reverse: bool, sample: Sample) {
        self.count += 1;
        self.quals.push(qual);
        self.samples.push(sample);
        if is_reverse {
            self.reverse += 1;
        } else {
            self.forward += 1;
        }
        match sample {
            Sample::Treatment => self.treatment += 1,
            Sample::Control => self.control += 1,
        }
    }
}

/// Alleles observed at one reference position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pileup {
    pub ref_base: u8,
    alleles: BTreeMap<Allele, AlleleEvidence>,
}

impl Pileup {
    pub fn new(ref_base: u8) -> Self {
        Pileup {
            ref_base,
            alleles: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, allele: Allele, qual: u8, is_reverse: bool, sample: Sample) {
        self.alleles
            .entry(allele)
            .or_default()
            .add(qual, is_reverse, sample);
    }

    pub fn ref_allele(&self) -> Allele {
        Allele::Base(self.ref_base)
    }

    pub fn is_ref(&self, allele: &Allele) -> bool {
        *allele == self.ref_allele()
    }

    /// Number of reads covering the position.
    pub fn depth(&self) -> u32 {
        self.alleles.values().map(|e| e.count).sum()
    }

    pub fn sample_depth(&self, sample: Sample) -> u32 {
        self.alleles
            .values()
            .map(|e| match sample {
                Sample::Treatment => e.treatment,
                Sample::Control => e.control,
            })
            .sum()
    }

    pub fn get(&self, allele: &Allele) -> Option<&AlleleEvidence> {
        self.alleles.get(allele)
    }

    pub fn count(&self, allele: &Allele) -> u32 {
        self.get(allele).map_or(0, |e| e.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Allele, &AlleleEvidence)> {
        self.alleles.iter()
    }

    /// Non-reference alleles, most observed first (ties by allele order).
    pub fn alt_alleles(&self) -> Vec<(&Allele, &AlleleEvidence)> {
        self.alleles
            .iter()
            .filter(|(allele, _)| !self.is_ref(allele))
            .sorted_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)))
            .collect()
    }

    pub fn is_all_reference(&self) -> bool {
        self.alleles.keys().all(|allele| self.is_ref(allele))
    }
}

/// Per-position pileups over a region. Positions without coverage are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionEvidence {
    region: GenomicRegion,
    pileups: BTreeMap<i64, Pileup>,
}

impl PositionEvidence {
    /// Tallies one observation per read per covered position inside `region`.
    pub fn build(region: &GenomicRegion, reference: &ReferenceWindow, reads: &[Read]) -> Self {
        let mut pileups: BTreeMap<i64, Pileup> = BTreeMap::new();
        for read in reads {
            for obs in read.observations() {
                if !region.contains(obs.ref_pos) {
                    continue;
                }
                pileups
                    .entry(obs.ref_pos)
                    .or_insert_with(|| Pileup::new(reference.base_at(obs.ref_pos).unwrap_or(b'N')))
                    .add(obs.allele, obs.qual, read.is_reverse(), read.sample());
            }
        }
        PositionEvidence {
            region: region.clone(),
            pileups,
        }
    }

    pub fn region(&self) -> &GenomicRegion {
        &self.region
    }

    pub fn get(&self, pos: i64) -> Option<&Pileup> {
        self.pileups.get(&pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Pileup)> {
        self.pileups.iter().map(|(pos, pileup)| (*pos, pileup))
    }

    pub fn len(&self) -> usize {
        self.pileups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pileups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::reads::{parse_cigar_string, RawRecord};

    fn reference() -> ReferenceWindow {
        ReferenceWindow {
            contig: "chr1".to_string(),
            start: 100,
            seq: b"ACGTACGTACGTACGTACGT".to_vec(),
        }
    }

    fn read(bases: &str, cigar: &str, start: i64, is_reverse: bool, sample: Sample) -> Read {
        Read::new(RawRecord {
            id: format!("{}-{}", start, cigar),
            bases: bases.as_bytes().to_vec(),
            quals: vec![30; bases.len()],
            ref_start: start,
            is_reverse,
            mapq: 60,
            cigar: parse_cigar_string(cigar).unwrap(),
            sample,
        })
        .unwrap()
    }

    #[test]
    fn reference_reads_give_reference_pileups() {
        let region = GenomicRegion::new("chr1", 102, 110).unwrap();
        let reads = vec![
            read("ACGTACGT", "8M", 100, false, Sample::Treatment),
            read("GTACGTAC", "8M", 102, true, Sample::Treatment),
            read("ACGTACGT", "8M", 104, false, Sample::Control),
        ];
        let evidence = PositionEvidence::build(&region, &reference(), &reads);
        assert_eq!(evidence.len(), 8);
        assert!(evidence.iter().all(|(_, p)| p.is_all_reference()));
        assert_eq!(evidence.get(101), None);
        assert_eq!(evidence.get(105).unwrap().depth(), 3);
        assert_eq!(evidence.get(105).unwrap().sample_depth(Sample::Control), 1);
        assert_eq!(evidence.get(103).unwrap().depth(), 2);
    }

    #[test]
    fn depth_matches_overlapping_reads() {
        let region = GenomicRegion::new("chr1", 100, 120).unwrap();
        let reads = vec![
            read("ACGTTCGT", "8M", 100, false, Sample::Treatment),
            read("ACGCGT", "3M2D3M", 100, true, Sample::Treatment),
            read("ACGTGGGACGT", "4M3I4M", 100, false, Sample::Treatment),
        ];
        let evidence = PositionEvidence::build(&region, &reference(), &reads);
        for pos in 100..108 {
            assert_eq!(evidence.get(pos).unwrap().depth(), 3, "position {}", pos);
        }

        let at_104 = evidence.get(104).unwrap();
        assert_eq!(at_104.count(&Allele::Base(b'T')), 1);
        assert_eq!(at_104.count(&Allele::Deletion), 1);
        assert_eq!(at_104.count(&Allele::Base(b'A')), 1);

        let at_103 = evidence.get(103).unwrap();
        assert_eq!(at_103.count(&Allele::Insertion(b"TGGG".to_vec())), 1);
        let alts = at_103.alt_alleles();
        assert_eq!(alts.len(), 2);
        assert_eq!(*alts[0].0, Allele::Insertion(b"TGGG".to_vec()));
        assert_eq!(alts[0].1.forward, 1);
        assert_eq!(*alts[1].0, Allele::Deletion);
    }
}
