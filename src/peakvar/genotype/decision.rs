use super::likelihood::{LikelihoodEngine, LikelihoodParams};
use super::variant::{Filter, Variant};
use crate::peakvar::peak::Peak;
use crate::peakvar::pileup::{Pileup, PositionEvidence};
use crate::peakvar::reads::Sample;
use crate::peakvar::reference::ReferenceWindow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Alternate alleles seen fewer times are not considered
    pub min_alt_count: u32,
    pub min_depth: u32,
    pub min_quality: f64,
    /// Largest acceptable Phred-scaled strand bias
    pub max_strand_bias: f64,
    pub max_summit_dist: Option<u32>,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            min_alt_count: 2,
            min_depth: 5,
            min_quality: 10.0,
            max_strand_bias: 60.0,
            max_summit_dist: None,
        }
    }
}

/// Turns pileups into genotyped, filtered variant records.
pub struct VariantDecision {
    engine: LikelihoodEngine,
    filters: FilterParams,
}

impl VariantDecision {
    pub fn new(likelihood: LikelihoodParams, filters: FilterParams) -> Self {
        VariantDecision {
            engine: LikelihoodEngine::new(likelihood),
            filters,
        }
    }

    /// Calls every position of the peak carrying a sufficiently supported
    /// alternate allele. Deletions called at consecutive positions with the
    /// same genotype are reported as one record.
    pub fn call(
        &self,
        peak: &Peak,
        evidence: &PositionEvidence,
        reference: &ReferenceWindow,
    ) -> Vec<Variant> {
        let mut variants: Vec<Variant> = Vec::new();
        for variant in evidence
            .iter()
            .filter_map(|(pos, pileup)| self.call_position(peak, pos, pileup, reference))
        {
            if let Some(last) = variants.last_mut() {
                if last.is_simple_deletion()
                    && variant.is_simple_deletion()
                    && last.genotype == variant.genotype
                    && last.pos + last.ref_seq.len() as i64 == variant.pos
                {
                    last.absorb_deletion(&variant);
                    continue;
                }
            }
            variants.push(variant);
        }
        variants
    }

    pub fn call_position(
        &self,
        peak: &Peak,
        pos: i64,
        pileup: &Pileup,
        reference: &ReferenceWindow,
    ) -> Option<Variant> {
        let alleles = self
            .engine
            .candidate_alleles(pileup, self.filters.min_alt_count);
        if alleles.len() < 2 {
            return None;
        }

        let summit_distance = peak.summit_distance(pos);
        let likelihoods = self.engine.genotype(pileup, &alleles, summit_distance);
        let quality = likelihoods.quality();
        let genotype = likelihoods.best_genotype().clone();
        let alts = &alleles[1..];
        let allele_balance = self.engine.allele_balance(pileup, &alleles, &genotype);
        let strand_bias = self.engine.strand_bias(pileup, alts);
        let rank_sum = self.engine.quality_rank_sum(pileup, alts);
        let depth = pileup.depth();

        let mut filters = Vec::new();
        if depth < self.filters.min_depth {
            filters.push(Filter::LowDepth);
        }
        if quality < self.filters.min_quality {
            filters.push(Filter::LowQual);
        }
        if strand_bias > self.filters.max_strand_bias {
            filters.push(Filter::StrandBias);
        }
        if matches!(self.filters.max_summit_dist, Some(max) if summit_distance > max) {
            filters.push(Filter::SummitDist);
        }
        if genotype.iter().all(|&allele| allele == 0) {
            filters.push(Filter::RefCall);
        }

        Some(Variant {
            contig: reference.contig.clone(),
            pos,
            allele_depths: alleles.iter().map(|a| pileup.count(a)).collect(),
            ref_seq: vec![pileup.ref_base],
            alleles,
            prev_base: reference.base_at(pos - 1),
            next_base: reference.base_at(pos + 1),
            genotype,
            quality,
            posteriors: likelihoods.posteriors(),
            filters,
            depth,
            strand_bias,
            rank_sum,
            summit_distance,
            treatment_depth: pileup.sample_depth(Sample::Treatment),
            control_depth: pileup.sample_depth(Sample::Control),
            allele_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::reads::Allele;
    use crate::utils::GenomicRegion;

    fn peak() -> Peak {
        Peak {
            id: "p1".to_string(),
            region: GenomicRegion::new("chr1", 0, 20).unwrap(),
            summit: 10,
        }
    }

    fn reference() -> ReferenceWindow {
        ReferenceWindow {
            contig: "chr1".to_string(),
            start: 0,
            seq: b"ACGTACGTACGTACGTACGT".to_vec(),
        }
    }

    fn pileup(ref_count: u32, alt_count: u32) -> Pileup {
        // Position 10 holds a G
        let mut pileup = Pileup::new(b'G');
        for i in 0..ref_count {
            pileup.add(Allele::Base(b'G'), 35, i % 2 == 1, Sample::Treatment);
        }
        for i in 0..alt_count {
            pileup.add(Allele::Base(b'T'), 35, i % 2 == 1, Sample::Treatment);
        }
        pileup
    }

    #[test]
    fn supported_heterozygote_passes() {
        let decision = VariantDecision::new(LikelihoodParams::default(), FilterParams::default());
        let variant = decision
            .call_position(&peak(), 10, &pileup(18, 2), &reference())
            .unwrap();
        assert_eq!(variant.genotype.as_slice(), &[0, 1]);
        assert!(variant.quality > 10.0);
        assert!(variant.is_pass(), "{:?}", variant.filters);
        assert_eq!(variant.allele_depths, vec![18, 2]);
        assert_eq!(variant.prev_base, Some(b'C'));
        assert_eq!(variant.treatment_depth, 20);
        let balance = variant.allele_balance.unwrap();
        assert!((balance.treatment_fraction - 0.1).abs() < 1e-9);
        assert_eq!(balance.control_fraction, None);
    }

    #[test]
    fn single_alternate_read_is_not_a_candidate() {
        let decision = VariantDecision::new(LikelihoodParams::default(), FilterParams::default());
        assert!(decision
            .call_position(&peak(), 10, &pileup(19, 1), &reference())
            .is_none());
        assert!(decision
            .call_position(&peak(), 10, &pileup(20, 0), &reference())
            .is_none());
    }

    #[test]
    fn failing_calls_keep_their_flags() {
        let filters = FilterParams {
            max_summit_dist: Some(5),
            ..FilterParams::default()
        };
        let decision = VariantDecision::new(LikelihoodParams::default(), filters);
        let variant = decision
            .call_position(&peak(), 18, &pileup(2, 2), &reference())
            .unwrap();
        assert!(variant.filters.contains(&Filter::LowDepth));
        assert!(variant.filters.contains(&Filter::SummitDist));

        let variant = decision
            .call_position(&peak(), 10, &pileup(60, 2), &reference())
            .unwrap();
        assert_eq!(variant.filters, vec![Filter::RefCall]);
        assert_eq!(variant.allele_balance, None);
    }
}
