use super::likelihood::AlleleBalance;
use crate::peakvar::reads::Allele;
use arrayvec::ArrayVec;

/// Diploid genotype as indices into the allele list (reference is 0).
pub type Genotype = ArrayVec<usize, 2>;

/// Reasons a call is flagged. Flagged calls are still reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Filter {
    LowDepth,
    LowQual,
    StrandBias,
    SummitDist,
    RefCall,
}

impl Filter {
    pub const ALL: [Filter; 5] = [
        Filter::LowDepth,
        Filter::LowQual,
        Filter::StrandBias,
        Filter::SummitDist,
        Filter::RefCall,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Filter::LowDepth => "LowDepth",
            Filter::LowQual => "LowQual",
            Filter::StrandBias => "StrandBias",
            Filter::SummitDist => "SummitDist",
            Filter::RefCall => "RefCall",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Filter::LowDepth => "Read depth below the minimum",
            Filter::LowQual => "Variant quality below the minimum",
            Filter::StrandBias => "Phred-scaled strand bias above the maximum",
            Filter::SummitDist => "Position too far from the peak summit",
            Filter::RefCall => "Most likely genotype is homozygous reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub contig: String,
    /// Zero-based reference position
    pub pos: i64,
    /// Reference allele first
    pub alleles: Vec<Allele>,
    /// Reference bases spanned by the record; longer than one base only for
    /// merged deletions
    pub ref_seq: Vec<u8>,
    pub prev_base: Option<u8>,
    /// Base following `ref_seq`
    pub next_base: Option<u8>,
    pub genotype: Genotype,
    pub quality: f64,
    pub posteriors: Vec<f64>,
    pub filters: Vec<Filter>,
    pub depth: u32,
    pub allele_depths: Vec<u32>,
    pub strand_bias: f64,
    pub rank_sum: Option<f64>,
    pub summit_distance: u32,
    pub treatment_depth: u32,
    pub control_depth: u32,
    pub allele_balance: Option<AlleleBalance>,
}

impl Variant {
    pub fn is_pass(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn genotype_quality(&self) -> i32 {
        self.quality.min(99.0).round() as i32
    }

    pub fn ref_base(&self) -> u8 {
        self.alleles
            .first()
            .and_then(|allele| allele.bases().first().copied())
            .unwrap_or(b'N')
    }

    /// Whether this record is a deletion of the reference base alone.
    pub fn is_simple_deletion(&self) -> bool {
        matches!(self.alleles.as_slice(), [Allele::Base(_), Allele::Deletion])
    }

    /// Extends a deletion record by the next deleted reference base.
    pub fn absorb_deletion(&mut self, next: &Variant) {
        self.ref_seq.extend_from_slice(&next.ref_seq);
        self.next_base = next.next_base;
        self.quality = self.quality.min(next.quality);
        self.filters.extend_from_slice(&next.filters);
        self.filters.sort();
        self.filters.dedup();
    }

    /// Zero-based position and VCF allele strings (reference first).
    ///
    /// Deletions need a padding base: the preceding reference base when there
    /// is one, otherwise the following base appended on the right.
    pub fn vcf_alleles(&self) -> (i64, Vec<Vec<u8>>) {
        let has_deletion = self.alleles.iter().any(|a| *a == Allele::Deletion);
        let spell = |index: usize, allele: &Allele| -> Vec<u8> {
            match allele {
                _ if index == 0 => self.ref_seq.clone(),
                Allele::Deletion => Vec::new(),
                other => other.bases().to_vec(),
            }
        };

        if !has_deletion {
            return (
                self.pos,
                self.alleles
                    .iter()
                    .enumerate()
                    .map(|(i, allele)| spell(i, allele))
                    .collect(),
            );
        }

        match (self.prev_base, self.next_base) {
            (Some(prev), _) => {
                let alleles = self
                    .alleles
                    .iter()
                    .enumerate()
                    .map(|(i, allele)| {
                        let mut seq = vec![prev];
                        seq.extend(spell(i, allele));
                        seq
                    })
                    .collect();
                (self.pos - 1, alleles)
            }
            (None, next) => {
                let next = next.unwrap_or(b'N');
                let alleles = self
                    .alleles
                    .iter()
                    .enumerate()
                    .map(|(i, allele)| {
                        let mut seq = spell(i, allele);
                        seq.push(next);
                        seq
                    })
                    .collect();
                (self.pos, alleles)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(alleles: Vec<Allele>, prev_base: Option<u8>) -> Variant {
        Variant {
            contig: "chr1".to_string(),
            pos: 100,
            ref_seq: alleles[0].bases().to_vec(),
            alleles,
            prev_base,
            next_base: Some(b'T'),
            genotype: [0, 1].into_iter().collect(),
            quality: 123.4,
            posteriors: vec![0.0, 1.0, 0.0],
            filters: Vec::new(),
            depth: 20,
            allele_depths: vec![10, 10],
            strand_bias: 0.0,
            rank_sum: None,
            summit_distance: 0,
            treatment_depth: 20,
            control_depth: 0,
            allele_balance: None,
        }
    }

    #[test]
    fn snv_and_insertion_alleles_are_unpadded() {
        let v = variant(vec![Allele::Base(b'A'), Allele::Base(b'G')], Some(b'C'));
        assert_eq!(v.vcf_alleles(), (100, vec![b"A".to_vec(), b"G".to_vec()]));
        assert_eq!(v.genotype_quality(), 99);

        let v = variant(
            vec![Allele::Base(b'A'), Allele::Insertion(b"ATT".to_vec())],
            Some(b'C'),
        );
        assert_eq!(v.vcf_alleles(), (100, vec![b"A".to_vec(), b"ATT".to_vec()]));
    }

    #[test]
    fn deletions_are_anchored() {
        let v = variant(
            vec![Allele::Base(b'A'), Allele::Deletion, Allele::Base(b'G')],
            Some(b'C'),
        );
        assert_eq!(
            v.vcf_alleles(),
            (99, vec![b"CA".to_vec(), b"C".to_vec(), b"CG".to_vec()])
        );

        let v = variant(vec![Allele::Base(b'A'), Allele::Deletion], None);
        assert_eq!(v.vcf_alleles(), (100, vec![b"AT".to_vec(), b"T".to_vec()]));
    }

    #[test]
    fn merged_deletion_spells_every_deleted_base() {
        let mut first = variant(vec![Allele::Base(b'A'), Allele::Deletion], Some(b'C'));
        first.filters = vec![Filter::SummitDist];
        let mut second = variant(vec![Allele::Base(b'G'), Allele::Deletion], Some(b'A'));
        second.pos = 101;
        second.next_base = Some(b'C');
        second.quality = 40.0;
        second.filters = vec![Filter::LowDepth, Filter::SummitDist];
        assert!(first.is_simple_deletion());

        first.absorb_deletion(&second);
        assert_eq!(
            first.vcf_alleles(),
            (99, vec![b"CAG".to_vec(), b"C".to_vec()])
        );
        assert_eq!(first.quality, 40.0);
        assert_eq!(first.filters, vec![Filter::LowDepth, Filter::SummitDist]);

        let mut at_start = variant(vec![Allele::Base(b'A'), Allele::Deletion], None);
        at_start.absorb_deletion(&second);
        assert_eq!(at_start.vcf_alleles(), (100, vec![b"AGC".to_vec(), b"C".to_vec()]));
    }
}
