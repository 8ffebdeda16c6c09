//! Diploid genotype likelihoods and posteriors from a single pileup.
//!
//! For alleles `a0` (reference), `a1`, ... and genotype `{ai, aj}` every
//! observation with error probability `e` contributes `1 - e` when it matches
//! the allele and `e / 3` otherwise; heterozygous genotypes average the two
//! alleles. Everything is computed in natural-log space.

use super::Genotype;
use crate::peakvar::pileup::Pileup;
use crate::peakvar::reads::{Allele, Sample};
use crate::utils::{fisher_exact, ln_to_phred, log_sum_exp, phred_to_err, rank_sum_z};
use crate::utils::{GenotypePrior, SummitDiscount};
use arrayvec::ArrayVec;
use std::f64::consts::LN_2;

/// Largest reported quality.
pub const MAX_QUAL: f64 = 999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodParams {
    pub prior: GenotypePrior,
    pub summit_discount: SummitDiscount,
    /// Observations below this base quality do not enter the likelihood
    pub min_base_qual: u8,
    pub max_alt_alleles: usize,
    /// Heterozygous calls are allele-specific when the balanced model's BIC
    /// exceeds the allele-specific model's by more than this
    pub min_asb_delta_bic: f64,
}

impl Default for LikelihoodParams {
    fn default() -> Self {
        LikelihoodParams {
            prior: GenotypePrior::Flat,
            summit_discount: SummitDiscount::None,
            min_base_qual: 13,
            max_alt_alleles: 2,
            min_asb_delta_bic: 10.0,
        }
    }
}

/// Likelihoods and posteriors over every diploid genotype of a set of alleles.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeLikelihoods {
    /// Reference allele first
    pub alleles: Vec<Allele>,
    pub genotypes: Vec<Genotype>,
    /// Tempered log-likelihoods
    pub log_likelihoods: Vec<f64>,
    /// Normalised log-posteriors
    pub log_posteriors: Vec<f64>,
}

impl GenotypeLikelihoods {
    pub fn posteriors(&self) -> Vec<f64> {
        self.log_posteriors.iter().map(|lp| lp.exp()).collect()
    }

    /// Index of the most probable genotype; earlier genotypes win ties.
    pub fn best(&self) -> usize {
        let mut best = 0;
        for (i, lp) in self.log_posteriors.iter().enumerate() {
            if *lp > self.log_posteriors[best] {
                best = i;
            }
        }
        best
    }

    pub fn best_genotype(&self) -> &Genotype {
        &self.genotypes[self.best()]
    }

    /// Phred-scaled probability that the best genotype is wrong, `-10 log10(1 - P(best))`.
    pub fn quality(&self) -> f64 {
        let best = self.best();
        let others = self
            .log_posteriors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best)
            .map(|(_, lp)| *lp)
            .collect::<Vec<_>>();
        ln_to_phred(log_sum_exp(&others)).clamp(0.0, MAX_QUAL)
    }
}

/// Allelic balance of a heterozygous call.
///
/// The balanced model fixes the treatment fraction of the second allele at
/// one half, or shares a single fraction between treatment and control when
/// control reads are present. The allele-specific model frees the treatment
/// fraction. Fractions are maximum-likelihood estimates from allele counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlleleBalance {
    /// Fraction of usable treatment observations carrying the second allele
    pub treatment_fraction: f64,
    pub control_fraction: Option<f64>,
    /// BIC of the balanced model minus BIC of the allele-specific model
    pub delta_bic: f64,
    pub allele_specific: bool,
}

/// All unordered allele pairs in VCF order: (0,0), (0,1), (1,1), (0,2), (1,2), (2,2), ...
pub fn diploid_genotypes(num_alleles: usize) -> Vec<Genotype> {
    let mut genotypes = Vec::new();
    for j in 0..num_alleles {
        for i in 0..=j {
            let mut gt = ArrayVec::new();
            gt.push(i);
            gt.push(j);
            genotypes.push(gt);
        }
    }
    genotypes
}

pub struct LikelihoodEngine {
    params: LikelihoodParams,
}

impl LikelihoodEngine {
    pub fn new(params: LikelihoodParams) -> Self {
        LikelihoodEngine { params }
    }

    pub fn params(&self) -> &LikelihoodParams {
        &self.params
    }

    /// Reference plus the most frequent alternates seen at least `min_alt_count` times.
    pub fn candidate_alleles(&self, pileup: &Pileup, min_alt_count: u32) -> Vec<Allele> {
        let mut alleles = vec![pileup.ref_allele()];
        alleles.extend(
            pileup
                .alt_alleles()
                .into_iter()
                .filter(|(_, evidence)| evidence.count >= min_alt_count)
                .take(self.params.max_alt_alleles)
                .map(|(allele, _)| allele.clone()),
        );
        alleles
    }

    fn log_prior(&self, genotypes: &[Genotype]) -> Vec<f64> {
        match self.params.prior {
            GenotypePrior::Flat => vec![-(genotypes.len() as f64).ln(); genotypes.len()],
            GenotypePrior::Population { heterozygosity } => {
                let theta = heterozygosity;
                let mut priors = genotypes
                    .iter()
                    .map(|gt| match (gt[0], gt[1]) {
                        (0, 0) => 0.0,
                        (0, _) => theta,
                        (i, j) if i == j => theta / 2.0,
                        _ => theta * theta,
                    })
                    .collect::<Vec<_>>();
                let non_ref: f64 = priors.iter().sum();
                priors[0] = (1.0 - non_ref).max(theta);
                let total: f64 = priors.iter().sum();
                priors.iter().map(|p| (p / total).ln()).collect()
            }
        }
    }

    /// Genotype posteriors over `alleles` (reference first) at a position
    /// `summit_distance` bases from the peak summit.
    pub fn genotype(
        &self,
        pileup: &Pileup,
        alleles: &[Allele],
        summit_distance: u32,
    ) -> GenotypeLikelihoods {
        let genotypes = diploid_genotypes(alleles.len());
        let weight = self.params.summit_discount.weight(summit_distance);

        // Per-allele log-probability of every usable observation
        let mut allele_lls: Vec<Vec<f64>> = vec![Vec::new(); alleles.len()];
        for (observed, evidence) in pileup.iter() {
            for &qual in &evidence.quals {
                if qual < self.params.min_base_qual {
                    continue;
                }
                let err = phred_to_err(qual).min(0.75);
                for (index, allele) in alleles.iter().enumerate() {
                    let prob = if allele == observed { 1.0 - err } else { err / 3.0 };
                    allele_lls[index].push(prob.ln());
                }
            }
        }

        let log_likelihoods = genotypes
            .iter()
            .map(|gt| {
                let (a, b) = (gt[0], gt[1]);
                let ll: f64 = if a == b {
                    allele_lls[a].iter().sum()
                } else {
                    allele_lls[a]
                        .iter()
                        .zip(&allele_lls[b])
                        .map(|(pa, pb)| log_sum_exp(&[*pa, *pb]) - LN_2)
                        .sum()
                };
                ll * weight
            })
            .collect::<Vec<_>>();

        let unnormalised = log_likelihoods
            .iter()
            .zip(self.log_prior(&genotypes))
            .map(|(ll, prior)| ll + prior)
            .collect::<Vec<_>>();
        let norm = log_sum_exp(&unnormalised);
        let log_posteriors = unnormalised.iter().map(|lp| lp - norm).collect();

        GenotypeLikelihoods {
            alleles: alleles.to_vec(),
            genotypes,
            log_likelihoods,
            log_posteriors,
        }
    }

    /// Observation log-probabilities `(ln P(obs | a), ln P(obs | b))` per sample.
    fn allele_pair_lls(&self, pileup: &Pileup, a: &Allele, b: &Allele) -> [Vec<(f64, f64)>; 2] {
        let mut lls = [Vec::new(), Vec::new()];
        for (observed, evidence) in pileup.iter() {
            for (&qual, &sample) in evidence.quals.iter().zip(&evidence.samples) {
                if qual < self.params.min_base_qual {
                    continue;
                }
                let err = phred_to_err(qual).min(0.75);
                let prob = |allele: &Allele| if allele == observed { 1.0 - err } else { err / 3.0 };
                let index = match sample {
                    Sample::Treatment => 0,
                    Sample::Control => 1,
                };
                lls[index].push((prob(a).ln(), prob(b).ln()));
            }
        }
        lls
    }

    /// Tests a heterozygous `genotype` for allele-specific binding in the
    /// treatment. `None` for homozygous genotypes or when no usable treatment
    /// observation supports either allele.
    pub fn allele_balance(
        &self,
        pileup: &Pileup,
        alleles: &[Allele],
        genotype: &Genotype,
    ) -> Option<AlleleBalance> {
        let (a, b) = (alleles.get(genotype[0])?, alleles.get(genotype[1])?);
        if a == b {
            return None;
        }
        let fraction = |sample: Sample| {
            let count = |allele: &Allele| {
                pileup.get(allele).map_or(0, |e| {
                    e.quals
                        .iter()
                        .zip(&e.samples)
                        .filter(|(q, s)| **q >= self.params.min_base_qual && **s == sample)
                        .count()
                })
            };
            let (na, nb) = (count(a), count(b));
            (na + nb > 0).then(|| (nb as f64 / (na + nb) as f64, na + nb))
        };
        let (treatment_fraction, num_treatment) = fraction(Sample::Treatment)?;
        let control = fraction(Sample::Control);

        let [treatment_lls, control_lls] = self.allele_pair_lls(pileup, a, b);
        let log_lik = |lls: &[(f64, f64)], f: f64| -> f64 {
            lls.iter()
                .map(|(la, lb)| {
                    let mut terms = Vec::with_capacity(2);
                    if f < 1.0 {
                        terms.push((1.0 - f).ln() + la);
                    }
                    if f > 0.0 {
                        terms.push(f.ln() + lb);
                    }
                    log_sum_exp(&terms)
                })
                .sum()
        };

        let num_obs = (treatment_lls.len() + control_lls.len()).max(1) as f64;
        let bic = |ll: f64, num_params: f64| -2.0 * ll + num_params * num_obs.ln();
        let (balanced, specific) = match control {
            Some((control_fraction, num_control)) => {
                let shared = (treatment_fraction * num_treatment as f64
                    + control_fraction * num_control as f64)
                    / (num_treatment + num_control) as f64;
                let balanced = log_lik(&treatment_lls, shared) + log_lik(&control_lls, shared);
                let specific = log_lik(&treatment_lls, treatment_fraction)
                    + log_lik(&control_lls, control_fraction);
                (bic(balanced, 1.0), bic(specific, 2.0))
            }
            None => (
                bic(log_lik(&treatment_lls, 0.5), 0.0),
                bic(log_lik(&treatment_lls, treatment_fraction), 1.0),
            ),
        };
        let delta_bic = balanced - specific;

        Some(AlleleBalance {
            treatment_fraction,
            control_fraction: control.map(|(f, _)| f),
            delta_bic,
            allele_specific: delta_bic > self.params.min_asb_delta_bic,
        })
    }

    /// Phred-scaled Fisher exact test of reference versus alternate counts on each strand.
    pub fn strand_bias(&self, pileup: &Pileup, alts: &[Allele]) -> f64 {
        let ref_evidence = pileup.get(&pileup.ref_allele());
        let ref_row = ref_evidence.map_or([0, 0], |e| [e.forward, e.reverse]);
        let alt_row = alts
            .iter()
            .filter_map(|allele| pileup.get(allele))
            .fold([0, 0], |acc, e| [acc[0] + e.forward, acc[1] + e.reverse]);
        let p = fisher_exact([ref_row, alt_row]);
        if p >= 1.0 {
            return 0.0;
        }
        (-10.0 * p.log10()).min(MAX_QUAL)
    }

    /// Mann-Whitney z-score of alternate against reference base qualities.
    pub fn quality_rank_sum(&self, pileup: &Pileup, alts: &[Allele]) -> Option<f64> {
        let ref_quals = pileup
            .get(&pileup.ref_allele())
            .map(|e| e.quals.clone())
            .unwrap_or_default();
        let alt_quals = alts
            .iter()
            .filter_map(|allele| pileup.get(allele))
            .flat_map(|e| e.quals.iter().copied())
            .collect::<Vec<_>>();
        rank_sum_z(&alt_quals, &ref_quals)
    }
}
