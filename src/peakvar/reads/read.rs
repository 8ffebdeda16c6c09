//! Module for representing and building read information from alignment records.
//!

use super::cigar::{Cigar, CigarOp, CigarOpExt};
use crate::peakvar::error::RegionError;
use crate::utils::normalize_bases;
use rust_htslib::bam;
use std::fmt;

/// Library a read was sequenced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sample {
    Treatment,
    Control,
}

/// Allele observed by one read at one reference position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Allele {
    /// Aligned base
    Base(u8),
    /// Aligned base followed by inserted bases (anchor first)
    Insertion(Vec<u8>),
    /// Reference base absent from the read
    Deletion,
}

impl Allele {
    /// Bases spelled by this allele; empty for a deletion.
    pub fn bases(&self) -> &[u8] {
        match self {
            Allele::Base(base) => std::slice::from_ref(base),
            Allele::Insertion(seq) => seq,
            Allele::Deletion => &[],
        }
    }
}

impl fmt::Display for Allele {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allele::Base(base) => write!(f, "{}", *base as char),
            Allele::Insertion(seq) => write!(f, "{}", String::from_utf8_lossy(seq)),
            Allele::Deletion => write!(f, "*"),
        }
    }
}

/// One allele observation at a reference position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub ref_pos: i64,
    pub allele: Allele,
    pub qual: u8,
}

/// Minimal alignment-record contract consumed from the read source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    pub ref_start: i64,
    pub is_reverse: bool,
    pub mapq: u8,
    pub cigar: Vec<CigarOp>,
    pub sample: Sample,
}

impl RawRecord {
    /// Creates a `RawRecord` from an HTSlib record.
    ///
    /// # Arguments
    /// * `rec` - A BAM record from HTSlib.
    /// * `sample` - Library the record was read from.
    pub fn from_hts_rec(rec: &bam::Record, sample: Sample) -> RawRecord {
        // Quality strings are optional in BAM and stored as 0xFF when absent
        const MISSING_QUAL: u8 = 0xff;
        const FALLBACK_QUAL: u8 = 20;

        let mut quals = rec.qual().to_vec();
        if quals.first() == Some(&MISSING_QUAL) {
            quals.iter_mut().for_each(|q| *q = FALLBACK_QUAL);
        }

        RawRecord {
            id: String::from_utf8_lossy(rec.qname()).into_owned(),
            bases: rec.seq().as_bytes(),
            quals,
            ref_start: rec.pos(),
            is_reverse: rec.is_reverse(),
            mapq: rec.mapq(),
            cigar: rec.cigar().take().to_vec(),
            sample,
        }
    }
}

/// Validated, immutable read.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    id: String,
    sample: Sample,
    is_reverse: bool,
    mapq: u8,
    bases: Vec<u8>,
    quals: Vec<u8>,
    cigar: Cigar,
}

impl Read {
    /// Builds a read, checking that the CIGAR, qualities and bases agree.
    pub fn new(raw: RawRecord) -> Result<Read, RegionError> {
        let RawRecord {
            id,
            bases,
            quals,
            ref_start,
            is_reverse,
            mapq,
            cigar,
            sample,
        } = raw;

        if bases.is_empty() {
            return Err(RegionError::malformed(&id, "empty sequence"));
        }
        if quals.len() != bases.len() {
            return Err(RegionError::malformed(
                &id,
                format!(
                    "{} qualities for {} bases",
                    quals.len(),
                    bases.len()
                ),
            ));
        }
        if ref_start < 0 {
            return Err(RegionError::malformed(&id, "unmapped record"));
        }

        let cigar = Cigar {
            ref_pos: ref_start,
            ops: cigar,
        };
        check_cigar(&id, &cigar, bases.len())?;

        Ok(Read {
            bases: normalize_bases(&bases),
            id,
            sample,
            is_reverse,
            mapq,
            quals,
            cigar,
        })
    }

    /// Copy of this read carrying a new alignment over its soft-clip-trimmed bases.
    pub fn realigned(&self, cigar: Cigar) -> Result<Read, RegionError> {
        let (bases, quals) = self.trimmed();
        check_cigar(&self.id, &cigar, bases.len())?;
        Ok(Read {
            id: self.id.clone(),
            sample: self.sample,
            is_reverse: self.is_reverse,
            mapq: self.mapq,
            bases: bases.to_vec(),
            quals: quals.to_vec(),
            cigar,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sample(&self) -> Sample {
        self.sample
    }

    pub fn is_reverse(&self) -> bool {
        self.is_reverse
    }

    pub fn mapq(&self) -> u8 {
        self.mapq
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn quals(&self) -> &[u8] {
        &self.quals
    }

    pub fn cigar(&self) -> &Cigar {
        &self.cigar
    }

    pub fn ref_start(&self) -> i64 {
        self.cigar.ref_pos
    }

    pub fn ref_end(&self) -> i64 {
        self.cigar.ref_end()
    }

    /// Half-open reference span covered by the alignment.
    pub fn ref_span(&self) -> (i64, i64) {
        (self.ref_start(), self.ref_end())
    }

    /// Bases and qualities with soft-clipped ends removed.
    pub fn trimmed(&self) -> (&[u8], &[u8]) {
        let (left, right) = self.cigar.soft_clips();
        let end = self.bases.len() - right;
        (&self.bases[left..end], &self.quals[left..end])
    }

    /// Base and quality aligned to `ref_pos`. `None` outside the read and where
    /// the read has no base (deletions, skips).
    pub fn base_at_ref(&self, ref_pos: i64) -> Option<(u8, u8)> {
        if ref_pos < self.ref_start() || ref_pos >= self.ref_end() {
            return None;
        }
        let mut rpos = self.cigar.ref_pos;
        let mut qpos = 0usize;
        for op in &self.cigar.ops {
            let ref_len = op.get_ref_len();
            let query_len = op.get_query_len() as usize;
            if ref_pos < rpos + ref_len {
                return match op {
                    CigarOp::Match(_) | CigarOp::Equal(_) | CigarOp::Diff(_) => {
                        let index = qpos + (ref_pos - rpos) as usize;
                        Some((self.bases[index], self.quals[index]))
                    }
                    _ => None,
                };
            }
            rpos += ref_len;
            qpos += query_len;
        }
        None
    }

    /// Walks the alignment and returns exactly one observation per covered
    /// reference position, in reference order.
    pub fn observations(&self) -> Vec<Observation> {
        let mut observations: Vec<Observation> = Vec::with_capacity(self.cigar.ref_len() as usize);
        let mut rpos = self.cigar.ref_pos;
        let mut qpos = 0usize;
        for op in &self.cigar.ops {
            match *op {
                CigarOp::Match(len) | CigarOp::Equal(len) | CigarOp::Diff(len) => {
                    for offset in 0..len as usize {
                        observations.push(Observation {
                            ref_pos: rpos + offset as i64,
                            allele: Allele::Base(self.bases[qpos + offset]),
                            qual: self.quals[qpos + offset],
                        });
                    }
                    rpos += len as i64;
                    qpos += len as usize;
                }
                CigarOp::Ins(len) => {
                    let inserted = &self.bases[qpos..qpos + len as usize];
                    let ins_qual = self.quals[qpos..qpos + len as usize]
                        .iter()
                        .copied()
                        .min()
                        .unwrap_or(0);
                    // Insertions are reported on the preceding aligned base
                    if let Some(last) = observations.last_mut() {
                        if last.ref_pos == rpos - 1 {
                            match &mut last.allele {
                                Allele::Base(anchor) => {
                                    let mut seq = vec![*anchor];
                                    seq.extend_from_slice(inserted);
                                    last.allele = Allele::Insertion(seq);
                                    last.qual = last.qual.min(ins_qual);
                                }
                                Allele::Insertion(seq) => {
                                    seq.extend_from_slice(inserted);
                                    last.qual = last.qual.min(ins_qual);
                                }
                                Allele::Deletion => {}
                            }
                        }
                    }
                    qpos += len as usize;
                }
                CigarOp::Del(len) => {
                    let prev_qual = qpos.checked_sub(1).map(|i| self.quals[i]);
                    let next_qual = self.quals.get(qpos).copied();
                    let del_qual = match (prev_qual, next_qual) {
                        (Some(p), Some(n)) => p.min(n),
                        (Some(q), None) | (None, Some(q)) => q,
                        (None, None) => 0,
                    };
                    for offset in 0..len as i64 {
                        observations.push(Observation {
                            ref_pos: rpos + offset,
                            allele: Allele::Deletion,
                            qual: del_qual,
                        });
                    }
                    rpos += len as i64;
                }
                CigarOp::RefSkip(len) => rpos += len as i64,
                CigarOp::SoftClip(len) => qpos += len as usize,
                CigarOp::HardClip(_) | CigarOp::Pad(_) => {}
            }
        }
        observations
    }
}

fn check_cigar(id: &str, cigar: &Cigar, num_bases: usize) -> Result<(), RegionError> {
    if cigar.ops.is_empty() {
        return Err(RegionError::malformed(id, "empty CIGAR"));
    }
    if cigar.query_len() != num_bases {
        return Err(RegionError::malformed(
            id,
            format!(
                "CIGAR {} spans {} bases but the sequence has {}",
                cigar.to_cigar_string(),
                cigar.query_len(),
                num_bases
            ),
        ));
    }
    if !cigar
        .ops
        .iter()
        .any(|op| matches!(op, CigarOp::Match(_) | CigarOp::Equal(_) | CigarOp::Diff(_)))
    {
        return Err(RegionError::malformed(id, "no aligned bases"));
    }

    // Clips may only appear at the ends: hard clips outermost, soft clips inside them
    let inner = cigar
        .ops
        .iter()
        .skip_while(|op| matches!(op, CigarOp::HardClip(_) | CigarOp::SoftClip(_)))
        .collect::<Vec<_>>();
    let core_len = inner
        .iter()
        .rposition(|op| !matches!(op, CigarOp::HardClip(_) | CigarOp::SoftClip(_)))
        .map_or(0, |i| i + 1);
    if inner[..core_len]
        .iter()
        .any(|op| matches!(op, CigarOp::HardClip(_) | CigarOp::SoftClip(_)))
    {
        return Err(RegionError::malformed(id, "clipping inside the alignment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::reads::cigar::parse_cigar_string;

    fn raw(bases: &str, cigar: &str, ref_start: i64) -> RawRecord {
        RawRecord {
            id: "read1".to_string(),
            bases: bases.as_bytes().to_vec(),
            quals: vec![30; bases.len()],
            ref_start,
            is_reverse: false,
            mapq: 60,
            cigar: parse_cigar_string(cigar).unwrap(),
            sample: Sample::Treatment,
        }
    }

    #[test]
    fn construct_rejects_inconsistent_lengths() {
        let err = Read::new(raw("ACGT", "5M", 10)).unwrap_err();
        assert!(matches!(err, RegionError::MalformedRecord { .. }));

        let mut record = raw("ACGT", "4M", 10);
        record.quals.pop();
        assert!(Read::new(record).is_err());

        assert!(Read::new(raw("ACGT", "2M2S1M", 10)).is_err());
        assert!(Read::new(raw("ACGT", "4S", 10)).is_err());
        assert!(Read::new(raw("ACGT", "1S3M", 10)).is_ok());
    }

    #[test]
    fn base_lookup_respects_indels() {
        // ref:  10 11 12 13 14 15 16
        // read: A  C  -  -  G [TT] A
        let read = Read::new(raw("ACGTTA", "2M2D1M2I1M", 10)).unwrap();
        assert_eq!(read.ref_span(), (10, 16));
        assert_eq!(read.base_at_ref(9), None);
        assert_eq!(read.base_at_ref(10), Some((b'A', 30)));
        assert_eq!(read.base_at_ref(12), None);
        assert_eq!(read.base_at_ref(14), Some((b'G', 30)));
        assert_eq!(read.base_at_ref(15), Some((b'A', 30)));
        assert_eq!(read.base_at_ref(16), None);
    }

    #[test]
    fn observations_cover_each_position_once() {
        let read = Read::new(raw("AACGTTA", "1S2M2D1M2I1M", 10)).unwrap();
        let obs = read.observations();
        let positions = obs.iter().map(|o| o.ref_pos).collect::<Vec<_>>();
        assert_eq!(positions, vec![10, 11, 12, 13, 14, 15]);
        assert_eq!(obs[0].allele, Allele::Base(b'A'));
        assert_eq!(obs[2].allele, Allele::Deletion);
        assert_eq!(obs[4].allele, Allele::Insertion(b"GTT".to_vec()));
        assert_eq!(obs[4].allele.to_string(), "GTT");
        assert_eq!(obs[5].allele, Allele::Base(b'A'));
    }

    #[test]
    fn trimmed_drops_soft_clips() {
        let read = Read::new(raw("NNACGTNN", "2S4M2S", 0)).unwrap();
        assert_eq!(read.trimmed().0, b"ACGT");

        let realigned = read
            .realigned(Cigar {
                ref_pos: 5,
                ops: vec![CigarOp::Match(4)],
            })
            .unwrap();
        assert_eq!(realigned.bases(), b"ACGT");
        assert_eq!(realigned.ref_span(), (5, 9));
    }
}
