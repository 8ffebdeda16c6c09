use super::{align_local, LocalAlignment, RealignParams};
use crate::peakvar::assembly::{AssemblyResult, Unitig};
use crate::peakvar::error::RegionError;
use crate::peakvar::reads::{push_op, Cigar, CigarOp, Read};
use crate::peakvar::reference::ReferenceWindow;
use std::cmp::Ordering;

/// Where a read's evidence comes from after realignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignTarget {
    Unitig(usize),
    /// The read keeps its original mapping
    Reference,
    /// Excluded from pileups
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAssignment {
    pub read_id: String,
    pub target: AlignTarget,
    pub score: i32,
}

struct IndexedUnitig {
    unitig: Unitig,
    /// Reference position of each unitig base; `None` for bases inserted
    /// relative to the reference or outside the local alignment
    to_ref: Vec<Option<i64>>,
    identity: f64,
    discarded: bool,
}

/// Unitigs of one region, each aligned once to the reference window.
pub struct UnitigAlignmentIndex {
    unitigs: Vec<IndexedUnitig>,
    params: RealignParams,
    divergences: Vec<RegionError>,
}

fn project_alignment(aln: &LocalAlignment, query_len: usize, offset: i64) -> Vec<Option<i64>> {
    let mut to_ref = vec![None; query_len];
    let (mut qpos, mut tpos) = (aln.query_start, aln.target_start);
    for op in &aln.ops {
        match *op {
            CigarOp::Match(len) | CigarOp::Equal(len) | CigarOp::Diff(len) => {
                for _ in 0..len {
                    to_ref[qpos] = Some(offset + tpos as i64);
                    qpos += 1;
                    tpos += 1;
                }
            }
            CigarOp::Ins(len) => qpos += len as usize,
            CigarOp::Del(len) => tpos += len as usize,
            _ => {}
        }
    }
    to_ref
}

impl UnitigAlignmentIndex {
    /// Aligns every unitig to `reference`. Unitigs below the minimum identity
    /// are kept for read selection but marked as discarded.
    pub fn build(
        assembly: &AssemblyResult,
        reference: &ReferenceWindow,
        params: &RealignParams,
    ) -> UnitigAlignmentIndex {
        let mut divergences = Vec::new();
        let unitigs = assembly
            .unitigs()
            .iter()
            .map(|unitig| {
                let len = unitig.seq.len();
                let (to_ref, identity) =
                    match align_local(&unitig.seq, &reference.seq, &params.scoring, params.tie_break) {
                        Some(aln) => (
                            project_alignment(&aln, len, reference.start),
                            aln.identity(len),
                        ),
                        None => (vec![None; len], 0.0),
                    };
                let discarded = identity < params.min_unitig_identity;
                if discarded {
                    divergences.push(RegionError::AlignmentDivergence {
                        unitig_id: unitig.id,
                        identity,
                    });
                }
                IndexedUnitig {
                    unitig: unitig.clone(),
                    to_ref,
                    identity,
                    discarded,
                }
            })
            .collect();

        UnitigAlignmentIndex {
            unitigs,
            params: *params,
            divergences,
        }
    }

    /// Index without unitigs: every read keeps its reference alignment.
    pub fn reference_only(params: &RealignParams) -> UnitigAlignmentIndex {
        UnitigAlignmentIndex {
            unitigs: Vec::new(),
            params: *params,
            divergences: Vec::new(),
        }
    }

    pub fn num_unitigs(&self) -> usize {
        self.unitigs.len()
    }

    pub fn num_accepted(&self) -> usize {
        self.unitigs.iter().filter(|u| !u.discarded).count()
    }

    /// One `AlignmentDivergence` error per discarded unitig.
    pub fn divergences(&self) -> &[RegionError] {
        &self.divergences
    }

    pub fn unitig_identity(&self, unitig_id: usize) -> Option<f64> {
        self.unitigs.get(unitig_id).map(|u| u.identity)
    }

    /// Reference position of a unitig base, or `None` inside a
    /// reference-relative insertion.
    pub fn project_to_reference(&self, unitig_id: usize, unitig_pos: usize) -> Option<i64> {
        self.unitigs
            .get(unitig_id)
            .and_then(|u| u.to_ref.get(unitig_pos).copied().flatten())
    }

    /// Unitig interval to search for `read`: bases projecting within the
    /// read's original span plus the margin. Discarded unitigs are searched whole.
    fn search_window(&self, indexed: &IndexedUnitig, read: &Read) -> Option<(usize, usize)> {
        if indexed.discarded {
            return Some((0, indexed.unitig.seq.len()));
        }
        let margin = self.params.window_margin as i64;
        let (lo, hi) = (read.ref_start() - margin, read.ref_end() + margin);
        let inside = |pos: &Option<i64>| matches!(pos, Some(r) if *r >= lo && *r < hi);
        let first = indexed.to_ref.iter().position(inside)?;
        let last = indexed.to_ref.iter().rposition(inside)?;
        Some((first, last + 1))
    }

    /// Local alignment of the read's unclipped bases to a unitig, in unitig coordinates.
    pub fn realign(&self, read: &Read, unitig_id: usize) -> Option<LocalAlignment> {
        let indexed = self.unitigs.get(unitig_id)?;
        let (start, end) = self.search_window(indexed, read)?;
        let (query, _) = read.trimmed();
        let mut aln = align_local(
            query,
            &indexed.unitig.seq[start..end],
            &self.params.scoring,
            self.params.tie_break,
        )?;
        aln.target_start += start;
        aln.target_end += start;
        Some(aln)
    }

    /// Highest-scoring unitig for `read`; ties go to the tie-break policy and
    /// then to the lower unitig id.
    fn best_alignment(&self, read: &Read) -> Option<(usize, LocalAlignment)> {
        let mut best: Option<(usize, LocalAlignment)> = None;
        for indexed in &self.unitigs {
            let Some(aln) = self.realign(read, indexed.unitig.id) else {
                continue;
            };
            let replace = match &best {
                None => true,
                Some((_, current)) => {
                    aln.score > current.score
                        || (aln.score == current.score
                            && aln.tie_order(current, self.params.tie_break) == Ordering::Less)
                }
            };
            if replace {
                best = Some((indexed.unitig.id, aln));
            }
        }
        best
    }

    fn classify(&self, read: &Read, best: Option<&(usize, LocalAlignment)>) -> ReadAssignment {
        let record = |target, score| ReadAssignment {
            read_id: read.id().to_string(),
            target,
            score,
        };
        if self.num_accepted() == 0 {
            return record(AlignTarget::Reference, 0);
        }
        let Some((unitig_id, aln)) = best else {
            return record(AlignTarget::Unassigned, 0);
        };
        let query_len = read.trimmed().0.len();
        let indexed = &self.unitigs[*unitig_id];
        let min_identity = self.params.min_read_identity;
        if aln.identity(query_len) >= min_identity {
            if indexed.discarded {
                record(AlignTarget::Reference, aln.score)
            } else {
                record(AlignTarget::Unitig(*unitig_id), aln.score)
            }
        } else if aln.contained_identity(query_len, indexed.unitig.seq.len()) >= min_identity {
            // Read runs past the end of the unitig but agrees with it where they overlap
            record(AlignTarget::Reference, aln.score)
        } else {
            record(AlignTarget::Unassigned, aln.score)
        }
    }

    /// Chooses the unitig a read is realigned to.
    pub fn select_best_unitig(&self, read: &Read) -> ReadAssignment {
        let best = self.best_alignment(read);
        self.classify(read, best.as_ref())
    }

    /// Composes a read-to-unitig alignment with the unitig-to-reference
    /// projection. Gaps between consecutive projected positions become
    /// deletions and unprojected bases become insertions. Unaligned ends
    /// become soft clips unless they end exactly where the read originally did.
    pub fn compose(&self, read: &Read, unitig_id: usize, aln: &LocalAlignment) -> Option<Cigar> {
        let to_ref = &self.unitigs.get(unitig_id)?.to_ref;
        let query_len = read.trimmed().0.len();

        let mut core: Vec<CigarOp> = Vec::new();
        let mut first_ref: Option<i64> = None;
        let mut last_ref: Option<i64> = None;
        let mut upos = aln.target_start;
        for op in &aln.ops {
            match *op {
                CigarOp::Match(len) | CigarOp::Equal(len) | CigarOp::Diff(len) => {
                    for _ in 0..len {
                        match to_ref.get(upos).copied().flatten() {
                            Some(rpos) if last_ref.map_or(true, |last| rpos > last) => {
                                match last_ref {
                                    Some(last) => push_op(&mut core, CigarOp::Del((rpos - last - 1) as u32)),
                                    None => first_ref = Some(rpos),
                                }
                                push_op(&mut core, CigarOp::Match(1));
                                last_ref = Some(rpos);
                            }
                            _ => push_op(&mut core, CigarOp::Ins(1)),
                        }
                        upos += 1;
                    }
                }
                CigarOp::Ins(len) => push_op(&mut core, CigarOp::Ins(len)),
                CigarOp::Del(len) => upos += len as usize,
                _ => {}
            }
        }
        let mut ref_pos = first_ref?;
        let core_end = last_ref? + 1;

        let mut left_clip = aln.query_start as u32;
        let mut right_clip = query_len.saturating_sub(aln.query_end) as u32;
        if let Some(CigarOp::Ins(len)) = core.first().copied() {
            left_clip += len;
            core.remove(0);
        }
        if let Some(CigarOp::Ins(len)) = core.last().copied() {
            right_clip += len;
            core.pop();
        }

        // Unaligned ends that fill the gap to the read's original span exactly
        // are restored as aligned bases
        let mut left_match = 0;
        if left_clip > 0 && ref_pos - left_clip as i64 == read.ref_start() {
            ref_pos -= left_clip as i64;
            left_match = std::mem::take(&mut left_clip);
        }
        let mut right_match = 0;
        if right_clip > 0 && core_end + right_clip as i64 == read.ref_end() {
            right_match = std::mem::take(&mut right_clip);
        }

        let mut ops = Vec::with_capacity(core.len() + 4);
        push_op(&mut ops, CigarOp::SoftClip(left_clip));
        push_op(&mut ops, CigarOp::Match(left_match));
        for op in core {
            push_op(&mut ops, op);
        }
        push_op(&mut ops, CigarOp::Match(right_match));
        push_op(&mut ops, CigarOp::SoftClip(right_clip));
        Some(Cigar { ref_pos, ops })
    }

    /// Assigns a read and returns it in reference coordinates, or `None` when
    /// the read is unassigned. A composed alignment that would move the read
    /// off its mapped span is dropped in favour of the original alignment.
    pub fn assign(&self, read: &Read) -> (ReadAssignment, Option<Read>) {
        let best = self.best_alignment(read);
        let mut assignment = self.classify(read, best.as_ref());
        match (assignment.target, best) {
            (AlignTarget::Unitig(unitig_id), Some((_, aln))) => {
                let realigned = self
                    .compose(read, unitig_id, &aln)
                    .ok_or_else(|| RegionError::malformed(read.id(), "no reference-anchored bases"))
                    .and_then(|cigar| read.realigned(cigar))
                    .and_then(|realigned| {
                        if realigned.ref_span() == read.ref_span() {
                            Ok(realigned)
                        } else {
                            Err(RegionError::malformed(
                                read.id(),
                                format!(
                                    "composed span {:?} differs from mapped span {:?}",
                                    realigned.ref_span(),
                                    read.ref_span()
                                ),
                            ))
                        }
                    });
                match realigned {
                    Ok(realigned) => (assignment, Some(realigned)),
                    Err(err) => {
                        log::debug!("Keeping reference alignment: {}", err);
                        assignment.target = AlignTarget::Reference;
                        (assignment, Some(read.clone()))
                    }
                }
            }
            (AlignTarget::Unassigned, _) => (assignment, None),
            _ => {
                assignment.target = AlignTarget::Reference;
                (assignment, Some(read.clone()))
            }
        }
    }
}
