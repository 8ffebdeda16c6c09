//! Gap-affine local alignment (Smith-Waterman with Gotoh's three-state recursion).
//!
//! Among equally scoring alignments the result is fixed by a [`TieBreak`]
//! policy over the number of indel bases and the start position, so the same
//! inputs always produce the same path.

use crate::peakvar::reads::{push_op, CigarOp};
use crate::utils::{AlnScoring, TieBreak};
use std::cmp::Ordering;

/// Local alignment of a query against a target. Coordinates are half-open and
/// `ops` uses `=`, `X`, `I` (query only) and `D` (target only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAlignment {
    pub score: i32,
    pub query_start: usize,
    pub query_end: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub ops: Vec<CigarOp>,
    /// Inserted plus deleted bases
    pub num_indels: u32,
}

impl LocalAlignment {
    pub fn num_matches(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                CigarOp::Equal(len) => *len as usize,
                _ => 0,
            })
            .sum()
    }

    /// Fraction of matching columns, counting query bases outside the local
    /// alignment as mismatches.
    pub fn identity(&self, query_len: usize) -> f64 {
        let columns: usize = self.ops.iter().map(|op| op.len() as usize).sum();
        let unaligned = self.query_start + query_len.saturating_sub(self.query_end);
        let total = columns + unaligned;
        if total == 0 {
            return 0.0;
        }
        self.num_matches() as f64 / total as f64
    }

    /// Query bases left unaligned because the alignment reached the first or
    /// last base of a target of length `target_len`.
    pub fn overhang(&self, query_len: usize, target_len: usize) -> usize {
        let left = if self.target_start == 0 {
            self.query_start
        } else {
            0
        };
        let right = if self.target_end == target_len {
            query_len.saturating_sub(self.query_end)
        } else {
            0
        };
        left + right
    }

    /// Identity over the query bases the target could have covered.
    pub fn contained_identity(&self, query_len: usize, target_len: usize) -> f64 {
        let columns: usize = self.ops.iter().map(|op| op.len() as usize).sum();
        let unaligned = self.query_start + query_len.saturating_sub(self.query_end);
        let total = columns + unaligned - self.overhang(query_len, target_len);
        if total == 0 {
            return 0.0;
        }
        self.num_matches() as f64 / total as f64
    }

    /// Compares two alignments with the same score under `policy`.
    /// `Ordering::Less` means `self` is preferred.
    pub fn tie_order(&self, other: &LocalAlignment, policy: TieBreak) -> Ordering {
        let indels = self.num_indels.cmp(&other.num_indels);
        let start = (self.target_start, self.query_start).cmp(&(other.target_start, other.query_start));
        match policy {
            TieBreak::FewestIndels => indels.then(start),
            TieBreak::Leftmost => start.then(indels),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    score: i32,
    indels: u32,
    target_start: u32,
    query_start: u32,
}

impl Cell {
    fn step(self, delta: i32, indels: u32) -> Cell {
        Cell {
            score: self.score + delta,
            indels: self.indels + indels,
            ..self
        }
    }
}

/// True if `a` should replace `b` as the best path into a cell.
fn better(a: &Cell, b: &Cell, policy: TieBreak) -> bool {
    if a.score != b.score {
        return a.score > b.score;
    }
    let indels = a.indels.cmp(&b.indels);
    let start = (a.target_start, a.query_start).cmp(&(b.target_start, b.query_start));
    let order = match policy {
        TieBreak::FewestIndels => indels.then(start),
        TieBreak::Leftmost => start.then(indels),
    };
    order == Ordering::Less
}

fn pick(candidates: [Option<(Cell, u8)>; 2], policy: TieBreak) -> Option<(Cell, u8)> {
    match candidates {
        [Some(a), Some(b)] => Some(if better(&b.0, &a.0, policy) { b } else { a }),
        [a, b] => a.or(b),
    }
}

fn positive(cell: Option<(Cell, u8)>) -> Option<(Cell, u8)> {
    cell.filter(|(c, _)| c.score > 0)
}

// Traceback bits stored per cell
const H_FROM_DIAG: u8 = 1;
const H_FROM_DEL: u8 = 2;
const H_FROM_INS: u8 = 3;
const H_MASK: u8 = 3;
const DIAG_FRESH: u8 = 4;
const DEL_EXTEND: u8 = 8;
const INS_EXTEND: u8 = 16;

/// Best local alignment of `query` within `target`, or `None` when no pair of
/// bases scores above zero. `N` never matches.
pub fn align_local(
    query: &[u8],
    target: &[u8],
    scoring: &AlnScoring,
    policy: TieBreak,
) -> Option<LocalAlignment> {
    let (n, m) = (query.len(), target.len());
    if n == 0 || m == 0 {
        return None;
    }
    let width = m + 1;
    let mut trace = vec![0u8; (n + 1) * width];

    // H and the deletion state use the previous and current row; insertions
    // look one row up in the same column.
    let mut h_prev: Vec<Option<Cell>> = vec![None; width];
    let mut h_curr: Vec<Option<Cell>> = vec![None; width];
    let mut ins_prev: Vec<Option<Cell>> = vec![None; width];
    let mut ins_curr: Vec<Option<Cell>> = vec![None; width];
    let mut best: Option<(Cell, usize, usize)> = None;

    let open = scoring.gapo_scr + scoring.gape_scr;
    let extend = scoring.gape_scr;

    for i in 1..=n {
        h_curr[0] = None;
        ins_curr[0] = None;
        let mut del: Option<Cell> = None;
        for j in 1..=m {
            let mut bits = 0u8;

            let del_cell = positive(pick(
                [
                    h_curr[j - 1].map(|c| (c.step(-open, 1), 0)),
                    del.map(|c| (c.step(-extend, 1), DEL_EXTEND)),
                ],
                policy,
            ));
            let ins_cell = positive(pick(
                [
                    h_prev[j].map(|c| (c.step(-open, 1), 0)),
                    ins_prev[j].map(|c| (c.step(-extend, 1), INS_EXTEND)),
                ],
                policy,
            ));
            if let Some((_, b)) = del_cell {
                bits |= b;
            }
            if let Some((_, b)) = ins_cell {
                bits |= b;
            }

            let (q, t) = (query[i - 1], target[j - 1]);
            let subst = if q == t && q != b'N' {
                scoring.match_scr
            } else {
                -scoring.mism_scr
            };
            let diag = match h_prev[j - 1] {
                Some(c) => (c.step(subst, 0), H_FROM_DIAG),
                None => (
                    Cell {
                        score: subst,
                        indels: 0,
                        target_start: (j - 1) as u32,
                        query_start: (i - 1) as u32,
                    },
                    H_FROM_DIAG | DIAG_FRESH,
                ),
            };

            let mut h = positive(Some(diag));
            for gap in [
                del_cell.map(|(c, _)| (c, H_FROM_DEL)),
                ins_cell.map(|(c, _)| (c, H_FROM_INS)),
            ] {
                h = pick([h, gap], policy);
            }
            if let Some((_, b)) = h {
                bits |= b;
            }
            trace[i * width + j] = bits;

            h_curr[j] = h.map(|(c, _)| c);
            del = del_cell.map(|(c, _)| c);
            ins_curr[j] = ins_cell.map(|(c, _)| c);

            if let Some((cell, from)) = h {
                if from & H_MASK == H_FROM_DIAG {
                    let replace = match &best {
                        None => true,
                        Some((b, _, _)) => better(&cell, b, policy),
                    };
                    if replace {
                        best = Some((cell, i, j));
                    }
                }
            }
        }
        std::mem::swap(&mut h_prev, &mut h_curr);
        std::mem::swap(&mut ins_prev, &mut ins_curr);
    }

    let (cell, end_i, end_j) = best?;
    let ops = traceback(&trace, width, query, target, end_i, end_j);
    Some(LocalAlignment {
        score: cell.score,
        query_start: cell.query_start as usize,
        query_end: end_i,
        target_start: cell.target_start as usize,
        target_end: end_j,
        ops,
        num_indels: cell.indels,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Best,
    Del,
    Ins,
}

fn traceback(
    trace: &[u8],
    width: usize,
    query: &[u8],
    target: &[u8],
    mut i: usize,
    mut j: usize,
) -> Vec<CigarOp> {
    let mut reversed = Vec::new();
    let mut state = State::Best;
    loop {
        let bits = trace[i * width + j];
        match state {
            State::Best => match bits & H_MASK {
                H_FROM_DIAG => {
                    let op = if query[i - 1] == target[j - 1] && query[i - 1] != b'N' {
                        CigarOp::Equal(1)
                    } else {
                        CigarOp::Diff(1)
                    };
                    reversed.push(op);
                    if bits & DIAG_FRESH != 0 {
                        break;
                    }
                    i -= 1;
                    j -= 1;
                }
                H_FROM_DEL => state = State::Del,
                H_FROM_INS => state = State::Ins,
                _ => break,
            },
            State::Del => {
                reversed.push(CigarOp::Del(1));
                if bits & DEL_EXTEND == 0 {
                    state = State::Best;
                }
                j -= 1;
            }
            State::Ins => {
                reversed.push(CigarOp::Ins(1));
                if bits & INS_EXTEND == 0 {
                    state = State::Best;
                }
                i -= 1;
            }
        }
    }

    let mut ops = Vec::new();
    for op in reversed.into_iter().rev() {
        push_op(&mut ops, op);
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn align(query: &[u8], target: &[u8]) -> LocalAlignment {
        align_local(query, target, &AlnScoring::default(), TieBreak::FewestIndels).unwrap()
    }

    fn cigar(aln: &LocalAlignment) -> String {
        aln.ops.iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn exact_substring_is_found() {
        let aln = align(b"GATTACA", b"CCCCGATTACATTTT");
        assert_eq!(aln.score, 14);
        assert_eq!((aln.target_start, aln.target_end), (4, 11));
        assert_eq!((aln.query_start, aln.query_end), (0, 7));
        assert_eq!(cigar(&aln), "7=");
        assert_eq!(aln.identity(7), 1.0);
    }

    #[test]
    fn mismatch_inside_alignment() {
        let aln = align(b"ACGTTACGTAACGT", b"ACGTTACCTAACGT");
        assert_eq!(cigar(&aln), "7=1X6=");
        assert_eq!(aln.score, 13 * 2 - 3);
        assert_eq!(aln.num_indels, 0);
        assert_eq!(aln.num_matches(), 13);
    }

    #[test]
    fn deletion_uses_affine_cost() {
        let query = b"ACGTACGGATCCGATTGCA";
        let target = b"ACGTACGGATCTTCGATTGCA";
        let aln = align(query, target);
        assert_eq!(aln.num_indels, 2);
        assert_eq!(aln.score, 19 * 2 - (5 + 2 * 2));
        assert_eq!(aln.query_end - aln.query_start, 19);
        assert_eq!(aln.target_end - aln.target_start, 21);
    }

    #[test]
    fn insertion_is_query_only() {
        let query = b"TTGACCGTAGGGGCTAGCATGCA";
        let target = b"TTGACCGTACTAGCATGCA";
        let aln = align(query, target);
        assert!(aln.ops.iter().any(|op| matches!(op, CigarOp::Ins(4))));
        assert_eq!(aln.query_end - aln.query_start, 23);
        assert_eq!(aln.target_end - aln.target_start, 19);
    }

    #[test]
    fn poor_flanks_are_clipped() {
        let aln = align(b"GGGGGGACGTACGTAC", b"ACGTACGTACTTTTTT");
        assert_eq!(aln.query_start, 6);
        assert!(aln.identity(16) < 1.0);
    }

    #[test]
    fn overhang_past_target_end_is_not_divergence() {
        // The last four query bases run past the end of the target
        let aln = align(b"ACGTTGCATTTT", b"GGACGTTGCA");
        assert_eq!((aln.query_start, aln.query_end), (0, 8));
        assert_eq!(aln.target_end, 10);
        assert_eq!(aln.overhang(12, 10), 4);
        assert_eq!(aln.identity(12), 8.0 / 12.0);
        assert_eq!(aln.contained_identity(12, 10), 1.0);

        // Unaligned bases facing more target are still counted
        let aln = align(b"ACGTTGCATTTT", b"GGACGTTGCAGG");
        assert_eq!(aln.overhang(12, 12), 0);
        assert!(aln.contained_identity(12, 12) < 1.0);
    }

    #[test]
    fn ties_break_to_leftmost_start() {
        // Query occurs twice in the target
        let aln = align(b"ACGTAC", b"ACGTACTTACGTAC");
        assert_eq!(aln.target_start, 0);
        let aln = align_local(b"ACGTAC", b"ACGTACTTACGTAC", &AlnScoring::default(), TieBreak::Leftmost).unwrap();
        assert_eq!(aln.target_start, 0);
    }

    #[test]
    fn homopolymer_deletion_is_deterministic() {
        let first = align(b"CCGTAAAAGCTTG", b"CCGTAAAAAGCTTG");
        let second = align(b"CCGTAAAAGCTTG", b"CCGTAAAAAGCTTG");
        assert_eq!(first, second);
        assert_eq!(first.num_indels, 1);
    }

    #[test]
    fn unrelated_sequences_may_not_align() {
        assert!(align_local(b"AAAA", b"CCCC", &AlnScoring::default(), TieBreak::FewestIndels).is_none());
        assert!(align_local(b"", b"CCCC", &AlnScoring::default(), TieBreak::FewestIndels).is_none());
    }
}
