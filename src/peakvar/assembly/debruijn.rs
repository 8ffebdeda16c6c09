//! De Bruijn graph assembler for short peak regions.
//!
//! Solid k-mers (seen at least `min_kmer_count` times) are compacted into
//! non-branching nodes, short dead-end tips are clipped, and every
//! source-to-sink path through the resulting DAG is reported as a candidate
//! haplotype. Reads are expected in reference orientation, so k-mers are not
//! canonicalised.

use super::Assembler;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyParams {
    /// k-mer length, at most 31
    pub kmer_len: usize,
    pub min_kmer_count: u32,
    /// Paths above this count make the region too tangled to assemble
    pub max_paths: usize,
    /// Shortest tip or haplotype kept
    pub min_unitig_len: usize,
}

impl Default for AssemblyParams {
    fn default() -> Self {
        AssemblyParams {
            kmer_len: 21,
            min_kmer_count: 2,
            max_paths: 16,
            min_unitig_len: 42,
        }
    }
}

pub struct DeBruijnAssembler {
    params: AssemblyParams,
}

impl DeBruijnAssembler {
    pub fn new(params: AssemblyParams) -> Self {
        DeBruijnAssembler { params }
    }
}

impl Assembler for DeBruijnAssembler {
    fn assemble(&self, seqs: &[&[u8]]) -> Result<Vec<Vec<u8>>, String> {
        let k = self.params.kmer_len;
        if !(2..=31).contains(&k) {
            return Err(format!("k-mer length {} outside 2..=31", k));
        }

        let graph = KmerGraph::build(seqs, k, self.params.min_kmer_count);
        if graph.solid.is_empty() {
            return Ok(Vec::new());
        }

        let mut nodes = graph.compact()?;
        clip_tips(&mut nodes, self.params.min_unitig_len);
        let paths = enumerate_paths(&nodes, self.params.max_paths)?;

        let haplotypes = paths
            .into_iter()
            .map(|path| spell_path(&nodes, &path, k))
            .filter(|seq| seq.len() >= self.params.min_unitig_len)
            .sorted_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)))
            .dedup()
            .collect_vec();
        log::trace!(
            "Assembled {} haplotypes from {} reads ({} solid {}-mers)",
            haplotypes.len(),
            seqs.len(),
            graph.solid.len(),
            k
        );
        Ok(haplotypes)
    }
}

fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

fn decode_base(code: u64) -> u8 {
    b"ACGT"[(code & 3) as usize]
}

struct KmerGraph {
    k: usize,
    mask: u64,
    /// Solid k-mers in ascending order
    solid: Vec<u64>,
    lookup: HashSet<u64>,
}

impl KmerGraph {
    fn build(seqs: &[&[u8]], k: usize, min_count: u32) -> KmerGraph {
        let mask = (1u64 << (2 * k)) - 1;
        let mut counts: HashMap<u64, u32> = HashMap::new();
        for seq in seqs {
            let mut kmer = 0u64;
            let mut valid = 0usize;
            for &base in seq.iter() {
                match encode_base(base) {
                    Some(code) => {
                        kmer = ((kmer << 2) | code) & mask;
                        valid += 1;
                    }
                    None => valid = 0,
                }
                if valid >= k {
                    *counts.entry(kmer).or_insert(0) += 1;
                }
            }
        }

        let solid = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .map(|(kmer, _)| kmer)
            .sorted()
            .collect_vec();
        let lookup = solid.iter().copied().collect();
        KmerGraph {
            k,
            mask,
            solid,
            lookup,
        }
    }

    fn successors(&self, kmer: u64) -> Vec<u64> {
        (0..4)
            .map(|code| ((kmer << 2) | code) & self.mask)
            .filter(|next| self.lookup.contains(next))
            .collect()
    }

    fn predecessors(&self, kmer: u64) -> Vec<u64> {
        let shift = 2 * (self.k - 1);
        (0..4)
            .map(|code| (kmer >> 2) | (code << shift))
            .filter(|prev| self.lookup.contains(prev))
            .collect()
    }

    /// A k-mer opens a node unless it continues a non-branching run.
    fn starts_node(&self, kmer: u64) -> bool {
        match self.predecessors(kmer).as_slice() {
            [prev] => *prev == kmer || self.successors(*prev).len() != 1,
            _ => true,
        }
    }

    /// Compacts solid k-mers into non-branching nodes linked by graph edges.
    fn compact(&self) -> Result<Vec<Node>, String> {
        let mut visited: HashSet<u64> = HashSet::with_capacity(self.solid.len());
        let mut nodes: Vec<Node> = Vec::new();
        let mut node_by_first: HashMap<u64, usize> = HashMap::new();

        for &start in self.solid.iter().filter(|&&kmer| self.starts_node(kmer)) {
            let mut kmers = vec![start];
            visited.insert(start);
            let mut current = start;
            while let [next] = self.successors(current).as_slice() {
                let next = *next;
                if visited.contains(&next) || self.starts_node(next) {
                    break;
                }
                visited.insert(next);
                kmers.push(next);
                current = next;
            }
            node_by_first.insert(start, nodes.len());
            nodes.push(Node {
                seq: self.spell(&kmers),
                last: current,
                succ: Vec::new(),
                pred: Vec::new(),
                removed: false,
            });
        }

        // K-mers never reached from a node start lie on an isolated cycle
        if visited.len() != self.solid.len() {
            return Err("k-mer graph contains a cycle".to_string());
        }

        for index in 0..nodes.len() {
            let succ = self
                .successors(nodes[index].last)
                .into_iter()
                .filter_map(|kmer| node_by_first.get(&kmer).copied())
                .collect_vec();
            for &target in &succ {
                nodes[target].pred.push(index);
            }
            nodes[index].succ = succ;
        }
        Ok(nodes)
    }

    fn spell(&self, kmers: &[u64]) -> Vec<u8> {
        let mut seq = (0..self.k)
            .rev()
            .map(|i| decode_base(kmers[0] >> (2 * i)))
            .collect_vec();
        seq.extend(kmers[1..].iter().map(|&kmer| decode_base(kmer)));
        seq
    }
}

struct Node {
    seq: Vec<u8>,
    last: u64,
    succ: Vec<usize>,
    pred: Vec<usize>,
    removed: bool,
}

impl Node {
    fn in_degree(&self, nodes: &[Node]) -> usize {
        self.pred.iter().filter(|&&i| !nodes[i].removed).count()
    }

    fn out_degree(&self, nodes: &[Node]) -> usize {
        self.succ.iter().filter(|&&i| !nodes[i].removed).count()
    }
}

/// Removes short dead ends hanging off a branching node, and short isolated nodes.
fn clip_tips(nodes: &mut [Node], min_len: usize) {
    let tips = (0..nodes.len())
        .filter(|&i| {
            let node = &nodes[i];
            if node.seq.len() >= min_len {
                return false;
            }
            let (in_deg, out_deg) = (node.in_degree(nodes), node.out_degree(nodes));
            match (in_deg, out_deg) {
                (0, 0) => true,
                (0, 1) => node.succ.iter().any(|&t| nodes[t].in_degree(nodes) > 1),
                (1, 0) => node.pred.iter().any(|&s| nodes[s].out_degree(nodes) > 1),
                _ => false,
            }
        })
        .collect_vec();
    for index in tips {
        nodes[index].removed = true;
    }
}

/// All source-to-sink paths, or an error when the graph is cyclic or too tangled.
fn enumerate_paths(nodes: &[Node], max_paths: usize) -> Result<Vec<Vec<usize>>, String> {
    let live = |i: &usize| !nodes[*i].removed;
    let sources = (0..nodes.len())
        .filter(live)
        .filter(|&i| nodes[i].in_degree(nodes) == 0)
        .collect_vec();
    if sources.is_empty() && (0..nodes.len()).any(|i| live(&i)) {
        return Err("k-mer graph contains a cycle".to_string());
    }

    let mut reached = vec![false; nodes.len()];
    let mut paths = Vec::new();
    for source in sources {
        // Each stack frame: node and index of the next successor to try
        let mut path: Vec<usize> = vec![source];
        let mut next_child: Vec<usize> = vec![0];
        let mut on_path = vec![false; nodes.len()];
        on_path[source] = true;
        reached[source] = true;

        while let Some(&node) = path.last() {
            let children = nodes[node].succ.iter().copied().filter(live).collect_vec();
            if children.is_empty() {
                paths.push(path.clone());
                if paths.len() > max_paths {
                    return Err(format!("more than {} haplotype paths", max_paths));
                }
            }
            let child_index = next_child.last().copied().unwrap_or(0);
            if child_index < children.len() {
                if let Some(slot) = next_child.last_mut() {
                    *slot += 1;
                }
                let child = children[child_index];
                if on_path[child] {
                    return Err("k-mer graph contains a cycle".to_string());
                }
                on_path[child] = true;
                reached[child] = true;
                path.push(child);
                next_child.push(0);
            } else {
                on_path[node] = false;
                path.pop();
                next_child.pop();
            }
        }
    }

    if (0..nodes.len()).any(|i| live(&i) && !reached[i]) {
        return Err("k-mer graph contains a cycle".to_string());
    }
    Ok(paths)
}

fn spell_path(nodes: &[Node], path: &[usize], k: usize) -> Vec<u8> {
    let mut seq = nodes[path[0]].seq.clone();
    for &index in &path[1..] {
        seq.extend_from_slice(&nodes[index].seq[k - 1..]);
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
    }

    fn tile(seq: &[u8], read_len: usize, step: usize, depth: usize) -> Vec<Vec<u8>> {
        let mut reads = Vec::new();
        for start in (0..=seq.len() - read_len).step_by(step) {
            for _ in 0..depth {
                reads.push(seq[start..start + read_len].to_vec());
            }
        }
        reads
    }

    fn assemble(reads: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String> {
        let seqs = reads.iter().map(|r| r.as_slice()).collect_vec();
        DeBruijnAssembler::new(AssemblyParams::default()).assemble(&seqs)
    }

    #[test]
    fn reconstructs_a_single_haplotype() {
        let genome = random_seq(200, 7);
        let reads = tile(&genome, 60, 5, 2);
        let unitigs = assemble(&reads).unwrap();
        assert_eq!(unitigs, vec![genome]);
    }

    #[test]
    fn heterozygous_snv_yields_two_haplotypes() {
        let genome = random_seq(200, 11);
        let mut alt = genome.clone();
        alt[100] = if genome[100] == b'A' { b'C' } else { b'A' };

        let mut reads = tile(&genome, 60, 5, 2);
        reads.extend(tile(&alt, 60, 5, 2));
        let unitigs = assemble(&reads).unwrap();
        assert_eq!(unitigs.len(), 2);
        assert!(unitigs.contains(&genome));
        assert!(unitigs.contains(&alt));
    }

    #[test]
    fn singleton_kmers_are_not_assembled() {
        let genome = random_seq(200, 3);
        let reads = tile(&genome, 60, 5, 1);
        let mut with_error = reads.clone();
        with_error.extend(tile(&genome, 60, 5, 1));
        with_error[0][30] = if with_error[0][30] == b'G' { b'T' } else { b'G' };
        assert_eq!(assemble(&with_error).unwrap(), vec![genome.clone()]);

        // Disjoint reads never reach the minimum k-mer count
        let sparse = vec![genome[..60].to_vec(), genome[100..160].to_vec()];
        assert!(assemble(&sparse).unwrap().is_empty());
    }

    #[test]
    fn tandem_repeats_fail_to_assemble() {
        let unit = b"ACGTTGCAAGGCTTACGATCCA";
        let mut genome = random_seq(60, 5);
        for _ in 0..4 {
            genome.extend_from_slice(unit);
        }
        genome.extend(random_seq(60, 6));
        let reads = tile(&genome, 60, 2, 2);
        assert!(assemble(&reads).is_err());
    }

    #[test]
    fn invalid_kmer_length_is_an_error() {
        let params = AssemblyParams {
            kmer_len: 40,
            ..AssemblyParams::default()
        };
        let seqs: Vec<&[u8]> = vec![b"ACGTACGT"];
        assert!(DeBruijnAssembler::new(params).assemble(&seqs).is_err());
    }
}
