pub type CigarOp = rust_htslib::bam::record::Cigar;

pub trait CigarOpExt {
    fn get_ref_len(&self) -> i64;
    fn get_query_len(&self) -> i64;
    /// Same operation kind with a different length.
    fn with_len(&self, len: u32) -> CigarOp;
}

impl CigarOpExt for CigarOp {
    fn get_ref_len(&self) -> i64 {
        match self {
            CigarOp::Match(len)
            | CigarOp::RefSkip(len)
            | CigarOp::Del(len)
            | CigarOp::Equal(len)
            | CigarOp::Diff(len) => *len as i64,
            CigarOp::Ins(_) | CigarOp::SoftClip(_) | CigarOp::HardClip(_) | CigarOp::Pad(_) => 0,
        }
    }

    fn get_query_len(&self) -> i64 {
        match self {
            CigarOp::Match(len)
            | CigarOp::Equal(len)
            | CigarOp::Diff(len)
            | CigarOp::Ins(len)
            | CigarOp::SoftClip(len) => *len as i64,
            CigarOp::RefSkip(_) | CigarOp::Del(_) | CigarOp::HardClip(_) | CigarOp::Pad(_) => 0,
        }
    }

    fn with_len(&self, len: u32) -> CigarOp {
        match self {
            CigarOp::Match(_) => CigarOp::Match(len),
            CigarOp::Ins(_) => CigarOp::Ins(len),
            CigarOp::Del(_) => CigarOp::Del(len),
            CigarOp::RefSkip(_) => CigarOp::RefSkip(len),
            CigarOp::SoftClip(_) => CigarOp::SoftClip(len),
            CigarOp::HardClip(_) => CigarOp::HardClip(len),
            CigarOp::Pad(_) => CigarOp::Pad(len),
            CigarOp::Equal(_) => CigarOp::Equal(len),
            CigarOp::Diff(_) => CigarOp::Diff(len),
        }
    }
}

/// Appends `op`, merging it into the last operation when both are of the same kind.
pub fn push_op(ops: &mut Vec<CigarOp>, op: CigarOp) {
    if op.len() == 0 {
        return;
    }
    if let Some(last) = ops.last_mut() {
        if std::mem::discriminant(last) == std::mem::discriminant(&op) {
            *last = last.with_len(last.len() + op.len());
            return;
        }
    }
    ops.push(op);
}

pub fn parse_cigar_string(cigar_string: &str) -> Result<Vec<CigarOp>, String> {
    let mut ops = Vec::new();
    let mut num_str = String::new();
    for c in cigar_string.chars() {
        if c.is_ascii_digit() {
            num_str.push(c);
            continue;
        }
        let num: u32 = num_str
            .parse()
            .map_err(|_| format!("Missing length before '{}' in CIGAR {}", c, cigar_string))?;
        num_str.clear();
        let op = match c {
            'M' => CigarOp::Match(num),
            'I' => CigarOp::Ins(num),
            'D' => CigarOp::Del(num),
            'N' => CigarOp::RefSkip(num),
            'S' => CigarOp::SoftClip(num),
            'H' => CigarOp::HardClip(num),
            'P' => CigarOp::Pad(num),
            '=' => CigarOp::Equal(num),
            'X' => CigarOp::Diff(num),
            _ => return Err(format!("Invalid CIGAR operation '{}' in {}", c, cigar_string)),
        };
        ops.push(op);
    }
    if !num_str.is_empty() {
        return Err(format!("Trailing length in CIGAR {}", cigar_string));
    }
    Ok(ops)
}

fn leading_soft_clip<'a>(ops: impl Iterator<Item = &'a CigarOp>) -> usize {
    ops.skip_while(|op| matches!(op, CigarOp::HardClip(_)))
        .map_while(|op| match op {
            CigarOp::SoftClip(len) => Some(*len as usize),
            _ => None,
        })
        .sum()
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Cigar {
    pub ref_pos: i64,
    pub ops: Vec<CigarOp>,
}

impl Cigar {
    pub fn query_len(&self) -> usize {
        self.ops.iter().map(|op| op.get_query_len() as usize).sum()
    }

    pub fn ref_len(&self) -> i64 {
        self.ops.iter().map(|op| op.get_ref_len()).sum()
    }

    pub fn ref_end(&self) -> i64 {
        self.ref_pos + self.ref_len()
    }

    /// Soft-clipped bases at the start and end of the query.
    pub fn soft_clips(&self) -> (usize, usize) {
        (
            leading_soft_clip(self.ops.iter()),
            leading_soft_clip(self.ops.iter().rev()),
        )
    }

    pub fn to_cigar_string(&self) -> String {
        self.ops.iter().map(|op| op.to_string()).collect()
    }
}
