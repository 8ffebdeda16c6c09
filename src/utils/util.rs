pub type Result<T> = std::result::Result<T, String>;

pub fn handle_error_and_exit(err: String) -> ! {
    log::error!("{}", err);
    std::process::exit(1);
}

/// Upper-cases nucleotides and maps anything outside `ACGT` to `N`.
pub fn normalize_bases(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|b| match b.to_ascii_uppercase() {
            base @ (b'A' | b'C' | b'G' | b'T') => base,
            _ => b'N',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bases_masks_iupac_codes() {
        assert_eq!(normalize_bases(b"acgtRYn"), b"ACGTNNN".to_vec());
    }
}
