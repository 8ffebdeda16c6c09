pub mod align;
pub mod bam_utils;
pub mod io_utils;
pub mod math;
pub mod prior;
pub mod readers;
pub mod region;
pub mod util;

pub use align::{AlnScoring, TieBreak};
pub use bam_utils::{get_bam_header, get_contigs, get_sample_name, is_bam_mapped};
pub use io_utils::{create_writer, output_path};
pub use math::{fisher_exact, ln_add, ln_to_phred, log_sum_exp, phred_to_err, rank_sum_z};
pub use prior::{GenotypePrior, SummitDiscount};
pub use readers::{open_genome_reader, open_peaks_reader};
pub use region::GenomicRegion;
pub use util::{handle_error_and_exit, normalize_bases, Result};
