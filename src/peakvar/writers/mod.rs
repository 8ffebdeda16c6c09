mod write_fasta;
mod write_vcf;

pub use write_fasta::FastaWriter;
pub use write_vcf::VcfWriter;
