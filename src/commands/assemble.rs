use super::call::{
    assembly_params, collection_params, initialize_thread_pool, with_read_sources,
    ThreadContextParams,
};
use crate::cli::AssembleArgs;
use crate::peakvar::{
    assembly::DeBruijnAssembler,
    peak::load_peaks,
    workflows::{assemble_region, RegionRegistry, RunSummary},
    writers::FastaWriter,
};
use crate::utils::{create_writer, get_bam_header, is_bam_mapped, Result};
use std::sync::Arc;

pub fn assemble(args: AssembleArgs) -> Result<()> {
    let bam_header = get_bam_header(&args.reads_path)?;
    if !is_bam_mapped(&bam_header) {
        return Err("Input BAM is not mapped".into());
    }

    let mut fasta_writer = create_writer(&args.output_prefix, "unitigs.fa", FastaWriter::new)?;

    let peaks = load_peaks(&args.peaks_path)?;
    log::info!("Loaded {} peaks", peaks.len());
    let registry = RegionRegistry::new(peaks);

    let params = Arc::new(collection_params(
        &args.collection,
        assembly_params(&args.assembly),
    ));
    let assembler = DeBruijnAssembler::new(params.assembly);

    let pool = initialize_thread_pool(
        args.num_threads,
        ThreadContextParams {
            genome_path: None,
            reads_path: args.reads_path.clone(),
            control_path: args.control_path.clone(),
        },
    )?;

    let results = registry.process_parallel(pool, move |peak| {
        with_read_sources(|sources| assemble_region(peak, &params, sources, &assembler))
    });

    let mut summary = RunSummary::default();
    let mut num_unitigs = 0;
    for result in results {
        summary.record_status(&result);
        match &result.outcome {
            Ok(assembly) => {
                num_unitigs += assembly.len();
                fasta_writer.write(&result.peak, assembly)?;
            }
            Err(err) => log::warn!("{}: {}", result.peak.id, err),
        }
    }
    fasta_writer.flush()?;

    log::info!(
        "Assembled {} unitigs across {} peaks ({} skipped, {} failed)",
        num_unitigs,
        summary.num_called,
        summary.num_skipped,
        summary.num_failed
    );
    Ok(())
}
