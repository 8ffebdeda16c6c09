use crate::cli::{AssemblyArgs, CallArgs, CollectionArgs};
use crate::peakvar::{
    assembly::{AssemblyParams, DeBruijnAssembler},
    genotype::{FilterParams, LikelihoodParams},
    peak::load_peaks,
    read_source::{BamReadSource, ReadSource},
    reads::Sample,
    realign::RealignParams,
    reference::FaidxReference,
    workflows::{process_region, Params, RegionRegistry, RunSummary},
    writers::{FastaWriter, VcfWriter},
};
use crate::utils::{
    create_writer, get_bam_header, get_contigs, get_sample_name, is_bam_mapped, Result,
};
use rayon::ThreadPoolBuilder;
use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

#[derive(Debug, Clone)]
pub(crate) struct ThreadContextParams {
    pub genome_path: Option<PathBuf>,
    pub reads_path: PathBuf,
    pub control_path: Option<PathBuf>,
}

thread_local! {
    static CTX_PARAMS: RefCell<Option<ThreadContextParams>> = const { RefCell::new(None) };
}

fn thread_context() -> ThreadContextParams {
    CTX_PARAMS.with(|ctx_cell| {
        ctx_cell
            .borrow()
            .as_ref()
            .expect("Thread context parameters not initialized")
            .clone()
    })
}

fn open_bam_source(path: &Path, sample: Sample) -> BamReadSource {
    BamReadSource::from_path(path, sample).unwrap_or_else(|e| {
        panic!(
            "Failed to initialize BAM reader for path {}: {}",
            path.display(),
            e
        )
    })
}

fn create_thread_local_reference() -> Option<FaidxReference> {
    thread_context().genome_path.map(|path| {
        FaidxReference::from_path(&path).unwrap_or_else(|e| {
            panic!(
                "Failed to initialize reference reader for path {}: {}",
                path.display(),
                e
            )
        })
    })
}

fn create_thread_local_treatment_reader() -> BamReadSource {
    open_bam_source(&thread_context().reads_path, Sample::Treatment)
}

fn create_thread_local_control_reader() -> Option<BamReadSource> {
    thread_context()
        .control_path
        .map(|path| open_bam_source(&path, Sample::Control))
}

thread_local! {
    // Reference
    static THREAD_REFERENCE: RefCell<Option<FaidxReference>> = RefCell::new(create_thread_local_reference());
    // Treatment BAM reader
    static THREAD_TREATMENT_READER: RefCell<BamReadSource> = RefCell::new(create_thread_local_treatment_reader());
    // Control BAM reader
    static THREAD_CONTROL_READER: RefCell<Option<BamReadSource>> = RefCell::new(create_thread_local_control_reader());
}

/// Runs `f` with this thread's treatment reader and, when configured, its control reader.
pub(crate) fn with_read_sources<T>(f: impl FnOnce(&mut [&mut dyn ReadSource]) -> T) -> T {
    THREAD_TREATMENT_READER.with(|treatment_cell| {
        THREAD_CONTROL_READER.with(|control_cell| {
            let mut treatment = treatment_cell.borrow_mut();
            let mut control = control_cell.borrow_mut();
            let treatment: &mut dyn ReadSource = &mut *treatment;
            match control.as_mut() {
                Some(control) => f(&mut [treatment, control]),
                None => f(&mut [treatment]),
            }
        })
    })
}

pub(crate) fn initialize_thread_pool(
    num_threads: usize,
    thread_context: ThreadContextParams,
) -> Result<rayon::ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("peakvar-{}", i))
        .start_handler(move |_thread_index| {
            CTX_PARAMS.with(|cell| {
                *cell.borrow_mut() = Some(thread_context.clone());
            });
            log::trace!("Initialized thread {:?}", std::thread::current().id());
        })
        .exit_handler(|_thread_index| {
            CTX_PARAMS.with(|cell| {
                *cell.borrow_mut() = None;
            });
        })
        .build()
        .map_err(|e| format!("Failed to initialize thread pool: {}", e))
}

pub(crate) fn assembly_params(args: &AssemblyArgs) -> AssemblyParams {
    AssemblyParams {
        kmer_len: args.kmer_len,
        min_kmer_count: args.min_kmer_count,
        max_paths: args.max_paths,
        ..AssemblyParams::default()
    }
}

pub(crate) fn collection_params(args: &CollectionArgs, assembly: AssemblyParams) -> Params {
    Params {
        max_reads: args.max_reads,
        flank: args.flank_len,
        min_mapq: args.min_mapq,
        timeout: args.timeout_secs.map(Duration::from_secs),
        assembly,
        ..Params::default()
    }
}

fn workflow_params(args: &CallArgs) -> Params {
    let base = collection_params(&args.collection, assembly_params(&args.assembly));
    Params {
        realign: RealignParams {
            scoring: args.aln_scoring,
            tie_break: args.tie_break,
            min_unitig_identity: args.min_unitig_identity,
            min_read_identity: args.min_read_identity,
            ..RealignParams::default()
        },
        likelihood: LikelihoodParams {
            prior: args.prior,
            summit_discount: args.summit_discount,
            min_base_qual: args.min_base_qual,
            min_asb_delta_bic: args.min_asb_delta_bic,
            ..LikelihoodParams::default()
        },
        filters: FilterParams {
            min_alt_count: args.min_alt_count,
            min_depth: args.min_depth,
            min_quality: args.min_quality,
            max_strand_bias: args.max_strand_bias,
            max_summit_dist: args.max_summit_dist,
        },
        ..base
    }
}

pub fn call(args: CallArgs) -> Result<()> {
    let bam_header = get_bam_header(&args.reads_path)?;
    if !is_bam_mapped(&bam_header) {
        return Err("Input BAM is not mapped".into());
    }
    if let Some(control_path) = &args.control_path {
        if !is_bam_mapped(&get_bam_header(control_path)?) {
            return Err("Control BAM is not mapped".into());
        }
    }
    // Fail early on an unreadable reference instead of inside the workers
    FaidxReference::from_path(&args.genome_path)?;

    let sample_name = match &args.sample_name {
        Some(name) => name.clone(),
        None => get_sample_name(&args.reads_path, &bam_header)?,
    };
    let contigs = get_contigs(&bam_header);
    let mut vcf_writer = create_writer(&args.output_prefix, "vcf.gz", |path| {
        VcfWriter::new(path, &sample_name, &contigs)
    })?;
    let mut fasta_writer = if args.write_unitigs {
        Some(create_writer(&args.output_prefix, "unitigs.fa", FastaWriter::new)?)
    } else {
        None
    };

    let peaks = load_peaks(&args.peaks_path)?;
    log::info!("Loaded {} peaks", peaks.len());
    let registry = RegionRegistry::new(peaks);

    let params = Arc::new(workflow_params(&args));
    let assembler = DeBruijnAssembler::new(params.assembly);

    log::debug!(
        "Initializing thread pool with {} threads...",
        args.num_threads
    );
    let pool = initialize_thread_pool(
        args.num_threads,
        ThreadContextParams {
            genome_path: Some(args.genome_path.clone()),
            reads_path: args.reads_path.clone(),
            control_path: args.control_path.clone(),
        },
    )?;

    let results = registry.process_parallel(pool, move |peak| {
        THREAD_REFERENCE.with(|reference_cell| {
            let reference = reference_cell.borrow();
            let reference = reference
                .as_ref()
                .expect("Reference reader not initialized");
            with_read_sources(|sources| {
                process_region(peak, &params, reference, sources, &assembler)
            })
        })
    });

    let mut summary = RunSummary::default();
    for result in results {
        summary.record(&result);
        if let Ok(outcome) = &result.outcome {
            vcf_writer.write_all(&outcome.variants)?;
            if let Some(writer) = fasta_writer.as_mut() {
                writer.write(&result.peak, &outcome.assembly)?;
            }
        }
    }
    if let Some(writer) = fasta_writer.as_mut() {
        writer.flush()?;
    }
    summary.log();

    Ok(())
}
