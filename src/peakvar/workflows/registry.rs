use super::region::RegionOutcome;
use crate::peakvar::error::RegionError;
use crate::peakvar::peak::Peak;
use crossbeam_channel::{bounded, Receiver};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use rayon::ThreadPool;
use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

const CHANNEL_BUFFER_SIZE: usize = 2048;

/// A processed region: its output, or the reason it was abandoned.
#[derive(Debug, Clone)]
pub struct RegionResult<T = RegionOutcome> {
    pub peak: Peak,
    pub outcome: Result<T, RegionError>,
}

/// Totals across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub num_called: usize,
    /// Regions abandoned after exceeding their time budget
    pub num_skipped: usize,
    pub num_failed: usize,
    pub num_variants: usize,
    pub num_pass: usize,
    pub num_malformed_reads: usize,
    pub num_assembly_failures: usize,
    pub num_divergent_unitigs: usize,
}

impl RunSummary {
    /// Counts a region as called, skipped or failed.
    pub fn record_status<T>(&mut self, result: &RegionResult<T>) {
        match &result.outcome {
            Ok(_) => self.num_called += 1,
            Err(RegionError::Timeout { .. }) => self.num_skipped += 1,
            Err(_) => self.num_failed += 1,
        }
    }

    pub fn record(&mut self, result: &RegionResult) {
        self.record_status(result);
        match &result.outcome {
            Ok(outcome) => {
                self.num_variants += outcome.variants.len();
                self.num_pass += outcome.variants.iter().filter(|v| v.is_pass()).count();
                self.num_malformed_reads += outcome.stats.num_malformed;
                self.num_divergent_unitigs += outcome.stats.num_divergent;
                if outcome.stats.assembly_failed {
                    self.num_assembly_failures += 1;
                }
            }
            Err(err @ RegionError::Timeout { .. }) => {
                log::warn!("{}: Skipped: {}", result.peak.id, err)
            }
            Err(err) => log::error!("{}: {}", result.peak.id, err),
        }
    }

    pub fn log(&self) {
        log::info!(
            "Processed {} regions: {} called, {} skipped, {} failed",
            self.num_called + self.num_skipped + self.num_failed,
            self.num_called,
            self.num_skipped,
            self.num_failed
        );
        log::info!(
            "Reported {} variants ({} passing filters)",
            self.num_variants,
            self.num_pass
        );
        if self.num_malformed_reads > 0 {
            log::warn!("Skipped {} malformed reads", self.num_malformed_reads);
        }
        if self.num_assembly_failures > 0 {
            log::warn!(
                "Assembly failed in {} regions; reference alignments were used",
                self.num_assembly_failures
            );
        }
    }
}

/// Owns the regions of a run and hands them to workers.
pub struct RegionRegistry {
    peaks: Vec<Peak>,
}

impl RegionRegistry {
    pub fn new(peaks: Vec<Peak>) -> Self {
        RegionRegistry { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Processes regions one at a time on the calling thread.
    pub fn process<'a, T, F>(&'a self, mut worker: F) -> impl Iterator<Item = RegionResult<T>> + 'a
    where
        F: FnMut(&Peak) -> Result<T, RegionError> + 'a,
    {
        self.peaks.iter().map(move |peak| RegionResult {
            peak: peak.clone(),
            outcome: worker(peak),
        })
    }

    /// Processes regions on `pool` and yields results in input order.
    pub fn process_parallel<T, F>(self, pool: ThreadPool, worker: F) -> OrderedResults<T>
    where
        T: Send + 'static,
        F: Fn(&Peak) -> Result<T, RegionError> + Send + Sync + 'static,
    {
        let (sender, receiver) = bounded(CHANNEL_BUFFER_SIZE);
        let peaks = self.peaks;
        let handle = thread::spawn(move || {
            pool.install(|| {
                peaks
                    .into_par_iter()
                    .enumerate()
                    .for_each_with(sender, |s, (index, peak)| {
                        let outcome = worker(&peak);
                        if let Err(e) = s.send((index, RegionResult { peak, outcome })) {
                            log::error!("Failed to send region result: {}", e);
                        }
                    });
            });
        });

        OrderedResults {
            receiver,
            pending: BTreeMap::new(),
            next_index: 0,
            handle: Some(handle),
        }
    }
}

/// Re-orders results arriving from workers into input order.
pub struct OrderedResults<T> {
    receiver: Receiver<(usize, RegionResult<T>)>,
    pending: BTreeMap<usize, RegionResult<T>>,
    next_index: usize,
    handle: Option<JoinHandle<()>>,
}

impl<T> Iterator for OrderedResults<T> {
    type Item = RegionResult<T>;

    fn next(&mut self) -> Option<RegionResult<T>> {
        loop {
            if let Some(result) = self.pending.remove(&self.next_index) {
                self.next_index += 1;
                return Some(result);
            }
            match self.receiver.recv() {
                Ok((index, result)) => {
                    self.pending.insert(index, result);
                }
                Err(_) => {
                    if let Some(handle) = self.handle.take() {
                        if handle.join().is_err() {
                            log::error!("Region worker thread panicked");
                        }
                    }
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peakvar::assembly::AssemblyResult;
    use crate::peakvar::error::Stage;
    use crate::peakvar::workflows::RegionStats;
    use crate::utils::GenomicRegion;
    use rayon::ThreadPoolBuilder;
    use std::time::Duration;

    fn peaks(count: u32) -> Vec<Peak> {
        (0..count)
            .map(|i| Peak {
                id: format!("peak{}", i),
                region: GenomicRegion::new("chr1", i * 100, i * 100 + 50).unwrap(),
                summit: i * 100 + 25,
            })
            .collect()
    }

    fn empty_outcome() -> RegionOutcome {
        RegionOutcome {
            variants: Vec::new(),
            assembly: AssemblyResult::NoAssembly,
            assignments: Vec::new(),
            stats: RegionStats::default(),
        }
    }

    fn worker(peak: &Peak) -> Result<RegionOutcome, RegionError> {
        match peak.region.start / 100 % 5 {
            3 => Err(RegionError::Timeout {
                stage: Stage::Loaded,
                budget: Duration::from_secs(1),
            }),
            4 => Err(RegionError::Reference {
                region: peak.region.to_string(),
                reason: "missing".to_string(),
            }),
            _ => Ok(empty_outcome()),
        }
    }

    #[test]
    fn parallel_results_come_back_in_input_order() {
        let registry = RegionRegistry::new(peaks(200));
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let ids = registry
            .process_parallel(pool, worker)
            .map(|result| result.peak.id)
            .collect::<Vec<_>>();
        let expected = (0..200).map(|i| format!("peak{}", i)).collect::<Vec<_>>();
        assert_eq!(ids, expected);
    }

    #[test]
    fn summary_counts_outcomes() {
        let registry = RegionRegistry::new(peaks(10));
        let mut summary = RunSummary::default();
        for result in registry.process(worker) {
            summary.record(&result);
        }
        assert_eq!(summary.num_called, 6);
        assert_eq!(summary.num_skipped, 2);
        assert_eq!(summary.num_failed, 2);
    }
}
