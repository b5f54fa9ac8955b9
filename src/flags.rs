use std::path::PathBuf;

xflags::xflags! {
    /// Four-core L1/L2/L3 cache hierarchy simulator.
    cmd SimArgs {
        /// Path to the trace file to run.
        optional trace_file: PathBuf

        /// Prints the full statistics report after simulation.
        optional --history

        /// Reads commands from stdin instead of running a trace.
        optional -i, --interactive

        /// Also writes per-level statistics to this CSV file.
        optional --csv path: PathBuf

        /// Backing store latency in cycles.
        optional --memory-latency cycles: u32

        /// Cycles a single access may take before the run is aborted.
        optional --max-stall cycles: u64

        /// Enables debug logging.
        optional -v, --verbose
    }
}
