//! Statistics report printed after a run

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::SimulatorResult;
use crate::memory::cache::CacheHistory;
use crate::system::{Completion, HierarchyStats};

pub struct PerformanceReport {
    pub stats: HierarchyStats,
    pub num_operations: usize,
    pub num_l1_hits: usize,
    /// Average ticks from issue to completion
    pub amat: f64,
}

impl PerformanceReport {
    pub fn make(stats: HierarchyStats, completions: &[Completion]) -> Self {
        let total: u64 = completions.iter().map(Completion::latency).sum();
        let amat = match completions.len() {
            0 => 0.0,
            n => total as f64 / n as f64,
        };
        Self {
            stats,
            num_operations: completions.len(),
            num_l1_hits: completions.iter().filter(|c| c.hit).count(),
            amat,
        }
    }

    /// (level, core, counters) for every cache in the system;
    /// the shared L3 has no core
    fn rows(&self) -> Vec<(&'static str, Option<usize>, CacheHistory)> {
        let mut rows = Vec::new();
        for (core, history) in self.stats.l1.iter().enumerate() {
            rows.push(("L1", Some(core), *history));
        }
        for (core, history) in self.stats.l2.iter().enumerate() {
            rows.push(("L2", Some(core), *history));
        }
        rows.push(("L3", None, self.stats.l3));
        rows
    }

    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> SimulatorResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record([
            "Level",
            "Core",
            "Hits",
            "Misses",
            "Evictions",
            "Hit rate",
        ])?;
        for (level, core, history) in self.rows() {
            writer.write_record([
                level.to_string(),
                core.map_or_else(
                    || "shared".to_string(),
                    |core| core.to_string(),
                ),
                history.num_hit.to_string(),
                history.num_miss.to_string(),
                history.num_eviction.to_string(),
                format!("{:.3}", history.get_hit_rate()),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> SimulatorResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv_to(file)
    }
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[HISTORY] # cycles = {}", self.stats.cycles)?;
        writeln!(
            f,
            "[HISTORY] # operations = {} ({} L1 hits)",
            self.num_operations, self.num_l1_hits
        )?;
        writeln!(f, "[HISTORY] AMAT = {:.2}", self.amat)?;
        for (level, core, history) in self.rows() {
            let name = match core {
                Some(core) => format!("{} core {}", level, core),
                None => level.to_string(),
            };
            writeln!(
                f,
                "[HISTORY] {:<10} hit {:>5} miss {:>5} evict {:>5} hit rate {:.3}",
                name,
                history.num_hit,
                history.num_miss,
                history.num_eviction,
                history.get_hit_rate()
            )?;
        }
        writeln!(
            f,
            "[HISTORY] L3 grants per core = {:?}",
            self.stats.l3_grants
        )?;
        for (core, counts) in self.stats.patterns.iter().enumerate() {
            writeln!(
                f,
                "[HISTORY] core {} pattern sequential {} stride-2 {} random {}",
                core, counts.sequential, counts.stride2, counts.random
            )?;
        }
        write!(
            f,
            "[HISTORY] memory reads {} writes {}",
            self.stats.memory_reads, self.stats.memory_writes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{HierarchyPolicy, MulticoreSystem, Operation};

    fn report() -> SimulatorResult<PerformanceReport> {
        let mut system = MulticoreSystem::make(HierarchyPolicy::default())?;
        let completions = system.run_operations(&[
            Operation::write(0, 0x10, 0x01),
            Operation::read(0, 0x10),
            Operation::read(2, 0x80),
        ])?;
        Ok(PerformanceReport::make(system.stats(), &completions))
    }

    #[test]
    fn test_report_counts() -> SimulatorResult<()> {
        let report = report()?;
        assert_eq!(report.num_operations, 3);
        assert_eq!(report.num_l1_hits, 1);
        assert!(report.amat >= 1.0);
        let text = report.to_string();
        assert!(text.contains("L1 core 0"));
        assert!(text.contains("AMAT"));
        Ok(())
    }

    #[test]
    fn test_csv_rows() -> SimulatorResult<()> {
        let mut buffer = Vec::new();
        report()?.write_csv_to(&mut buffer)?;
        let text = String::from_utf8_lossy(&buffer);
        let lines: Vec<_> = text.lines().collect();
        // Header, four L1 rows, four L2 rows, one L3 row
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "Level,Core,Hits,Misses,Evictions,Hit rate");
        assert_eq!(lines[1], "L1,0,1,1,0,0.500");
        assert!(lines[9].starts_with("L3,shared,"));
        Ok(())
    }

    #[test]
    fn test_empty_run() {
        let report = PerformanceReport::make(HierarchyStats::default(), &[]);
        assert_eq!(report.amat, 0.0);
        assert!(report.to_string().contains("# operations = 0"));
    }
}
