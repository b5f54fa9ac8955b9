use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_lib::memory::cache::CacheHistory;
use sim_lib::memory::NUM_CORES;
use sim_lib::report::PerformanceReport;
use sim_lib::system::{HierarchyPolicy, MulticoreSystem, Operation};

const OPERATIONS_PER_CORE: usize = 256;
const WRITE_RATIO: f64 = 0.25;
const SEED: u64 = 0x5eed;

#[derive(Clone, Copy, Debug)]
enum Pattern {
    Sequential,
    Stride2,
    Random,
    /// Every core hammers the same region
    SharedHot,
}

impl Pattern {
    fn name(&self) -> &'static str {
        match self {
            Pattern::Sequential => "sequential",
            Pattern::Stride2 => "stride-2",
            Pattern::Random => "random",
            Pattern::SharedHot => "shared-hot",
        }
    }

    fn operations(&self, footprint: usize, rng: &mut StdRng) -> Vec<Operation> {
        let mut operations = Vec::with_capacity(OPERATIONS_PER_CORE * NUM_CORES);
        for i in 0..OPERATIONS_PER_CORE {
            for core in 0..NUM_CORES {
                let base = match self {
                    Pattern::SharedHot => 0,
                    _ => core * footprint,
                };
                let offset = match self {
                    Pattern::Sequential => i % footprint,
                    Pattern::Stride2 => (2 * i) % footprint,
                    Pattern::Random | Pattern::SharedHot => rng.gen_range(0..footprint),
                };
                let address = ((base + offset) % 256) as u8;
                if rng.gen_bool(WRITE_RATIO) {
                    operations.push(Operation::write(core, address, rng.gen()));
                } else {
                    operations.push(Operation::read(core, address));
                }
            }
        }
        operations
    }
}

fn combined(histories: &[CacheHistory]) -> CacheHistory {
    histories.iter().fold(CacheHistory::default(), |total, history| CacheHistory {
        num_hit: total.num_hit + history.num_hit,
        num_miss: total.num_miss + history.num_miss,
        num_eviction: total.num_eviction + history.num_eviction,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let patterns = [Pattern::Sequential, Pattern::Stride2, Pattern::Random, Pattern::SharedHot];
    let footprints = [4usize, 8, 16, 32, 64];
    let levels = ["L1", "L2", "L3"];

    std::fs::create_dir_all("eval")?;
    let mut writer = csv::Writer::from_path("eval/sweep_eval.csv")?;
    writer.write_record([
        "Pattern",
        "Footprint",
        "L1 hit rate",
        "L2 hit rate",
        "L3 hit rate",
        "Cycles",
        "AMAT",
    ])?;

    let mut rng = StdRng::seed_from_u64(SEED);
    // data[pattern][level] = [(footprint, hit rate)]
    let mut data = vec![vec![Vec::new(); levels.len()]; patterns.len()];

    for (p, pattern) in patterns.iter().enumerate() {
        for footprint in footprints {
            eprintln!("Running {} over {} bytes", pattern.name(), footprint);
            let mut system = MulticoreSystem::make(HierarchyPolicy::default())?;
            let completions = system.run_operations(&pattern.operations(footprint, &mut rng))?;
            let report = PerformanceReport::make(system.stats(), &completions);

            let rates = [
                combined(&report.stats.l1).get_hit_rate(),
                combined(&report.stats.l2).get_hit_rate(),
                report.stats.l3.get_hit_rate(),
            ];
            for (level, rate) in rates.iter().enumerate() {
                data[p][level].push((footprint as i32, *rate));
            }
            writer.write_record([
                pattern.name().to_string(),
                footprint.to_string(),
                format!("{:.3}", rates[0]),
                format!("{:.3}", rates[1]),
                format!("{:.3}", rates[2]),
                report.stats.cycles.to_string(),
                format!("{:.3}", report.amat),
            ])?;
        }
    }
    writer.flush()?;

    // Plot the data, one panel per level
    use plotters::prelude::*;

    let root = SVGBackend::new("eval/sweep_eval.svg", (1500, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((1, levels.len()));

    let x_range = footprints[0] as i32..footprints[footprints.len() - 1] as i32;
    for (level, panel) in panels.iter().enumerate() {
        let mut ctx = ChartBuilder::on(panel)
            .caption(format!("{} hit rate", levels[level]), ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range.clone(), 0.0..1.05)?;
        ctx.configure_mesh()
            .x_desc("Footprint per core (bytes)")
            .y_desc("Hit rate")
            .draw()?;

        for (p, pattern) in patterns.iter().enumerate() {
            let color = Palette99::pick(p).to_rgba();
            ctx.draw_series(LineSeries::new(data[p][level].iter().copied(), color))?
                .label(pattern.name())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        ctx.configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }
    root.present()?;

    Ok(())
}
