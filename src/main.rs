//! Ping-pong compute CLI - Run a diffusion engine from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use pingpong_compute::{
    compute::{ComputePass, CpuDevice, CpuProgram, Engine},
    schema::{CellValue, EngineConfig, Seed, UniformDecl},
};

/// Diffusion rate; stable for rates up to 0.25.
const DIFFUSION_RATE: f32 = 0.2;

/// Summary statistics over component 0 of a grid.
struct FrameStats {
    total: f32,
    active_cells: usize,
    min_value: f32,
    max_value: f32,
}

impl FrameStats {
    fn from_cells(cells: &[CellValue]) -> Self {
        let mut stats = Self {
            total: 0.0,
            active_cells: 0,
            min_value: f32::INFINITY,
            max_value: f32::NEG_INFINITY,
        };
        for cell in cells {
            let v = cell[0];
            stats.total += v;
            if v > 1e-6 {
                stats.active_cells += 1;
            }
            stats.min_value = stats.min_value.min(v);
            stats.max_value = stats.max_value.max(v);
        }
        stats
    }
}

fn diffusion_pass() -> ComputePass<CpuProgram> {
    ComputePass::new(
        "diffuse",
        CpuProgram::new(|cell| {
            let Some(heat) = cell.input("heat") else {
                return [0.0; 4];
            };
            let rate = cell.scalar("rate").unwrap_or(0.0);
            let c = heat.current();
            let neighbours = heat.offset(-1, 0)[0]
                + heat.offset(1, 0)[0]
                + heat.offset(0, -1)[0]
                + heat.offset(0, 1)[0];
            [c[0] + rate * (neighbours - 4.0 * c[0]), c[1], c[2], c[3]]
        }),
    )
    .with_uniform(UniformDecl::scalar("rate", DIFFUSION_RATE))
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [frames]", args[0]);
        eprintln!();
        eprintln!("Run a ping-pong diffusion engine from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to engine configuration file");
        eprintln!("  frames       Number of frames to compute (default: 100)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let frames: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EngineConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    // Load or create seed
    let seed_path = config_path.with_extension("seed.json");
    let seed: Seed = if seed_path.exists() {
        let seed_str = fs::read_to_string(&seed_path).unwrap_or_else(|e| {
            eprintln!("Error reading seed file: {}", e);
            std::process::exit(1);
        });
        serde_json::from_str(&seed_str).unwrap_or_else(|e| {
            eprintln!("Error parsing seed: {}", e);
            std::process::exit(1);
        })
    } else {
        Seed::default()
    };

    println!("Ping-pong Diffusion");
    println!("===================");
    println!("Grid: {}x{}", config.width, config.height);
    println!("Ordering: {:?}", config.ordering);
    println!("Rate: {}", DIFFUSION_RATE);
    println!("Frames: {}", frames);
    println!();

    let mut engine = Engine::with_config(config, CpuDevice::new()).unwrap_or_else(|e| {
        eprintln!("Error creating engine: {}", e);
        std::process::exit(1);
    });

    let initial = seed.generate(engine.size());
    let initial_stats = FrameStats::from_cells(&initial.cells);

    let heat = engine
        .add_variable("heat", diffusion_pass(), initial)
        .and_then(|heat| engine.set_dependencies(heat, &[heat]).map(|_| heat))
        .and_then(|heat| engine.init().map(|_| heat))
        .unwrap_or_else(|e| {
            eprintln!("Error initializing engine: {}", e);
            std::process::exit(1);
        });

    println!("Initial state:");
    print_stats(&initial_stats);
    println!();

    println!("Running engine...");
    let start = Instant::now();

    for i in 0..frames {
        if let Err(e) = engine.compute() {
            eprintln!("Error computing frame {}: {}", i + 1, e);
            std::process::exit(1);
        }

        // Print progress every 10%
        if (i + 1) % (frames / 10).max(1) == 0 {
            let stats = read_stats(&mut engine, heat);
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Frame {}/{}: total={:.6}, active={}, {:.1} frames/s",
                i + 1,
                frames,
                stats.total,
                stats.active_cells,
                (i + 1) as f32 / elapsed
            );
        }
    }

    let elapsed = start.elapsed();
    let final_stats = read_stats(&mut engine, heat);

    println!();
    println!("Final state:");
    print_stats(&final_stats);
    println!();
    if initial_stats.total.abs() > f32::EPSILON {
        println!(
            "Heat conservation: {:.4}%",
            (1.0 - (final_stats.total - initial_stats.total).abs() / initial_stats.total.abs())
                * 100.0
        );
    }
    println!(
        "Time: {:.2}s ({:.1} frames/s)",
        elapsed.as_secs_f32(),
        frames as f32 / elapsed.as_secs_f32()
    );
}

fn read_stats(
    engine: &mut Engine<CpuDevice>,
    heat: pingpong_compute::VariableHandle,
) -> FrameStats {
    let cells = engine.read_current(heat).unwrap_or_else(|e| {
        eprintln!("Error reading state: {}", e);
        std::process::exit(1);
    });
    FrameStats::from_cells(&cells)
}

fn print_stats(stats: &FrameStats) {
    println!("  Total heat: {:.6}", stats.total);
    println!("  Active cells: {}", stats.active_cells);
    println!(
        "  Value range: [{:.6}, {:.6}]",
        stats.min_value, stats.max_value
    );
}

fn print_example_config() {
    let config = EngineConfig::default();
    let seed = Seed {
        pattern: pingpong_compute::Pattern::GaussianBlob {
            center: (0.5, 0.5),
            radius: 0.1,
            amplitude: 1.0,
            component: 0,
        },
    };

    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap_or_default());
    println!();
    println!("Example seed (config.seed.json):");
    println!("{}", serde_json::to_string_pretty(&seed).unwrap_or_default());
}
