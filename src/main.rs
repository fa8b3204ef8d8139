//! sfzkit - sampler envelope and curve engine

use anyhow::{bail, Context, Result};
use clap::Parser;
use sfzkit::config::{self, SfzkitConfig};
use sfzkit::engine::{Engine, Recorder};
use sfzkit::instrument::{Instrument, Tuning};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            let cfg = match config::load_config(&config_path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            };

            println!("Configuration is valid!");
            println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
            println!("  Block size: {}", cfg.audio.block_size);
            println!("  Voices: {}", cfg.engine.voices);
            println!("  Preload size: {}", cfg.engine.preload_size);
            println!("  Oversampling: x{}", cfg.engine.oversampling);
            println!("  Queue capacity: {}", cfg.engine.queue_capacity);
            println!("  Reload check: every {} ms", cfg.engine.reload_check_interval_ms);

            let mut ok = true;
            if let Some(path) = &cfg.instrument {
                ok &= check_instrument(path);
            }
            if let Some(path) = &cfg.tuning {
                match Tuning::from_file(path) {
                    Ok(tuning) => println!(
                        "  Tuning: {} ({} degrees, period {:.2} cents)",
                        tuning.description(),
                        tuning.len(),
                        tuning.period()
                    ),
                    Err(e) => {
                        println!("  Tuning {:?} failed to load: {}", path, e);
                        ok = false;
                    }
                }
            }

            if !ok {
                std::process::exit(1);
            }
        }

        Commands::Curves { instrument, points } => {
            let instrument = Instrument::from_file(&instrument)
                .with_context(|| format!("failed to load instrument {:?}", instrument))?;
            let points = points.max(2);

            for (index, curve) in instrument.curves().iter() {
                let values: Vec<String> = (0..points)
                    .map(|i| {
                        let x = i as f32 / (points - 1) as f32;
                        format!("{:+.3}", curve.eval_normalized(x))
                    })
                    .collect();
                println!("curve {:>3}: {}", index, values.join(" "));
            }
            for (position, error) in instrument.rejected_curves() {
                println!("rejected curve #{}: {}", position, error);
            }
        }

        Commands::Render {
            config: config_path,
            output,
            duration,
            note,
            velocity,
            hold,
        } => {
            let cfg = config::load_config(&config_path)?;
            if cfg.instrument.is_none() {
                bail!("No instrument configured in {:?}", config_path);
            }
            render(&cfg, &output, duration, note, velocity, hold)?;
        }

        Commands::Watch {
            config: config_path,
            duration,
        } => {
            let cfg = config::load_config(&config_path)?;
            watch(&cfg, duration)?;
        }

        Commands::Init => {
            let files = [
                ("sfzkit.yaml", include_str!("../sfzkit.example.yaml")),
                ("piano.yaml", include_str!("../demos/piano.yaml")),
            ];

            for (path, contents) in files {
                if Path::new(path).exists() {
                    println!("{} already exists. Not overwriting.", path);
                } else {
                    std::fs::write(path, contents)?;
                    println!("Created {}.", path);
                }
            }
        }
    }

    Ok(())
}

fn check_instrument(path: &Path) -> bool {
    match Instrument::from_file(path) {
        Ok(instrument) => {
            println!("  Instrument: {:?}", path);
            println!("    Regions: {}", instrument.regions().len());
            println!("    Curves: {}", instrument.curves().num_curves());
            for diagnostic in instrument.diagnostics() {
                println!("    warning: {}", diagnostic);
            }
            for (position, error) in instrument.rejected_curves() {
                println!("    warning: curve #{}: {}", position, error);
            }
            true
        }
        Err(e) => {
            println!("  Instrument {:?} failed to load: {}", path, e);
            false
        }
    }
}

fn render(cfg: &SfzkitConfig, output: &Path, duration: f32, note: u8, velocity: u8, hold: f32) -> Result<()> {
    let (mut engine, mut worker) = Engine::new(cfg)?;

    // Offline: run the worker inline, then an empty block applies its results
    worker.run_pending();
    engine.render_block(&mut []);
    println!(
        "Rendering note {} (velocity {}) for {:.2}s to {:?}...",
        note, velocity, duration, output
    );

    let sample_rate = cfg.audio.sample_rate;
    let total = (duration.max(0.0) * sample_rate as f32) as usize;
    let release_at = (hold.max(0.0) * sample_rate as f32) as usize;
    let mut recorder = Recorder::new(output, sample_rate)?;
    let mut block = vec![0.0f32; cfg.audio.block_size];

    engine.note_on(0, note, velocity);
    let mut position = 0;
    while position < total {
        let len = block.len().min(total - position);
        if (position..position + len).contains(&release_at) {
            engine.note_off(release_at - position, note);
        }
        engine.render_block(&mut block[..len]);
        recorder.write_block(&block[..len])?;
        position += len;
    }

    println!(
        "Recorded {:.2}s, peak {:.3}, {} voices still active",
        recorder.duration_secs(),
        recorder.peak(),
        engine.active_voices()
    );
    recorder.finalize()?;
    Ok(())
}

fn watch(cfg: &SfzkitConfig, duration: Option<f32>) -> Result<()> {
    let (mut engine, worker) = Engine::new(cfg)?;
    let mut worker_thread = worker.spawn().context("failed to start worker thread")?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let block_size = cfg.audio.block_size;
    let block_time = Duration::from_secs_f64(block_size as f64 / cfg.audio.sample_rate as f64);
    let mut block = vec![0.0f32; block_size];
    let started = Instant::now();
    let mut rendered = 0usize;
    let sample_rate = cfg.audio.sample_rate as usize;

    println!("Watching for changes (Ctrl-C to stop)...");
    while running.load(Ordering::SeqCst) {
        if let Some(limit) = duration {
            if started.elapsed().as_secs_f32() >= limit {
                break;
            }
        }

        // A short note every second keeps envelopes running
        let second = rendered % sample_rate;
        if second < block_size {
            engine.note_on(0, 60, 100);
        } else if (sample_rate / 2..sample_rate / 2 + block_size).contains(&second) {
            engine.note_off(0, 60);
        }

        engine.render_block(&mut block);
        rendered += block_size;

        // Pace the simulated audio thread against the wall clock
        let due = block_time * (rendered / block_size) as u32;
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            std::thread::sleep(wait);
        }
    }

    worker_thread.stop();
    let status = engine.status();
    println!(
        "Stopped after {} blocks; {} regions loaded, {} dropped requests",
        status.blocks_rendered(),
        status.num_regions(),
        status.dropped_requests()
    );
    Ok(())
}
