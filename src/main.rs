// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn, Level};

use beatstage::audio::print_inputs;
use beatstage::config::{validate_config, ConfigWatcher};
use beatstage::engine::{ClockEngine, Stage};
use beatstage::events::{Event, EventKind};
use beatstage::midi::{print_sources, ClockSource, MidirBackend};
use beatstage::render::HeadlessPipeline;
use beatstage::timing::TempoSettings;

fn print_usage() {
    println!("BEATSTAGE - MIDI clock and audio reactive visual stage");
    println!();
    println!("Usage: beatstage [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-sources            List available MIDI sources (inputs)");
    println!("  --list-audio              List available audio inputs");
    println!("  --monitor <DEVICE> [BPM]  Print beats and bars from a MIDI clock source");
    println!("  --validate <CONFIG>       Check a stage configuration file");
    println!("  --run <CONFIG>            Run the stage, reloading CONFIG on change");
    println!("  --verbose                 Enable debug logging");
    println!("  --help                    Show this help message");
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn monitor_clock(device: &str, bpm: f64) -> Result<()> {
    let (mut source, mut events) = ClockSource::new(Arc::new(MidirBackend::new()));
    let mut engine = ClockEngine::new(TempoSettings::new(bpm, 4), Default::default());

    for kind in [EventKind::Beat, EventKind::Bar, EventKind::Start, EventKind::Stop] {
        engine.on(kind, |event| match event {
            Event::Beat(beat) => println!("Beat {} ({:.3}s)", beat.beat, beat.beat_length),
            Event::Bar(bar) => println!("Bar {} ({:.3}s)", bar.bar, bar.bar_length),
            other => println!("{}", other.kind()),
        });
    }
    engine.on(EventKind::Message, |event| println!("{:?}", event));

    println!("Waiting for MIDI clock from \"{}\" (press Ctrl+C to stop)...", device);
    source.configure(device);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => {
                    engine.process(event);
                }
                None => break,
            },
        }
    }

    source.teardown();
    println!();
    println!("Monitor complete!");
    Ok(())
}

async fn run_stage(path: &str) -> Result<()> {
    let config = validate_config(path)?;
    let mut stage = Stage::new(
        config,
        Arc::new(MidirBackend::new()),
        Box::new(HeadlessPipeline::new()),
    );

    stage.setup().await?;
    stage.start();
    stage.start_audio();

    let watcher = match ConfigWatcher::new(path, None) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Hot reload disabled: {:#}", e);
            None
        }
    };

    info!("Stage running (press Ctrl+C to stop)");
    stage.run_until(shutdown_signal(), watcher.as_ref()).await;

    stage.teardown();
    Ok(())
}

fn required_arg<'a>(args: &'a [String], option: &str, hint: &str) -> &'a str {
    match args.get(2) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires {}", option, hint);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().filter(|a| a != "--verbose").collect();
    let verbose = env::args().any(|a| a == "--verbose");

    if args.len() < 2 {
        println!("BEATSTAGE - MIDI clock and audio reactive visual stage");
        println!("Run with --help for usage information");
        return Ok(());
    }

    init_logging(verbose);

    match args[1].as_str() {
        "--list-sources" => {
            print_sources();
        }
        "--list-audio" => {
            print_inputs();
        }
        "--monitor" => {
            let device = required_arg(&args, "--monitor", "a device name");
            let bpm: f64 = match args.get(3) {
                Some(value) => value
                    .parse()
                    .map_err(|_| anyhow!("Invalid BPM: {}", value))?,
                None => 120.0,
            };
            monitor_clock(device, bpm).await?;
        }
        "--validate" => {
            let path = required_arg(&args, "--validate", "a config file");
            let config = validate_config(path)?;
            println!(
                "{} is valid: {} scene group(s), {} BPM, {} beats per bar",
                path,
                config.scenes.len(),
                config.midi.bpm,
                config.midi.beats_per_bar
            );
        }
        "--run" => {
            let path = required_arg(&args, "--run", "a config file");
            run_stage(path).await?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
