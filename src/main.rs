// Headless runner: simulates an ensemble session and streams onset events
// to a CSV writer worker.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use tracing::{info, warn};

use adaptive_metronome::cli::Args;
use adaptive_metronome::config::ConfigurationStore;
use adaptive_metronome::core::timebase::{Tick, Timebase};
use adaptive_metronome::ensemble::events::OnsetEvent;
use adaptive_metronome::ensemble::intro::IntroSequence;
use adaptive_metronome::ensemble::scheduler::EnsembleScheduler;

struct EventRow {
    event: OnsetEvent,
    gain: f32,
    tick: Tick,
}

fn write_events(rx: Receiver<EventRow>, out: Option<String>) -> std::io::Result<u64> {
    let mut sink: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    writeln!(
        sink,
        "player_id,beat,scheduled_time,actual_time,asynchrony,gain,tick"
    )?;
    let mut rows = 0u64;
    for row in rx {
        let ev = row.event;
        writeln!(
            sink,
            "{},{},{:.6},{:.6},{:.6},{:.4},{}",
            ev.player_id,
            ev.beat,
            ev.scheduled_time,
            ev.actual_time,
            ev.asynchrony,
            row.gain,
            row.tick
        )?;
        rows += 1;
    }
    sink.flush()?;
    Ok(rows)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let store = Arc::new(ConfigurationStore::load_or_default(&args.config));
    if let Some(count) = args.intro_tones {
        let mut global = store.global();
        global.num_intro_tones = count;
        store.set_global(global)?;
    }
    let global = store.global();
    info!(
        "session: {} players, base period {:.3}s, {} intro tones",
        store.player_count(),
        global.base_period,
        global.num_intro_tones
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_for_ctrlc = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_for_ctrlc.store(true, Ordering::SeqCst);
    })?;

    let tb = Timebase {
        fs: args.sample_rate,
    };

    let (tx, rx) = bounded::<EventRow>(256);
    let out = args.out.clone();
    let writer = std::thread::spawn(move || write_events(rx, out));

    // Count-in, then the reference pulse starts one period after the last
    // tone.
    let mut intro = IntroSequence::new(global.num_intro_tones, 0.0, global.base_period);
    let first_beat_time = intro
        .end_time()
        .map(|t| t + global.base_period)
        .unwrap_or(0.0);
    for tone in intro.dispatch_until(first_beat_time) {
        info!("intro tone {} at {:.3}s", tone.index + 1, tone.time);
    }

    let mut scheduler = EnsembleScheduler::with_all_players(store.clone(), args.seed)?;
    for beat in 0..args.beats {
        if stop_flag.load(Ordering::SeqCst) {
            warn!("interrupted at beat {beat}");
            break;
        }
        let reference = first_beat_time + beat as f64 * global.base_period;
        let events = scheduler.advance(reference)?;
        for event in events {
            let gain = store.gain_for(event.player_id).unwrap_or(0.0);
            let tick = tb.sec_to_tick(event.actual_time);
            tx.send(EventRow { event, gain, tick })?;
        }
    }
    let beats_run = scheduler.beat();
    scheduler.stop();

    drop(tx);
    match writer.join() {
        Ok(Ok(rows)) => info!("wrote {rows} onset events over {beats_run} beats"),
        Ok(Err(err)) => return Err(Box::new(err)),
        Err(_) => return Err("event writer panicked".into()),
    }
    Ok(())
}
