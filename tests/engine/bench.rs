use fretsync::core::input::PendingInputs;
use fretsync::game::bot;
use fretsync::game::chart::{ChartContext, ChartData, TrackData};
use fretsync::game::gameplay::EngineSettings;
use fretsync::game::note::{ChartNote, Difficulty, FretNote, Instrument, Lane, NoteData, NoteFlags};
use fretsync::game::phrase::{Phrase, PhraseKind};
use fretsync::game::player::Player;
use fretsync::game::timing::{TempoChange, TimeSignature};
use smallvec::smallvec;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

const NOTES: u64 = 20_000;
const FRAME_RATE: f64 = 1_000.0;

fn long_chart() -> ChartData {
    let resolution = 480;
    let notes = (0..NOTES)
        .map(|i| {
            let mut lanes = smallvec![Lane::OFF; Instrument::FiveFret.lane_count()];
            let length = if i % 7 == 0 { 360 } else { 1 };
            lanes[1 + (i as usize % 5)] = Lane { length };
            if i % 11 == 0 {
                lanes[1 + ((i as usize + 2) % 5)] = Lane { length };
            }
            ChartNote { tick: 480 + i * 120, data: NoteData::Fret(FretNote { lanes, flags: NoteFlags::empty() }) }
        })
        .collect();
    let phrases = (0..NOTES / 64)
        .map(|p| {
            let start = 480 + p * 64 * 120;
            let kind = if p % 5 == 4 { PhraseKind::Solo } else { PhraseKind::Overdrive };
            Phrase { kind, start, end: start + 16 * 120 }
        })
        .collect();
    ChartData {
        name: "engine_bench".to_string(),
        resolution,
        tempos: vec![TempoChange { tick: 0, bpm: 150.0 }, TempoChange { tick: 480 * 512, bpm: 180.0 }],
        time_signatures: vec![TimeSignature::default()],
        beats: Vec::new(),
        tracks: vec![TrackData { instrument: Instrument::FiveFret, difficulty: Difficulty::Expert, notes, phrases }],
    }
}

fn main() {
    let chart = long_chart();
    let settings = EngineSettings::default();

    let started = Instant::now();
    let ctx = match ChartContext::build(&chart, settings.min_sustain_ticks) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("engine_bench: chart rejected: {e}");
            std::process::exit(1);
        }
    };
    let build_ms = started.elapsed().as_secs_f64() * 1000.0;

    let inputs = bot::perfect_inputs(&ctx, 0, settings.hopo_frequency_ticks, true);
    let input_count = inputs.len();
    let mut pending = PendingInputs::new(inputs);
    let mut player = Player::new(0, Arc::clone(&ctx), 0, &settings);
    let mut batch = Vec::new();
    let end = ctx.last_end_seconds() + 1.0;
    let dt = 1.0 / FRAME_RATE;

    let started = Instant::now();
    let mut frames: u64 = 0;
    let mut events: u64 = 0;
    let mut time = 0.0;
    while time < end {
        frames += 1;
        time = frames as f64 * dt;
        pending.drain_until(time, &mut batch);
        events += black_box(player.update(time, &mut batch)).len() as u64;
    }
    let elapsed = started.elapsed().as_secs_f64();

    println!("engine_bench: notes={NOTES} inputs={input_count} build={build_ms:.2}ms");
    println!(
        "engine_bench: frames={frames} events={events} elapsed={:.3}s step={:.3}us throughput={:.0} frames/s",
        elapsed,
        elapsed * 1e6 / frames as f64,
        frames as f64 / elapsed
    );
    println!("engine_bench: final combo={} overdrive={:.1}%", player.combo(), player.overdrive().fraction() * 100.0);
}
