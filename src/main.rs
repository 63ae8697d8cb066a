use fretsync::config::{CONFIG_PATH, Config};
use fretsync::core::audio::SimulatedAudio;
use fretsync::core::input::{PendingInputs, Replay};
use fretsync::game::bot;
use fretsync::game::chart::{ChartContext, ChartData};
use fretsync::game::gameplay::{Session, SessionStatus};
use fretsync::game::note::{Difficulty, Instrument};
use fretsync::game::stats::{PlayerStats, PlayerSummary};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

const FRAME_RATE: f64 = 240.0;
// Frames allowed past the song end before the run is abandoned.
const OVERRUN_SECONDS: f64 = 60.0;

struct Args {
    chart: PathBuf,
    replay: Option<PathBuf>,
    config: PathBuf,
    player_count: usize,
    tracks: Vec<(Instrument, Difficulty)>,
}

const USAGE: &str = "usage: fretsync <chart.json> [--replay replay.json] [--config path] [--player-count N] \
                     [--track Instrument:Difficulty]...";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut chart = None;
    let mut replay = None;
    let mut config = PathBuf::from(CONFIG_PATH);
    let mut player_count = 1;
    let mut tracks = Vec::new();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("{name} needs a value\n{USAGE}"));
        match arg.as_str() {
            "--replay" => replay = Some(PathBuf::from(value("--replay")?)),
            "--config" => config = PathBuf::from(value("--config")?),
            "--player-count" => {
                let raw = value("--player-count")?;
                player_count = raw.parse().ok().filter(|&n| n > 0).ok_or(format!("invalid player count '{raw}'"))?;
            }
            "--track" => {
                let raw = value("--track")?;
                let (inst, diff) = raw.split_once(':').ok_or(format!("invalid track '{raw}'"))?;
                let inst: Instrument = inst.parse().map_err(|()| format!("unknown instrument '{inst}'"))?;
                let diff: Difficulty = diff.parse().map_err(|()| format!("unknown difficulty '{diff}'"))?;
                tracks.push((inst, diff));
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if chart.is_none() && !other.starts_with("--") => chart = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument '{other}'\n{USAGE}")),
        }
    }
    let chart = chart.ok_or_else(|| USAGE.to_string())?;
    Ok(Args { chart, replay, config, player_count, tracks })
}

#[derive(Serialize)]
struct RunSummary {
    chart: String,
    song_end_time: f64,
    frames: u64,
    players: Vec<PlayerSummary>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder().filter_level(log::LevelFilter::Trace).try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::load_or_create(&args.config)?;
    log::set_max_level(config.log_level.as_level_filter());
    let settings = config.engine_settings();

    let chart = ChartData::load_json(&args.chart)?;
    let ctx = Arc::new(ChartContext::build(&chart, settings.min_sustain_ticks)?);
    if ctx.tracks.is_empty() {
        return Err(format!("chart '{}' has no tracks", args.chart.display()).into());
    }
    let mut track_indices = Vec::with_capacity(args.player_count);
    for player in 0..args.player_count {
        let index = match args.tracks.get(player).or(args.tracks.last()) {
            Some(&(inst, diff)) => ctx.track_index(inst, diff)?,
            None => player % ctx.tracks.len(),
        };
        track_indices.push(index);
    }

    let mut pending: Vec<PendingInputs> = match &args.replay {
        Some(path) => {
            let mut replay = Replay::load(path)?;
            if replay.players.len() < args.player_count {
                warn!("Replay has {} player(s), {} requested; the rest play nothing.", replay.players.len(), args.player_count);
            }
            replay.players.resize_with(args.player_count, Vec::new);
            let instruments: Vec<Instrument> = track_indices.iter().map(|&t| ctx.tracks[t].instrument).collect();
            replay.check_instruments(&instruments)?;
            replay.players.into_iter().map(PendingInputs::new).collect()
        }
        None => track_indices
            .iter()
            .map(|&t| PendingInputs::new(bot::perfect_inputs(&ctx, t, settings.hopo_frequency_ticks, true)))
            .collect(),
    };

    let mut session = Session::new(Arc::clone(&ctx), settings, SimulatedAudio::default(), &track_indices);
    let mut stats = vec![PlayerStats::default(); track_indices.len()];
    let mut batches = vec![Vec::new(); track_indices.len()];
    let dt = 1.0 / FRAME_RATE;
    let limit = session.song_end_time() + OVERRUN_SECONDS;
    let mut frames: u64 = 0;
    session.start(0.0);
    loop {
        frames += 1;
        let now = frames as f64 * dt;
        session.audio_mut().advance(dt);
        let horizon = session.input_time(now);
        for (queue, batch) in pending.iter_mut().zip(batches.iter_mut()) {
            queue.drain_until(horizon, batch);
        }
        let status = session.update(now, &mut batches);
        for (player, tally) in session.players().iter().zip(stats.iter_mut()) {
            player.events().iter().for_each(|e| tally.record(e));
        }
        if status == SessionStatus::Finished {
            break;
        }
        if session.song_time() > limit {
            warn!("Song did not finish by {limit:.2}s; stopping.");
            break;
        }
    }
    info!("Finished '{}' after {frames} frames.", ctx.name);

    let summary = RunSummary {
        chart: ctx.name.clone(),
        song_end_time: session.song_end_time(),
        frames,
        players: stats.iter().enumerate().map(|(i, s)| s.summary(i)).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
