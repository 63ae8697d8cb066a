use crate::game::note::{Instrument, LaneMask, PRO_STRINGS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    Keyboard,
    Gamepad,
    Bot,
    Replay,
}

/// Raw controller payload. Fret lanes use the chart's lane numbering, so
/// fret 1 is the first fretted lane and lane 0 (open) is never pressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputAction {
    Fret { lane: u8, pressed: bool },
    Strum,
    Pad { lane: u8 },
    Key { lane: u8, pressed: bool },
    /// Fret 0 is an open string.
    ProFret { string: u8, fret: u8 },
    Overdrive,
}

impl InputAction {
    /// Whether a controller for `instrument` can produce this action.
    pub fn fits(self, instrument: Instrument) -> bool {
        let lanes = instrument.lane_count();
        match (self, instrument) {
            (Self::Overdrive, _) => true,
            (Self::Strum, Instrument::FiveFret | Instrument::SixFret | Instrument::ProGuitar) => true,
            (Self::Fret { lane, .. }, Instrument::FiveFret | Instrument::SixFret) => lane > 0 && usize::from(lane) < lanes,
            (Self::ProFret { string, .. }, Instrument::ProGuitar) => usize::from(string) < PRO_STRINGS,
            (Self::Pad { lane }, Instrument::Drums) | (Self::Key { lane, .. }, Instrument::Keys) => {
                usize::from(lane) < lanes
            }
            _ => false,
        }
    }
}

/// One time-stamped input. `time` is in song seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub time: f64,
    pub action: InputAction,
    #[serde(default = "default_source")]
    pub source: InputSource,
}

const fn default_source() -> InputSource {
    InputSource::Replay
}

impl InputEvent {
    pub const fn new(time: f64, action: InputAction, source: InputSource) -> Self {
        Self { time, action, source }
    }
}

/// Rolling controller state a player judges sustains against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub frets: LaneMask,
    pub keys: LaneMask,
    pub strings: [u8; PRO_STRINGS],
}

impl InputState {
    /// Applies the held-state part of `action`.
    pub fn apply(&mut self, action: InputAction) {
        match action {
            InputAction::Fret { lane, pressed } => {
                let lane = usize::from(lane);
                self.frets = if pressed { self.frets.with(lane) } else { self.frets.without(lane) };
            }
            InputAction::Key { lane, pressed } => {
                let lane = usize::from(lane);
                self.keys = if pressed { self.keys.with(lane) } else { self.keys.without(lane) };
            }
            InputAction::ProFret { string, fret } => self.strings[usize::from(string)] = fret,
            InputAction::Strum | InputAction::Pad { .. } | InputAction::Overdrive => {}
        }
    }
}

/// Events waiting for the frame that reaches their timestamp.
#[derive(Clone, Debug, Default)]
pub struct PendingInputs {
    events: VecDeque<InputEvent>,
}

impl PendingInputs {
    /// `events` must be ordered by time.
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self { events: events.into() }
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// Moves every event at or before `horizon` into `batch`.
    pub fn drain_until(&mut self, horizon: f64, batch: &mut Vec<InputEvent>) {
        while let Some(ev) = self.events.front() {
            if ev.time > horizon {
                break;
            }
            if let Some(ev) = self.events.pop_front() {
                batch.push(ev);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read replay '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed replay: {0}")]
    Json(#[from] serde_json::Error),
    #[error("replay events for player {player} are not ordered at {time}s")]
    Order { player: usize, time: f64 },
    #[error("replay player {player} sends {action:?} at {time}s, which a {instrument} track cannot take")]
    Lane { player: usize, time: f64, action: InputAction, instrument: &'static str },
}

/// Recorded inputs, one ordered list per player.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Replay {
    pub players: Vec<Vec<InputEvent>>,
}

impl Replay {
    pub fn from_json_str(s: &str) -> Result<Self, ReplayError> {
        let replay: Replay = serde_json::from_str(s)?;
        for (player, events) in replay.players.iter().enumerate() {
            if let Some(pair) = events.windows(2).find(|w| w[1].time < w[0].time) {
                return Err(ReplayError::Order { player, time: pair[1].time });
            }
        }
        Ok(replay)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ReplayError::Io { path: path.display().to_string(), source })?;
        Self::from_json_str(&text)
    }

    /// Rejects actions player `i`'s controller could not produce on
    /// `instruments[i]`. Players without an instrument are not checked.
    pub fn check_instruments(&self, instruments: &[Instrument]) -> Result<(), ReplayError> {
        for (player, (events, &instrument)) in self.players.iter().zip(instruments).enumerate() {
            if let Some(ev) = events.iter().find(|ev| !ev.action.fits(instrument)) {
                return Err(ReplayError::Lane { player, time: ev.time, action: ev.action, instrument: instrument.as_str() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tracks_held_frets_and_strings() {
        let mut state = InputState::default();
        state.apply(InputAction::Fret { lane: 2, pressed: true });
        state.apply(InputAction::Fret { lane: 4, pressed: true });
        state.apply(InputAction::Fret { lane: 2, pressed: false });
        state.apply(InputAction::ProFret { string: 3, fret: 12 });
        state.apply(InputAction::Strum);
        assert_eq!(state.frets, LaneMask::EMPTY.with(4));
        assert_eq!(state.strings[3], 12);
    }

    #[test]
    fn pending_inputs_drain_by_horizon() {
        let mut pending = PendingInputs::new(vec![
            InputEvent::new(0.1, InputAction::Strum, InputSource::Bot),
            InputEvent::new(0.2, InputAction::Strum, InputSource::Bot),
            InputEvent::new(0.3, InputAction::Strum, InputSource::Bot),
        ]);
        let mut batch = Vec::new();
        pending.drain_until(0.2, &mut batch);
        assert_eq!(batch.len(), 2);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn replay_rejects_unordered_events() {
        let json = r#"{ "players": [[
            { "time": 0.5, "action": "Strum" },
            { "time": 0.4, "action": { "Pad": { "lane": 1 } } }
        ]] }"#;
        assert!(matches!(Replay::from_json_str(json), Err(ReplayError::Order { player: 0, .. })));
    }

    #[test]
    fn replay_parses_actions() {
        let json = r#"{ "players": [[
            { "time": 0.5, "action": { "Fret": { "lane": 1, "pressed": true } }, "source": "Keyboard" },
            { "time": 0.5, "action": "Strum" }
        ]] }"#;
        let replay = Replay::from_json_str(json).unwrap();
        assert_eq!(replay.players[0][0].action, InputAction::Fret { lane: 1, pressed: true });
        assert_eq!(replay.players[0][1].source, InputSource::Replay);
    }

    #[test]
    fn replay_rejects_lanes_the_track_does_not_have() {
        let json = r#"{ "players": [
            [{ "time": 0.5, "action": { "Fret": { "lane": 5, "pressed": true } } }],
            [{ "time": 0.7, "action": { "Fret": { "lane": 9, "pressed": true } } }]
        ] }"#;
        let replay = Replay::from_json_str(json).unwrap();
        assert!(replay.check_instruments(&[Instrument::FiveFret]).is_ok(), "only player 0 is checked");
        assert!(matches!(
            replay.check_instruments(&[Instrument::FiveFret, Instrument::FiveFret]),
            Err(ReplayError::Lane { player: 1, instrument: "FiveFret", .. })
        ));
        assert!(matches!(
            replay.check_instruments(&[Instrument::Drums]),
            Err(ReplayError::Lane { player: 0, .. })
        ));
    }

    #[test]
    fn actions_fit_their_controllers() {
        assert!(InputAction::Strum.fits(Instrument::ProGuitar));
        assert!(!InputAction::Strum.fits(Instrument::Drums));
        assert!(!InputAction::Fret { lane: 0, pressed: true }.fits(Instrument::FiveFret), "open is never pressed");
        assert!(InputAction::Fret { lane: 6, pressed: true }.fits(Instrument::SixFret));
        assert!(!InputAction::ProFret { string: PRO_STRINGS as u8, fret: 0 }.fits(Instrument::ProGuitar));
        assert!(InputAction::Overdrive.fits(Instrument::Keys));
    }
}
