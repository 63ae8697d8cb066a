pub mod bot;
pub mod chart;
pub mod gameplay;
pub mod judgment;
pub mod note;
pub mod overdrive;
pub mod phrase;
pub mod playable;
pub mod player;
pub mod queue;
pub mod solo;
pub mod stats;
pub mod timing;
pub mod timing_windows;
pub mod window;
