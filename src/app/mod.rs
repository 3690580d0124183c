mod state;

pub use state::{App, Panel, ScreenMode, StageStatus};
