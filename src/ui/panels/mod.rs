mod log;
mod probes;
mod report;
mod stages;

pub use log::draw_log;
pub use probes::draw_probes;
pub use report::draw_report;
pub use stages::draw_stages;
