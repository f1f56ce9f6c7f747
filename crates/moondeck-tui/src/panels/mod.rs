//! Concrete panels. Deliberately minimal: panels are pluggable views that
//! receive typed state and emit user intents; their visual content is not
//! what this crate is about.

pub mod job_status;
pub mod main_menu;
pub mod printer_select;
pub mod splash;

pub use job_status::JobStatusPanel;
pub use main_menu::MainMenuPanel;
pub use printer_select::PrinterSelectPanel;
pub use splash::SplashPanel;
