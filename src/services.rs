pub mod cli_app;
pub mod gui_app;
