pub mod args;
pub mod options;
pub mod quality;
pub mod render_result;
pub mod status;
