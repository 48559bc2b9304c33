pub mod ffmpeg;
pub mod queue;
