pub mod executor;

pub use executor::{
    build_hls_args, ExecutionResult, ExecutorError, ExitOutcome, FfmpegExecutor, HlsOptions,
    TranscodeExecutor, TranscodeRequest,
};
