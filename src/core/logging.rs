//! 显式注入的日志句柄
//!
//! 组件不直接调用全局 `log::logger()`，而是持有一个 `PipelineLogger`，
//! 由调用方决定日志落到哪里。默认转发到已安装的全局 logger。

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
enum Sink {
    Global,
    Custom(Arc<dyn Log>),
}

#[derive(Clone)]
pub struct PipelineLogger {
    sink: Sink,
    target: &'static str,
}

impl PipelineLogger {
    /// 转发到 `log::logger()`（未安装 logger 时为 no-op）
    pub fn global() -> Self {
        Self {
            sink: Sink::Global,
            target: "plate_pipeline",
        }
    }

    pub fn with_sink(sink: Arc<dyn Log>) -> Self {
        Self {
            sink: Sink::Custom(sink),
            target: "plate_pipeline",
        }
    }

    /// 同一个 sink，换一个 target（每个组件一个）
    pub fn scoped(&self, target: &'static str) -> Self {
        Self {
            sink: self.sink.clone(),
            target,
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let sink: &dyn Log = match &self.sink {
            Sink::Global => log::logger(),
            Sink::Custom(sink) => sink.as_ref(),
        };

        let metadata = Metadata::builder().level(level).target(self.target).build();
        if !sink.enabled(&metadata) {
            return;
        }

        sink.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(self.target)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }
}

impl Default for PipelineLogger {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for PipelineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match self.sink {
            Sink::Global => "global",
            Sink::Custom(_) => "custom",
        };
        f.debug_struct("PipelineLogger")
            .field("sink", &sink)
            .field("target", &self.target)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::capture::CaptureLog;
    use super::*;

    #[test]
    fn test_custom_sink_receives_messages() {
        let sink = Arc::new(CaptureLog::default());
        let logger = PipelineLogger::with_sink(sink.clone()).scoped("tracker");

        logger.info(format_args!("track_id={} spawned", 7));
        logger.debug(format_args!("cycle done"));

        assert_eq!(sink.messages(), vec!["track_id=7 spawned", "cycle done"]);
        assert!(sink.targets().iter().all(|t| t == "tracker"));
    }

    #[test]
    fn test_disabled_level_is_skipped() {
        let sink = Arc::new(CaptureLog::default());
        let logger = PipelineLogger::with_sink(sink.clone());

        logger.log(Level::Trace, format_args!("too verbose"));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_global_logger_without_install_is_noop() {
        let logger = PipelineLogger::global();
        logger.warn(format_args!("nobody listens"));
        assert_eq!(logger.target(), "plate_pipeline");
    }
}
