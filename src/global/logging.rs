use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::global::config::{AppSettings, LogRotation};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. The returned guard must be kept
/// alive for the file writer to flush.
pub fn init(settings: &AppSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("movieo_sync={},info", settings.log_level).into());
    let logging = &settings.logging;

    let console = logging.log_to_console.then(|| {
        if logging.json {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        }
    });

    let (file, guard) = if logging.log_to_file {
        let rotation = match logging.log_rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        };
        let appender = RollingFileAppender::new(
            rotation,
            &logging.log_directory,
            &logging.log_file_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}
