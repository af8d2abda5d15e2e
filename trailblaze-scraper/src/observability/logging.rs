use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console plus rotating JSON file output. `debug` widens
/// the default directive so per-row parser logging shows up.
pub fn init_logging(debug: bool) {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "scraper.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let directive = if debug {
        "trailblaze_scraper=debug,trailblaze_core=debug"
    } else {
        "trailblaze_scraper=info,trailblaze_core=info"
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(directive.split(',').next().unwrap().parse().unwrap())
                .add_directive(directive.split(',').nth(1).unwrap().parse().unwrap()),
        )
        .with(file_layer)
        .with(console_layer)
        .init();

    // Keep the guard alive for the life of the process so the file
    // writer flushes on exit.
    std::mem::forget(guard);
}
