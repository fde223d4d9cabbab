use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the global subscriber. Logs go to stderr so stdout stays the
/// command's report. Safe to call more than once.
pub(crate) fn init(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
