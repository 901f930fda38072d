use std::{io::IsTerminal, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::Targets, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Variable holding the log level
pub const LEVEL_ENV: &str = "LOG_LEVEL";

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Level named by `value`, or the build's default when unset or unknown
fn level(value: Option<&str>) -> LevelFilter {
    let Some(value) = value else {
        return default_level();
    };

    LevelFilter::from_str(value).unwrap_or_else(|_| {
        eprintln!("Ignoring {LEVEL_ENV}={value}, logging at {}", default_level());
        default_level()
    })
}

/// Install the global subscriber.
///
/// Events from `emissary*` targets at or above [`LEVEL_ENV`] go to stderr,
/// leaving stdout to command output. Colour is used only on a terminal.
///
/// Later calls leave the first subscriber in place.
pub fn init() {
    let level = level(std::env::var(LEVEL_ENV).ok().as_deref());
    let stderr = std::io::stderr();

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(stderr.is_terminal())
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(Targets::new().with_target("emissary", level)),
        )
        .try_init();
}
