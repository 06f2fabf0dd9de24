//! `tracing` subscriber setup shared by both binaries.
//!
//! `RUST_LOG` wins when set; otherwise the filter is derived from the
//! run's [`Verbosity`].

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::options::Verbosity;

const CRATE_TARGETS: [&str; 4] = ["psass", "psass_core", "psass_worker", "psass_dispatcher"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(verbosity: Verbosity) -> String {
    let level = match verbosity {
        Verbosity::None => "warn",
        Verbosity::Basic | Verbosity::Detail => "info",
        Verbosity::Debug => "debug",
    };
    CRATE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber, writing formatted events to `writer`.
///
/// Workers must pass `std::io::stderr` since their stdout carries the
/// protocol. Calling this twice is harmless; the second call is ignored.
pub fn init<W>(verbosity: Verbosity, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_verbosity() {
        assert!(default_directives(Verbosity::None).starts_with("psass=warn"));
        assert!(default_directives(Verbosity::Basic).contains("psass_worker=info"));
        assert!(default_directives(Verbosity::Debug).contains("psass_dispatcher=debug"));
    }
}
