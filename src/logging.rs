use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Warnings and up by default; stdout holds the in-place status line.
fn default_directive(quiet: bool) -> &'static str {
    if quiet {
        "commit_watch=error"
    } else {
        "commit_watch=warn"
    }
}

/// Initialize logging on stderr.
///
/// When `quiet` is true, only error-level events are emitted.
/// `RUST_LOG` directives are honoured on top of the default.
pub fn init_logging(quiet: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(
            EnvFilter::from_default_env().add_directive(
                default_directive(quiet)
                    .parse()
                    .expect("Invalid log directive"),
            ),
        )
        .init();
}

#[cfg(test)]
mod logging_tests {
    use super::*;

    #[test]
    fn default_keeps_status_line_clean() {
        assert_eq!(default_directive(false), "commit_watch=warn");
        assert_eq!(default_directive(true), "commit_watch=error");
    }

    #[test]
    fn directives_parse() {
        for quiet in [false, true] {
            let directive = default_directive(quiet);
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok());
        }
    }
}
