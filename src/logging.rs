use tracing_subscriber::EnvFilter;

/// Installs the stderr logger. `RUST_LOG` takes precedence over `filter`.
///
/// Returns false if a subscriber was already installed, e.g. by the host or
/// a previous session.
pub fn init(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tolerates_existing_subscriber() {
        init("debug");
        assert!(!init("not a [valid filter"));
    }
}
