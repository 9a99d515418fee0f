use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the caller provides one.
pub const DEFAULT_DIRECTIVE: &str = "info,lanty=debug";

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `directive`, which wins over [`DEFAULT_DIRECTIVE`].
/// Returns `false` if a subscriber was already installed.
pub fn init(directive: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or(DEFAULT_DIRECTIVE)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init(Some("warn"));
        assert!(!init(None));
    }
}
