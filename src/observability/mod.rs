//! Logging and tracing initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing stack for a host binary.
///
/// Log level filtering comes from `RUST_LOG` when set; otherwise debug
/// builds log this crate at `debug` and everything else at `info`, release
/// builds at `info`. Debug builds get pretty output, release builds JSON.
///
/// Calling this twice returns an error from the subscriber registry; hosts
/// that install their own subscriber can skip it entirely.
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("info,oauth2_mux=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    }

    Ok(())
}
