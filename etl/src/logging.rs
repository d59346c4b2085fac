use common::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log sink for one pipeline run: every event goes to the console and to a
/// log file truncated at the start of the run. Events are captured only
/// while this value is alive and only on the thread that created it.
pub struct RunLogger {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLogger {
    pub fn init(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(Error::Logging)?;
        }
        let file = File::create(path).map_err(Error::Logging)?;

        let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry()
            .with(env)
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            );

        Ok(Self {
            path: path.to_path_buf(),
            _guard: tracing::subscriber::set_default(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
