use crate::qemu_trace;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A [`log::Log`] backend that routes messages to the QEMU debug port.
///
/// Declared as a `static` by the kernel and installed once during early
/// bring-up:
///
/// ```rust,no_run
/// use kernel_qemu::QemuLogger;
/// use log::{LevelFilter, info};
///
/// static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
///
/// LOGGER.init().expect("logger initialization");
/// info!("memory manager online");
/// ```
pub struct QemuLogger {
    max_level: LevelFilter,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install this logger as the `log` facade's sink.
    ///
    /// # Errors
    /// Fails if another logger was installed first.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n", formatted straight into
        // the port sink without allocating.
        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // no-op for the qemu debug port
    }
}
