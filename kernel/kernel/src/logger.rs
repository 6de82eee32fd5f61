//! Early logging bring-up.

use kernel_qemu::QemuLogger;
use log::LevelFilter;

static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);

/// Install the QEMU debug-port logger as the `log` facade's sink.
///
/// Called once during early bring-up, before the memory manager comes
/// online so its bootstrap traces land somewhere. Harmless if another
/// logger won the race (the second install is simply ignored).
pub fn init_logging() {
    let _ = LOGGER.init();
}
