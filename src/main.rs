//! Keystone launcher
//!
//! Main entry point: installs logging, runs the launch chain and exits with
//! its code.

use ks_integration::Launcher;

fn main() {
    ks_core::logging::init();

    tracing::info!("Starting keystone {}", env!("CARGO_PKG_VERSION"));

    let code = Launcher::new().run();
    std::process::exit(code)
}
