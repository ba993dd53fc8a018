use std::io::IsTerminal;

use ndbox::{BoxResult, DeviceKind, NdBox, backend};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn main() -> BoxResult<()> {
    init_tracing();
    ndbox::config::install(ndbox::BackendConfig::from_env()?)?;

    for backend in backend::backends() {
        println!(
            "{:<7} supported={:<5} devices={}",
            backend.kind(),
            backend.is_supported(),
            backend.device_count()
        );

        for index in 0..backend.device_count() {
            let info = backend.device_info(index)?;
            println!("  [{}] {} ({})", info.device, info.name, info.vendor);
            println!("      version: {}", info.version);
            println!("      memory:  {} MiB", info.global_memory / (1024 * 1024));
            for (key, value) in &info.properties {
                println!("      {}: {}", key, value);
            }
        }
    }

    // Smoke test: a small box on every usable device, checked through a host copy.
    let source = NdBox::from_slice(&[2, 3], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    for backend in backend::backends().filter(|b| b.kind() != DeviceKind::Cpu) {
        for index in 0..backend.device_count() {
            let device = ndbox::Device::new(backend.kind(), index);
            let remote = source.device_copy(device)?;
            let back = remote.device_copy(ndbox::Device::CPU)?;
            println!("{} round trip: {}", device, back.get_data()? == source.get_data()?);
        }
    }
    println!("{}", source);

    Ok(())
}
