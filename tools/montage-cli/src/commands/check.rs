//! Report engine availability.

use montage_common::config::{config_file_path, AppConfig, EngineBackend};
use montage_engine::{available_backends, open_runtime, EngineSession};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Montage Engine Check");
    println!("{}", "=".repeat(50));

    println!("Config file: {}", config_file_path().display());
    println!("Configured backend: {:?}", config.engine.backend);
    println!();

    let available = available_backends();
    let mut configured_ok = false;
    for backend in [EngineBackend::Simulated, EngineBackend::Native] {
        if !available.contains(&backend) {
            println!("[--] {backend:?}: not compiled in");
            continue;
        }

        let engine = montage_common::config::EngineConfig {
            backend,
            ..config.engine.clone()
        };
        let result = open_runtime(&engine).and_then(EngineSession::open);
        match result {
            Ok(session) => {
                session.close();
                println!("[OK] {backend:?}: engine initialized and created a timeline");
                configured_ok |= backend == config.engine.backend;
            }
            Err(e) => println!("[FAIL] {backend:?}: {e}"),
        }
    }

    println!();
    if configured_ok {
        println!("The configured backend is ready.");
    } else {
        println!("The configured backend is not usable. See above.");
    }

    Ok(())
}
