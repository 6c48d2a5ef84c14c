use cranelift_codegen::VERSION as CRANELIFT_VERSION;
use fibgen_codegen::{build_module, emit_object_file, GenConfig};
use log::info;

/// Cranelift release this generator was written against. A large gap to
/// the linked version may mean API or output differences.
const WRITTEN_AGAINST: &str = "0.116.0";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!(
        "At the time of writing, Cranelift version is {}. Your version is: {}",
        WRITTEN_AGAINST, CRANELIFT_VERSION
    );

    let config = GenConfig::default();

    let module = match build_module(&config) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return;
        }
    };

    println!("--In-memory Cranelift IR representation is:--");
    println!("{}", module);

    // Emission failures are reported but never change the exit status.
    match emit_object_file(&module, &config) {
        Ok(summary) => info!(
            "emitted {} for {} ({} bytes)",
            summary.path.display(),
            summary.triple,
            summary.bytes
        ),
        Err(e) => eprintln!("error: {:#}", e),
    }
}
