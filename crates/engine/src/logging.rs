/// Installs the `env_logger` backend. `RUST_LOG` wins unless `quiet` or
/// `verbose` is set; a second call is a no-op.
pub fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if builder.target(env_logger::Target::Stderr).try_init().is_err() {
        log::debug!("Logger already installed");
    }
}
