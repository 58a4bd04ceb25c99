use memsync::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let repo_root = cli::resolve_repo(cli.repo.as_deref()).ok();
    let cfg = match cli::load_config(&cli, repo_root.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("config load failed, using defaults: {err}");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            if let Some(host) = cli.host.as_ref() {
                cfg.host = Some(host.clone());
            }
            cfg
        }
    };

    let telemetry_guard =
        telemetry::init(telemetry::TelemetryConfig::new(cli.verbose, cfg.logging.clone()));

    let code = match cli::run(cli, cfg) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(
                disposition = e.disposition().as_str(),
                effect = e.effect().as_str(),
                "command failed"
            );
            eprintln!("error: {e}");
            1
        }
    };
    // exit skips destructors; flush file logs first
    drop(telemetry_guard);
    std::process::exit(code);
}
