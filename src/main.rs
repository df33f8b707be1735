use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let mut settings = linkedit::Settings::default();
    apply_env_overrides(&mut settings)?;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-V" | "--version" => {
                print_version();
                return Ok(());
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "--backend" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--backend requires COMMAND"))?;
                settings.backend.command = Some(value.into());
            }
            "--timeout" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--timeout requires SECONDS|off"))?;
                settings.backend.request_timeout =
                    parse_timeout(&value).with_context(|| "parse --timeout")?;
            }
            _ if arg.starts_with("--backend=") => {
                let value = arg.trim_start_matches("--backend=");
                settings.backend.command = Some(value.into());
            }
            _ if arg.starts_with("--timeout=") => {
                let value = arg.trim_start_matches("--timeout=");
                settings.backend.request_timeout =
                    parse_timeout(value).with_context(|| "parse --timeout")?;
            }
            other => return Err(anyhow::anyhow!("unknown argument {other}")),
        }
    }

    linkedit::run_stdio_server(settings)
}

fn apply_env_overrides(settings: &mut linkedit::Settings) -> anyhow::Result<()> {
    if let Ok(command) = std::env::var("LINKEDIT_BACKEND") {
        if !command.trim().is_empty() {
            settings.backend.command = Some(command.into());
        }
    }
    if let Ok(args) = std::env::var("LINKEDIT_BACKEND_ARGS") {
        settings.backend.args = args.split_whitespace().map(str::to_string).collect();
    }
    if let Ok(timeout) = std::env::var("LINKEDIT_REQUEST_TIMEOUT") {
        settings.backend.request_timeout =
            parse_timeout(&timeout).with_context(|| "parse LINKEDIT_REQUEST_TIMEOUT")?;
    }
    Ok(())
}

fn parse_timeout(value: &str) -> anyhow::Result<Option<std::time::Duration>> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("off") || trimmed == "0" {
        return Ok(None);
    }
    let (number, unit) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], 1),
        Some('m') => (&trimmed[..trimmed.len() - 1], 60),
        Some('h') => (&trimmed[..trimmed.len() - 1], 3600),
        _ => (trimmed, 1),
    };
    let amount: u64 = number
        .parse()
        .with_context(|| "request timeout must be a number of seconds or use s/m/h suffix")?;
    let seconds = amount.saturating_mul(unit);
    Ok(Some(std::time::Duration::from_secs(seconds)))
}

fn print_usage() {
    eprintln!(
        "Usage:\n  linkedit [--backend COMMAND] [--timeout SECONDS|off]\n\nEnvironment:\n  LINKEDIT_BACKEND, LINKEDIT_BACKEND_ARGS, LINKEDIT_REQUEST_TIMEOUT\n"
    );
}

fn print_version() {
    println!("linkedit {}", env!("CARGO_PKG_VERSION"));
}
