use building_energy_anomaly::config::Config;
use building_energy_anomaly::models::energy::AggregatedPeriod;
use building_energy_anomaly::services::aggregate::{Aggregator, Granularity};
use building_energy_anomaly::services::ingest::load_dataset;
use building_energy_anomaly::services::kpis::KpiSummary;
use building_energy_anomaly::services::prepare::{attach_capacity, attach_weather};
use building_energy_anomaly::services::ranking::top_n;
use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    granularity: Granularity,
    periods: Vec<AggregatedPeriod>,
    top: Vec<AggregatedPeriod>,
    kpis: KpiSummary,
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (input={}, granularity={}, weight_hdd={}, weight_occupancy={}, top_n={}, city={}, year={}, month={})",
        cfg.input_path.display(),
        cfg.granularity,
        cfg.baseline.weight_hdd,
        cfg.baseline.weight_occupancy,
        cfg.top_n,
        cfg.selection.city.as_deref().unwrap_or("-"),
        cfg.selection.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string()),
        cfg.selection.month.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()),
    );

    // 2) Load input tables
    let dataset = load_dataset(&cfg.input_path)?;

    // 3) Joins the loader left to us
    let mut readings = dataset.readings;
    if !dataset.weather.is_empty() {
        readings = attach_weather(&readings, &dataset.buildings, &dataset.weather);
    }
    let readings = attach_capacity(&readings, &dataset.buildings);

    // 4) Caller selection
    let (buildings, readings) = cfg.selection.apply(&readings, &dataset.buildings);
    if readings.is_empty() {
        return Err("No readings left after applying the selection".into());
    }

    // 5) Aggregate and score
    let periods = Aggregator::new(cfg.baseline).aggregate(&readings, &buildings, cfg.granularity);
    let top = top_n(&periods, cfg.top_n.get());
    let kpis = KpiSummary::from_periods(&periods);
    info!(
        "Scored {} {} period(s) for {} building(s)",
        periods.len(),
        cfg.granularity,
        buildings.len()
    );

    // 6) Emit
    let report = Report {
        granularity: cfg.granularity,
        periods,
        top,
        kpis,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| format!("serializing report failed: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        let value = match arg.to_str() {
            Some("--env-file") => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            Some(s) if s.starts_with("--env-file=") => {
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                PathBuf::from(path_str)
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if env_file.replace(value).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }

    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            load_env_file(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => {
            let default_path = Path::new(".env");
            if default_path.is_file() {
                load_env_file(default_path)?;
                Ok(Some(LoadedEnvFile {
                    path: default_path.to_path_buf(),
                    explicit: false,
                }))
            } else {
                Ok(None)
            }
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in contents.lines().enumerate() {
        let Some((key, value)) = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        // Values already in the process environment win.
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// `KEY=value`, `export KEY=value`, quoted values and trailing `# comments`.
fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(format!("invalid environment variable name: {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &raw[1..];
            let end = body
                .find(quote)
                .ok_or_else(|| format!("unterminated {} quoted value", quote))?;
            let rest = body[end + 1..].trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err("unexpected characters after closing quote".to_string());
            }
            body[..end].to_string()
        }
        _ => raw.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "building-energy-anomaly {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
